use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};

use hashlink::LinkedHashMap;
use tracing::{debug, trace};

use crate::error::{ArgumentError, BoxError, ConfigError, DeclarationError, Unresolved};

/// Names that are bound by the orchestrator itself and can never be supplied as configuration.
pub const RESERVED_NAMES: [&str; 5] = ["output", "outputs", "input", "inputs", "basedir"];
/// Name of the base directory configuration value, which is always injected.
pub const BASEDIR: &str = "basedir";

#[inline]
pub(crate) fn is_reserved(name: &str) -> bool { RESERVED_NAMES.contains(&name) }
/// Binding names are reserved names that can never be configuration parameters; `basedir` can.
#[inline]
pub(crate) fn is_binding(name: &str) -> bool { name != BASEDIR && is_reserved(name) }

/// Returns `true` if `name` is a valid configuration name: an ASCII identifier.
pub fn is_valid_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}


/// A path-like or string scalar.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Scalar {
  Path(PathBuf),
  Str(String),
}

impl Display for Scalar {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Scalar::Path(path) => write!(f, "{}", path.display()),
      Scalar::Str(string) => f.write_str(string),
    }
  }
}

impl From<&str> for Scalar {
  #[inline]
  fn from(value: &str) -> Self { Self::Str(value.to_string()) }
}
impl From<String> for Scalar {
  #[inline]
  fn from(value: String) -> Self { Self::Str(value) }
}
impl From<PathBuf> for Scalar {
  #[inline]
  fn from(value: PathBuf) -> Self { Self::Path(value) }
}
impl From<&Path> for Scalar {
  #[inline]
  fn from(value: &Path) -> Self { Self::Path(value.to_path_buf()) }
}


/// A configuration value: a path-like scalar, a string scalar, or an ordered tuple of scalars.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum ConfigValue {
  Path(PathBuf),
  Str(String),
  Tuple(Vec<Scalar>),
}

impl ConfigValue {
  /// Creates a tuple value from `items`.
  #[inline]
  pub fn tuple<S: Into<Scalar>>(items: impl IntoIterator<Item=S>) -> Self {
    Self::Tuple(items.into_iter().map(Into::into).collect())
  }

  #[inline]
  pub fn as_path(&self) -> Option<&Path> {
    match self {
      ConfigValue::Path(path) => Some(path),
      _ => None,
    }
  }
  #[inline]
  pub fn as_str(&self) -> Option<&str> {
    match self {
      ConfigValue::Str(string) => Some(string),
      _ => None,
    }
  }
  #[inline]
  pub fn as_tuple(&self) -> Option<&[Scalar]> {
    match self {
      ConfigValue::Tuple(items) => Some(items),
      _ => None,
    }
  }
  /// Returns the items of this value as strings: one string for a scalar, one per element for a tuple.
  pub fn to_strings(&self) -> Vec<String> {
    match self {
      ConfigValue::Tuple(items) => items.iter().map(|s| s.to_string()).collect(),
      scalar => vec![scalar.to_string()],
    }
  }
}

/// Formats paths by their display form, strings as-is, and tuples as their elements joined by single spaces. This is
/// the form substituted into target templates.
impl Display for ConfigValue {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      ConfigValue::Path(path) => write!(f, "{}", path.display()),
      ConfigValue::Str(string) => f.write_str(string),
      ConfigValue::Tuple(items) => {
        let mut first = true;
        for item in items {
          if !first {
            f.write_str(" ")?;
          }
          write!(f, "{}", item)?;
          first = false;
        }
        Ok(())
      }
    }
  }
}

impl From<Scalar> for ConfigValue {
  #[inline]
  fn from(value: Scalar) -> Self {
    match value {
      Scalar::Path(path) => Self::Path(path),
      Scalar::Str(string) => Self::Str(string),
    }
  }
}
impl From<&str> for ConfigValue {
  #[inline]
  fn from(value: &str) -> Self { Self::Str(value.to_string()) }
}
impl From<String> for ConfigValue {
  #[inline]
  fn from(value: String) -> Self { Self::Str(value) }
}
impl From<PathBuf> for ConfigValue {
  #[inline]
  fn from(value: PathBuf) -> Self { Self::Path(value) }
}
impl From<&Path> for ConfigValue {
  #[inline]
  fn from(value: &Path) -> Self { Self::Path(value.to_path_buf()) }
}
impl<S: Into<Scalar>> From<Vec<S>> for ConfigValue {
  #[inline]
  fn from(value: Vec<S>) -> Self { Self::tuple(value) }
}


/// Immutable, flat mapping from configuration name to value, in resolution order.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Config {
  values: LinkedHashMap<String, ConfigValue>,
}

impl Config {
  #[inline]
  pub fn get(&self, name: &str) -> Option<&ConfigValue> { self.values.get(name) }
  #[inline]
  pub fn contains(&self, name: &str) -> bool { self.values.contains_key(name) }
  #[inline]
  pub fn len(&self) -> usize { self.values.len() }
  #[inline]
  pub fn is_empty(&self) -> bool { self.values.is_empty() }
  #[inline]
  pub fn iter(&self) -> impl Iterator<Item=(&str, &ConfigValue)> + '_ {
    self.values.iter().map(|(k, v)| (k.as_str(), v))
  }
}

impl Debug for Config {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_map().entries(self.values.iter()).finish()
  }
}


type LazyFn = dyn Fn(&ConfigArgs) -> Result<ConfigValue, BoxError> + Send + Sync;

/// A named configuration value computed from other configuration values. The declared parameter names are the
/// complete dependency declaration of the function.
pub struct LazyConfig {
  name: String,
  params: Vec<String>,
  func: Box<LazyFn>,
}

impl LazyConfig {
  pub fn new<P: Into<String>>(
    name: impl Into<String>,
    params: impl IntoIterator<Item=P>,
    func: impl Fn(&ConfigArgs) -> Result<ConfigValue, BoxError> + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      params: params.into_iter().map(Into::into).collect(),
      func: Box::new(func),
    }
  }

  #[inline]
  pub fn name(&self) -> &str { &self.name }
  #[inline]
  pub fn params(&self) -> &[String] { &self.params }

  /// Validates the name and parameters of this lazy configuration.
  pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
    if is_reserved(&self.name) {
      return Err(DeclarationError::ReservedLazyConfig { name: self.name.clone() });
    }
    if !is_valid_name(&self.name) {
      return Err(DeclarationError::InvalidLazyConfigName { name: self.name.clone() });
    }
    for (i, param) in self.params.iter().enumerate() {
      if is_binding(param) {
        return Err(DeclarationError::ReservedParameter { owner: self.name.clone(), param: param.clone() });
      }
      if self.params[..i].contains(param) {
        return Err(DeclarationError::DuplicateParameter { owner: self.name.clone(), param: param.clone() });
      }
    }
    Ok(())
  }
}

impl Debug for LazyConfig {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LazyConfig").field("name", &self.name).field("params", &self.params).finish_non_exhaustive()
  }
}


/// Arguments passed to a lazy configuration function: exactly the values of its declared parameters.
pub struct ConfigArgs<'a> {
  owner: &'a str,
  params: &'a [String],
  values: &'a LinkedHashMap<String, ConfigValue>,
}

impl<'a> ConfigArgs<'a> {
  /// Gets the value of declared parameter `name`.
  pub fn get(&self, name: &str) -> Result<&'a ConfigValue, ArgumentError> {
    if !self.params.iter().any(|p| p == name) {
      return Err(ArgumentError::Undeclared(name.to_string()));
    }
    // Resolution only evaluates a function once all its parameters are available.
    self.values.get(name).ok_or_else(|| ArgumentError::Undeclared(name.to_string()))
  }
  /// Gets the value of declared parameter `name` as a path.
  pub fn path(&self, name: &str) -> Result<&'a Path, ArgumentError> {
    self.get(name)?.as_path().ok_or_else(|| ArgumentError::WrongShape { name: name.to_string(), expected: "a path" })
  }
  /// Gets the value of declared parameter `name` as a string.
  pub fn str(&self, name: &str) -> Result<&'a str, ArgumentError> {
    self.get(name)?.as_str().ok_or_else(|| ArgumentError::WrongShape { name: name.to_string(), expected: "a string" })
  }
  /// Gets the name of the lazy configuration being computed.
  #[inline]
  pub fn owner(&self) -> &str { self.owner }
}


/// Resolves base values and lazy configuration functions into one flat [`Config`].
///
/// Resolution is an iterative fixed-point: every pass evaluates each unresolved lazy function whose parameters are all
/// available, in registration order, and makes its result available under the function's name. When a pass resolves
/// nothing new, the remaining functions either depend on names that never exist or form a cycle; both are reported as
/// one [`ConfigError::UnresolvedLazyConfig`].
pub fn resolve(
  basedir: &Path,
  base: impl IntoIterator<Item=(String, ConfigValue)>,
  lazy_configs: &[LazyConfig],
) -> Result<Config, ConfigError> {
  let mut values = LinkedHashMap::new();
  let mut reserved = Vec::new();
  for (name, value) in base {
    if is_reserved(&name) {
      reserved.push(name);
      continue;
    }
    if !is_valid_name(&name) {
      return Err(ConfigError::InvalidName(name));
    }
    values.insert(name, value);
  }
  if !reserved.is_empty() {
    return Err(ConfigError::ReservedName(reserved));
  }
  values.insert(BASEDIR.to_string(), ConfigValue::Path(basedir.to_path_buf()));

  if let Some(lazy) = lazy_configs.iter().find(|l| values.contains_key(&l.name)) {
    return Err(ConfigError::LazyShadowsValue(lazy.name.clone()));
  }

  let mut to_run: Vec<&LazyConfig> = lazy_configs.iter().collect();
  let mut pass = 0;
  while !to_run.is_empty() {
    pass += 1;
    let mut cannot_run_yet = Vec::new();
    for lazy in to_run.iter().copied() {
      if !lazy.params.iter().all(|p| values.contains_key(p)) {
        cannot_run_yet.push(lazy);
        continue;
      }
      let args = ConfigArgs { owner: &lazy.name, params: &lazy.params, values: &values };
      let value = (lazy.func)(&args)
        .map_err(|source| ConfigError::LazyConfigFailed { name: lazy.name.clone(), source })?;
      trace!(pass, name = %lazy.name, %value, "resolved lazy config");
      values.insert(lazy.name.clone(), value);
    }

    if cannot_run_yet.len() == to_run.len() {
      let unresolved = cannot_run_yet.iter().map(|lazy| Unresolved {
        name: lazy.name.clone(),
        missing: lazy.params.iter().filter(|p| !values.contains_key(*p)).cloned().collect(),
      }).collect();
      return Err(ConfigError::UnresolvedLazyConfig(unresolved));
    }
    to_run = cannot_run_yet;
  }
  debug!(values = values.len(), passes = pass, "resolved configuration");

  Ok(Config { values })
}
