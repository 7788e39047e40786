use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::build::Build;
use crate::config::{ConfigValue, LazyConfig, resolve};
use crate::error::{ConfigureError, DeclarationError};
use crate::fs::{absolute, normalize};
use crate::graph::RuleGraph;
use crate::rule::{DeclaredRule, Rule};
use crate::store::{FileStore, FingerprintStore};

/// Options of the orchestrator itself.
#[derive(Clone, Debug)]
pub struct Options {
  /// Path of the fingerprint store. Relative paths are anchored at the base directory.
  pub database: PathBuf,
  /// Script name used by [`Scope::subdir_script`] when no filename is given.
  pub subdir_default_filename: String,
  /// Maximum number of concurrently executing actions. `0` and `1` execute on the calling thread.
  pub workers: usize,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      database: PathBuf::from(".isengard.ron"),
      subdir_default_filename: "BUILD".to_string(),
      workers: std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1),
    }
  }
}


type ScriptFn = dyn Fn(&mut Scope) -> Result<(), DeclarationError> + Send + Sync;
type MetaRuleFn = dyn Fn(&mut Scope, &[&str]) -> Result<(), DeclarationError> + Send + Sync;

/// A project being declared: collects rules, lazy configuration, build scripts, and meta rules until it is
/// [configured](Isengard::configure) into a [`Build`].
pub struct Isengard {
  basedir: PathBuf,
  options: Options,
  rules: Vec<DeclaredRule>,
  lazy_configs: Vec<LazyConfig>,
  scripts: HashMap<PathBuf, Arc<ScriptFn>>,
  meta_rules: HashMap<String, Arc<MetaRuleFn>>,
}

impl Isengard {
  /// Creates a project rooted at `basedir` with default [`Options`].
  #[inline]
  pub fn new(basedir: impl AsRef<Path>) -> Self { Self::with_options(basedir, Options::default()) }

  /// Creates a project rooted at `basedir`. A relative base directory is anchored at the current directory. The
  /// normalized, absolute base directory is the value of the `basedir` configuration.
  pub fn with_options(basedir: impl AsRef<Path>, options: Options) -> Self {
    Self {
      basedir: absolute(basedir),
      options,
      rules: Vec::new(),
      lazy_configs: Vec::new(),
      scripts: HashMap::new(),
      meta_rules: HashMap::new(),
    }
  }

  #[inline]
  pub fn basedir(&self) -> &Path { &self.basedir }
  #[inline]
  pub fn options(&self) -> &Options { &self.options }

  /// Gets the scope of the base directory.
  #[inline]
  pub fn root(&mut self) -> Scope<'_> {
    let workdir = self.basedir.clone();
    Scope { project: self, workdir }
  }

  /// Declares `rule` with the base directory as working directory.
  #[inline]
  pub fn rule(&mut self, rule: Rule) -> Result<(), DeclarationError> {
    self.root().rule(rule)
  }

  /// Declares a lazy configuration value.
  ///
  /// # Errors
  ///
  /// Returns an error if the name is reserved, invalid, or already declared, or if a parameter is reserved or
  /// duplicated.
  pub fn lazy_config(&mut self, lazy_config: LazyConfig) -> Result<(), DeclarationError> {
    lazy_config.validate()?;
    if self.lazy_configs.iter().any(|l| l.name() == lazy_config.name()) {
      return Err(DeclarationError::DuplicateLazyConfig { name: lazy_config.name().to_string() });
    }
    self.lazy_configs.push(lazy_config);
    Ok(())
  }

  /// Registers `script` as the build script at `path`, relative to the base directory.
  pub fn script(
    &mut self,
    path: impl AsRef<Path>,
    script: impl Fn(&mut Scope) -> Result<(), DeclarationError> + Send + Sync + 'static,
  ) -> Result<(), DeclarationError> {
    let path = normalize(self.basedir.join(path));
    if self.scripts.contains_key(&path) {
      return Err(DeclarationError::DuplicateScript { path });
    }
    self.scripts.insert(path, Arc::new(script));
    Ok(())
  }

  /// Registers meta rule `name`: a function that declares rules into the scope it is [applied](Scope::apply) in.
  pub fn meta_rule(
    &mut self,
    name: impl Into<String>,
    meta_rule: impl Fn(&mut Scope, &[&str]) -> Result<(), DeclarationError> + Send + Sync + 'static,
  ) -> Result<(), DeclarationError> {
    let name = name.into();
    if self.meta_rules.contains_key(&name) {
      return Err(DeclarationError::DuplicateMetaRule { name });
    }
    self.meta_rules.insert(name, Arc::new(meta_rule));
    Ok(())
  }

  /// Configures this project with `base` configuration values and the durable fingerprint store at
  /// [`Options::database`].
  ///
  /// # Errors
  ///
  /// Returns an error if the configuration cannot be resolved, the graph cannot be finalized, or the store cannot be
  /// opened. No partial graph is built.
  pub fn configure<K: Into<String>, V: Into<ConfigValue>>(
    self,
    base: impl IntoIterator<Item=(K, V)>,
  ) -> Result<Build<FileStore>, ConfigureError> {
    let database = if self.options.database.is_absolute() {
      self.options.database.clone()
    } else {
      self.basedir.join(&self.options.database)
    };
    let store = FileStore::open(database)?;
    self.configure_with_store(base, store)
  }

  /// Configures this project with `base` configuration values and `store` as fingerprint store.
  pub fn configure_with_store<S: FingerprintStore, K: Into<String>, V: Into<ConfigValue>>(
    self,
    base: impl IntoIterator<Item=(K, V)>,
    store: S,
  ) -> Result<Build<S>, ConfigureError> {
    let base = base.into_iter().map(|(k, v)| (k.into(), v.into()));
    let config = resolve(&self.basedir, base, &self.lazy_configs)?;
    let graph = RuleGraph::finalize(self.rules, &config)?;
    debug!(basedir = %self.basedir.display(), rules = graph.len(), "configured");
    Ok(Build::new(self.basedir, self.options, config, graph, store))
  }
}

impl Debug for Isengard {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Isengard")
      .field("basedir", &self.basedir)
      .field("options", &self.options)
      .field("rules", &self.rules)
      .field("scripts", &self.scripts.keys().collect::<Vec<_>>())
      .field("meta_rules", &self.meta_rules.keys().collect::<Vec<_>>())
      .finish_non_exhaustive()
  }
}


/// Working-directory context in which rules are declared. Relative target templates of rules declared through a
/// scope are anchored at its working directory.
pub struct Scope<'p> {
  project: &'p mut Isengard,
  workdir: PathBuf,
}

impl Scope<'_> {
  #[inline]
  pub fn workdir(&self) -> &Path { &self.workdir }
  #[inline]
  pub fn basedir(&self) -> &Path { &self.project.basedir }

  /// Declares `rule` in this scope.
  pub fn rule(&mut self, rule: Rule) -> Result<(), DeclarationError> {
    let declared = rule.declare(&self.workdir)?;
    self.project.rules.push(declared);
    Ok(())
  }

  /// Declares a lazy configuration value. Lazy configuration is global; the scope does not affect it.
  #[inline]
  pub fn lazy_config(&mut self, lazy_config: LazyConfig) -> Result<(), DeclarationError> {
    self.project.lazy_config(lazy_config)
  }

  /// Runs `declare` in the scope of subdirectory `name` of this scope's working directory.
  pub fn subdir<R>(&mut self, name: impl AsRef<Path>, declare: impl FnOnce(&mut Scope) -> R) -> R {
    let workdir = normalize(self.workdir.join(name));
    let mut child = Scope { project: &mut *self.project, workdir };
    declare(&mut child)
  }

  /// Evaluates the build script registered at `name/filename` in the scope of subdirectory `name`. Without a
  /// `filename`, [`Options::subdir_default_filename`] is used.
  ///
  /// # Errors
  ///
  /// Returns [`DeclarationError::UnknownScript`] if no script is registered at that path, or the error of the script.
  pub fn subdir_script(&mut self, name: impl AsRef<Path>, filename: Option<&str>) -> Result<(), DeclarationError> {
    let filename = filename.unwrap_or(&self.project.options.subdir_default_filename);
    let path = normalize(self.workdir.join(name.as_ref()).join(filename));
    let script = self.project.scripts.get(&path).cloned()
      .ok_or(DeclarationError::UnknownScript { path })?;
    self.subdir(name, |scope| script(scope))
  }

  /// Applies meta rule `name` with `args` in this scope.
  ///
  /// # Errors
  ///
  /// Returns [`DeclarationError::UnknownMetaRule`] if no meta rule is registered under `name`, or the error of the
  /// meta rule.
  pub fn apply(&mut self, name: &str, args: &[&str]) -> Result<(), DeclarationError> {
    let meta_rule = self.project.meta_rules.get(name).cloned()
      .ok_or_else(|| DeclarationError::UnknownMetaRule { name: name.to_string() })?;
    meta_rule(self, args)
  }
}

impl Debug for Scope<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Scope").field("workdir", &self.workdir).finish_non_exhaustive()
  }
}
