use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by actions and lazy configuration functions.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Malformed declarations, detected when a rule or lazy configuration is declared, or when the graph is finalized.
#[derive(Debug, Error)]
pub enum DeclarationError {
  #[error("rule `{rule}`: cannot define both `output` and `outputs`")]
  BothOutputForms { rule: String },
  #[error("rule `{rule}`: one of `output` or `outputs` is mandatory")]
  MissingOutput { rule: String },
  #[error("rule `{rule}`: `outputs` must not be empty")]
  EmptyOutputs { rule: String },
  #[error("rule `{rule}`: cannot define both `input` and `inputs`")]
  BothInputForms { rule: String },
  #[error("rule `{rule}`: action must have {expected}")]
  ParameterMismatch { rule: String, expected: &'static str },
  #[error("rule `{rule}`: action has parameter `{param}` but the rule declares no inputs")]
  UnexpectedInputParameter { rule: String, param: String },
  #[error("rule `{rule}`: no action was given")]
  MissingAction { rule: String },
  #[error("`{owner}`: parameter `{param}` is declared more than once")]
  DuplicateParameter { owner: String, param: String },
  #[error("`{owner}`: `{param}` cannot be used as a configuration parameter")]
  ReservedParameter { owner: String, param: String },
  #[error("`{owner}`: invalid target template `{template}`: {reason}")]
  InvalidTemplate { owner: String, template: String, reason: TemplateError },
  #[error("lazy config `{name}`: name is reserved")]
  ReservedLazyConfig { name: String },
  #[error("lazy config `{name}`: invalid name")]
  InvalidLazyConfigName { name: String },
  #[error("lazy config `{name}` is declared more than once")]
  DuplicateLazyConfig { name: String },
  #[error("target `{output}` is an output of both rule `{first}` and rule `{second}`")]
  DuplicateOutput { output: String, first: String, second: String },
  #[error("meta rule `{name}` already exists")]
  DuplicateMetaRule { name: String },
  #[error("no meta rule named `{name}`")]
  UnknownMetaRule { name: String },
  #[error("no build script registered at `{}`", path.display())]
  UnknownScript { path: PathBuf },
  #[error("build script `{}` is registered more than once", path.display())]
  DuplicateScript { path: PathBuf },
  #[error("meta rule `{name}`: {message}")]
  MetaRule { name: String, message: String },
}

/// Syntax errors in target templates.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum TemplateError {
  #[error("unmatched `{{` at position {0}")]
  UnclosedPlaceholder(usize),
  #[error("unmatched `}}` at position {0}")]
  UnopenedPlaceholder(usize),
  #[error("empty placeholder at position {0}")]
  EmptyPlaceholder(usize),
  #[error("template resolves to an empty target")]
  Empty,
}

/// Errors while resolving the configuration, or while resolving target references against it.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("reserved config name(s): {}", .0.join(", "))]
  ReservedName(Vec<String>),
  #[error("invalid config name `{0}`")]
  InvalidName(String),
  #[error("lazy config `{0}` has the same name as a configuration value")]
  LazyShadowsValue(String),
  #[error("invalid lazy config: {}", format_unresolved(.0))]
  UnresolvedLazyConfig(Vec<Unresolved>),
  #[error("lazy config `{name}` failed: {source}")]
  LazyConfigFailed { name: String, #[source] source: BoxError },
  #[error("invalid rule `{rule}`: unknown config `{key}`")]
  UnknownConfig { rule: String, key: String },
}

/// A lazy configuration function that could not be resolved, with the parameters that were never found.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Unresolved {
  pub name: String,
  pub missing: Vec<String>,
}

fn format_unresolved(unresolved: &[Unresolved]) -> String {
  let mut errors = Vec::new();
  for u in unresolved {
    for missing in &u.missing {
      errors.push(format!("Unknown `{}` needed by `{}`", missing, u.name));
    }
  }
  errors.join(", ")
}

/// Errors returned by `configure`, fatal to the configure phase.
#[derive(Debug, Error)]
pub enum ConfigureError {
  #[error(transparent)]
  Declaration(#[from] DeclarationError),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("failed to open fingerprint store: {0}")]
  Store(#[from] StoreError),
}

/// A rule in a dependency cycle, as part of a [`RunError::Cycle`] path.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CycleEntry {
  pub rule: String,
  pub target: String,
}

/// Errors returned by `run` and `clean`, fatal to that call.
#[derive(Debug, Error)]
pub enum RunError {
  #[error("no rule has `{0}` as output, and it does not exist")]
  UnknownTarget(String),
  #[error("dependency cycle: {}", CyclePath(.0))]
  Cycle(Vec<CycleEntry>),
  #[error("rule `{rule}` failed: {source}")]
  Action { rule: String, #[source] source: BoxError },
  #[error("failed to fingerprint `{target}` for rule `{rule}`: {source}")]
  Fingerprint { rule: String, target: String, #[source] source: io::Error },
  #[error("failed to inspect requested target `{target}`: {source}")]
  Request { target: String, #[source] source: io::Error },
  #[error("failed to clean `{target}`: {source}")]
  Clean { target: String, #[source] source: io::Error },
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("worker executing rule `{0}` terminated unexpectedly")]
  Worker(String),
}

impl RunError {
  /// Gets the name of the rule this error originated from, if any.
  pub fn rule(&self) -> Option<&str> {
    match self {
      RunError::Action { rule, .. } | RunError::Fingerprint { rule, .. } | RunError::Worker(rule) => Some(rule),
      _ => None,
    }
  }
}

struct CyclePath<'a>(&'a [CycleEntry]);
impl Display for CyclePath<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut first = true;
    for entry in self.0 {
      if !first {
        f.write_str(" -> ")?;
      }
      write!(f, "{} ({})", entry.rule, entry.target)?;
      first = false;
    }
    Ok(())
  }
}

/// Errors of persistent fingerprint stores.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("I/O error on `{}`: {source}", path.display())]
  Io { path: PathBuf, #[source] source: io::Error },
  #[error("failed to read `{}`: {source}", path.display())]
  Deserialize { path: PathBuf, #[source] source: ron::error::SpannedError },
  #[error("failed to serialize fingerprints: {0}")]
  Serialize(#[from] ron::Error),
}

/// An action or lazy configuration function requested a parameter it did not declare, or with the wrong shape.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ArgumentError {
  #[error("parameter `{0}` was not declared")]
  Undeclared(String),
  #[error("parameter `{name}` is not {expected}")]
  WrongShape { name: String, expected: &'static str },
}
