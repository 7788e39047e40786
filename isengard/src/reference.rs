use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::TemplateError;
use crate::fs::normalize;
use crate::target::Target;

/// A segment of a parsed target template.
#[derive(Clone, Eq, PartialEq, Debug)]
enum Segment {
  Literal(String),
  Placeholder(String),
}

/// An unresolved target: a template with `{name}` placeholders, anchored to the working directory that was active
/// when the owning rule was declared.
#[derive(Clone, Eq, PartialEq)]
pub struct TargetReference {
  workdir: PathBuf,
  template: String,
  segments: Vec<Segment>,
}

impl TargetReference {
  /// Parses `template`, anchoring it at `workdir`. `{{` and `}}` are literal braces.
  pub fn parse(workdir: impl Into<PathBuf>, template: impl Into<String>) -> Result<Self, TemplateError> {
    let template = template.into();
    let segments = parse_segments(&template)?;
    if segments.is_empty() {
      return Err(TemplateError::Empty);
    }
    Ok(Self { workdir: workdir.into(), template, segments })
  }

  #[inline]
  pub fn workdir(&self) -> &Path { &self.workdir }
  #[inline]
  pub fn template(&self) -> &str { &self.template }
  /// Iterates over the configuration names this template refers to.
  pub fn keys(&self) -> impl Iterator<Item=&str> + '_ {
    self.segments.iter().filter_map(|s| match s {
      Segment::Placeholder(key) => Some(key.as_str()),
      _ => None,
    })
  }

  /// Resolves this reference against `config`: substitutes every placeholder, then decides the kind of target from
  /// the result. A trailing `@` gives a virtual target; a trailing `/` a folder; anything else a file. Relative paths
  /// are joined onto the working directory of this reference.
  ///
  /// # Errors
  ///
  /// Returns the name of the first placeholder that has no value in `config`.
  pub fn resolve(&self, config: &Config) -> Result<Target, String> {
    let mut resolved = String::new();
    for segment in &self.segments {
      match segment {
        Segment::Literal(literal) => resolved.push_str(literal),
        Segment::Placeholder(key) => {
          let value = config.get(key).ok_or_else(|| key.clone())?;
          resolved.push_str(&value.to_string());
        }
      }
    }

    if let Some(name) = resolved.strip_suffix('@') {
      return Ok(Target::Virtual(name.to_string()));
    }
    let is_folder = resolved.ends_with('/') || resolved.ends_with(std::path::MAIN_SEPARATOR);
    let path = Path::new(&resolved);
    let path = if path.is_absolute() { normalize(path) } else { normalize(self.workdir.join(path)) };
    if is_folder {
      Ok(Target::Folder(path))
    } else {
      Ok(Target::File(path))
    }
  }
}

impl Debug for TargetReference {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?} in {}", self.template, self.workdir.display())
  }
}

fn parse_segments(template: &str) -> Result<Vec<Segment>, TemplateError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = template.char_indices().peekable();
  while let Some((i, c)) = chars.next() {
    match c {
      '{' if matches!(chars.peek(), Some((_, '{'))) => {
        chars.next();
        literal.push('{');
      }
      '}' if matches!(chars.peek(), Some((_, '}'))) => {
        chars.next();
        literal.push('}');
      }
      '{' => {
        let mut key = String::new();
        loop {
          match chars.next() {
            Some((_, '}')) => break,
            Some((_, '{')) | None => return Err(TemplateError::UnclosedPlaceholder(i)),
            Some((_, c)) => key.push(c),
          }
        }
        if key.is_empty() {
          return Err(TemplateError::EmptyPlaceholder(i));
        }
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder(key));
      }
      '}' => return Err(TemplateError::UnopenedPlaceholder(i)),
      c => literal.push(c),
    }
  }
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }
  Ok(segments)
}
