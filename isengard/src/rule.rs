use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use crate::config::{ConfigValue, is_binding};
use crate::error::{ArgumentError, BoxError, DeclarationError};
use crate::reference::TargetReference;
use crate::target::Target;

/// The body of a rule. Receives exactly the parameters it declared, already bound to concrete targets and
/// configuration values. On success, every declared output must exist in its final form.
pub trait Action: Send + Sync + 'static {
  fn execute(&self, args: &ActionArgs) -> Result<(), BoxError>;
}

impl<F: Fn(&ActionArgs) -> Result<(), BoxError> + Send + Sync + 'static> Action for F {
  #[inline]
  fn execute(&self, args: &ActionArgs) -> Result<(), BoxError> { self(args) }
}

/// How one side (outputs or inputs) of a rule is bound to the action.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Binding {
  /// `output`/`input`: the sole target.
  One,
  /// `outputs`/`inputs`: the full ordered list of targets.
  Many,
  /// No inputs; the action declares no input-shaped parameter.
  None,
}


/// A rule declaration: a named transformation from input target templates to output target templates.
///
/// ```
/// use isengard::rule::Rule;
///
/// let rule = Rule::new("compile")
///   .output("{build_dir}/a.o")
///   .input("src/a.c")
///   .params(["output", "input", "cc"])
///   .action(|args| {
///     let _cc = args.config("cc")?;
///     let _object = args.output()?;
///     Ok(())
///   });
/// assert_eq!(rule.name(), "compile");
/// ```
pub struct Rule {
  name: String,
  output: Option<String>,
  outputs: Option<Vec<String>>,
  input: Option<String>,
  inputs: Option<Vec<String>>,
  params: Vec<String>,
  action: Option<Arc<dyn Action>>,
}

impl Rule {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      output: None,
      outputs: None,
      input: None,
      inputs: None,
      params: Vec::new(),
      action: None,
    }
  }

  /// Declares the sole output; the action must have an `output` parameter.
  #[inline]
  pub fn output(mut self, template: impl Into<String>) -> Self {
    self.output = Some(template.into());
    self
  }
  /// Declares the outputs; the action must have an `outputs` parameter.
  #[inline]
  pub fn outputs<S: Into<String>>(mut self, templates: impl IntoIterator<Item=S>) -> Self {
    self.outputs = Some(templates.into_iter().map(Into::into).collect());
    self
  }
  /// Declares the sole input; the action must have an `input` parameter.
  #[inline]
  pub fn input(mut self, template: impl Into<String>) -> Self {
    self.input = Some(template.into());
    self
  }
  /// Declares the inputs; the action must have an `inputs` parameter.
  #[inline]
  pub fn inputs<S: Into<String>>(mut self, templates: impl IntoIterator<Item=S>) -> Self {
    self.inputs = Some(templates.into_iter().map(Into::into).collect());
    self
  }
  /// Declares the parameters of the action: `output` or `outputs`, `input` or `inputs` (when the rule has inputs),
  /// and the names of the configuration values to inject.
  #[inline]
  pub fn params<S: Into<String>>(mut self, params: impl IntoIterator<Item=S>) -> Self {
    self.params = params.into_iter().map(Into::into).collect();
    self
  }
  #[inline]
  pub fn action(self, action: impl Fn(&ActionArgs) -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
    self.action_object(action)
  }
  /// Sets the action to an [`Action`] implementation that is not a closure.
  #[inline]
  pub fn action_object(mut self, action: impl Action) -> Self {
    self.action = Some(Arc::new(action));
    self
  }

  #[inline]
  pub fn name(&self) -> &str { &self.name }

  /// Validates this declaration and anchors its target templates at `workdir`.
  pub(crate) fn declare(self, workdir: &Path) -> Result<DeclaredRule, DeclarationError> {
    let rule = self.name;
    let has = |p: &str| self.params.iter().any(|q| q == p);
    let mismatch = |expected| DeclarationError::ParameterMismatch { rule: rule.clone(), expected };

    for (i, param) in self.params.iter().enumerate() {
      if self.params[..i].contains(param) {
        return Err(DeclarationError::DuplicateParameter { owner: rule.clone(), param: param.clone() });
      }
    }

    let (outputs, output_binding) = match (self.output, self.outputs) {
      (Some(_), Some(_)) => return Err(DeclarationError::BothOutputForms { rule }),
      (Some(output), None) => {
        if !has("output") || has("outputs") {
          return Err(mismatch("an `output` and no `outputs` parameter"));
        }
        (vec![output], Binding::One)
      }
      (None, Some(outputs)) => {
        if !has("outputs") || has("output") {
          return Err(mismatch("an `outputs` and no `output` parameter"));
        }
        if outputs.is_empty() {
          return Err(DeclarationError::EmptyOutputs { rule });
        }
        (outputs, Binding::Many)
      }
      (None, None) => return Err(DeclarationError::MissingOutput { rule }),
    };

    let (inputs, input_binding) = match (self.input, self.inputs) {
      (Some(_), Some(_)) => return Err(DeclarationError::BothInputForms { rule }),
      (Some(input), None) => {
        if !has("input") || has("inputs") {
          return Err(mismatch("an `input` and no `inputs` parameter"));
        }
        (vec![input], Binding::One)
      }
      (None, Some(inputs)) => {
        if !has("inputs") || has("input") {
          return Err(mismatch("an `inputs` and no `input` parameter"));
        }
        (inputs, Binding::Many)
      }
      (None, None) => {
        if let Some(param) = self.params.iter().find(|p| *p == "input" || *p == "inputs") {
          return Err(DeclarationError::UnexpectedInputParameter { rule, param: param.clone() });
        }
        (Vec::new(), Binding::None)
      }
    };

    let Some(action) = self.action else {
      return Err(DeclarationError::MissingAction { rule });
    };

    let parse = |templates: Vec<String>| -> Result<Vec<TargetReference>, DeclarationError> {
      templates.into_iter().map(|template| {
        TargetReference::parse(workdir, template.clone())
          .map_err(|reason| DeclarationError::InvalidTemplate { owner: rule.clone(), template, reason })
      }).collect()
    };
    let outputs = parse(outputs)?;
    let inputs = parse(inputs)?;
    let config = self.params.into_iter().filter(|p| !is_binding(p)).collect();

    Ok(DeclaredRule { name: rule, outputs, inputs, output_binding, input_binding, config, action })
  }
}

impl Debug for Rule {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Rule")
      .field("name", &self.name)
      .field("output", &self.output)
      .field("outputs", &self.outputs)
      .field("input", &self.input)
      .field("inputs", &self.inputs)
      .field("params", &self.params)
      .finish_non_exhaustive()
  }
}


/// A validated rule whose targets are still unresolved references.
pub(crate) struct DeclaredRule {
  pub(crate) name: String,
  pub(crate) outputs: Vec<TargetReference>,
  pub(crate) inputs: Vec<TargetReference>,
  pub(crate) output_binding: Binding,
  pub(crate) input_binding: Binding,
  pub(crate) config: Vec<String>,
  pub(crate) action: Arc<dyn Action>,
}

impl Debug for DeclaredRule {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DeclaredRule")
      .field("name", &self.name)
      .field("outputs", &self.outputs)
      .field("inputs", &self.inputs)
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}


/// A rule whose targets are resolved and whose configuration parameters are bound. Immutable.
pub struct ResolvedRule {
  pub(crate) name: String,
  pub(crate) outputs: Vec<Target>,
  pub(crate) inputs: Vec<Target>,
  pub(crate) output_binding: Binding,
  pub(crate) input_binding: Binding,
  pub(crate) config: Vec<(String, ConfigValue)>,
  pub(crate) action: Arc<dyn Action>,
}

impl ResolvedRule {
  #[inline]
  pub fn name(&self) -> &str { &self.name }
  #[inline]
  pub fn outputs(&self) -> &[Target] { &self.outputs }
  #[inline]
  pub fn inputs(&self) -> &[Target] { &self.inputs }
  #[inline]
  pub fn output_binding(&self) -> Binding { self.output_binding }
  #[inline]
  pub fn input_binding(&self) -> Binding { self.input_binding }

  /// Invokes the action of this rule with its bound arguments.
  #[inline]
  pub(crate) fn execute(&self) -> Result<(), BoxError> {
    self.action.execute(&ActionArgs { rule: self })
  }
}

impl Debug for ResolvedRule {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResolvedRule")
      .field("name", &self.name)
      .field("outputs", &self.outputs)
      .field("inputs", &self.inputs)
      .finish_non_exhaustive()
  }
}


impl Display for ResolvedRule {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} (", self.name)?;
    for (i, output) in self.outputs.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{}", output)?;
    }
    f.write_str(")")
  }
}


/// Arguments bound to an action: the targets and configuration values of the parameters it declared.
pub struct ActionArgs<'a> {
  rule: &'a ResolvedRule,
}

impl<'a> ActionArgs<'a> {
  /// Gets the sole output, bound when the action declared `output`.
  pub fn output(&self) -> Result<&'a Target, ArgumentError> {
    match self.rule.output_binding {
      Binding::One => self.rule.outputs.first().ok_or_else(|| ArgumentError::Undeclared("output".to_string())),
      _ => Err(ArgumentError::Undeclared("output".to_string())),
    }
  }
  /// Gets all outputs, bound when the action declared `outputs`.
  pub fn outputs(&self) -> Result<&'a [Target], ArgumentError> {
    match self.rule.output_binding {
      Binding::Many => Ok(&self.rule.outputs),
      _ => Err(ArgumentError::Undeclared("outputs".to_string())),
    }
  }
  /// Gets the sole input, bound when the action declared `input`.
  pub fn input(&self) -> Result<&'a Target, ArgumentError> {
    match self.rule.input_binding {
      Binding::One => self.rule.inputs.first().ok_or_else(|| ArgumentError::Undeclared("input".to_string())),
      _ => Err(ArgumentError::Undeclared("input".to_string())),
    }
  }
  /// Gets all inputs, bound when the action declared `inputs`.
  pub fn inputs(&self) -> Result<&'a [Target], ArgumentError> {
    match self.rule.input_binding {
      Binding::Many => Ok(&self.rule.inputs),
      _ => Err(ArgumentError::Undeclared("inputs".to_string())),
    }
  }
  /// Gets the value of declared configuration parameter `name`.
  pub fn config(&self, name: &str) -> Result<&'a ConfigValue, ArgumentError> {
    self.rule.config.iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v)
      .ok_or_else(|| ArgumentError::Undeclared(name.to_string()))
  }
  /// Gets the value of declared configuration parameter `name` as a path.
  pub fn path(&self, name: &str) -> Result<&'a Path, ArgumentError> {
    self.config(name)?.as_path().ok_or_else(|| ArgumentError::WrongShape { name: name.to_string(), expected: "a path" })
  }
  /// Gets the value of declared configuration parameter `name` as a string.
  pub fn str(&self, name: &str) -> Result<&'a str, ArgumentError> {
    self.config(name)?.as_str().ok_or_else(|| ArgumentError::WrongShape { name: name.to_string(), expected: "a string" })
  }
  /// Gets the name of the rule being executed.
  #[inline]
  pub fn rule_name(&self) -> &'a str { &self.rule.name }
}
