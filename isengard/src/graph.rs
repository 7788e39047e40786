use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::config::Config;
use crate::error::{ConfigError, ConfigureError, DeclarationError};
use crate::rule::{DeclaredRule, ResolvedRule};
use crate::target::Target;

/// Index of a rule in a [`RuleGraph`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RuleId(pub(crate) usize);

/// Frozen graph of resolved rules, indexed by output identity. No two rules share an output identity. Inputs that
/// are not the output of any rule are leaves, supplied externally.
#[derive(Debug, Default)]
pub struct RuleGraph {
  rules: Vec<ResolvedRule>,
  by_output: HashMap<String, RuleId>,
}

impl RuleGraph {
  /// Resolves every target reference of `declared` rules against `config`, binds the configuration parameters of
  /// their actions, and indexes them by output identity.
  pub(crate) fn finalize(declared: Vec<DeclaredRule>, config: &Config) -> Result<Self, ConfigureError> {
    let mut graph = Self::default();
    for rule in declared {
      let unknown = |key: String| ConfigError::UnknownConfig { rule: rule.name.clone(), key };
      let outputs = rule.outputs.iter().map(|r| r.resolve(config)).collect::<Result<Vec<_>, _>>().map_err(unknown)?;
      let inputs = rule.inputs.iter().map(|r| r.resolve(config)).collect::<Result<Vec<_>, _>>().map_err(unknown)?;
      let mut bound = Vec::with_capacity(rule.config.len());
      for name in &rule.config {
        let value = config.get(name).ok_or_else(|| unknown(name.clone()))?;
        bound.push((name.clone(), value.clone()));
      }

      let id = RuleId(graph.rules.len());
      for output in &outputs {
        match graph.by_output.entry(output.identity()) {
          Entry::Occupied(entry) => {
            let first = graph.rules.get(entry.get().0).map_or_else(|| rule.name.clone(), |r| r.name.clone());
            return Err(DeclarationError::DuplicateOutput {
              output: entry.key().clone(),
              first,
              second: rule.name.clone(),
            }.into());
          }
          Entry::Vacant(entry) => {
            entry.insert(id);
          }
        }
      }
      graph.rules.push(ResolvedRule {
        name: rule.name,
        outputs,
        inputs,
        output_binding: rule.output_binding,
        input_binding: rule.input_binding,
        config: bound,
        action: rule.action,
      });
    }
    debug!(rules = graph.rules.len(), outputs = graph.by_output.len(), "finalized rule graph");
    Ok(graph)
  }

  #[inline]
  pub fn len(&self) -> usize { self.rules.len() }
  #[inline]
  pub fn is_empty(&self) -> bool { self.rules.is_empty() }

  /// Gets the rule for `id`.
  ///
  /// # Panics
  ///
  /// Panics if `id` was not created by this graph.
  #[inline]
  pub fn rule(&self, id: RuleId) -> &ResolvedRule { &self.rules[id.0] }
  #[inline]
  pub fn rules(&self) -> impl Iterator<Item=(RuleId, &ResolvedRule)> + '_ {
    self.rules.iter().enumerate().map(|(i, r)| (RuleId(i), r))
  }

  /// Gets the rule that produces the target with `identity`, or `None` if it is a leaf.
  #[inline]
  pub fn producer_of(&self, identity: &str) -> Option<RuleId> { self.by_output.get(identity).copied() }
  #[inline]
  pub fn producer(&self, target: &Target) -> Option<RuleId> { self.producer_of(&target.identity()) }
}


#[cfg(test)]
mod test {
  use std::path::Path;

  use assert_matches::assert_matches;

  use crate::config::{ConfigValue, resolve};
  use crate::rule::Rule;

  use super::*;

  fn rule(name: &str, output: &str, input: Option<&str>) -> DeclaredRule {
    let mut rule = Rule::new(name).output(output);
    rule = match input {
      Some(input) => rule.input(input).params(["output", "input"]),
      None => rule.params(["output"]),
    };
    rule.action(|_| Ok(())).declare(Path::new("/proj")).unwrap()
  }

  fn config() -> Config {
    resolve(Path::new("/proj"), vec![("cc".to_string(), ConfigValue::from("clang"))], &[]).unwrap()
  }

  #[test]
  fn test_finalize_indexes_outputs() {
    let graph = RuleGraph::finalize(vec![rule("a", "{basedir}/a.o", Some("a.c")), rule("b", "b", Some("a.o"))], &config()).unwrap();
    assert_eq!(graph.len(), 2);
    let a = graph.producer_of("/proj/a.o").unwrap();
    assert_eq!(graph.rule(a).name(), "a");
    assert_eq!(graph.rule(a).inputs(), &[Target::file("/proj/a.c")]);
    assert_eq!(graph.producer_of("/proj/a.c"), None);
  }

  #[test]
  fn test_duplicate_output_names_both_rules() {
    let result = RuleGraph::finalize(vec![rule("first", "{basedir}/x", None), rule("second", "x", None)], &config());
    assert_matches!(result, Err(ConfigureError::Declaration(DeclarationError::DuplicateOutput { output, first, second })) => {
      assert_eq!(output, "/proj/x");
      assert_eq!(first, "first");
      assert_eq!(second, "second");
    });
  }

  #[test]
  fn test_unknown_template_key() {
    let result = RuleGraph::finalize(vec![rule("r", "{build_dir}/x", None)], &config());
    assert_matches!(result, Err(ConfigureError::Config(ConfigError::UnknownConfig { rule, key })) => {
      assert_eq!(rule, "r");
      assert_eq!(key, "build_dir");
    });
  }

  #[test]
  fn test_unknown_action_parameter() {
    let declared = Rule::new("r").output("x").params(["output", "cflags"]).action(|_| Ok(())).declare(Path::new("/proj")).unwrap();
    let result = RuleGraph::finalize(vec![declared], &config());
    assert_matches!(result, Err(ConfigureError::Config(ConfigError::UnknownConfig { key, .. })) if key == "cflags");
  }

  #[test]
  fn test_config_bound() {
    let declared = Rule::new("r").output("x").params(["output", "cc"]).action(|_| Ok(())).declare(Path::new("/proj")).unwrap();
    let graph = RuleGraph::finalize(vec![declared], &config()).unwrap();
    let id = graph.producer_of("/proj/x").unwrap();
    assert_eq!(graph.rule(id).config, vec![("cc".to_string(), ConfigValue::from("clang"))]);
  }
}
