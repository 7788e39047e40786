use std::fmt::{Display, Formatter};

use crate::error::RunError;
use crate::rule::ResolvedRule;
use crate::store::FingerprintStore;
use crate::target::{Fingerprint, Target};

/// Reason why a rule cannot be skipped.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Inconsistency {
  /// The rule declares no inputs, so there is no input history to compare against.
  NoInputs,
  /// A virtual target among the outputs or inputs; virtual targets never have a fingerprint.
  Virtual(Target),
  /// An output does not exist.
  OutputMissing(Target),
  /// An output was never recorded, or changed since it was recorded.
  OutputChanged { target: Target, recorded: Option<Fingerprint>, current: Fingerprint },
  /// An input does not exist, was never recorded for this rule, or changed since it was recorded.
  InputChanged { target: Target, recorded: Option<Fingerprint>, current: Option<Fingerprint> },
}

impl Display for Inconsistency {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Inconsistency::NoInputs => f.write_str("no inputs"),
      Inconsistency::Virtual(target) => write!(f, "virtual target {}", target),
      Inconsistency::OutputMissing(target) => write!(f, "output {} missing", target),
      Inconsistency::OutputChanged { target, recorded: None, .. } => write!(f, "output {} not recorded", target),
      Inconsistency::OutputChanged { target, recorded: Some(recorded), current } =>
        write!(f, "output {} changed [{:?} ≠ {:?}]", target, recorded, current),
      Inconsistency::InputChanged { target, current: None, .. } => write!(f, "input {} missing", target),
      Inconsistency::InputChanged { target, recorded: None, .. } => write!(f, "input {} not recorded", target),
      Inconsistency::InputChanged { target, recorded: Some(recorded), current: Some(current) } =>
        write!(f, "input {} changed [{:?} ≠ {:?}]", target, recorded, current),
    }
  }
}


/// Key under which the fingerprint of `input`, as consumed by `rule`, is recorded. Outputs are keyed by their
/// identity; inputs are keyed per consuming rule so that a producer refreshing its output record never hides the
/// change from its consumers.
pub fn input_key(rule: &ResolvedRule, input: &Target) -> String {
  let consumer = rule.outputs.first().map(|t| t.identity()).unwrap_or_default();
  format!("{}|{}", consumer, input.identity())
}

/// Fingerprints of the outputs and inputs of a rule, in declaration order.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub(crate) struct Fingerprints {
  pub(crate) outputs: Vec<Option<Fingerprint>>,
  pub(crate) inputs: Vec<Option<Fingerprint>>,
}

impl Fingerprints {
  /// Reads the recorded fingerprints of `rule` from `store`.
  pub(crate) fn recorded(rule: &ResolvedRule, store: &impl FingerprintStore) -> Self {
    Self {
      outputs: rule.outputs.iter().map(|t| store.get(&t.identity())).collect(),
      inputs: rule.inputs.iter().map(|t| store.get(&input_key(rule, t))).collect(),
    }
  }

  /// Observes the current fingerprints of the outputs and inputs of `rule`.
  pub(crate) fn observe(rule: &ResolvedRule) -> Result<Self, RunError> {
    Ok(Self {
      outputs: observe_all(rule, &rule.outputs)?,
      inputs: observe_all(rule, &rule.inputs)?,
    })
  }

  /// Records these fingerprints for `rule` into `store`; absent fingerprints remove the record.
  pub(crate) fn record(&self, rule: &ResolvedRule, store: &mut impl FingerprintStore) {
    for (target, fingerprint) in rule.outputs.iter().zip(&self.outputs) {
      set_or_remove(store, target.identity(), *fingerprint);
    }
    for (target, fingerprint) in rule.inputs.iter().zip(&self.inputs) {
      set_or_remove(store, input_key(rule, target), *fingerprint);
    }
  }
}

pub(crate) fn observe_all(rule: &ResolvedRule, targets: &[Target]) -> Result<Vec<Option<Fingerprint>>, RunError> {
  targets.iter().map(|target| target.fingerprint().map_err(|source| RunError::Fingerprint {
    rule: rule.name.clone(),
    target: target.identity(),
    source,
  })).collect()
}

fn set_or_remove(store: &mut impl FingerprintStore, key: String, fingerprint: Option<Fingerprint>) {
  match fingerprint {
    Some(fingerprint) => store.set(key, fingerprint),
    None => store.remove(&key),
  }
}

/// Decides whether `rule` can be skipped, given its `recorded` and `current` fingerprints. Returns `None` if it can be
/// skipped, or the first reason it cannot.
pub(crate) fn check(rule: &ResolvedRule, recorded: &Fingerprints, current: &Fingerprints) -> Option<Inconsistency> {
  if rule.inputs.is_empty() {
    return Some(Inconsistency::NoInputs);
  }
  if let Some(target) = rule.outputs.iter().chain(&rule.inputs).find(|t| t.is_virtual()) {
    return Some(Inconsistency::Virtual(target.clone()));
  }
  for ((target, recorded), current) in rule.outputs.iter().zip(&recorded.outputs).zip(&current.outputs) {
    let Some(current) = current else {
      return Some(Inconsistency::OutputMissing(target.clone()));
    };
    if recorded.as_ref() != Some(current) {
      return Some(Inconsistency::OutputChanged { target: target.clone(), recorded: *recorded, current: *current });
    }
  }
  for ((target, recorded), current) in rule.inputs.iter().zip(&recorded.inputs).zip(&current.inputs) {
    if current.is_none() || recorded != current {
      return Some(Inconsistency::InputChanged { target: target.clone(), recorded: *recorded, current: *current });
    }
  }
  None
}
