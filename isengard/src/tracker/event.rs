use crate::check::Inconsistency;
use crate::error::RunError;
use crate::rule::ResolvedRule;
use crate::target::Target;
use crate::tracker::Tracker;

/// A [`Tracker`] that stores [`Event`]s in a [`Vec`], useful in testing to assert that builds are incremental and
/// correct.
#[derive(Clone, Debug)]
pub struct EventTracker {
  events: Vec<Event>,
  clear_on_build_start: bool,
}

impl Default for EventTracker {
  fn default() -> Self {
    Self { events: Vec::new(), clear_on_build_start: true }
  }
}

impl EventTracker {
  /// Creates a tracker that keeps events of all builds instead of clearing them when a new build starts.
  pub fn accumulating() -> Self {
    Self { events: Vec::new(), clear_on_build_start: false }
  }
}

/// Enumeration of important build events.
#[derive(Clone, Debug)]
pub enum Event {
  BuildStart(Target),
  BuildEnd { target: Target, failed: bool },

  RequireRule(RuleEvent),
  CheckRule { rule: RuleEvent, inconsistency: Option<Inconsistency> },
  UpToDate(RuleEvent),

  ExecuteStart(RuleEvent),
  ExecuteEnd { rule: RuleEvent, failed: bool },

  CleanStart(Target),
  CleanTarget(Target),
  CleanEnd(Target),
}

/// Identifies the rule an [`Event`] is about, and the position of the event.
#[derive(Clone, Debug)]
pub struct RuleEvent {
  pub name: String,
  pub outputs: Vec<Target>,
  pub index: usize,
}

impl RuleEvent {
  fn new(rule: &ResolvedRule, index: usize) -> Self {
    Self { name: rule.name().to_string(), outputs: rule.outputs().to_vec(), index }
  }
  /// Returns `true` if the rule produces `target`.
  #[inline]
  pub fn produces(&self, target: &Target) -> bool { self.outputs.contains(target) }
}

impl Tracker for EventTracker {
  #[inline]
  fn build_start(&mut self, target: &Target) {
    if self.clear_on_build_start {
      self.events.clear();
    }
    self.events.push(Event::BuildStart(target.clone()));
  }
  #[inline]
  fn build_end(&mut self, target: &Target, result: Result<(), &RunError>) {
    self.events.push(Event::BuildEnd { target: target.clone(), failed: result.is_err() });
  }

  #[inline]
  fn require_rule(&mut self, rule: &ResolvedRule) {
    let data = RuleEvent::new(rule, self.events.len());
    self.events.push(Event::RequireRule(data));
  }
  #[inline]
  fn check_rule(&mut self, rule: &ResolvedRule, inconsistency: Option<&Inconsistency>) {
    let data = RuleEvent::new(rule, self.events.len());
    self.events.push(Event::CheckRule { rule: data, inconsistency: inconsistency.cloned() });
  }

  #[inline]
  fn up_to_date(&mut self, rule: &ResolvedRule) {
    let data = RuleEvent::new(rule, self.events.len());
    self.events.push(Event::UpToDate(data));
  }

  #[inline]
  fn execute_start(&mut self, rule: &ResolvedRule) {
    let data = RuleEvent::new(rule, self.events.len());
    self.events.push(Event::ExecuteStart(data));
  }
  #[inline]
  fn execute_end(&mut self, rule: &ResolvedRule, result: Result<(), &RunError>) {
    let data = RuleEvent::new(rule, self.events.len());
    self.events.push(Event::ExecuteEnd { rule: data, failed: result.is_err() });
  }

  #[inline]
  fn clean_start(&mut self, target: &Target) {
    if self.clear_on_build_start {
      self.events.clear();
    }
    self.events.push(Event::CleanStart(target.clone()));
  }
  #[inline]
  fn clean_target(&mut self, target: &Target) {
    self.events.push(Event::CleanTarget(target.clone()));
  }
  #[inline]
  fn clean_end(&mut self, target: &Target) {
    self.events.push(Event::CleanEnd(target.clone()));
  }
}

impl Event {
  /// Returns `true` if this is an [execute start event](Event::ExecuteStart).
  pub fn is_execute_start(&self) -> bool {
    matches!(self, Event::ExecuteStart(_))
  }
  /// Returns `Some(&data)` if this is an [execute start event](Event::ExecuteStart) of the rule producing `target`,
  /// or `None` otherwise.
  pub fn match_execute_start(&self, target: &Target) -> Option<&RuleEvent> {
    match self {
      Event::ExecuteStart(data) if data.produces(target) => Some(data),
      _ => None,
    }
  }
  /// Returns `Some(&data)` if this is an [execute end event](Event::ExecuteEnd) of the rule producing `target`, or
  /// `None` otherwise.
  pub fn match_execute_end(&self, target: &Target) -> Option<&RuleEvent> {
    match self {
      Event::ExecuteEnd { rule, .. } if rule.produces(target) => Some(rule),
      _ => None,
    }
  }
  /// Returns `Some(inconsistency)` if this is a [check event](Event::CheckRule) of the rule producing `target`, or
  /// `None` otherwise.
  pub fn match_check(&self, target: &Target) -> Option<Option<&Inconsistency>> {
    match self {
      Event::CheckRule { rule, inconsistency } if rule.produces(target) => Some(inconsistency.as_ref()),
      _ => None,
    }
  }
  /// Returns `Some(&data)` if this is an [up-to-date event](Event::UpToDate) of the rule producing `target`, or
  /// `None` otherwise.
  pub fn match_up_to_date(&self, target: &Target) -> Option<&RuleEvent> {
    match self {
      Event::UpToDate(data) if data.produces(target) => Some(data),
      _ => None,
    }
  }
  /// Returns `true` if this is a [clean event](Event::CleanTarget) of `target`.
  pub fn is_clean_of(&self, target: &Target) -> bool {
    matches!(self, Event::CleanTarget(t) if t == target)
  }
}

impl EventTracker {
  /// Returns a slice over all events.
  pub fn slice(&self) -> &[Event] {
    &self.events
  }
  /// Returns an iterator over all events.
  pub fn iter(&self) -> std::slice::Iter<'_, Event> {
    self.events.iter()
  }
  /// Clears all events.
  pub fn clear(&mut self) {
    self.events.clear();
  }

  /// Returns `true` if `predicate` returns `true` for any event.
  pub fn any(&self, predicate: impl FnMut(&Event) -> bool) -> bool {
    self.iter().any(predicate)
  }
  /// Returns `true` if `predicate` returns `true` for exactly one event.
  pub fn one(&self, predicate: impl FnMut(&&Event) -> bool) -> bool {
    self.iter().filter(predicate).count() == 1
  }
  /// Returns `Some(v)` for the first event `e` where `f(e)` returns `Some(v)`, or `None` otherwise.
  pub fn find_map<'a, R>(&'a self, f: impl FnMut(&'a Event) -> Option<R>) -> Option<R> {
    self.iter().find_map(f)
  }

  /// Returns `true` if any rule was executed.
  pub fn any_execute(&self) -> bool {
    self.any(|e| e.is_execute_start())
  }
  /// Returns the number of executed rules.
  pub fn execute_count(&self) -> usize {
    self.iter().filter(|e| e.is_execute_start()).count()
  }
  /// Returns `true` if the rule producing `target` was executed.
  pub fn any_execute_of(&self, target: &Target) -> bool {
    self.any(|e| e.match_execute_start(target).is_some())
  }
  /// Returns `true` if the rule producing `target` was executed exactly once.
  pub fn one_execute_of(&self, target: &Target) -> bool {
    self.one(|e| e.match_execute_start(target).is_some())
  }
  /// Returns the index of the first [execute start event](Event::ExecuteStart) of the rule producing `target`.
  pub fn first_execute_start_index(&self, target: &Target) -> Option<usize> {
    self.find_map(|e| e.match_execute_start(target)).map(|d| d.index)
  }
  /// Returns the index of the first [execute end event](Event::ExecuteEnd) of the rule producing `target`.
  pub fn first_execute_end_index(&self, target: &Target) -> Option<usize> {
    self.find_map(|e| e.match_execute_end(target)).map(|d| d.index)
  }
  /// Returns the inconsistency found by the first [check event](Event::CheckRule) of the rule producing `target`;
  /// `Some(None)` means the rule was up-to-date.
  pub fn first_check(&self, target: &Target) -> Option<Option<&Inconsistency>> {
    self.find_map(|e| e.match_check(target))
  }
  /// Returns `true` if the rule producing `target` was found up-to-date.
  pub fn any_up_to_date_of(&self, target: &Target) -> bool {
    self.any(|e| e.match_up_to_date(target).is_some())
  }
  /// Returns `true` if `target` was cleaned.
  pub fn any_clean_of(&self, target: &Target) -> bool {
    self.any(|e| e.is_clean_of(target))
  }
  /// Returns `true` if the last build failed.
  pub fn build_failed(&self) -> bool {
    self.iter().rev().find_map(|e| match e {
      Event::BuildEnd { failed, .. } => Some(*failed),
      _ => None,
    }).unwrap_or_default()
  }
}
