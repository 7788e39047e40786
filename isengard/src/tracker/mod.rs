use crate::check::Inconsistency;
use crate::error::RunError;
use crate::rule::ResolvedRule;
use crate::target::Target;

pub mod writing;
pub mod event;
pub mod metrics;

/// Build event tracker. Can be used to implement logging, event tracing, progress tracking, metrics, etc.
///
/// Events are always delivered on the thread that drives the build, also when rules execute on worker threads.
#[allow(unused_variables)]
pub trait Tracker {
  /// Start: a new build of `target`.
  #[inline]
  fn build_start(&mut self, target: &Target) {}
  /// End: completed build of `target`, with `result`.
  #[inline]
  fn build_end(&mut self, target: &Target, result: Result<(), &RunError>) {}

  /// Planned `rule` as part of the current build.
  #[inline]
  fn require_rule(&mut self, rule: &ResolvedRule) {}
  /// Checked whether `rule` can be skipped, possibly finding an `inconsistency`. `None` means it is up-to-date.
  #[inline]
  fn check_rule(&mut self, rule: &ResolvedRule, inconsistency: Option<&Inconsistency>) {}

  /// Skipped `rule` because it is up-to-date.
  #[inline]
  fn up_to_date(&mut self, rule: &ResolvedRule) {}

  /// Start: execute the action of `rule`.
  #[inline]
  fn execute_start(&mut self, rule: &ResolvedRule) {}
  /// End: executed the action of `rule`, with `result`.
  #[inline]
  fn execute_end(&mut self, rule: &ResolvedRule, result: Result<(), &RunError>) {}

  /// Start: clean the outputs required for `target`.
  #[inline]
  fn clean_start(&mut self, target: &Target) {}
  /// Removed `target` and its record.
  #[inline]
  fn clean_target(&mut self, target: &Target) {}
  /// End: cleaned the outputs required for `target`.
  #[inline]
  fn clean_end(&mut self, target: &Target) {}
}

/// Implement [`Tracker`] for `()` that does nothing.
impl Tracker for () {}

/// A [`Tracker`] that forwards events to two [`Tracker`]s.
#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub struct CompositeTracker<A1, A2>(pub A1, pub A2);
impl<A1, A2> CompositeTracker<A1, A2> {
  pub fn new(tracker_1: A1, tracker_2: A2) -> Self { Self(tracker_1, tracker_2) }
}
impl<A1: Tracker, A2: Tracker> Tracker for CompositeTracker<A1, A2> {
  #[inline]
  fn build_start(&mut self, target: &Target) {
    self.0.build_start(target);
    self.1.build_start(target);
  }
  #[inline]
  fn build_end(&mut self, target: &Target, result: Result<(), &RunError>) {
    self.0.build_end(target, result);
    self.1.build_end(target, result);
  }

  #[inline]
  fn require_rule(&mut self, rule: &ResolvedRule) {
    self.0.require_rule(rule);
    self.1.require_rule(rule);
  }
  #[inline]
  fn check_rule(&mut self, rule: &ResolvedRule, inconsistency: Option<&Inconsistency>) {
    self.0.check_rule(rule, inconsistency);
    self.1.check_rule(rule, inconsistency);
  }

  #[inline]
  fn up_to_date(&mut self, rule: &ResolvedRule) {
    self.0.up_to_date(rule);
    self.1.up_to_date(rule);
  }

  #[inline]
  fn execute_start(&mut self, rule: &ResolvedRule) {
    self.0.execute_start(rule);
    self.1.execute_start(rule);
  }
  #[inline]
  fn execute_end(&mut self, rule: &ResolvedRule, result: Result<(), &RunError>) {
    self.0.execute_end(rule, result);
    self.1.execute_end(rule, result);
  }

  #[inline]
  fn clean_start(&mut self, target: &Target) {
    self.0.clean_start(target);
    self.1.clean_start(target);
  }
  #[inline]
  fn clean_target(&mut self, target: &Target) {
    self.0.clean_target(target);
    self.1.clean_target(target);
  }
  #[inline]
  fn clean_end(&mut self, target: &Target) {
    self.0.clean_end(target);
    self.1.clean_end(target);
  }
}
