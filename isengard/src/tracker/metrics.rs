use std::time::{Duration, Instant};

use crate::error::RunError;
use crate::rule::ResolvedRule;
use crate::target::Target;
use crate::tracker::Tracker;

/// A [`Tracker`] that counts build events and measures build duration into a [`Report`].
#[derive(Clone, Debug)]
pub struct MetricsTracker {
  report: Report,
  clear_on_build_start: bool,
  last_build_start: Option<Instant>,
}

impl Default for MetricsTracker {
  fn default() -> Self {
    Self {
      report: Report::default(),
      clear_on_build_start: true,
      last_build_start: None,
    }
  }
}

impl MetricsTracker {
  /// Creates a tracker that keeps counting across builds instead of resetting its report when a new build starts.
  pub fn accumulating() -> Self {
    Self { clear_on_build_start: false, ..Self::default() }
  }

  #[inline]
  pub fn report(&self) -> &Report { &self.report }
}

#[derive(Default, Clone, Debug)]
pub struct Report {
  pub total_required_rules: u32,
  pub total_executed_rules: u32,
  pub total_failed_rules: u32,
  pub total_up_to_date_rules: u32,
  pub total_cleaned_targets: u32,

  pub build_duration: Duration,
}

impl Report {
  fn clear(&mut self) {
    *self = Self::default();
  }
}

impl Tracker for MetricsTracker {
  #[inline]
  fn build_start(&mut self, _target: &Target) {
    if self.clear_on_build_start {
      self.report.clear();
    }
    self.last_build_start = Some(Instant::now());
  }
  #[inline]
  fn build_end(&mut self, _target: &Target, _result: Result<(), &RunError>) {
    if let Some(start) = &self.last_build_start {
      self.report.build_duration = start.elapsed();
    }
  }

  #[inline]
  fn require_rule(&mut self, _rule: &ResolvedRule) {
    self.report.total_required_rules += 1;
  }
  #[inline]
  fn up_to_date(&mut self, _rule: &ResolvedRule) {
    self.report.total_up_to_date_rules += 1;
  }

  #[inline]
  fn execute_start(&mut self, _rule: &ResolvedRule) {
    self.report.total_executed_rules += 1;
  }
  #[inline]
  fn execute_end(&mut self, _rule: &ResolvedRule, result: Result<(), &RunError>) {
    if result.is_err() {
      self.report.total_failed_rules += 1;
    }
  }

  #[inline]
  fn clean_start(&mut self, _target: &Target) {
    if self.clear_on_build_start {
      self.report.clear();
    }
  }
  #[inline]
  fn clean_target(&mut self, _target: &Target) {
    self.report.total_cleaned_targets += 1;
  }
}


#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_accumulating_keeps_counting() {
    let target = Target::virtual_target("all");
    let mut resetting = MetricsTracker::default();
    let mut accumulating = MetricsTracker::accumulating();
    for tracker in [&mut resetting, &mut accumulating] {
      for _ in 0..2 {
        tracker.build_start(&target);
        tracker.clean_target(&target);
        tracker.build_end(&target, Ok(()));
      }
    }
    assert_eq!(resetting.report().total_cleaned_targets, 1);
    assert_eq!(accumulating.report().total_cleaned_targets, 2);
  }
}
