use std::io::{self, Stderr, Stdout};

use crate::check::Inconsistency;
use crate::error::RunError;
use crate::rule::ResolvedRule;
use crate::target::Target;
use crate::tracker::Tracker;

/// A [`Tracker`] that writes events to a [`std::io::Write`] instance, for example [`std::io::Stdout`].
#[derive(Debug, Clone)]
pub struct WritingTracker<W> {
  writer: W,
  indentation: u32,
}

impl Default for WritingTracker<Stdout> {
  #[inline]
  fn default() -> Self { Self::new_stdout_writer() }
}

impl Default for WritingTracker<Stderr> {
  #[inline]
  fn default() -> Self { Self::new_stderr_writer() }
}

impl<W: io::Write> WritingTracker<W> {
  #[inline]
  pub fn new(writer: W) -> Self { Self { writer, indentation: 0 } }
  #[inline]
  pub fn writer(&self) -> &W { &self.writer }
  #[inline]
  pub fn into_writer(self) -> W { self.writer }
}

impl WritingTracker<Stdout> {
  #[inline]
  pub fn new_stdout_writer() -> Self { Self::new(io::stdout()) }
}

impl WritingTracker<Stderr> {
  #[inline]
  pub fn new_stderr_writer() -> Self { Self::new(io::stderr()) }
}

impl<W: io::Write> Tracker for WritingTracker<W> {
  #[inline]
  fn build_start(&mut self, target: &Target) {
    self.writeln(format_args!("Build start: {}", target));
    self.indent();
  }
  #[inline]
  fn build_end(&mut self, target: &Target, result: Result<(), &RunError>) {
    self.unindent();
    match result {
      Ok(()) => self.writeln(format_args!("Build end: {}", target)),
      Err(e) => self.writeln(format_args!("Build failed: {} [error: {}]", target, e)),
    }
  }

  #[inline]
  fn check_rule(&mut self, rule: &ResolvedRule, inconsistency: Option<&Inconsistency>) {
    if let Some(inconsistency) = inconsistency {
      self.writeln(format_args!("☒ {} [{}]", rule, inconsistency));
    }
  }
  #[inline]
  fn up_to_date(&mut self, rule: &ResolvedRule) {
    self.writeln(format_args!("✓ {}", rule));
  }

  #[inline]
  fn execute_start(&mut self, rule: &ResolvedRule) {
    self.writeln(format_args!("→ {}", rule));
    self.indent();
  }
  #[inline]
  fn execute_end(&mut self, rule: &ResolvedRule, result: Result<(), &RunError>) {
    self.unindent();
    match result {
      Ok(()) => self.writeln(format_args!("← {}", rule)),
      Err(e) => self.writeln(format_args!("← {} [error: {}]", rule, e)),
    }
  }

  #[inline]
  fn clean_start(&mut self, target: &Target) {
    self.writeln(format_args!("Clean start: {}", target));
    self.indent();
  }
  #[inline]
  fn clean_target(&mut self, target: &Target) {
    self.writeln(format_args!("✗ {}", target));
  }
  #[inline]
  fn clean_end(&mut self, target: &Target) {
    self.unindent();
    self.writeln(format_args!("Clean end: {}", target));
  }
}

impl<W: io::Write> WritingTracker<W> {
  #[inline]
  fn writeln(&mut self, args: std::fmt::Arguments) {
    self.write_indentation();
    writeln!(&mut self.writer, "{}", args).ok();
  }
  #[inline]
  fn write_indentation(&mut self) {
    for _ in 0..self.indentation {
      write!(&mut self.writer, " ").ok();
    }
  }

  #[inline]
  fn indent(&mut self) {
    self.indentation = self.indentation.saturating_add(1);
  }
  #[inline]
  fn unindent(&mut self) {
    self.indentation = self.indentation.saturating_sub(1);
  }
}
