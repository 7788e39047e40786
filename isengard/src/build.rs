use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::check::input_key;
use crate::config::Config;
use crate::error::RunError;
use crate::fs::{metadata, normalize};
use crate::graph::{RuleGraph, RuleId};
use crate::project::Options;
use crate::runner::{Plan, Runner, RunReport};
use crate::store::{FileStore, FingerprintStore};
use crate::target::Target;
use crate::tracker::Tracker;

/// A configured project: a frozen rule graph with its configuration, a fingerprint store, and a build event tracker.
/// Created by [`Isengard::configure`](crate::Isengard::configure).
pub struct Build<S = FileStore, T = ()> {
  basedir: PathBuf,
  options: Options,
  config: Config,
  graph: RuleGraph,
  store: S,
  tracker: T,
}

impl<S, T> Debug for Build<S, T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Build")
      .field("basedir", &self.basedir)
      .field("options", &self.options)
      .field("config", &self.config)
      .field("graph", &self.graph)
      .finish_non_exhaustive()
  }
}

impl<S: FingerprintStore> Build<S> {
  pub(crate) fn new(basedir: PathBuf, options: Options, config: Config, graph: RuleGraph, store: S) -> Self {
    Self { basedir, options, config, graph, store, tracker: () }
  }
}

impl<S: FingerprintStore, T: Tracker> Build<S, T> {
  /// Replaces the tracker of this build with `tracker`.
  pub fn with_tracker<T2: Tracker>(self, tracker: T2) -> Build<S, T2> {
    Build {
      basedir: self.basedir,
      options: self.options,
      config: self.config,
      graph: self.graph,
      store: self.store,
      tracker,
    }
  }

  #[inline]
  pub fn basedir(&self) -> &Path { &self.basedir }
  #[inline]
  pub fn options(&self) -> &Options { &self.options }
  #[inline]
  pub fn config(&self) -> &Config { &self.config }
  #[inline]
  pub fn graph(&self) -> &RuleGraph { &self.graph }
  #[inline]
  pub fn store(&self) -> &S { &self.store }
  #[inline]
  pub fn tracker(&self) -> &T { &self.tracker }
  #[inline]
  pub fn tracker_mut(&mut self) -> &mut T { &mut self.tracker }
  /// Sets the maximum number of concurrently executing actions for subsequent runs.
  #[inline]
  pub fn set_workers(&mut self, workers: usize) { self.options.workers = workers; }

  /// Resolves a run request into a target: `name@` is a virtual target, anything else a path, relative paths being
  /// anchored at the base directory.
  pub fn target(&self, request: impl AsRef<str>) -> Target {
    let request = request.as_ref();
    if let Some(name) = request.strip_suffix('@') {
      return Target::virtual_target(name);
    }
    let path = Path::new(request);
    if path.is_absolute() {
      Target::file(normalize(path))
    } else {
      Target::file(normalize(self.basedir.join(path)))
    }
  }

  /// Brings the target of `request` and everything it transitively depends on up-to-date, skipping rules whose
  /// outputs and inputs are unchanged since they last executed. The store is persisted afterwards, also when the run
  /// fails.
  ///
  /// # Errors
  ///
  /// - [`RunError::UnknownTarget`] if no rule produces the target and it does not exist.
  /// - [`RunError::Cycle`] if the rules required for the target form a dependency cycle.
  /// - [`RunError::Action`] if an action failed, or [`RunError::Worker`] if it panicked.
  /// - [`RunError::Store`] if the store could not be persisted.
  pub fn run(&mut self, request: impl AsRef<str>) -> Result<RunReport, RunError> {
    let target = self.target(request);
    self.tracker.build_start(&target);
    let result = self.run_target(&target);
    let result = self.flush(result);
    self.tracker.build_end(&target, result.as_ref().map(|_| ()));
    result
  }

  fn run_target(&mut self, target: &Target) -> Result<RunReport, RunError> {
    let Some(root) = self.producer(target)? else {
      return Ok(RunReport::default());
    };
    let plan = Plan::new(&self.graph, root)?;
    debug!(target = %target, rules = plan.order().len(), workers = self.options.workers, "running");
    Runner::new(&self.graph, &mut self.store, &mut self.tracker).run(&plan, self.options.workers)
  }

  /// Removes the outputs of every rule the target of `request` transitively depends on, including the target itself,
  /// and forgets their fingerprint records. The store is persisted afterwards.
  ///
  /// # Errors
  ///
  /// Returns an error if the target is unknown, the rules form a dependency cycle, an output could not be removed,
  /// or the store could not be persisted.
  pub fn clean(&mut self, request: impl AsRef<str>) -> Result<(), RunError> {
    let target = self.target(request);
    self.tracker.clean_start(&target);
    let result = self.clean_target(&target);
    let result = self.flush(result);
    self.tracker.clean_end(&target);
    result
  }

  fn clean_target(&mut self, target: &Target) -> Result<(), RunError> {
    let Some(root) = self.producer(target)? else {
      return Ok(());
    };
    let plan = Plan::new(&self.graph, root)?;
    for id in plan.order() {
      let rule = self.graph.rule(*id);
      for output in rule.outputs() {
        output.clean().map_err(|source| RunError::Clean { target: output.identity(), source })?;
        self.store.remove(&output.identity());
        self.tracker.clean_target(output);
      }
      for input in rule.inputs() {
        self.store.remove(&input_key(rule, input));
      }
    }
    Ok(())
  }

  /// Gets the rule producing `target`, or `None` if it is an existing leaf.
  fn producer(&self, target: &Target) -> Result<Option<RuleId>, RunError> {
    if let Some(id) = self.graph.producer(target) {
      return Ok(Some(id));
    }
    let exists = match target.path() {
      Some(path) => metadata(path).map_err(|source| RunError::Request { target: target.identity(), source })?.is_some(),
      None => false,
    };
    if exists {
      debug!(target = %target, "requested target is an existing leaf");
      Ok(None)
    } else {
      Err(RunError::UnknownTarget(target.identity()))
    }
  }

  fn flush<R>(&mut self, result: Result<R, RunError>) -> Result<R, RunError> {
    match (result, self.store.flush()) {
      (Ok(value), Ok(())) => Ok(value),
      (Ok(_), Err(e)) => Err(e.into()),
      (Err(e), Ok(())) => Err(e),
      (Err(e), Err(flush_error)) => {
        warn!(error = %flush_error, "failed to persist fingerprint store after failed run");
        Err(e)
      }
    }
  }
}
