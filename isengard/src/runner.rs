use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Mutex};
use std::thread;

use tracing::{debug, trace, warn};

use crate::check::{check, Fingerprints, Inconsistency, observe_all};
use crate::error::{CycleEntry, RunError};
use crate::graph::{RuleGraph, RuleId};
use crate::rule::ResolvedRule;
use crate::store::FingerprintStore;
use crate::tracker::Tracker;

/// Summary of a successful run.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct RunReport {
  executed: Vec<String>,
  up_to_date: Vec<String>,
}

impl RunReport {
  /// Names of the rules whose action was executed, in completion order.
  #[inline]
  pub fn executed(&self) -> &[String] { &self.executed }
  /// Names of the rules that were skipped because they were up-to-date, in completion order.
  #[inline]
  pub fn up_to_date(&self) -> &[String] { &self.up_to_date }
  /// Returns `true` if no action was executed.
  #[inline]
  pub fn is_noop(&self) -> bool { self.executed.is_empty() }
}


/// The rules required to bring one rule up-to-date, in dependency order.
#[derive(Debug)]
pub(crate) struct Plan {
  /// Post-order: every rule comes after the producers of its inputs.
  order: Vec<RuleId>,
  /// Producers of the inputs of each planned rule, without duplicates.
  dependencies: HashMap<RuleId, Vec<RuleId>>,
}

impl Plan {
  /// Walks the graph top-down from `root`, visiting each rule once.
  ///
  /// # Errors
  ///
  /// Returns [`RunError::Cycle`] with the full cycle path if a rule transitively requires itself.
  pub(crate) fn new(graph: &RuleGraph, root: RuleId) -> Result<Self, RunError> {
    let mut planner = Planner { graph, stack: Vec::new(), plan: Plan { order: Vec::new(), dependencies: HashMap::new() } };
    planner.ensure(root)?;
    Ok(planner.plan)
  }

  #[inline]
  pub(crate) fn order(&self) -> &[RuleId] { &self.order }
}

struct Planner<'g> {
  graph: &'g RuleGraph,
  stack: Vec<RuleId>,
  plan: Plan,
}

impl Planner<'_> {
  fn ensure(&mut self, id: RuleId) -> Result<(), RunError> {
    if self.plan.dependencies.contains_key(&id) {
      return Ok(());
    }
    if let Some(position) = self.stack.iter().position(|s| *s == id) {
      let path = self.stack[position..].iter().chain(std::iter::once(&id)).map(|id| {
        let rule = self.graph.rule(*id);
        let target = rule.outputs.first().map(|t| t.identity()).unwrap_or_default();
        CycleEntry { rule: rule.name.clone(), target }
      }).collect();
      return Err(RunError::Cycle(path));
    }

    self.stack.push(id);
    let mut dependencies = Vec::new();
    for input in &self.graph.rule(id).inputs {
      if let Some(producer) = self.graph.producer(input) {
        self.ensure(producer)?;
        if !dependencies.contains(&producer) {
          dependencies.push(producer);
        }
      }
    }
    self.stack.pop();

    self.plan.dependencies.insert(id, dependencies);
    self.plan.order.push(id);
    Ok(())
  }
}


/// Progress of a single rule, reported by whoever processes it to the thread that drives the build.
#[derive(Debug)]
enum Message {
  Checked(RuleId, Option<Inconsistency>),
  Started(RuleId),
  Finished(RuleId, Result<Finished, RunError>),
}

#[derive(Debug)]
enum Finished {
  UpToDate,
  Executed(Fingerprints),
}

/// Checks whether `rule` can be skipped against its `recorded` fingerprints, and executes it if not. Never panics:
/// a panicking action is reported as [`RunError::Worker`].
fn process(id: RuleId, rule: &ResolvedRule, recorded: Fingerprints, send: &mut impl FnMut(Message)) {
  let current = match Fingerprints::observe(rule) {
    Ok(current) => current,
    Err(e) => return send(Message::Finished(id, Err(e))),
  };
  let inconsistency = check(rule, &recorded, &current);
  let skip = inconsistency.is_none();
  send(Message::Checked(id, inconsistency));
  if skip {
    return send(Message::Finished(id, Ok(Finished::UpToDate)));
  }

  send(Message::Started(id));
  let result = match panic::catch_unwind(AssertUnwindSafe(|| rule.execute())) {
    Ok(Ok(())) => observe_all(rule, &rule.outputs)
      .map(|outputs| Finished::Executed(Fingerprints { outputs, inputs: current.inputs })),
    Ok(Err(source)) => Err(RunError::Action { rule: rule.name.clone(), source }),
    Err(_) => Err(RunError::Worker(rule.name.clone())),
  };
  send(Message::Finished(id, result));
}


/// Brings the rules of a [`Plan`] up-to-date. Owns the store and tracker for the duration of the run; only this
/// thread touches them.
pub(crate) struct Runner<'a, S, T> {
  graph: &'a RuleGraph,
  store: &'a mut S,
  tracker: &'a mut T,
  remaining: HashMap<RuleId, usize>,
  dependents: HashMap<RuleId, Vec<RuleId>>,
  ready: VecDeque<RuleId>,
  started: HashSet<RuleId>,
  failure: Option<RunError>,
  report: RunReport,
}

impl<'a, S: FingerprintStore, T: Tracker> Runner<'a, S, T> {
  pub(crate) fn new(graph: &'a RuleGraph, store: &'a mut S, tracker: &'a mut T) -> Self {
    Self {
      graph,
      store,
      tracker,
      remaining: HashMap::new(),
      dependents: HashMap::new(),
      ready: VecDeque::new(),
      started: HashSet::new(),
      failure: None,
      report: RunReport::default(),
    }
  }

  /// Runs every rule of `plan`. With at most one worker, rules run in plan order on this thread; otherwise up to
  /// `workers` actions run concurrently, each rule only after all producers of its inputs completed.
  ///
  /// After the first failure no further rule is started. Rules already executing are waited for, and their results
  /// recorded.
  pub(crate) fn run(mut self, plan: &Plan, workers: usize) -> Result<RunReport, RunError> {
    for id in plan.order() {
      self.tracker.require_rule(self.graph.rule(*id));
    }
    if workers <= 1 {
      self.run_inline(plan);
    } else {
      self.schedule(plan);
      self.run_parallel(workers);
    }
    match self.failure {
      Some(e) => Err(e),
      None => Ok(self.report),
    }
  }

  fn run_inline(&mut self, plan: &Plan) {
    let graph = self.graph;
    for id in plan.order() {
      if self.failure.is_some() {
        break;
      }
      let rule = graph.rule(*id);
      let recorded = Fingerprints::recorded(rule, &*self.store);
      process(*id, rule, recorded, &mut |message| self.handle(message));
    }
  }

  fn schedule(&mut self, plan: &Plan) {
    for id in plan.order() {
      let dependencies = plan.dependencies.get(id).map(Vec::as_slice).unwrap_or_default();
      self.remaining.insert(*id, dependencies.len());
      for dependency in dependencies {
        self.dependents.entry(*dependency).or_default().push(*id);
      }
      if dependencies.is_empty() {
        self.ready.push_back(*id);
      }
    }
  }

  fn run_parallel(&mut self, workers: usize) {
    let graph = self.graph;
    let (job_sender, job_receiver) = mpsc::channel::<(RuleId, Fingerprints)>();
    let job_receiver = Mutex::new(job_receiver);
    let (message_sender, message_receiver) = mpsc::channel::<Message>();
    debug!(workers, rules = self.remaining.len(), "starting workers");

    thread::scope(|scope| {
      for _ in 0..workers.min(self.remaining.len()) {
        let job_receiver = &job_receiver;
        let message_sender = message_sender.clone();
        scope.spawn(move || loop {
          let job = match job_receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
          };
          let Ok((id, recorded)) = job else { break };
          process(id, graph.rule(id), recorded, &mut |message| { message_sender.send(message).ok(); });
        });
      }
      drop(message_sender);

      let mut in_flight = 0usize;
      loop {
        while self.failure.is_none() {
          let Some(id) = self.ready.pop_front() else { break };
          let recorded = Fingerprints::recorded(graph.rule(id), &*self.store);
          trace!(rule = %graph.rule(id), "dispatching");
          if job_sender.send((id, recorded)).is_err() {
            self.fail(RunError::Worker(graph.rule(id).name.clone()));
            break;
          }
          in_flight += 1;
        }
        if in_flight == 0 {
          break;
        }
        match message_receiver.recv() {
          Ok(message) => {
            if matches!(message, Message::Finished(..)) {
              in_flight -= 1;
            }
            self.handle(message);
          }
          Err(_) => {
            self.fail(RunError::Worker("<unknown>".to_string()));
            break;
          }
        }
      }
      drop(job_sender);
    });
  }

  fn handle(&mut self, message: Message) {
    let graph = self.graph;
    match message {
      Message::Checked(id, inconsistency) => {
        let rule = graph.rule(id);
        if let Some(inconsistency) = &inconsistency {
          trace!(rule = %rule, %inconsistency, "inconsistent");
        }
        self.tracker.check_rule(rule, inconsistency.as_ref());
      }
      Message::Started(id) => {
        self.started.insert(id);
        self.tracker.execute_start(graph.rule(id));
      }
      Message::Finished(id, result) => {
        let rule = graph.rule(id);
        match result {
          Ok(Finished::UpToDate) => {
            self.tracker.up_to_date(rule);
            self.report.up_to_date.push(rule.name.clone());
            self.complete(id);
          }
          Ok(Finished::Executed(fingerprints)) => {
            for (target, fingerprint) in rule.outputs.iter().zip(&fingerprints.outputs) {
              if fingerprint.is_none() && !target.is_virtual() {
                warn!(rule = %rule.name, target = %target, "output does not exist after successful execution");
              }
            }
            fingerprints.record(rule, &mut *self.store);
            self.tracker.execute_end(rule, Ok(()));
            self.report.executed.push(rule.name.clone());
            self.complete(id);
          }
          Err(e) => {
            if self.started.contains(&id) {
              self.tracker.execute_end(rule, Err(&e));
            }
            self.fail(e);
          }
        }
      }
    }
  }

  fn complete(&mut self, id: RuleId) {
    let Some(dependents) = self.dependents.get(&id) else { return };
    for dependent in dependents {
      if let Some(remaining) = self.remaining.get_mut(dependent) {
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
          self.ready.push_back(*dependent);
        }
      }
    }
  }

  fn fail(&mut self, error: RunError) {
    debug!(%error, "rule failed, not starting further rules");
    if self.failure.is_none() {
      self.failure = Some(error);
    }
  }
}
