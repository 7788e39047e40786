use std::fs;
use std::path::Path;
use std::time::Duration;

use assert_matches::assert_matches;
use rstest::rstest;
use tempfile::TempDir;
use testresult::TestResult;

use dev_shared::action::{concat, Counter, fail, read_or_empty, slow_concat};
use dev_shared::fs::{write_in, write_until_modified};
use dev_shared::test::*;
use isengard::{Inconsistency, Isengard, Options, Rule, RunError, Target};
use isengard::store::MemoryStore;
use isengard::tracker::metrics::MetricsTracker;

fn options(workers: usize) -> Options {
  Options { workers, ..Options::default() }
}

fn configure(project: Isengard) -> TestBuild {
  let base: [(&str, &str); 0] = [];
  project.configure(base).unwrap().with_tracker(create_test_tracker())
}

/// Single rule compiling `src/a.c` into `build/a.o`.
fn compile_project(dir: &Path, counter: &Counter, workers: usize) -> Isengard {
  let mut project = Isengard::with_options(dir, options(workers));
  project.rule(Rule::new("R1")
    .output("{basedir}/build/a.o")
    .input("{basedir}/src/a.c")
    .params(["output", "input"])
    .action(concat(counter))
  ).unwrap();
  project
}

#[rstest]
fn test_scenario(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "src/a.c", "v1")?;
  let mut build = configure(compile_project(temp_dir.path(), &counter, 1));
  let a_o = build.target("build/a.o");

  // New rule: execute.
  build.run_then_assert_one_execute("build/a.o", "build/a.o")?;
  assert_eq!(counter.get(), 1);
  assert_eq!(read_or_empty(temp_dir.path().join("build/a.o")), "v1");
  assert!(build.store().len() >= 2, "expected records for output and input");

  // Nothing changed: no execute.
  let report = build.run_then_assert_no_execute("build/a.o")?;
  assert_eq!(report.up_to_date(), &["R1".to_string()]);
  assert_eq!(build.events().first_check(&a_o), Some(None));

  // Change input: execute exactly once more.
  write_until_modified(temp_dir.path().join("src/a.c"), "v2")?;
  build.run_then_assert(&a_o.identity(), |tracker| {
    assert!(tracker.one_execute_of(&a_o));
    assert_matches!(tracker.first_check(&a_o), Some(Some(Inconsistency::InputChanged { .. })));
  })?;
  assert_eq!(counter.get(), 2);
  assert_eq!(read_or_empty(temp_dir.path().join("build/a.o")), "v2");
  Ok(())
}

#[rstest]
fn test_output_changes_cause_execution(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "src/a.c", "v1")?;
  let mut build = configure(compile_project(temp_dir.path(), &counter, 1));
  let a_o = build.target("build/a.o");
  build.run("build/a.o")?;

  // Modified output: execute to restore it.
  write_until_modified(temp_dir.path().join("build/a.o"), "tampered")?;
  build.run_then_assert("build/a.o", |tracker| {
    assert_matches!(tracker.first_check(&a_o), Some(Some(Inconsistency::OutputChanged { .. })));
  })?;
  assert_eq!(read_or_empty(temp_dir.path().join("build/a.o")), "v1");

  // Removed output: execute to restore it.
  fs::remove_file(temp_dir.path().join("build/a.o"))?;
  build.run_then_assert("build/a.o", |tracker| {
    assert_matches!(tracker.first_check(&a_o), Some(Some(Inconsistency::OutputMissing(_))));
  })?;
  assert_eq!(counter.get(), 3);
  build.run_then_assert_no_execute("build/a.o")?;
  Ok(())
}

#[rstest]
fn test_chain_executes_in_dependency_order(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "a.c", "a")?;
  write_in(temp_dir.path(), "b.c", "b")?;
  let mut project = Isengard::with_options(temp_dir.path(), options(1));
  project.rule(Rule::new("compile_a").output("a.o").input("a.c").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("compile_b").output("b.o").input("b.c").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("link").output("app").inputs(["a.o", "b.o"]).params(["output", "inputs"]).action(concat(&counter)))?;
  let mut build = configure(project);
  let (a_o, b_o, app) = (build.target("a.o"), build.target("b.o"), build.target("app"));

  build.run_then_assert("app", |tracker| {
    let link_start = assert_matches!(tracker.first_execute_start_index(&app), Some(i) => i);
    let a_end = assert_matches!(tracker.first_execute_end_index(&a_o), Some(i) => i);
    let b_end = assert_matches!(tracker.first_execute_end_index(&b_o), Some(i) => i);
    assert!(link_start > a_end);
    assert!(link_start > b_end);
  })?;
  assert_eq!(read_or_empty(temp_dir.path().join("app")), "ab");

  // Only the changed branch and its dependents execute.
  write_until_modified(temp_dir.path().join("b.c"), "B")?;
  build.run_then_assert("app", |tracker| {
    assert!(!tracker.any_execute_of(&a_o));
    assert!(tracker.one_execute_of(&b_o));
    assert!(tracker.one_execute_of(&app));
  })?;
  assert_eq!(read_or_empty(temp_dir.path().join("app")), "aB");

  // Requesting an intermediate target only brings that target up-to-date.
  write_until_modified(temp_dir.path().join("a.c"), "A")?;
  build.run_then_assert_one_execute("a.o", "a.o")?;
  build.run_then_assert_one_execute("app", "app")?;
  Ok(())
}

#[rstest]
fn test_shared_dependency_executes_once(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "config.h.in", "cfg")?;
  let mut project = Isengard::with_options(temp_dir.path(), options(1));
  project.rule(Rule::new("configure").output("config.h").input("config.h.in").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("left").output("left.o").input("config.h").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("right").output("right.o").input("config.h").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("all").output("all@").inputs(["left.o", "right.o"]).params(["output", "inputs"]).action(concat(&counter)))?;
  let mut build = configure(project);
  let config_h = build.target("config.h");

  build.run_then_assert("all@", |tracker| {
    assert!(tracker.one_execute_of(&config_h));
    assert_eq!(tracker.execute_count(), 4);
  })?;
  Ok(())
}

#[rstest]
fn test_virtual_target_always_executes(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "a.c", "a")?;
  let mut project = Isengard::with_options(temp_dir.path(), options(1));
  project.rule(Rule::new("compile").output("a.o").input("a.c").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("test").output("test@").input("a.o").params(["output", "input"]).action(concat(&counter)))?;
  let mut build = configure(project);
  let test = Target::virtual_target("test");

  build.run("test@")?;
  assert_eq!(counter.get(), 2);
  build.run_then_assert("test@", |tracker| {
    assert!(tracker.one_execute_of(&test));
    assert_eq!(tracker.first_check(&test), Some(Some(&Inconsistency::Virtual(test.clone()))));
    assert!(tracker.any_up_to_date_of(&Target::file(temp_dir.path().join("a.o"))));
  })?;
  assert_eq!(counter.get(), 3);
  Ok(())
}

#[rstest]
fn test_rule_without_inputs_always_executes(temp_dir: TempDir, counter: Counter) -> TestResult {
  let mut project = Isengard::with_options(temp_dir.path(), options(1));
  project.rule(Rule::new("generate").output("gen.txt").params(["output"]).action(concat(&counter)))?;
  let mut build = configure(project);
  let gen = build.target("gen.txt");
  build.run("gen.txt")?;
  build.run_then_assert("gen.txt", |tracker| {
    assert_eq!(tracker.first_check(&gen), Some(Some(&Inconsistency::NoInputs)));
  })?;
  assert_eq!(counter.get(), 2);
  Ok(())
}

#[rstest]
fn test_leaf_and_unknown_requests(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "src/a.c", "v1")?;
  let mut build = configure(compile_project(temp_dir.path(), &counter, 1));
  let report = build.run("src/a.c")?;
  assert!(report.is_noop());
  assert_eq!(counter.get(), 0);

  assert_matches!(build.run("src/missing.c"), Err(RunError::UnknownTarget(identity)) => {
    assert!(identity.ends_with("missing.c"));
  });
  assert_matches!(build.run("nothing@"), Err(RunError::UnknownTarget(identity)) if identity == "nothing@");
  Ok(())
}

#[rstest]
fn test_cycle(temp_dir: TempDir, counter: Counter) -> TestResult {
  let mut project = Isengard::with_options(temp_dir.path(), options(1));
  project.rule(Rule::new("A").output("a").input("b").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("B").output("b").input("a").params(["output", "input"]).action(concat(&counter)))?;
  let mut build = configure(project);
  let result = build.run("a");
  assert_matches!(&result, Err(RunError::Cycle(path)) => {
    let names: Vec<_> = path.iter().map(|e| e.rule.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "A"]);
  });
  let message = result.unwrap_err().to_string();
  assert!(message.contains("A (") && message.contains("B ("), "{}", message);
  assert!(build.events().build_failed());
  assert_eq!(counter.get(), 0);
  Ok(())
}

#[rstest]
fn test_failure_is_retried(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "a.c", "a")?;
  write_in(temp_dir.path(), "b.c", "b")?;
  let failing = Counter::new();
  let mut project = Isengard::with_options(temp_dir.path(), options(1));
  project.rule(Rule::new("good").output("a.o").input("a.c").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("bad").output("b.o").input("b.c").params(["output", "input"]).action(fail(&failing, "compiler crashed")))?;
  project.rule(Rule::new("link").output("app").inputs(["a.o", "b.o"]).params(["output", "inputs"]).action(concat(&counter)))?;
  let mut build = configure(project);

  let result = build.run("app");
  assert_matches!(&result, Err(RunError::Action { rule, source }) => {
    assert_eq!(rule, "bad");
    assert_eq!(source.to_string(), "compiler crashed");
  });
  assert_eq!(result.as_ref().err().and_then(|e| e.rule()), Some("bad"));
  assert_eq!(counter.get(), 1, "expected only the good rule to execute");
  assert!(!temp_dir.path().join("app").exists());

  // The failed rule is retried; the succeeded rule is not.
  assert_matches!(build.run("app"), Err(RunError::Action { .. }));
  assert_eq!(failing.get(), 2);
  assert_eq!(counter.get(), 1);
  Ok(())
}

#[rstest]
fn test_parallel_execution(temp_dir: TempDir, counter: Counter) -> TestResult {
  let mut project = Isengard::with_options(temp_dir.path(), options(4));
  let mut objects = Vec::new();
  for i in 0..16 {
    write_in(temp_dir.path(), format!("src/{}.c", i), format!("{},", i))?;
    project.rule(Rule::new(format!("compile{}", i))
      .output(format!("build/{}.o", i))
      .input(format!("src/{}.c", i))
      .params(["output", "input"])
      .action(slow_concat(&counter, Duration::from_millis(10)))
    )?;
    objects.push(format!("build/{}.o", i));
  }
  project.rule(Rule::new("link").output("build/app").inputs(objects).params(["output", "inputs"]).action(concat(&counter)))?;
  let mut build = configure(project);
  let app = build.target("build/app");

  let report = build.run_then_assert("build/app", |tracker| {
    assert_eq!(tracker.execute_count(), 17);
    let link_start = assert_matches!(tracker.first_execute_start_index(&app), Some(i) => i);
    for i in 0..16 {
      let object = Target::file(temp_dir.path().join(format!("build/{}.o", i)));
      let end = assert_matches!(tracker.first_execute_end_index(&object), Some(i) => i);
      assert!(link_start > end);
    }
  })?;
  assert_eq!(report.executed().last().map(String::as_str), Some("link"));
  let expected: String = (0..16).map(|i| format!("{},", i)).collect();
  assert_eq!(read_or_empty(temp_dir.path().join("build/app")), expected);

  build.run_then_assert_no_execute("build/app")?;
  write_until_modified(temp_dir.path().join("src/7.c"), "seven,")?;
  let report = build.run("build/app")?;
  assert_eq!(report.executed(), &["compile7".to_string(), "link".to_string()]);
  Ok(())
}

#[rstest]
fn test_parallel_failure_stops_scheduling(temp_dir: TempDir, counter: Counter) -> TestResult {
  let failing = Counter::new();
  let mut project = Isengard::with_options(temp_dir.path(), options(2));
  write_in(temp_dir.path(), "bad.c", "bad")?;
  project.rule(Rule::new("bad").output("bad.o").input("bad.c").params(["output", "input"]).action(fail(&failing, "nope")))?;
  project.rule(Rule::new("after").output("after.o").input("bad.o").params(["output", "input"]).action(concat(&counter)))?;
  project.rule(Rule::new("all").output("all@").input("after.o").params(["output", "input"]).action(concat(&counter)))?;
  let mut build = configure(project);
  assert_matches!(build.run("all@"), Err(RunError::Action { rule, .. }) if rule == "bad");
  assert_eq!(failing.get(), 1);
  assert_eq!(counter.get(), 0);
  Ok(())
}

#[rstest]
fn test_store_persists_across_builds(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "src/a.c", "v1")?;
  let mut build = configure(compile_project(temp_dir.path(), &counter, 1));
  build.run("build/a.o")?;
  assert!(temp_dir.path().join(".isengard.ron").exists());
  drop(build);

  let mut build = configure(compile_project(temp_dir.path(), &counter, 1));
  build.run_then_assert_no_execute("build/a.o")?;
  assert_eq!(counter.get(), 1);
  Ok(())
}

#[rstest]
fn test_clean(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "src/a.c", "v1")?;
  let mut build = configure(compile_project(temp_dir.path(), &counter, 1));
  let a_o = build.target("build/a.o");
  build.run("build/a.o")?;
  assert!(temp_dir.path().join("build/a.o").exists());

  build.clean("build/a.o")?;
  assert!(!temp_dir.path().join("build/a.o").exists());
  assert!(temp_dir.path().join("src/a.c").exists(), "leaf inputs must not be cleaned");
  assert!(build.events().any_clean_of(&a_o));
  assert!(build.store().is_empty());

  build.run_then_assert_one_execute("build/a.o", "build/a.o")?;
  Ok(())
}

#[rstest]
fn test_memory_store(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "src/a.c", "v1")?;
  let project = compile_project(temp_dir.path(), &counter, 1);
  let base: [(&str, &str); 0] = [];
  let mut build = project.configure_with_store(base, MemoryStore::new())?.with_tracker(create_test_tracker());
  build.run("build/a.o")?;
  build.run_then_assert_no_execute("build/a.o")?;
  assert!(!temp_dir.path().join(".isengard.ron").exists());
  Ok(())
}

#[rstest]
fn test_metrics(temp_dir: TempDir, counter: Counter) -> TestResult {
  write_in(temp_dir.path(), "src/a.c", "v1")?;
  let base: [(&str, &str); 0] = [];
  let mut build = compile_project(temp_dir.path(), &counter, 1)
    .configure_with_store(base, MemoryStore::new())?
    .with_tracker(MetricsTracker::default());

  build.run("build/a.o")?;
  let report = build.tracker().report();
  assert_eq!(report.total_required_rules, 1);
  assert_eq!(report.total_executed_rules, 1);
  assert_eq!(report.total_up_to_date_rules, 0);

  build.run("build/a.o")?;
  let report = build.tracker().report();
  assert_eq!(report.total_executed_rules, 0);
  assert_eq!(report.total_up_to_date_rules, 1);

  build.clean("build/a.o")?;
  assert_eq!(build.tracker().report().total_cleaned_targets, 1);
  Ok(())
}
