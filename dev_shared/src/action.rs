use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use isengard::{ActionArgs, BoxError, Target};

/// Shared counter of action invocations.
#[derive(Clone, Default, Debug)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
  #[inline]
  pub fn new() -> Self { Self::default() }
  #[inline]
  pub fn get(&self) -> usize { self.0.load(Ordering::SeqCst) }
  #[inline]
  pub fn increment(&self) { self.0.fetch_add(1, Ordering::SeqCst); }
}

fn inputs<'a>(args: &ActionArgs<'a>) -> &'a [Target] {
  args.inputs().or_else(|_| args.input().map(std::slice::from_ref)).unwrap_or_default()
}

fn outputs<'a>(args: &ActionArgs<'a>) -> Result<&'a [Target], BoxError> {
  Ok(args.outputs().or_else(|_| args.output().map(std::slice::from_ref))?)
}

fn write_output(output: &Target, contents: &str) -> Result<(), BoxError> {
  let Some(path) = output.path() else { return Ok(()) };
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  match output {
    Target::Folder(_) => fs::create_dir_all(path)?,
    _ => fs::write(path, contents)?,
  }
  Ok(())
}

/// Action that writes the concatenated contents of all file inputs to every file output, counting invocations in
/// `counter`. Virtual inputs and outputs are ignored.
pub fn concat(counter: &Counter) -> impl Fn(&ActionArgs) -> Result<(), BoxError> + Send + Sync + 'static {
  let counter = counter.clone();
  move |args| {
    counter.increment();
    let mut contents = String::new();
    for input in inputs(args) {
      if let Some(path) = input.path() {
        contents.push_str(&fs::read_to_string(path)?);
      }
    }
    for output in outputs(args)? {
      write_output(output, &contents)?;
    }
    Ok(())
  }
}

/// Like [`concat`], but sleeps for `duration` first.
pub fn slow_concat(counter: &Counter, duration: Duration) -> impl Fn(&ActionArgs) -> Result<(), BoxError> + Send + Sync + 'static {
  let concat = concat(counter);
  move |args| {
    std::thread::sleep(duration);
    concat(args)
  }
}

/// Action that writes the value of configuration parameter `param` to every file output.
pub fn write_config(counter: &Counter, param: &'static str) -> impl Fn(&ActionArgs) -> Result<(), BoxError> + Send + Sync + 'static {
  let counter = counter.clone();
  move |args| {
    counter.increment();
    let value = args.config(param)?.to_string();
    for output in outputs(args)? {
      write_output(output, &value)?;
    }
    Ok(())
  }
}

/// Action that counts its invocation and then fails with `message`.
pub fn fail(counter: &Counter, message: &'static str) -> impl Fn(&ActionArgs) -> Result<(), BoxError> + Send + Sync + 'static {
  let counter = counter.clone();
  move |_| {
    counter.increment();
    Err(message.into())
  }
}

/// Reads the file at `path`, returning an empty string if it does not exist.
pub fn read_or_empty(path: impl AsRef<Path>) -> String {
  fs::read_to_string(path).unwrap_or_default()
}
