use std::error::Error;
use std::fs;

use isengard::{ActionArgs, BoxError, DeclarationError, Isengard, LazyConfig, Rule};
use isengard::tracker::writing::WritingTracker;

/// "Compiles" and "links" by concatenating file contents, prefixed with the configured compiler flags.
fn concat_with_flags(args: &ActionArgs) -> Result<(), BoxError> {
  let mut contents = args.config("cflags")?.to_string();
  let inputs = args.inputs().or_else(|_| args.input().map(std::slice::from_ref))?;
  for input in inputs {
    contents.push('\n');
    contents.push_str(&fs::read_to_string(input.path().ok_or("virtual input")?)?);
  }
  let output = args.output()?.path().ok_or("virtual output")?;
  if let Some(parent) = output.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(output, contents)?;
  Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
  let dir = tempfile::tempdir()?;
  fs::create_dir_all(dir.path().join("lib"))?;
  fs::write(dir.path().join("lib/vector.c"), "int vector;")?;
  fs::write(dir.path().join("main.c"), "int main;")?;

  let mut project = Isengard::new(dir.path());
  project.lazy_config(LazyConfig::new("obj_dir", ["basedir", "platform"], |args| {
    Ok(args.path("basedir")?.join("build").join(args.str("platform")?).into())
  }))?;
  project.meta_rule("c_object", |scope, args| {
    let [name] = args else {
      return Err(DeclarationError::MetaRule { name: "c_object".to_string(), message: "expected a source name".to_string() });
    };
    scope.rule(Rule::new(format!("compile {}", name))
      .output(format!("{{obj_dir}}/{}.o", name))
      .input(format!("{}.c", name))
      .params(["output", "input", "cflags"])
      .action(concat_with_flags))
  })?;
  project.script("lib/BUILD", |scope| scope.apply("c_object", &["vector"]))?;

  let mut root = project.root();
  root.subdir_script("lib", None)?;
  root.apply("c_object", &["main"])?;
  root.rule(Rule::new("link")
    .output("{obj_dir}/app")
    .inputs(["{obj_dir}/main.o", "{obj_dir}/vector.o"])
    .params(["output", "inputs", "cflags"])
    .action(concat_with_flags))?;
  root.rule(Rule::new("all").output("all@").input("{obj_dir}/app").params(["output", "input"]).action(|_| Ok(())))?;

  let mut build = project.configure([("platform", "linux"), ("cflags", "-O2")])?
    .with_tracker(WritingTracker::new_stdout_writer());
  build.run("all@")?;
  println!("---");
  build.run("all@")?;
  println!("---");
  fs::write(dir.path().join("lib/vector.c"), "long vector;")?;
  build.run("all@")?;
  Ok(())
}
