//! Incremental build orchestration.
//!
//! A project declares [rules](Rule) that map input [targets](Target) to output targets through an action, and
//! [lazy configuration](LazyConfig) computed from other configuration values. Target templates such as
//! `{build_dir}/{platform}/a.o` are resolved against the configuration when the project is
//! [configured](Isengard::configure), producing a frozen [rule graph](RuleGraph). [Running](Build::run) a target then
//! executes only the rules whose outputs or inputs changed since they were last executed, as recorded by a
//! [fingerprint store](FingerprintStore).
//!
//! ```
//! # use isengard::{Isengard, Rule};
//! # use isengard::store::MemoryStore;
//! # let dir = tempfile::tempdir()?;
//! # std::fs::write(dir.path().join("hello.txt"), "Hello")?;
//! let mut project = Isengard::new(dir.path());
//! project.rule(Rule::new("shout")
//!   .output("{basedir}/HELLO.txt")
//!   .input("hello.txt")
//!   .params(["output", "input"])
//!   .action(|args| {
//!     let text = std::fs::read_to_string(args.input()?.path().ok_or("virtual input")?)?;
//!     std::fs::write(args.output()?.path().ok_or("virtual output")?, text.to_uppercase())?;
//!     Ok(())
//!   }))?;
//! let mut build = project.configure_with_store(Vec::<(String, String)>::new(), MemoryStore::new())?;
//! assert_eq!(build.run("HELLO.txt")?.executed().len(), 1);
//! assert!(build.run("HELLO.txt")?.is_noop());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use build::Build;
pub use check::Inconsistency;
pub use config::{Config, ConfigArgs, ConfigValue, LazyConfig, Scalar};
pub use error::{BoxError, ConfigError, ConfigureError, DeclarationError, RunError};
pub use graph::{RuleGraph, RuleId};
pub use project::{Isengard, Options, Scope};
pub use rule::{Action, ActionArgs, Binding, ResolvedRule, Rule};
pub use runner::RunReport;
pub use store::FingerprintStore;
pub use target::{Fingerprint, Target};

pub mod build;
pub mod check;
pub mod config;
pub mod error;
pub mod fs;
pub mod graph;
pub mod project;
pub mod reference;
pub mod rule;
pub mod runner;
pub mod store;
pub mod target;
pub mod tracker;
