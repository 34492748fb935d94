//! tereby - a task runner driven by Rhai scripts
//!
//! Tasks are declared in a `Terebyfile.rhai` next to your project and
//! exported from it:
//!
//! ```rhai
//! let lint = task(#{ name: "lint", run: "cargo clippy -- -D warnings" });
//! let test = task(#{ name: "test", run: ["cargo test"] });
//!
//! let ci = task(#{
//!     name: "ci",
//!     description: "Everything CI runs",
//!     dependencies: [lint, test],
//! });
//!
//! export lint;
//! export test;
//! export ci;
//! export ci as default_task;
//! ```
//!
//! Independent tasks run concurrently, each task runs at most once per
//! invocation, and a failure only skips the tasks that depend on it.
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tereby::{script, Runner, Terebyfile, TerminalReporter};
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let loaded = script::load("Terebyfile.rhai".as_ref(), &[])?;
//!     let terebyfile = Terebyfile::from_exports(&loaded.arena, &loaded.exports)?;
//!     let selected = terebyfile.select(&["ci".to_string()], "Terebyfile.rhai")?;
//!
//!     Runner::new(terebyfile.graph(), Arc::new(TerminalReporter))
//!         .with_script(loaded.context)
//!         .run_tasks(&selected)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod graph;
pub mod reexec;
pub mod runner;
pub mod script;
pub mod task;
pub mod terebyfile;

// Re-export main types
pub use display::TerminalReporter;
pub use error::{Result, TerebyError};
pub use graph::TaskGraph;
pub use runner::{RunReporter, RunSummary, Runner, RunnerConfig, TaskState};
pub use task::{TaskAction, TaskArena, TaskId, TaskOptions};
pub use terebyfile::{Exports, Terebyfile};
