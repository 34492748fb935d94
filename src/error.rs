//! Error types for tereby
//!
//! Uses `miette` for pretty error reporting. User errors (bad Terebyfiles,
//! unknown task names, missing installations) carry fixed message templates
//! and are printed as a single line; everything else goes through the full
//! diagnostic report.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tereby operations
#[derive(Error, Diagnostic, Debug)]
pub enum TerebyError {
    #[error("Task \"{name}\" has been exported twice.")]
    #[diagnostic(code(tereby::terebyfile::duplicate_export))]
    DuplicateExport { name: String },

    #[error("Task \"{name}\" was declared twice.")]
    #[diagnostic(code(tereby::terebyfile::duplicate_name))]
    DuplicateName { name: String },

    #[error("No tasks found. Did you forget to export your tasks?")]
    #[diagnostic(code(tereby::terebyfile::no_tasks))]
    NoTasksFound,

    #[error("Task \"{name}\" references itself.")]
    #[diagnostic(
        code(tereby::terebyfile::cycle),
        help("Check the dependencies of the tasks in your Terebyfile")
    )]
    CycleDetected { name: String },

    #[error(
        "Task \"{name}\" does not exist or is not exported from {path}.{}",
        did_you_mean(.suggestion)
    )]
    #[diagnostic(
        code(tereby::task::not_found),
        help("Run `tereby --tasks` to see available tasks")
    )]
    TaskNotFound {
        name: String,
        path: String,
        suggestion: Option<String>,
    },

    #[error("No default task has been exported from {path}; please specify a task name.")]
    #[diagnostic(code(tereby::task::no_default))]
    NoDefaultTask { path: String },

    #[error("Unable to find Terebyfile.")]
    #[diagnostic(
        code(tereby::terebyfile::not_found),
        help("Create a Terebyfile.rhai in your package, or specify one with --terebyfile")
    )]
    TerebyfileNotFound,

    #[error("{name} is not a file.")]
    #[diagnostic(code(tereby::terebyfile::not_a_file))]
    NotAFile { name: String },

    #[error("Found more than one Terebyfile: {}", .names.join(", "))]
    #[diagnostic(code(tereby::terebyfile::ambiguous))]
    MultipleTerebyfiles { names: Vec<String> },

    #[error("Unable to find tereby; ensure tereby is installed in your package.")]
    #[diagnostic(
        code(tereby::reexec::not_installed),
        help("Install it with `cargo install tereby --root .tools/tereby`")
    )]
    InstallationNotFound,

    #[error("Invalid task: {reason}")]
    #[diagnostic(code(tereby::task::invalid))]
    InvalidTask { reason: String },

    #[error("Failed to load {}", .path.display())]
    #[diagnostic(code(tereby::script::load))]
    ScriptLoad {
        path: PathBuf,
        #[source]
        source: Box<rhai::EvalAltResult>,
    },

    #[error("Script execution failed in task '{task}'")]
    #[diagnostic(code(tereby::script::failed))]
    ScriptFailed {
        task: String,
        #[source]
        source: Box<rhai::EvalAltResult>,
    },

    #[error("Command `{command}` failed with exit code {code}")]
    #[diagnostic(code(tereby::exec::failed))]
    CommandFailed { command: String, code: i32 },

    #[error("Command not found: {command}")]
    #[diagnostic(
        code(tereby::exec::command_not_found),
        help("Ensure the command is installed and in your PATH")
    )]
    CommandNotFound { command: String },

    #[error("{failed} task(s) failed, {skipped} skipped")]
    #[diagnostic(code(tereby::run::failed))]
    RunFailed { failed: usize, skipped: usize },

    #[error("Failed to parse {}", .path.display())]
    #[diagnostic(code(tereby::manifest::parse))]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to hand off to {}", .path.display())]
    #[diagnostic(code(tereby::reexec::handoff))]
    Handoff {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error")]
    #[diagnostic(code(tereby::io))]
    Io(#[from] std::io::Error),
}

impl TerebyError {
    /// Whether this error is caused by the user's Terebyfile or command line.
    ///
    /// User errors are printed as one concise line without a diagnostic trace.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateExport { .. }
                | Self::DuplicateName { .. }
                | Self::NoTasksFound
                | Self::CycleDetected { .. }
                | Self::TaskNotFound { .. }
                | Self::NoDefaultTask { .. }
                | Self::TerebyfileNotFound
                | Self::NotAFile { .. }
                | Self::MultipleTerebyfiles { .. }
                | Self::InstallationNotFound
                | Self::InvalidTask { .. }
        )
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(candidate) => format!(" Did you mean \"{candidate}\"?"),
        None => String::new(),
    }
}

/// Result type alias for tereby operations
pub type Result<T> = std::result::Result<T, TerebyError>;
