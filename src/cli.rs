//! Command line definition
//!
//! Uses the `clap` derive API. Task names come first; the first argument
//! starting with `-` after them begins the arguments forwarded to the
//! Terebyfile as `ARGS`.

use std::path::PathBuf;

use clap::Parser;

/// tereby - run tasks declared in a Terebyfile
#[derive(Parser, Debug)]
#[command(name = "tereby")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Path to the Terebyfile (searched for upward from the working directory by default)
    #[arg(long, env = "TEREBYFILE", value_name = "PATH")]
    pub terebyfile: Option<PathBuf>,

    /// List the exported tasks
    #[arg(short = 'T', long)]
    pub tasks: bool,

    /// List the exported task names, one per line
    #[arg(long, conflicts_with = "tasks")]
    pub tasks_simple: bool,

    /// Print the version of the tereby serving this project
    #[arg(long)]
    pub version: bool,

    /// Run command tasks through the platform shell
    #[arg(long)]
    pub shell: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Tasks to run, followed by arguments for the Terebyfile
    #[arg(value_name = "TASKS", trailing_var_arg = true)]
    pub rest: Vec<String>,
}

impl Cli {
    /// Requested task names
    pub fn task_names(&self) -> &[String] {
        &self.rest[..self.args_start()]
    }

    /// Arguments exposed to the Terebyfile as `ARGS`
    pub fn script_args(&self) -> Vec<String> {
        let args = &self.rest[self.args_start()..];
        match args.first().map(String::as_str) {
            Some("--") => args[1..].to_vec(),
            _ => args.to_vec(),
        }
    }

    fn args_start(&self) -> usize {
        self.rest
            .iter()
            .position(|arg| arg.starts_with('-'))
            .unwrap_or(self.rest.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tereby").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_tasks_and_args() {
        let cli = parse(&["build", "test", "--release", "fast"]);

        assert_eq!(cli.task_names(), ["build", "test"]);
        assert_eq!(cli.script_args(), ["--release", "fast"]);
    }

    #[test]
    fn test_no_tasks() {
        let cli = parse(&[]);

        assert!(cli.task_names().is_empty());
        assert!(cli.script_args().is_empty());
    }

    #[test]
    fn test_flags_before_tasks() {
        let cli = parse(&["-v", "--shell", "--terebyfile", "x/Terebyfile.rhai", "lint"]);

        assert!(cli.verbose);
        assert!(cli.shell);
        assert_eq!(cli.terebyfile, Some(PathBuf::from("x/Terebyfile.rhai")));
        assert_eq!(cli.task_names(), ["lint"]);
    }

    #[test]
    fn test_flags_after_tasks_are_script_args() {
        let cli = parse(&["lint", "--tasks"]);

        assert!(!cli.tasks);
        assert_eq!(cli.script_args(), ["--tasks"]);
    }

    #[test]
    fn test_listing_flags() {
        assert!(parse(&["-T"]).tasks);
        assert!(parse(&["--tasks-simple"]).tasks_simple);
        assert!(parse(&["--version"]).version);
    }
}
