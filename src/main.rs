//! tereby command line entry point
//!
//! Finds the Terebyfile, hands off to the project's own tereby if this is
//! not it, then loads, validates and runs the requested tasks.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use console::style;

use tereby::cli::Cli;
use tereby::config::find_terebyfile;
use tereby::display::{pretty_duration, simplify_path, task_list, task_list_simple};
use tereby::reexec::{self, Resolution};
use tereby::{script, Result, Runner, RunnerConfig, TerebyError, Terebyfile, TerminalReporter};

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();

    let cli = Cli::parse();

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) if e.is_user_error() => {
            eprintln!("{}: {}", style("Error").red().bold(), e);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir()?;

    let path = match locate(&cli, &cwd) {
        Ok(path) => path,
        Err(_) if cli.version => return Ok(print_version()),
        Err(e) => return Err(e),
    };

    if let Resolution::HandOff(installation) = reexec::resolve(&path, &std::env::current_exe()?)? {
        let args: Vec<OsString> = std::env::args_os().skip(1).collect();
        return reexec::hand_off(&installation, &args);
    }

    if cli.version {
        return Ok(print_version());
    }

    let dir = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
    std::env::set_current_dir(&dir)?;
    let display_path = simplify_path(&path);

    let loaded = script::load(&path, &cli.script_args())?;
    let terebyfile = Terebyfile::from_exports(&loaded.arena, &loaded.exports)?;

    if cli.tasks {
        print!("{}", task_list(&terebyfile));
        return Ok(ExitCode::SUCCESS);
    }
    if cli.tasks_simple {
        print!("{}", task_list_simple(&terebyfile));
        return Ok(ExitCode::SUCCESS);
    }

    let selected = terebyfile.select(cli.task_names(), &display_path)?;
    let names = selected
        .iter()
        .map(|&id| terebyfile.graph().name(id))
        .collect::<Vec<_>>()
        .join(", ");

    println!(
        "Using {} to run {}",
        style(&display_path).magenta(),
        style(&names).cyan()
    );

    let start = Instant::now();
    let runner = Runner::new(terebyfile.graph(), Arc::new(TerminalReporter))
        .with_script(loaded.context)
        .with_config(RunnerConfig {
            cwd: dir,
            shell: cli.shell,
        });
    let summary = runner.execute(&selected).await;

    let outcome = if summary.is_success() {
        String::new()
    } else {
        format!(" {}", style("with errors").red())
    };
    println!(
        "Completed {}{} in {}",
        style(&names).cyan(),
        outcome,
        style(pretty_duration(start.elapsed())).magenta()
    );

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Absolute path of the Terebyfile to use
fn locate(cli: &Cli, cwd: &Path) -> Result<PathBuf> {
    match &cli.terebyfile {
        Some(path) if path.is_dir() => Err(TerebyError::NotAFile {
            name: path.display().to_string(),
        }),
        Some(path) if !path.exists() => Err(TerebyError::TerebyfileNotFound),
        Some(path) => Ok(cwd.join(path)),
        None => find_terebyfile(cwd),
    }
}

fn print_version() -> ExitCode {
    println!("tereby {}", env!("CARGO_PKG_VERSION"));
    ExitCode::SUCCESS
}
