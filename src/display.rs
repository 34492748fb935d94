//! Terminal output
//!
//! Progress lines, failure reports and the `--tasks` listing.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use console::style;
use directories::BaseDirs;

use crate::runner::RunReporter;
use crate::terebyfile::Terebyfile;

/// Prints task progress to the terminal
#[derive(Debug, Default)]
pub struct TerminalReporter;

impl RunReporter for TerminalReporter {
    fn task_started(&self, name: &str) {
        println!("Starting {}", style(name).cyan());
    }

    fn task_finished(&self, name: &str, elapsed: Duration) {
        println!(
            "Finished {} in {}",
            style(name).cyan(),
            style(pretty_duration(elapsed)).magenta()
        );
    }

    fn task_failed(&self, name: &str, elapsed: Duration, error: &miette::Report) {
        eprintln!("{}", format_failure(name, elapsed, error));
    }
}

/// `Error in <task> in <elapsed>` followed by the failure's full report
pub fn format_failure(name: &str, elapsed: Duration, error: &miette::Report) -> String {
    format!(
        "{} in {} in {}\n{:?}",
        style("Error").red().bold(),
        style(name).cyan(),
        style(pretty_duration(elapsed)).magenta(),
        error
    )
}

/// Human-readable duration: `850ms`, `1.2s`, `2m 3.4s`
pub fn pretty_duration(duration: Duration) -> String {
    let millis = duration.as_millis();

    if millis < 1000 {
        return format!("{millis}ms");
    }

    let minutes = duration.as_secs() / 60;
    let seconds = duration.as_secs_f64() - (minutes * 60) as f64;

    if minutes == 0 {
        format!("{seconds:.1}s")
    } else {
        format!("{minutes}m {seconds:.1}s")
    }
}

/// Normalize a path and abbreviate the home directory to `~`
pub fn simplify_path(path: &Path) -> String {
    let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    simplify_path_with_home(path, home.as_deref())
}

fn simplify_path_with_home(path: &Path, home: Option<&Path>) -> String {
    let path = normalize(path);

    if let Some(home) = home.map(normalize) {
        if path != home {
            if let Ok(rest) = path.strip_prefix(&home) {
                return Path::new("~").join(rest).display().to_string();
            }
        }
    }

    path.display().to_string()
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}

/// Render the `--tasks` listing
pub fn task_list(terebyfile: &Terebyfile) -> String {
    let graph = terebyfile.graph();
    let default = terebyfile.default_task();
    let width = terebyfile.task_names().map(str::len).max().unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!("{}\n", style("Available tasks:").bold()));

    for (name, id) in terebyfile.tasks() {
        let padding = " ".repeat(width - name.len());
        let description = terebyfile
            .task(id)
            .and_then(|task| task.description.as_deref())
            .unwrap_or("");

        out.push_str(&format!(
            "  {}{}  {}",
            style(name).cyan().bold(),
            padding,
            style(description).dim()
        ));

        let deps: Vec<&str> = graph.dependencies(id).iter().map(|&d| graph.name(d)).collect();
        if !deps.is_empty() {
            out.push_str(&format!(
                " {}",
                style(format!("[deps: {}]", deps.join(", "))).yellow().dim()
            ));
        }
        if default == Some(id) {
            out.push_str(&format!(" {}", style("(default)").green()));
        }

        out.push('\n');
    }

    out
}

/// Render the `--tasks-simple` listing: one name per line
pub fn task_list_simple(terebyfile: &Terebyfile) -> String {
    terebyfile
        .task_names()
        .map(|name| format!("{name}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskArena, TaskOptions};
    use crate::terebyfile::{Exports, DEFAULT_EXPORT};

    #[test]
    fn test_pretty_duration() {
        assert_eq!(pretty_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(pretty_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(pretty_duration(Duration::from_millis(1200)), "1.2s");
        assert_eq!(pretty_duration(Duration::from_millis(123_400)), "2m 3.4s");
    }

    #[test]
    fn test_simplify_path() {
        let home = Path::new("/home/user");

        assert_eq!(
            simplify_path_with_home(Path::new("/home/user/project/Terebyfile.rhai"), Some(home)),
            "~/project/Terebyfile.rhai"
        );
        assert_eq!(
            simplify_path_with_home(Path::new("/home/user/a/../b/./Terebyfile.rhai"), Some(home)),
            "~/b/Terebyfile.rhai"
        );
        assert_eq!(simplify_path_with_home(home, Some(home)), "/home/user");
        assert_eq!(
            simplify_path_with_home(Path::new("/home/username/x"), Some(home)),
            "/home/username/x"
        );
        assert_eq!(
            simplify_path_with_home(Path::new("/srv/app/../x"), None),
            "/srv/x"
        );
    }

    #[test]
    fn test_format_failure() {
        console::set_colors_enabled(false);
        let error = miette::miette!("boom");
        let text = format_failure("build", Duration::from_millis(5), &error);

        assert!(text.starts_with("Error in build in 5ms\n"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_task_lists() {
        console::set_colors_enabled(false);
        let mut arena = TaskArena::new();
        let lint = arena
            .define(TaskOptions::new("lint").description("Check style"))
            .unwrap();
        let build = arena
            .define(TaskOptions::new("build").depends_on([lint]))
            .unwrap();
        let exports = Exports::new()
            .task("lint", lint)
            .task("build", build)
            .task(DEFAULT_EXPORT, build);
        let terebyfile = Terebyfile::from_exports(&arena, &exports).unwrap();

        let listing = task_list(&terebyfile);
        assert!(listing.contains("lint   Check style"));
        assert!(listing.contains("build  "));
        assert!(listing.contains("[deps: lint] (default)"));

        assert_eq!(task_list_simple(&terebyfile), "lint\nbuild\n");
    }
}
