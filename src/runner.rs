//! Task scheduler
//!
//! Runs the dependency closure of the requested tasks. A task starts as soon
//! as all of its dependencies succeeded; there is no concurrency cap beyond
//! that. Every in-flight task is a future in one `FuturesUnordered`, polled
//! from the caller's task, so scheduling is cooperative.
//!
//! Failures are fail-soft: a failing task skips its transitive dependents,
//! while everything unrelated keeps running to completion.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use miette::IntoDiagnostic;
use tokio::process::Command;

use crate::error::{Result, TerebyError};
use crate::graph::TaskGraph;
use crate::script::ScriptContext;
use crate::task::{TaskAction, TaskId};

/// State of a task within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never started because a dependency failed
    Skipped,
}

/// Receives progress events as they happen
pub trait RunReporter: Send + Sync {
    fn task_started(&self, _name: &str) {}

    fn task_finished(&self, _name: &str, _elapsed: Duration) {}

    fn task_failed(&self, name: &str, elapsed: Duration, error: &miette::Report);
}

/// Final state of one task in the closure
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub name: String,
    pub state: TaskState,
    pub elapsed: Option<Duration>,
}

/// Outcome of a run, in closure order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<TaskOutcome>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| outcome.state == TaskState::Succeeded)
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.name == name)
            .map(|outcome| outcome.state)
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Working directory for command tasks
    pub cwd: PathBuf,
    /// Run commands through the platform shell
    pub shell: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_default(),
            shell: false,
        }
    }
}

/// Task scheduler for one validated graph
pub struct Runner<'a> {
    graph: &'a TaskGraph,
    reporter: Arc<dyn RunReporter>,
    script: Option<ScriptContext>,
    config: RunnerConfig,
}

impl<'a> Runner<'a> {
    pub fn new(graph: &'a TaskGraph, reporter: Arc<dyn RunReporter>) -> Self {
        Self {
            graph,
            reporter,
            script: None,
            config: RunnerConfig::default(),
        }
    }

    /// Engine used to call Rhai task closures
    pub fn with_script(mut self, script: ScriptContext) -> Self {
        self.script = Some(script);
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the selected tasks, failing if any task in the closure did not succeed
    pub async fn run_tasks(&self, selected: &[TaskId]) -> Result<RunSummary> {
        let summary = self.execute(selected).await;

        if summary.is_success() {
            Ok(summary)
        } else {
            Err(TerebyError::RunFailed {
                failed: summary.count(TaskState::Failed),
                skipped: summary.count(TaskState::Skipped),
            })
        }
    }

    /// Run the selected tasks and report every task's terminal state
    pub async fn execute(&self, selected: &[TaskId]) -> RunSummary {
        let closure = self.graph.closure(selected);

        let mut states: HashMap<TaskId, TaskState> =
            closure.iter().map(|&id| (id, TaskState::Pending)).collect();
        let mut waiting: HashMap<TaskId, usize> = closure
            .iter()
            .map(|&id| {
                let deps: HashSet<_> = self.graph.dependencies(id).iter().collect();
                (id, deps.len())
            })
            .collect();
        let mut elapsed: HashMap<TaskId, Duration> = HashMap::new();

        let mut ready: VecDeque<TaskId> = closure
            .iter()
            .copied()
            .filter(|id| waiting.get(id) == Some(&0))
            .collect();
        let mut running = FuturesUnordered::new();

        loop {
            while let Some(id) = ready.pop_front() {
                states.insert(id, TaskState::Running);
                tracing::debug!(task = self.graph.name(id), "starting");
                self.reporter.task_started(self.graph.name(id));
                running.push(self.run_one(id));
            }

            let Some((id, took, result)) = running.next().await else {
                break;
            };
            elapsed.insert(id, took);
            let name = self.graph.name(id);

            match result {
                Ok(()) => {
                    states.insert(id, TaskState::Succeeded);
                    tracing::debug!(task = name, ?took, "finished");
                    self.reporter.task_finished(name, took);

                    for dependent in self.graph.dependents(id) {
                        if states.get(&dependent) != Some(&TaskState::Pending) {
                            continue;
                        }
                        if let Some(count) = waiting.get_mut(&dependent) {
                            *count -= 1;
                            if *count == 0 {
                                ready.push_back(dependent);
                            }
                        }
                    }
                }
                Err(error) => {
                    states.insert(id, TaskState::Failed);
                    tracing::debug!(task = name, ?took, "failed");
                    self.reporter.task_failed(name, took, &error);
                    self.skip_dependents(id, &mut states);
                }
            }
        }

        RunSummary {
            outcomes: closure
                .iter()
                .map(|id| TaskOutcome {
                    name: self.graph.name(*id).to_string(),
                    state: states.get(id).copied().unwrap_or(TaskState::Pending),
                    elapsed: elapsed.get(id).copied(),
                })
                .collect(),
        }
    }

    /// Mark every pending transitive dependent of a failed task as skipped
    fn skip_dependents(&self, failed: TaskId, states: &mut HashMap<TaskId, TaskState>) {
        let mut stack = self.graph.dependents(failed);

        while let Some(id) = stack.pop() {
            if states.get(&id) != Some(&TaskState::Pending) {
                continue;
            }
            states.insert(id, TaskState::Skipped);
            tracing::debug!(
                task = self.graph.name(id),
                because = self.graph.name(failed),
                "skipping"
            );
            stack.extend(self.graph.dependents(id));
        }
    }

    async fn run_one(&self, id: TaskId) -> (TaskId, Duration, miette::Result<()>) {
        let start = Instant::now();
        let result = self.run_action(id).await;
        (id, start.elapsed(), result)
    }

    async fn run_action(&self, id: TaskId) -> miette::Result<()> {
        let Some(task) = self.graph.get(id) else {
            return Ok(());
        };

        match &task.action {
            TaskAction::None => Ok(()),
            TaskAction::Commands(commands) => {
                for cmd in commands {
                    execute_command(cmd, &self.config.cwd, self.config.shell).await?;
                }
                Ok(())
            }
            TaskAction::Script(func) => {
                let script = self.script.clone().ok_or_else(|| {
                    miette::miette!("task '{}' has a script action but no script engine", task.name)
                })?;
                let func = func.clone();

                // Rhai evaluation is synchronous; keep it off the scheduler's task.
                let result = tokio::task::spawn_blocking(move || script.call(&func))
                    .await
                    .into_diagnostic()?;

                result.map_err(|source| {
                    miette::Report::new(TerebyError::ScriptFailed {
                        task: task.name.clone(),
                        source,
                    })
                })
            }
            TaskAction::Native(run) => run().await,
        }
    }
}

/// Execute a single command with inherited stdio
async fn execute_command(cmd: &str, cwd: &Path, use_shell: bool) -> Result<()> {
    let mut command = if use_shell {
        let shell = if cfg!(windows) { "cmd" } else { "sh" };
        let flag = if cfg!(windows) { "/C" } else { "-c" };
        let mut c = Command::new(shell);
        c.arg(flag).arg(cmd);
        c
    } else {
        let parts = parse_command(cmd);
        let Some((program, args)) = parts.split_first() else {
            return Ok(());
        };
        let program = which::which(program).map_err(|_| TerebyError::CommandNotFound {
            command: program.clone(),
        })?;
        let mut c = Command::new(program);
        c.args(args);
        c
    };

    let status = command
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;

    if !status.success() {
        return Err(TerebyError::CommandFailed {
            command: cmd.to_string(),
            code: status.code().unwrap_or(1),
        });
    }

    Ok(())
}

/// Split a command string into parts, honouring simple quotes
fn parse_command(cmd: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in cmd.chars() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (' ', None) => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskArena, TaskOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl RunReporter for Recorder {
        fn task_started(&self, name: &str) {
            self.events.lock().unwrap().push(format!("start {name}"));
        }

        fn task_finished(&self, name: &str, _elapsed: Duration) {
            self.events.lock().unwrap().push(format!("finish {name}"));
        }

        fn task_failed(&self, name: &str, _elapsed: Duration, error: &miette::Report) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fail {name}: {error}"));
        }
    }

    fn counting(arena: &mut TaskArena, name: &str, deps: &[TaskId], runs: &Arc<AtomicUsize>) -> TaskId {
        let runs = Arc::clone(runs);
        arena
            .define(TaskOptions::new(name).depends_on(deps.iter().copied()).run(move || {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .unwrap()
    }

    #[tokio::test]
    async fn test_dependencies_run_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut arena = TaskArena::new();

        let mut define = |name: &'static str, deps: Vec<TaskId>| {
            let order = Arc::clone(&order);
            arena
                .define(TaskOptions::new(name).depends_on(deps).run(move || {
                    let order = Arc::clone(&order);
                    async move {
                        tokio::task::yield_now().await;
                        order.lock().unwrap().push(name);
                        Ok(())
                    }
                }))
                .unwrap()
        };

        let a = define("a", vec![]);
        let b = define("b", vec![a]);
        let c = define("c", vec![a]);
        let d = define("d", vec![b, c]);

        let graph = TaskGraph::new(arena);
        let recorder = Arc::new(Recorder::default());
        let summary = Runner::new(&graph, recorder.clone())
            .run_tasks(&[d])
            .await
            .unwrap();

        let order = order.lock().unwrap().clone();
        let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));

        assert!(summary.is_success());
        assert_eq!(summary.count(TaskState::Succeeded), 4);
        assert_eq!(recorder.events().len(), 8);
    }

    #[tokio::test]
    async fn test_shared_dependency_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut arena = TaskArena::new();
        let shared = counting(&mut arena, "shared", &[], &runs);
        let left = counting(&mut arena, "left", &[shared], &runs);
        let right = counting(&mut arena, "right", &[shared, shared], &runs);

        let graph = TaskGraph::new(arena);
        let summary = Runner::new(&graph, Arc::new(Recorder::default()))
            .run_tasks(&[left, right, left])
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(summary.outcomes.len(), 3);
    }

    #[tokio::test]
    async fn test_independent_tasks_run_concurrently() {
        // Each task waits for the other to have started.
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let mut arena = TaskArena::new();

        let mut ids = Vec::new();
        for name in ["x", "y"] {
            let barrier = Arc::clone(&barrier);
            ids.push(
                arena
                    .define(TaskOptions::new(name).run(move || {
                        let barrier = Arc::clone(&barrier);
                        async move {
                            barrier.wait().await;
                            Ok(())
                        }
                    }))
                    .unwrap(),
            );
        }

        let graph = TaskGraph::new(arena);
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            Runner::new(&graph, Arc::new(Recorder::default())).run_tasks(&ids),
        )
        .await
        .expect("independent tasks should not wait for each other")
        .unwrap();

        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let runs = Arc::new(AtomicUsize::new(0));
        let y_runs = Arc::new(AtomicUsize::new(0));
        let mut arena = TaskArena::new();

        let x = arena
            .define(TaskOptions::new("x").run(|| async { Err(miette::miette!("failure!")) }))
            .unwrap();
        let y = counting(&mut arena, "y", &[], &y_runs);
        let z = counting(&mut arena, "z", &[x], &runs);
        let after_z = counting(&mut arena, "afterZ", &[z], &runs);

        let graph = TaskGraph::new(arena);
        let recorder = Arc::new(Recorder::default());
        let runner = Runner::new(&graph, recorder.clone());

        let summary = runner.execute(&[x, y, after_z]).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(y_runs.load(Ordering::SeqCst), 1);
        assert_eq!(summary.state_of("x"), Some(TaskState::Failed));
        assert_eq!(summary.state_of("y"), Some(TaskState::Succeeded));
        assert_eq!(summary.state_of("z"), Some(TaskState::Skipped));
        assert_eq!(summary.state_of("afterZ"), Some(TaskState::Skipped));
        assert!(!summary.is_success());

        let events = recorder.events();
        assert!(events.contains(&"fail x: failure!".to_string()));
        assert!(!events.iter().any(|e| e.contains(" z") || e.contains("afterZ")));

        let err = runner.run_tasks(&[x, y, after_z]).await.unwrap_err();
        assert!(matches!(err, TerebyError::RunFailed { failed: 1, skipped: 2 }));
    }

    #[tokio::test]
    async fn test_independent_failures_all_reported() {
        let mut arena = TaskArena::new();
        let first = arena
            .define(TaskOptions::new("first").run(|| async { Err(miette::miette!("one")) }))
            .unwrap();
        let second = arena
            .define(TaskOptions::new("second").run(|| async { Err(miette::miette!("two")) }))
            .unwrap();
        let both = arena
            .define(TaskOptions::new("both").depends_on([first, second]))
            .unwrap();

        let graph = TaskGraph::new(arena);
        let recorder = Arc::new(Recorder::default());
        let summary = Runner::new(&graph, recorder.clone()).execute(&[both]).await;

        assert_eq!(summary.count(TaskState::Failed), 2);
        assert_eq!(summary.state_of("both"), Some(TaskState::Skipped));
        let failures = recorder
            .events()
            .into_iter()
            .filter(|e| e.starts_with("fail"))
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_command_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = TaskArena::new();
        let ok = arena
            .define(TaskOptions::new("ok").commands(["echo hello > out.txt"]))
            .unwrap();
        let bad = arena
            .define(TaskOptions::new("bad").commands(["exit 3"]))
            .unwrap();

        let graph = TaskGraph::new(arena);
        let recorder = Arc::new(Recorder::default());
        let runner = Runner::new(&graph, recorder.clone()).with_config(RunnerConfig {
            cwd: dir.path().to_path_buf(),
            shell: true,
        });

        let summary = runner.execute(&[ok, bad]).await;

        assert_eq!(summary.state_of("ok"), Some(TaskState::Succeeded));
        assert_eq!(summary.state_of("bad"), Some(TaskState::Failed));
        assert!(dir.path().join("out.txt").exists());
        assert!(recorder
            .events()
            .contains(&"fail bad: Command `exit 3` failed with exit code 3".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let mut arena = TaskArena::new();
        let task = arena
            .define(TaskOptions::new("missing").commands(["definitely-not-a-real-program-xyz --flag"]))
            .unwrap();

        let graph = TaskGraph::new(arena);
        let recorder = Arc::new(Recorder::default());
        let runner = Runner::new(&graph, recorder.clone()).with_config(RunnerConfig {
            cwd: std::env::temp_dir(),
            shell: false,
        });

        let summary = runner.execute(&[task]).await;
        assert_eq!(summary.state_of("missing"), Some(TaskState::Failed));
        assert!(recorder.events()[1].contains("Command not found"));
    }

    #[test]
    fn test_parse_command() {
        let parts = parse_command("cargo test --all");
        assert_eq!(parts, vec!["cargo", "test", "--all"]);
    }

    #[test]
    fn test_parse_command_with_quotes() {
        let parts = parse_command(r#"echo "hello world" 'a b'"#);
        assert_eq!(parts, vec!["echo", "hello world", "a b"]);
    }
}
