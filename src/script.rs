//! Rhai Terebyfile loading
//!
//! A Terebyfile is a Rhai module. Tasks are created with `task(#{ ... })`
//! and published with `export`:
//!
//! ```rhai
//! let build = task(#{
//!     name: "build",
//!     description: "Build release",
//!     run: "cargo build --release",
//! });
//!
//! let test = task(#{
//!     name: "test",
//!     dependencies: [build],
//!     run: || sh("cargo test"),
//! });
//!
//! export build;
//! export test;
//! export test as default_task;
//! ```
//!
//! Loading evaluates the whole script first and only then hands the task
//! arena and the exported bindings to validation, so dependency lists may be
//! extended after the tasks using them were created.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Module, Scope, AST};

use crate::error::{Result, TerebyError};
use crate::task::{DependencyListId, TaskAction, TaskArena, TaskId, TaskOptions};
use crate::terebyfile::{ExportValue, Exports};

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Script-side handle of a task
#[derive(Debug, Clone)]
struct TaskHandle {
    id: TaskId,
}

/// Script-side handle of a dependency list
#[derive(Debug, Clone)]
struct DependencyListHandle {
    id: DependencyListId,
}

/// Result of evaluating a Terebyfile
#[derive(Debug)]
pub struct LoadedScript {
    pub arena: TaskArena,
    pub exports: Exports,
    pub context: ScriptContext,
}

/// Engine and compiled script needed to call task closures later
#[derive(Clone)]
pub struct ScriptContext {
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl std::fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptContext").finish_non_exhaustive()
    }
}

impl ScriptContext {
    /// Call a task closure. Blocks until the closure returns.
    pub fn call(&self, func: &FnPtr) -> ScriptResult<()> {
        func.call::<Dynamic>(&self.engine, &self.ast, ()).map(|_| ())
    }
}

/// Load a Terebyfile from disk
///
/// `args` is exposed to the script as the `ARGS` constant.
pub fn load(path: &Path, args: &[String]) -> Result<LoadedScript> {
    let source = std::fs::read_to_string(path)?;

    tracing::debug!(path = %path.display(), "evaluating Terebyfile");

    load_source(&source, args).map_err(|source| TerebyError::ScriptLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Evaluate Terebyfile source text
pub fn load_source(source: &str, args: &[String]) -> ScriptResult<LoadedScript> {
    let arena = Arc::new(Mutex::new(TaskArena::new()));

    let mut engine = create_engine();
    register_task_api(&mut engine, &arena);

    let ast = engine.compile(source)?;

    let mut scope = Scope::new();
    let args: rhai::Array = args.iter().cloned().map(Dynamic::from).collect();
    scope.push_constant("ARGS", args);

    let module = Module::eval_ast_as_new(scope, &ast, &engine)?;

    let exports = module
        .iter_var()
        .map(|(binding, value)| {
            let value = value.flatten_clone();
            let export = match value.clone().try_cast::<TaskHandle>() {
                Some(handle) => ExportValue::Task(handle.id),
                None => ExportValue::Other(value.type_name().to_string()),
            };
            (binding.to_string(), export)
        })
        .collect();

    // Closures run later may still call `task()`; they must not change the
    // snapshot that gets validated.
    let arena = lock(&arena).clone();

    Ok(LoadedScript {
        arena,
        exports,
        context: ScriptContext {
            engine: Arc::new(engine),
            ast: Arc::new(ast),
        },
    })
}

fn lock(arena: &Mutex<TaskArena>) -> MutexGuard<'_, TaskArena> {
    arena.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a configured engine instance
fn create_engine() -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(64, 64);

    register_stdlib(&mut engine);

    engine
}

/// Register `task()` and the `Task` / `DependencyList` types
fn register_task_api(engine: &mut Engine, arena: &Arc<Mutex<TaskArena>>) {
    engine
        .register_type_with_name::<TaskHandle>("Task")
        .register_type_with_name::<DependencyListHandle>("DependencyList");

    let tasks = Arc::clone(arena);
    engine.register_fn("task", move |options: rhai::Map| -> ScriptResult<TaskHandle> {
        let options = task_options(options)?;
        let id = lock(&tasks).define(options).map_err(|e| e.to_string())?;
        Ok(TaskHandle { id })
    });

    let tasks = Arc::clone(arena);
    engine.register_get("name", move |task: &mut TaskHandle| -> String {
        lock(&tasks)
            .get(task.id)
            .map(|decl| decl.name.clone())
            .unwrap_or_default()
    });

    let tasks = Arc::clone(arena);
    engine.register_get("description", move |task: &mut TaskHandle| -> Dynamic {
        lock(&tasks)
            .get(task.id)
            .and_then(|decl| decl.description.clone())
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT)
    });

    let tasks = Arc::clone(arena);
    engine.register_get(
        "dependencies",
        move |task: &mut TaskHandle| -> ScriptResult<DependencyListHandle> {
            let id = lock(&tasks)
                .get(task.id)
                .map(|decl| decl.dependencies)
                .ok_or("unknown task")?;
            Ok(DependencyListHandle { id })
        },
    );

    let tasks = Arc::clone(arena);
    engine.register_fn(
        "push",
        move |list: &mut DependencyListHandle, task: TaskHandle| -> ScriptResult<()> {
            lock(&tasks)
                .push_dependency(list.id, task.id)
                .map_err(|e| e.to_string().into())
        },
    );

    let tasks = Arc::clone(arena);
    engine.register_fn("len", move |list: &mut DependencyListHandle| -> i64 {
        lock(&tasks).list(list.id).len() as i64
    });

    let tasks = Arc::clone(arena);
    engine.register_fn("to_string", move |task: &mut TaskHandle| -> String {
        let name = lock(&tasks)
            .get(task.id)
            .map(|decl| decl.name.clone())
            .unwrap_or_default();
        format!("Task({name})")
    });
}

/// Convert the map given to `task()` into [`TaskOptions`]
fn task_options(mut map: rhai::Map) -> ScriptResult<TaskOptions> {
    let name = map
        .remove("name")
        .ok_or("task() requires a `name`")?
        .into_string()
        .map_err(|t| format!("task name must be a string, got {t}"))?;

    let mut options = TaskOptions::new(name);

    if let Some(description) = map.remove("description") {
        let description = description
            .into_string()
            .map_err(|t| format!("task description must be a string, got {t}"))?;
        options = options.description(description);
    }

    if let Some(dependencies) = map.remove("dependencies") {
        let dependencies = dependencies.flatten();
        if let Some(list) = dependencies.clone().try_cast::<DependencyListHandle>() {
            options = options.shared_dependencies(list.id);
        } else if let Some(items) = dependencies.clone().try_cast::<rhai::Array>() {
            let ids = items
                .into_iter()
                .map(|item| {
                    let type_name = item.type_name();
                    item.flatten()
                        .try_cast::<TaskHandle>()
                        .map(|handle| handle.id)
                        .ok_or_else(|| format!("dependencies must be tasks, got {type_name}"))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            options = options.depends_on(ids);
        } else if !dependencies.is_unit() {
            return Err(format!(
                "dependencies must be an array of tasks or a dependency list, got {}",
                dependencies.type_name()
            )
            .into());
        }
    }

    if let Some(run) = map.remove("run") {
        options = options.action(task_action(run)?);
    }

    if let Some(key) = map.keys().next() {
        return Err(format!("unknown task option `{key}`").into());
    }

    Ok(options)
}

fn task_action(run: Dynamic) -> ScriptResult<TaskAction> {
    let run = run.flatten();
    if run.is_unit() {
        return Ok(TaskAction::None);
    }
    if let Some(func) = run.clone().try_cast::<FnPtr>() {
        return Ok(TaskAction::Script(func));
    }
    if let Some(command) = run.clone().try_cast::<rhai::ImmutableString>() {
        return Ok(TaskAction::Commands(vec![command.to_string()]));
    }
    if let Some(commands) = run.clone().try_cast::<rhai::Array>() {
        let commands = commands
            .into_iter()
            .map(|cmd| {
                cmd.into_string()
                    .map_err(|t| format!("commands must be strings, got {t}"))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        return Ok(TaskAction::Commands(commands));
    }

    Err(format!(
        "run must be a function, a command or an array of commands, got {}",
        run.type_name()
    )
    .into())
}

/// Register helper functions available to Terebyfiles
fn register_stdlib(engine: &mut Engine) {
    // File operations
    engine.register_fn("read_file", |path: &str| -> ScriptResult<String> {
        std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read file '{}': {}", path, e).into())
    });

    engine.register_fn("write_file", |path: &str, content: &str| -> ScriptResult<()> {
        std::fs::write(path, content)
            .map_err(|e| format!("Failed to write file '{}': {}", path, e).into())
    });

    engine.register_fn("file_exists", |path: &str| -> bool {
        Path::new(path).exists()
    });

    engine.register_fn("mkdir", |path: &str| -> ScriptResult<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory '{}': {}", path, e).into())
    });

    engine.register_fn("glob", |pattern: &str| -> ScriptResult<rhai::Array> {
        let paths: Vec<_> = glob::glob(pattern)
            .map_err(|e| format!("Invalid glob pattern: {}", e))?
            .filter_map(|p| p.ok())
            .map(|p| Dynamic::from(p.to_string_lossy().to_string()))
            .collect();
        Ok(paths)
    });

    // Shell commands. `sh` streams output, `exec` captures stdout.
    engine.register_fn("sh", |cmd: &str| -> ScriptResult<()> {
        let status = shell_command(cmd)
            .status()
            .map_err(|e| format!("Failed to execute command: {}", e))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!(
                "Command `{}` failed with exit code {}",
                cmd,
                status.code().unwrap_or(1)
            )
            .into())
        }
    });

    engine.register_fn("exec", |cmd: &str| -> ScriptResult<String> {
        match shell_command(cmd).output() {
            Ok(o) if o.status.success() => Ok(String::from_utf8_lossy(&o.stdout).to_string()),
            Ok(o) => {
                let stderr = String::from_utf8_lossy(&o.stderr);
                Err(format!("Command failed: {}", stderr).into())
            }
            Err(e) => Err(format!("Failed to execute command: {}", e).into()),
        }
    });

    // Environment
    engine.register_fn("get_env", |key: &str| -> String {
        std::env::var(key).unwrap_or_default()
    });

    engine.register_fn("set_env", |key: &str, value: &str| {
        std::env::set_var(key, value);
    });

    engine.register_fn("parse_json", |s: &str| -> ScriptResult<Dynamic> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| format!("Failed to parse JSON: {}", e))?;
        Ok(json_to_dynamic(value))
    });
}

fn shell_command(cmd: &str) -> std::process::Command {
    let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
    let mut command = std::process::Command::new(shell);
    command.arg(flag).arg(cmd);
    command
}

/// Convert serde_json::Value to Rhai Dynamic
fn json_to_dynamic(value: serde_json::Value) -> Dynamic {
    use serde_json::Value;

    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Dynamic::from(i),
            (None, Some(f)) => Dynamic::from(f),
            (None, None) => Dynamic::UNIT,
        },
        Value::String(s) => Dynamic::from(s),
        Value::Array(arr) => {
            let items: rhai::Array = arr.into_iter().map(json_to_dynamic).collect();
            Dynamic::from(items)
        }
        Value::Object(obj) => {
            let map: rhai::Map = obj
                .into_iter()
                .map(|(k, v)| (k.into(), json_to_dynamic(v)))
                .collect();
            Dynamic::from(map)
        }
    }
}
