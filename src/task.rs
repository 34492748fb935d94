//! Task declarations
//!
//! Tasks are stored in a [`TaskArena`] and referred to by [`TaskId`]. Identity
//! is the id, never the name: two tasks with the same name are still two
//! tasks, which is exactly what validation needs to tell apart.
//!
//! Dependency lists are arena objects of their own. A list can be shared by
//! several tasks and appended to after those tasks were defined, so the graph
//! is only meaningful once the whole Terebyfile has been evaluated.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{Result, TerebyError};

/// Stable identifier of a task within its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Identifier of a (possibly shared) dependency list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyListId(usize);

/// Async closure used by tasks defined from Rust
pub type NativeFn = Arc<dyn Fn() -> BoxFuture<'static, miette::Result<()>> + Send + Sync>;

/// What a task does when it runs
#[derive(Clone, Default)]
pub enum TaskAction {
    /// Aggregate task; only its dependencies do work
    #[default]
    None,
    /// Shell commands, run one after another
    Commands(Vec<String>),
    /// Rhai function pointer from the Terebyfile
    Script(rhai::FnPtr),
    /// Rust closure
    Native(NativeFn),
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Commands(cmds) => f.debug_tuple("Commands").field(cmds).finish(),
            Self::Script(fn_ptr) => f.debug_tuple("Script").field(&fn_ptr.fn_name()).finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// A declared task
#[derive(Debug, Clone)]
pub struct TaskDecl {
    pub name: String,
    pub description: Option<String>,
    pub dependencies: DependencyListId,
    pub action: TaskAction,
}

#[derive(Debug, Clone)]
enum Dependencies {
    Fresh(Vec<TaskId>),
    Shared(DependencyListId),
}

/// Options for [`TaskArena::define`]
#[derive(Debug, Clone)]
pub struct TaskOptions {
    name: String,
    description: Option<String>,
    dependencies: Dependencies,
    action: TaskAction,
}

impl TaskOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            dependencies: Dependencies::Fresh(Vec::new()),
            action: TaskAction::None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Depend on the given tasks through a new list owned by this task
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = Dependencies::Fresh(deps.into_iter().collect());
        self
    }

    /// Use an existing dependency list; later pushes to it affect this task too
    pub fn shared_dependencies(mut self, list: DependencyListId) -> Self {
        self.dependencies = Dependencies::Shared(list);
        self
    }

    pub fn action(mut self, action: TaskAction) -> Self {
        self.action = action;
        self
    }

    pub fn commands<I, S>(self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action(TaskAction::Commands(
            commands.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn run<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = miette::Result<()>> + Send + 'static,
    {
        self.action(TaskAction::Native(Arc::new(move || f().boxed())))
    }
}

/// Owner of every task and dependency list declared during one load
#[derive(Debug, Clone, Default)]
pub struct TaskArena {
    tasks: Vec<TaskDecl>,
    lists: Vec<Vec<TaskId>>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task. The dependency graph is not validated here.
    pub fn define(&mut self, options: TaskOptions) -> Result<TaskId> {
        if options.name.is_empty() {
            return Err(TerebyError::InvalidTask {
                reason: "task name must not be empty".to_string(),
            });
        }

        let dependencies = match options.dependencies {
            Dependencies::Fresh(deps) => {
                for &dep in &deps {
                    self.check_task(dep)?;
                }
                self.lists.push(deps);
                DependencyListId(self.lists.len() - 1)
            }
            Dependencies::Shared(list) => {
                self.check_list(list)?;
                list
            }
        };

        self.tasks.push(TaskDecl {
            name: options.name,
            description: options.description,
            dependencies,
            action: options.action,
        });

        Ok(TaskId(self.tasks.len() - 1))
    }

    /// Append a dependency to a list after the fact
    pub fn push_dependency(&mut self, list: DependencyListId, dep: TaskId) -> Result<()> {
        self.check_list(list)?;
        self.check_task(dep)?;
        self.lists[list.0].push(dep);
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskDecl> {
        self.tasks.get(id.0)
    }

    pub fn list(&self, list: DependencyListId) -> &[TaskId] {
        self.lists.get(list.0).map(Vec::as_slice).unwrap_or_default()
    }

    /// Current dependencies of a task, following its (maybe shared) list
    pub fn dependencies_of(&self, id: TaskId) -> &[TaskId] {
        self.get(id)
            .map(|task| self.list(task.dependencies))
            .unwrap_or_default()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> {
        (0..self.tasks.len()).map(TaskId)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn check_task(&self, id: TaskId) -> Result<()> {
        if id.0 < self.tasks.len() {
            Ok(())
        } else {
            Err(TerebyError::InvalidTask {
                reason: format!("unknown task id {}", id.0),
            })
        }
    }

    fn check_list(&self, list: DependencyListId) -> Result<()> {
        if list.0 < self.lists.len() {
            Ok(())
        } else {
            Err(TerebyError::InvalidTask {
                reason: format!("unknown dependency list {}", list.0),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_dependency_list() {
        let mut arena = TaskArena::new();
        let a = arena.define(TaskOptions::new("a")).unwrap();
        let b = arena.define(TaskOptions::new("b").depends_on([a])).unwrap();

        let shared = arena.get(b).unwrap().dependencies;
        let c = arena
            .define(TaskOptions::new("c").shared_dependencies(shared))
            .unwrap();
        let d = arena.define(TaskOptions::new("d")).unwrap();

        arena.push_dependency(shared, d).unwrap();

        assert_eq!(arena.dependencies_of(b), &[a, d]);
        assert_eq!(arena.dependencies_of(c), &[a, d]);
    }

    #[test]
    fn test_same_name_distinct_identity() {
        let mut arena = TaskArena::new();
        let first = arena.define(TaskOptions::new("a")).unwrap();
        let second = arena.define(TaskOptions::new("a")).unwrap();

        assert_ne!(first, second);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut arena = TaskArena::new();
        let result = arena.define(TaskOptions::new(""));

        assert!(matches!(result, Err(TerebyError::InvalidTask { .. })));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_foreign_ids_rejected() {
        let mut other = TaskArena::new();
        other.define(TaskOptions::new("x")).unwrap();
        let foreign = other.define(TaskOptions::new("y")).unwrap();

        let mut arena = TaskArena::new();
        let result = arena.define(TaskOptions::new("a").depends_on([foreign]));
        assert!(matches!(result, Err(TerebyError::InvalidTask { .. })));
    }
}
