//! Validated Terebyfiles
//!
//! A loaded script yields an arena of task declarations plus the bindings it
//! exported. [`Terebyfile::from_exports`] checks identity and naming
//! invariants, rejects dependency cycles, and picks out the default task.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TerebyError};
use crate::graph::TaskGraph;
use crate::task::{TaskArena, TaskDecl, TaskId};

/// Export binding that designates the default task
pub const DEFAULT_EXPORT: &str = "default_task";

/// A value exported from a Terebyfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportValue {
    Task(TaskId),
    /// Anything that is not a task, identified by its type name
    Other(String),
}

/// Exported bindings, in the order the loader produced them
#[derive(Debug, Clone, Default)]
pub struct Exports {
    bindings: Vec<(String, ExportValue)>,
}

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, binding: impl Into<String>, value: ExportValue) {
        self.bindings.push((binding.into(), value));
    }

    pub fn task(mut self, binding: impl Into<String>, id: TaskId) -> Self {
        self.push(binding, ExportValue::Task(id));
        self
    }

    pub fn other(mut self, binding: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.push(binding, ExportValue::Other(type_name.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExportValue)> {
        self.bindings.iter().map(|(binding, value)| (binding.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl FromIterator<(String, ExportValue)> for Exports {
    fn from_iter<I: IntoIterator<Item = (String, ExportValue)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

/// A validated Terebyfile
#[derive(Debug, Clone)]
pub struct Terebyfile {
    graph: TaskGraph,
    /// Exported tasks in declaration order
    tasks: Vec<TaskId>,
    by_name: HashMap<String, TaskId>,
    default_task: Option<TaskId>,
}

impl Terebyfile {
    /// Validate the exports of a fully evaluated script
    pub fn from_exports(arena: &TaskArena, exports: &Exports) -> Result<Self> {
        let mut exported = Vec::new();
        let mut seen = HashSet::new();
        let mut default_task = None;

        for (binding, value) in exports.iter() {
            let ExportValue::Task(id) = value else {
                continue;
            };
            let task = arena.get(*id).ok_or_else(|| TerebyError::InvalidTask {
                reason: format!("export `{binding}` refers to a task from another Terebyfile"),
            })?;

            // The default binding normally re-exports a named task.
            if binding == DEFAULT_EXPORT {
                default_task = Some(*id);
                continue;
            }

            if !seen.insert(*id) {
                return Err(TerebyError::DuplicateExport {
                    name: task.name.clone(),
                });
            }
            exported.push(*id);
        }

        if let Some(id) = default_task {
            if seen.insert(id) {
                exported.push(id);
            }
        }

        if exported.is_empty() {
            return Err(TerebyError::NoTasksFound);
        }

        exported.sort();

        let mut by_name = HashMap::with_capacity(exported.len());
        for &id in &exported {
            let name = arena.get(id).map(|task| task.name.clone()).unwrap_or_default();
            if by_name.insert(name.clone(), id).is_some() {
                return Err(TerebyError::DuplicateName { name });
            }
        }

        let graph = TaskGraph::new(arena.clone());
        if let Some(id) = graph.find_cycle(exported.iter().copied()) {
            return Err(TerebyError::CycleDetected {
                name: graph.name(id).to_string(),
            });
        }

        tracing::debug!(
            tasks = exported.len(),
            default = ?default_task.map(|id| graph.name(id)),
            "validated Terebyfile"
        );

        Ok(Self {
            graph,
            tasks: exported,
            by_name,
            default_task,
        })
    }

    /// Resolve requested task names, falling back to the default task
    ///
    /// `display_path` is the Terebyfile path as shown to the user.
    pub fn select(&self, names: &[String], display_path: &str) -> Result<Vec<TaskId>> {
        if names.is_empty() {
            return match self.default_task {
                Some(id) => Ok(vec![id]),
                None => Err(TerebyError::NoDefaultTask {
                    path: display_path.to_string(),
                }),
            };
        }

        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| TerebyError::TaskNotFound {
                    name: name.clone(),
                    path: display_path.to_string(),
                    suggestion: self.suggest(name).map(str::to_string),
                })
            })
            .collect()
    }

    /// Closest known task name, if it is close enough to be a likely typo
    fn suggest(&self, name: &str) -> Option<&str> {
        let (candidate, distance) = self
            .task_names()
            .map(|candidate| (candidate, edit_distance(name, candidate)))
            .fold(None, |best: Option<(&str, usize)>, (candidate, distance)| match best {
                Some((_, best_distance)) if best_distance <= distance => best,
                _ => Some((candidate, distance)),
            })?;

        ((distance as f64) < name.chars().count() as f64 * 0.4).then_some(candidate)
    }

    pub fn get(&self, name: &str) -> Option<TaskId> {
        self.by_name.get(name).copied()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskDecl> {
        self.graph.get(id)
    }

    /// Exported tasks with their names, in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = (&str, TaskId)> {
        self.tasks.iter().map(|&id| (self.graph.name(id), id))
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks().map(|(name, _)| name)
    }

    pub fn default_task(&self) -> Option<TaskId> {
        self.default_task
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }
}

/// Levenshtein distance over chars
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
