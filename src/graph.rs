//! Task graph construction and dependency resolution
//!
//! Freezes a [`TaskArena`] into a petgraph digraph once the Terebyfile has
//! finished evaluating. Edges point from a task to each of its dependencies.

use std::collections::HashSet;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, Control, DfsEvent};
use petgraph::Direction;

use crate::task::{TaskArena, TaskDecl, TaskId};

/// The task dependency graph
#[derive(Debug, Clone)]
pub struct TaskGraph {
    arena: TaskArena,
    graph: DiGraph<TaskId, ()>,
}

fn node(id: TaskId) -> NodeIndex {
    NodeIndex::new(id.index())
}

impl TaskGraph {
    /// Build the graph from every task in the arena, exported or not
    pub fn new(arena: TaskArena) -> Self {
        let mut graph = DiGraph::with_capacity(arena.len(), 0);

        for id in arena.ids() {
            graph.add_node(id);
        }

        for id in arena.ids() {
            // petgraph walks neighbors newest-first; insert in reverse so
            // traversals follow declaration order.
            for &dep in arena.dependencies_of(id).iter().rev() {
                graph.add_edge(node(id), node(dep), ());
            }
        }

        Self { arena, graph }
    }

    /// Depth-first search from `roots`, returning the task whose in-progress
    /// marker is hit again, if any
    pub fn find_cycle(&self, roots: impl IntoIterator<Item = TaskId>) -> Option<TaskId> {
        let starts: Vec<NodeIndex> = roots.into_iter().map(node).collect();

        let control = depth_first_search(&self.graph, starts, |event| match event {
            DfsEvent::BackEdge(_, target) => Control::Break(target),
            _ => Control::Continue,
        });

        match control {
            Control::Break(target) => Some(self.graph[target]),
            _ => None,
        }
    }

    /// All tasks reachable from `selected`, in first-discovery order
    ///
    /// Pre-order over `selected` in argument order, then each task's own
    /// dependency order.
    pub fn closure(&self, selected: &[TaskId]) -> Vec<TaskId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<TaskId> = selected.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.dependencies(id).iter().rev());
        }

        order
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskDecl> {
        self.arena.get(id)
    }

    pub fn name(&self, id: TaskId) -> &str {
        self.get(id).map(|task| task.name.as_str()).unwrap_or("<unknown>")
    }

    /// Direct dependencies of a task
    pub fn dependencies(&self, id: TaskId) -> &[TaskId] {
        self.arena.dependencies_of(id)
    }

    /// Tasks that directly depend on the given task
    pub fn dependents(&self, id: TaskId) -> Vec<TaskId> {
        if id.index() >= self.graph.node_count() {
            return Vec::new();
        }

        let mut dependents: Vec<TaskId> = self
            .graph
            .neighbors_directed(node(id), Direction::Incoming)
            .map(|idx| self.graph[idx])
            .collect();
        dependents.sort();
        dependents.dedup();
        dependents
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOptions;

    fn diamond() -> (TaskArena, [TaskId; 4]) {
        let mut arena = TaskArena::new();
        let a = arena.define(TaskOptions::new("a")).unwrap();
        let b = arena.define(TaskOptions::new("b").depends_on([a])).unwrap();
        let c = arena.define(TaskOptions::new("c").depends_on([a])).unwrap();
        let d = arena.define(TaskOptions::new("d").depends_on([b, c])).unwrap();
        (arena, [a, b, c, d])
    }

    #[test]
    fn test_closure_order() {
        let (arena, [a, b, c, d]) = diamond();
        let graph = TaskGraph::new(arena);

        assert_eq!(graph.closure(&[d]), vec![d, b, a, c]);
        assert_eq!(graph.closure(&[c, b]), vec![c, a, b]);
        assert_eq!(graph.closure(&[a]), vec![a]);
    }

    #[test]
    fn test_dependents() {
        let (arena, [a, b, c, d]) = diamond();
        let graph = TaskGraph::new(arena);

        assert_eq!(graph.dependents(a), vec![b, c]);
        assert_eq!(graph.dependents(b), vec![d]);
        assert!(graph.dependents(d).is_empty());
    }

    #[test]
    fn test_acyclic() {
        let (arena, ids) = diamond();
        let graph = TaskGraph::new(arena);

        assert_eq!(graph.find_cycle(ids), None);
    }

    #[test]
    fn test_cycle_added_after_construction() {
        let mut arena = TaskArena::new();
        let b = arena.define(TaskOptions::new("b")).unwrap();
        let a = arena.define(TaskOptions::new("a").depends_on([b])).unwrap();
        let b_deps = arena.get(b).unwrap().dependencies;
        arena.push_dependency(b_deps, a).unwrap();

        let graph = TaskGraph::new(arena);

        assert_eq!(graph.find_cycle([a, b]), Some(a));
        assert_eq!(graph.find_cycle([b, a]), Some(b));
    }

    #[test]
    fn test_self_dependency() {
        let mut arena = TaskArena::new();
        let a = arena.define(TaskOptions::new("a")).unwrap();
        let list = arena.get(a).unwrap().dependencies;
        arena.push_dependency(list, a).unwrap();

        let graph = TaskGraph::new(arena);
        assert_eq!(graph.find_cycle([a]), Some(a));
    }
}
