//! Dependency graph built from an accepted plan.
//!
//! `PlanGraph` wraps a petgraph directed graph over task ids. It is
//! constructed once per plan and rejects unknown dependency references
//! and cycles at construction, so everything downstream (validator,
//! scheduler) can assume a well-formed DAG.

use crate::core::plan::Plan;
use crate::core::task::TaskId;
use petgraph::algo::{is_cyclic_directed, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Structural problems found while building a `PlanGraph`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two tasks in the plan share the same id.
    DuplicateId { task: TaskId },
    /// A `depends_on` entry names a task id not present in the plan.
    UnknownDependency { task: TaskId, dependency: TaskId },
    /// The dependency graph contains at least one cycle.
    Cycle { involved: Vec<TaskId> },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::DuplicateId { task } => {
                write!(f, "task id '{}' is used more than once", task)
            }
            GraphError::UnknownDependency { task, dependency } => {
                write!(f, "task '{}' depends on unknown task '{}'", task, dependency)
            }
            GraphError::Cycle { involved } => {
                let ids: Vec<&str> = involved.iter().map(|id| id.as_str()).collect();
                write!(f, "dependency cycle involving tasks [{}]", ids.join(", "))
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Directed acyclic graph of task dependencies.
///
/// Edges point from a dependency to its dependent, so a topological
/// order lists prerequisites first.
#[derive(Debug, Clone)]
pub struct PlanGraph {
    graph: DiGraph<TaskId, ()>,
    node_index: HashMap<TaskId, NodeIndex>,
}

impl PlanGraph {
    /// Build the graph from a plan, rejecting duplicate ids, unknown
    /// ids, and cycles.
    pub fn from_plan(plan: &Plan) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut node_index = HashMap::new();

        for task in &plan.tasks {
            if node_index.contains_key(&task.id) {
                return Err(GraphError::DuplicateId {
                    task: task.id.clone(),
                });
            }
            let idx = graph.add_node(task.id.clone());
            node_index.insert(task.id.clone(), idx);
        }

        for task in &plan.tasks {
            let to = node_index[&task.id];
            for dep in &task.depends_on {
                let from = *node_index.get(dep).ok_or_else(|| GraphError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                })?;
                graph.add_edge(from, to, ());
            }
        }

        if is_cyclic_directed(&graph) {
            // A self-dependency forms an SCC of length one, so check
            // for self-edges as well as multi-node components.
            let involved = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| {
                    scc.len() > 1 || scc.iter().any(|&idx| graph.contains_edge(idx, idx))
                })
                .map(|scc| scc.iter().map(|&idx| graph[idx].clone()).collect())
                .unwrap_or_default();
            return Err(GraphError::Cycle { involved });
        }

        Ok(Self { graph, node_index })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of `id` (prerequisites).
    pub fn dependencies(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of `id` (tasks that wait on it).
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, dir: Direction) -> Vec<TaskId> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<TaskId> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids
    }

    /// Tasks whose every dependency appears in `terminal`.
    ///
    /// Callers filter out tasks that are already dispatched or
    /// terminal themselves; this only answers the dependency question.
    pub fn ready_tasks(&self, terminal: &HashSet<TaskId>) -> Vec<TaskId> {
        let mut ready: Vec<TaskId> = self
            .graph
            .node_indices()
            .filter(|&idx| !terminal.contains(&self.graph[idx]))
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .all(|dep| terminal.contains(&self.graph[dep]))
            })
            .map(|idx| self.graph[idx].clone())
            .collect();
        ready.sort();
        ready
    }

    /// All transitive dependents of `id`, in no particular order.
    pub fn transitive_dependents(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(&start) = self.node_index.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        let mut ids: Vec<TaskId> = seen.into_iter().map(|idx| self.graph[idx].clone()).collect();
        ids.sort();
        ids
    }

    /// Full topological order, prerequisites first.
    pub fn topological_order(&self) -> Vec<TaskId> {
        // Construction guarantees acyclicity, so toposort cannot fail.
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|idx| self.graph[idx].clone()).collect())
            .unwrap_or_default()
    }
}
