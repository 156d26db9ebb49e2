//! Dependency graph of tasks.
//!
//! The graph defines which tasks may run when: a task becomes ready once
//! every task it depends on has reached a terminal state. Tasks live in a
//! flat arena indexed by insertion order; dependencies are resolved to
//! arena indices, which keeps cycle detection and topological sorting free
//! of pointer chasing and makes tie-breaking deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::Task;
use super::types::TaskId;

/// Default bound on subtask nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Errors that can occur when building or validating a task graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Attempted to add a task whose id is already present.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// A dependency references a task that doesn't exist.
    #[error("missing dependency: task '{from}' depends on non-existent task '{to}'")]
    MissingDependency { from: TaskId, to: TaskId },

    /// The dependency relation contains a cycle.
    #[error("cycle detected: {path}")]
    Cycle { path: String },

    /// A task's subtask nesting exceeds the configured maximum.
    #[error("task '{task}' nests subtasks {depth} deep, maximum is {max}")]
    DepthExceeded {
        task: TaskId,
        depth: usize,
        max: usize,
    },
}

/// A group of mutually independent tasks that become ready together.
///
/// Level 0 holds tasks with no dependencies; a task at level n has at least
/// one dependency at level n - 1 and none at or above n. Tasks sharing a
/// level have no edges between them and may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyLevel {
    /// Distance from the roots of the graph.
    pub depth: usize,
    /// Ids of the tasks in this level, in insertion order.
    pub tasks: Vec<TaskId>,
}

/// A validated collection of tasks and their dependency edges.
#[derive(Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    max_depth: usize,
}

impl TaskGraph {
    /// Create an empty graph with the default subtask depth bound.
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create an empty graph with a custom subtask depth bound.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            max_depth,
        }
    }

    /// Check if the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Get the number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// The configured subtask depth bound.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Add a task to the graph.
    pub fn add_task(&mut self, task: Task) -> Result<(), GraphError> {
        if self.index.contains_key(task.id()) {
            return Err(GraphError::DuplicateTask(task.id().clone()));
        }
        self.index.insert(task.id().clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Get a task by arena index.
    pub fn task(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    /// Get the arena index for a task id.
    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Get a task by id.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.index_of(id).map(|i| &self.tasks[i])
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// All task ids in insertion order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id().clone()).collect()
    }

    /// Validate the graph structure.
    ///
    /// Checks, in order: every dependency id resolves to a task, no task
    /// nests subtasks beyond the depth bound, and the dependency relation
    /// is acyclic. A cycle error names the offending cycle, e.g.
    /// `"a → b → c → a"`.
    pub fn validate(&self) -> Result<(), GraphError> {
        let deps = self.resolved_dependencies()?;

        for task in &self.tasks {
            let depth = task.nesting_depth();
            if depth > self.max_depth {
                return Err(GraphError::DepthExceeded {
                    task: task.id().clone(),
                    depth,
                    max: self.max_depth,
                });
            }
        }

        self.kahn_order(&deps).map(|_| ())
    }

    /// Tasks in topological order: every dependency before its dependents.
    ///
    /// Kahn's algorithm over arena indices, O(V + E) up to tie-breaking.
    /// Ties among equally-ready tasks are broken by insertion order, so the
    /// result is deterministic for a given construction sequence.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let deps = self.resolved_dependencies()?;
        let order = self.kahn_order(&deps)?;
        Ok(order.into_iter().map(|i| self.tasks[i].id().clone()).collect())
    }

    /// Group tasks into dependency levels.
    ///
    /// level(t) = 0 when t has no dependencies, otherwise
    /// 1 + max(level(d)) over its dependencies.
    pub fn dependency_levels(&self) -> Result<Vec<DependencyLevel>, GraphError> {
        let deps = self.resolved_dependencies()?;
        let order = self.kahn_order(&deps)?;
        let groups = level_groups(&deps, &order);

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(depth, indices)| DependencyLevel {
                depth,
                tasks: indices
                    .into_iter()
                    .map(|i| self.tasks[i].id().clone())
                    .collect(),
            })
            .collect())
    }

    /// Resolve every task's dependency ids to arena indices.
    pub(crate) fn resolved_dependencies(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        let mut deps = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let mut row = Vec::with_capacity(task.depends_on().len());
            for dep in task.depends_on() {
                match self.index.get(dep) {
                    Some(&i) => row.push(i),
                    None => {
                        return Err(GraphError::MissingDependency {
                            from: task.id().clone(),
                            to: dep.clone(),
                        });
                    }
                }
            }
            // A dependency declared twice is still one edge.
            row.sort_unstable();
            row.dedup();
            deps.push(row);
        }
        Ok(deps)
    }

    /// Kahn's algorithm with a min-index heap for insertion-order ties.
    pub(crate) fn kahn_order(&self, deps: &[Vec<usize>]) -> Result<Vec<usize>, GraphError> {
        let n = deps.len();
        let mut in_degree: Vec<usize> = deps.iter().map(|d| d.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (task, row) in deps.iter().enumerate() {
            for &dep in row {
                dependents[dep].push(task);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != n {
            return Err(GraphError::Cycle {
                path: self.cycle_path(deps, &in_degree),
            });
        }

        Ok(order)
    }

    /// Reconstruct one cycle from the nodes Kahn's algorithm could not
    /// order, formatted in execution direction ("a → b" means b depends
    /// on a).
    fn cycle_path(&self, deps: &[Vec<usize>], in_degree: &[usize]) -> String {
        let remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
        // Every remaining node keeps at least one remaining dependency, so
        // walking dependency edges must revisit a node.
        let start = remaining
            .iter()
            .position(|&r| r)
            .unwrap_or(0);

        let mut path = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = start;
        let cycle_start = loop {
            if let Some(&seen_at) = position.get(&current) {
                break seen_at;
            }
            position.insert(current, path.len());
            path.push(current);
            current = match deps[current].iter().find(|&&d| remaining[d]) {
                Some(&next) => next,
                None => break path.len().saturating_sub(1),
            };
        };

        // The walk followed depends-on edges; reverse into execution order
        // and rotate so the lowest-index task leads, for determinism.
        let mut cycle: Vec<usize> = path[cycle_start..].to_vec();
        cycle.reverse();
        if let Some(min_pos) = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, &i)| i)
            .map(|(pos, _)| pos)
        {
            cycle.rotate_left(min_pos);
        }

        let mut names: Vec<&str> = cycle.iter().map(|&i| self.tasks[i].id().as_str()).collect();
        if let Some(&first) = names.first() {
            names.push(first);
        }
        names.join(" → ")
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Group a topological order into dependency levels of arena indices.
///
/// Within a level, indices stay in insertion order.
pub(crate) fn level_groups(deps: &[Vec<usize>], topo: &[usize]) -> Vec<Vec<usize>> {
    let mut level = vec![0usize; deps.len()];
    let mut max_level = 0;
    for &i in topo {
        level[i] = deps[i].iter().map(|&d| level[d] + 1).max().unwrap_or(0);
        max_level = max_level.max(level[i]);
    }

    let mut groups = vec![Vec::new(); if deps.is_empty() { 0 } else { max_level + 1 }];
    for (i, &l) in level.iter().enumerate() {
        groups[l].push(i);
    }
    groups
}
