use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::PlanningError;
use super::graph::DependencyGraph;
use super::task::{Task, TaskId};

/// Execution plan derived once from a task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub execution_order: Vec<TaskId>,
    pub parallel_groups: Vec<Vec<TaskId>>,
    pub critical_path: Vec<TaskId>,
    pub estimated_total_time_ms: u64,
}

impl TaskPlan {
    pub fn task_count(&self) -> usize {
        self.execution_order.len()
    }

    pub fn group(&self, level: usize) -> Option<&[TaskId]> {
        self.parallel_groups.get(level).map(Vec::as_slice)
    }

    pub fn level_of(&self, task_id: &TaskId) -> Option<usize> {
        self.parallel_groups
            .iter()
            .position(|group| group.contains(task_id))
    }

    pub fn is_on_critical_path(&self, task_id: &TaskId) -> bool {
        self.critical_path.contains(task_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPlanner {
    allow_parallel: bool,
}

impl Default for TaskPlanner {
    fn default() -> Self {
        Self {
            allow_parallel: true,
        }
    }
}

impl TaskPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// When false the time estimate is the plain sum of all durations.
    pub fn allow_parallel(mut self, allow_parallel: bool) -> Self {
        self.allow_parallel = allow_parallel;
        self
    }

    pub fn plan(&self, tasks: &[Task]) -> Result<TaskPlan, PlanningError> {
        let graph = DependencyGraph::build(tasks)?;

        if let Some(cycle) = graph.find_cycle() {
            debug!(cycle = ?cycle, "Rejecting plan with circular dependency");
            return Err(PlanningError::CircularDependency { cycle });
        }

        let order = graph.topological_order()?;
        let levels = assign_levels(&graph, &order);
        let parallel_groups = group_by_level(&graph, &levels);
        let critical_path = critical_path(&graph, &order);

        let estimated_total_time_ms = if self.allow_parallel {
            let mut slowest_per_level = vec![0u64; parallel_groups.len()];
            for (node, &level) in levels.iter().enumerate() {
                let duration = graph.task(node).estimated_duration_ms;
                slowest_per_level[level] = slowest_per_level[level].max(duration);
            }
            slowest_per_level
                .into_iter()
                .fold(0u64, u64::saturating_add)
        } else {
            tasks
                .iter()
                .map(|t| t.estimated_duration_ms)
                .fold(0u64, u64::saturating_add)
        };

        let plan = TaskPlan {
            execution_order: order.iter().map(|&i| graph.task(i).id.clone()).collect(),
            parallel_groups,
            critical_path,
            estimated_total_time_ms,
        };

        info!(
            tasks = plan.task_count(),
            levels = plan.parallel_groups.len(),
            critical_path_len = plan.critical_path.len(),
            estimated_total_time_ms = plan.estimated_total_time_ms,
            "Task plan computed"
        );

        Ok(plan)
    }
}

/// Plan with parallel execution allowed.
pub fn plan(tasks: &[Task]) -> Result<TaskPlan, PlanningError> {
    TaskPlanner::default().plan(tasks)
}

/// `level(t) = 0` without dependencies, else `1 + max(level(dep))`.
fn assign_levels(graph: &DependencyGraph<'_>, order: &[usize]) -> Vec<usize> {
    let mut levels = vec![0usize; graph.len()];
    for &node in order {
        levels[node] = graph
            .dependencies_of(node)
            .iter()
            .map(|&dep| levels[dep] + 1)
            .max()
            .unwrap_or(0);
    }
    levels
}

/// Groups are indexed by level; members keep input order.
fn group_by_level(graph: &DependencyGraph<'_>, levels: &[usize]) -> Vec<Vec<TaskId>> {
    let depth = levels.iter().copied().max().map_or(0, |max| max + 1);
    let mut groups = vec![Vec::new(); depth];
    for (node, &level) in levels.iter().enumerate() {
        groups[level].push(graph.task(node).id.clone());
    }
    groups
}

/// Longest-duration chain: `longest(t) = duration(t) + max(longest(dep))`,
/// reconstructed by walking predecessors back from the global maximum.
fn critical_path(graph: &DependencyGraph<'_>, order: &[usize]) -> Vec<TaskId> {
    let mut longest = vec![0u64; graph.len()];
    let mut predecessor: Vec<Option<usize>> = vec![None; graph.len()];

    for &node in order {
        let mut best: Option<(usize, u64)> = None;
        for &dep in graph.dependencies_of(node) {
            if best.map_or(true, |(_, value)| longest[dep] > value) {
                best = Some((dep, longest[dep]));
            }
        }
        predecessor[node] = best.map(|(dep, _)| dep);
        longest[node] = graph
            .task(node)
            .estimated_duration_ms
            .saturating_add(best.map_or(0, |(_, value)| value));
    }

    let mut end: Option<usize> = None;
    for &node in order {
        if end.map_or(true, |e| longest[node] > longest[e]) {
            end = Some(node);
        }
    }

    let mut path = Vec::new();
    let mut cursor = end;
    while let Some(node) = cursor {
        path.push(graph.task(node).id.clone());
        cursor = predecessor[node];
    }
    path.reverse();
    path
}
