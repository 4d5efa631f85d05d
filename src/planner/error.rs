use thiserror::Error;

use super::task::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("empty task list")]
    EmptyTaskList,

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(TaskId),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("circular dependency: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<TaskId> },
}

fn format_cycle(cycle: &[TaskId]) -> String {
    cycle
        .iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
