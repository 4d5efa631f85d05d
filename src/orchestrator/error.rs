use thiserror::Error;

use super::types::{WorkflowEventTag, WorkflowState};
use crate::planner::{PlanningError, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("workflow {instance_id}: no valid transition from {state} on {event:?}")]
    Transition {
        instance_id: String,
        state: WorkflowState,
        event: WorkflowEventTag,
    },

    #[error("task {task_id} is not eligible: {reason}")]
    TaskNotEligible { task_id: TaskId, reason: String },

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("workflow {instance_id} timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout {
        instance_id: String,
        timeout_ms: u64,
        elapsed_ms: u64,
    },

    #[error("task {task_id} failed after {attempts} attempts")]
    RetryExhausted { task_id: TaskId, attempts: u32 },

    #[error("task {task_id} failed permanently: {error}")]
    TaskFailed { task_id: TaskId, error: String },
}

impl WorkflowError {
    pub fn not_eligible(task_id: &TaskId, reason: impl Into<String>) -> Self {
        WorkflowError::TaskNotEligible {
            task_id: task_id.clone(),
            reason: reason.into(),
        }
    }
}
