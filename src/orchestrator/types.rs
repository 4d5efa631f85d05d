use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::planner::{Task, TaskId};
use crate::state_machine::TaggedEvent;

/// Workflow lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Pending => "pending",
            WorkflowState::Running => "running",
            WorkflowState::Paused => "paused",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
            WorkflowState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Events that drive the workflow lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "reason", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Start,
    Pause,
    Resume,
    Complete,
    Fail(String),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventTag {
    Start,
    Pause,
    Resume,
    Complete,
    Fail,
    Cancel,
}

impl TaggedEvent for WorkflowEvent {
    type Tag = WorkflowEventTag;

    fn tag(&self) -> WorkflowEventTag {
        match self {
            WorkflowEvent::Start => WorkflowEventTag::Start,
            WorkflowEvent::Pause => WorkflowEventTag::Pause,
            WorkflowEvent::Resume => WorkflowEventTag::Resume,
            WorkflowEvent::Complete => WorkflowEventTag::Complete,
            WorkflowEvent::Fail(_) => WorkflowEventTag::Fail,
            WorkflowEvent::Cancel => WorkflowEventTag::Cancel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Tracked state of one task within an instance. Created when the task
/// first becomes eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Failures recorded so far
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskExecution {
    pub fn pending(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_allow_parallel() -> bool {
    true
}

/// Immutable blueprint for workflow instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub tasks: Vec<Task>,
    /// Applies to tasks without their own `max_retries`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_allow_parallel")]
    pub allow_parallel: bool,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tasks,
            max_retries: default_max_retries(),
            timeout_ms: None,
            allow_parallel: default_allow_parallel(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn allow_parallel(mut self, allow_parallel: bool) -> Self {
        self.allow_parallel = allow_parallel;
        self
    }

    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == task_id)
    }

    /// Attempts allowed for `task`; never less than one.
    pub fn max_retries_for(&self, task: &Task) -> u32 {
        task.max_retries.unwrap_or(self.max_retries).max(1)
    }
}

/// Live progress, derived on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub success_rate: f64,
    pub estimated_time_remaining_ms: u64,
    pub actual_duration_ms: u64,
}
