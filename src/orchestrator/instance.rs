use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::lifecycle::WorkflowMachine;
use super::types::{TaskExecution, TaskStatus, WorkflowDefinition, WorkflowEvent, WorkflowState};
use crate::planner::{Task, TaskId, TaskPlan};
use crate::retry::RetryConfig;
use crate::state_machine::HistoryEntry;

/// One execution of a workflow definition.
///
/// Instances are values: orchestrator operations take `&WorkflowInstance`
/// and hand back a new one, so callers serialize writes by replacing the
/// instance they hold. The lifecycle status is always read from the
/// embedded state machine.
#[derive(Debug, Clone)]
pub struct WorkflowInstance {
    pub(super) id: String,
    pub(super) definition: Arc<WorkflowDefinition>,
    pub(super) plan: Arc<TaskPlan>,
    /// Index into `plan.parallel_groups` of the level being worked on
    pub(super) current_level: usize,
    pub(super) current_tasks: Vec<TaskId>,
    pub(super) completed_tasks: Vec<TaskId>,
    pub(super) failed_tasks: Vec<TaskId>,
    pub(super) task_executions: BTreeMap<TaskId, TaskExecution>,
    pub(super) machine: WorkflowMachine,
    pub(super) created_at: DateTime<Utc>,
    pub(super) started_at: Option<DateTime<Utc>>,
    pub(super) completed_at: Option<DateTime<Utc>>,
    pub(super) error: Option<String>,
}

impl WorkflowInstance {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workflow_id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn plan(&self) -> &TaskPlan {
        &self.plan
    }

    pub fn status(&self) -> WorkflowState {
        *self.machine.current_state()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Eligible tasks of the current level that have not completed yet.
    pub fn current_tasks(&self) -> &[TaskId] {
        &self.current_tasks
    }

    pub fn completed_tasks(&self) -> &[TaskId] {
        &self.completed_tasks
    }

    pub fn failed_tasks(&self) -> &[TaskId] {
        &self.failed_tasks
    }

    pub fn task_executions(&self) -> &BTreeMap<TaskId, TaskExecution> {
        &self.task_executions
    }

    pub fn execution(&self, task_id: &TaskId) -> Option<&TaskExecution> {
        self.task_executions.get(task_id)
    }

    pub fn state_machine(&self) -> &WorkflowMachine {
        &self.machine
    }

    pub fn history(&self) -> &[HistoryEntry<WorkflowState, WorkflowEvent>] {
        self.machine.history()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.definition.task(task_id)
    }

    /// Current tasks waiting to be dispatched.
    pub fn pending_tasks(&self) -> impl Iterator<Item = &TaskId> + '_ {
        self.current_tasks.iter().filter(|id| {
            self.task_executions
                .get(*id)
                .is_some_and(|e| e.status == TaskStatus::Pending)
        })
    }

    /// Backoff before re-dispatching a task that was reset to `Pending`
    /// after a failure. Zero for a task that has not failed.
    pub fn retry_delay(&self, task_id: &TaskId, retry: &RetryConfig) -> Duration {
        match self.task_executions.get(task_id) {
            Some(execution) if execution.attempts > 0 => {
                retry.delay_for_attempt(execution.attempts)
            }
            _ => Duration::ZERO,
        }
    }

    /// Whether the definition's timeout has elapsed at `now`. Instances
    /// without a timeout, not yet started, or already terminal never time
    /// out.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_past_timeout(now).is_some()
    }

    /// `(timeout_ms, elapsed_ms)` when the deadline has passed.
    pub(super) fn elapsed_past_timeout(&self, now: DateTime<Utc>) -> Option<(u64, u64)> {
        let timeout_ms = self.definition.timeout_ms?;
        let started_at = self.started_at?;
        if self.is_terminal() {
            return None;
        }
        let elapsed_ms = u64::try_from((now - started_at).num_milliseconds()).unwrap_or(0);
        (elapsed_ms >= timeout_ms).then_some((timeout_ms, elapsed_ms))
    }

    /// Serializable copy of everything but the transition table.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: self.id.clone(),
            workflow_id: self.definition.id.clone(),
            definition: (*self.definition).clone(),
            plan: (*self.plan).clone(),
            status: self.status(),
            current_tasks: self.current_tasks.clone(),
            completed_tasks: self.completed_tasks.clone(),
            failed_tasks: self.failed_tasks.clone(),
            task_executions: self.task_executions.clone(),
            history: self.machine.history().to_vec(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
        }
    }
}

/// Point-in-time view of an instance for external checkpointing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub id: String,
    pub workflow_id: String,
    pub definition: WorkflowDefinition,
    pub plan: TaskPlan,
    pub status: WorkflowState,
    pub current_tasks: Vec<TaskId>,
    pub completed_tasks: Vec<TaskId>,
    pub failed_tasks: Vec<TaskId>,
    pub task_executions: BTreeMap<TaskId, TaskExecution>,
    pub history: Vec<HistoryEntry<WorkflowState, WorkflowEvent>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
