use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::error::WorkflowError;
use super::instance::WorkflowInstance;
use super::lifecycle::{workflow_machine, WorkflowMachine};
use super::types::{
    TaskExecution, TaskStatus, WorkflowDefinition, WorkflowEvent, WorkflowMetrics, WorkflowState,
};
use crate::observability::engine_counters;
use crate::planner::{TaskId, TaskPlanner};

/// Binds a task plan to the workflow lifecycle.
///
/// Every operation is `&WorkflowInstance -> Result<WorkflowInstance, _>`:
/// on error the caller still holds the untouched original.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator<C = SystemClock> {
    clock: C,
}

impl Orchestrator<SystemClock> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Plan the definition and build a `Pending` instance. Planning errors
    /// propagate and no instance is created.
    pub fn create_workflow_instance(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowInstance, WorkflowError> {
        let plan = TaskPlanner::new()
            .allow_parallel(definition.allow_parallel)
            .plan(&definition.tasks)?;

        let id = Uuid::new_v4().to_string();
        info!(
            workflow_id = %definition.id,
            instance_id = %id,
            tasks = plan.task_count(),
            levels = plan.parallel_groups.len(),
            "Workflow instance created"
        );

        Ok(WorkflowInstance {
            machine: workflow_machine(&id),
            id,
            definition: Arc::new(definition),
            plan: Arc::new(plan),
            current_level: 0,
            current_tasks: Vec::new(),
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            task_executions: BTreeMap::new(),
            created_at: self.clock.now(),
            started_at: None,
            completed_at: None,
            error: None,
        })
    }

    pub fn start_workflow(&self, instance: &WorkflowInstance) -> Result<WorkflowInstance, WorkflowError> {
        let machine = self.fire(instance, WorkflowEvent::Start)?;

        let mut next = instance.clone();
        next.machine = machine;
        next.started_at = Some(self.clock.now());
        next.current_level = 0;
        unlock_level(&mut next, 0);

        info!(
            workflow_id = %next.workflow_id(),
            instance_id = %next.id,
            current_tasks = ?next.current_tasks,
            "Workflow started"
        );
        Ok(next)
    }

    /// Mark an eligible `Pending` task `Running`.
    pub fn start_task(
        &self,
        instance: &WorkflowInstance,
        task_id: &TaskId,
    ) -> Result<WorkflowInstance, WorkflowError> {
        let execution = eligible_execution(instance, task_id)?;
        if execution.status != TaskStatus::Pending {
            return Err(WorkflowError::not_eligible(task_id, "already running"));
        }

        let mut next = instance.clone();
        if let Some(execution) = next.task_executions.get_mut(task_id) {
            execution.status = TaskStatus::Running;
            execution.started_at = Some(self.clock.now());
        }

        debug!(
            instance_id = %next.id,
            task_id = %task_id,
            attempt = execution.attempts + 1,
            "Task started"
        );
        Ok(next)
    }

    /// Record a task success. Once every task of the current level has
    /// completed, the next level is unlocked; after the last level the
    /// workflow completes.
    pub fn complete_task(
        &self,
        instance: &WorkflowInstance,
        task_id: &TaskId,
    ) -> Result<WorkflowInstance, WorkflowError> {
        eligible_execution(instance, task_id)?;

        let now = self.clock.now();
        let mut next = instance.clone();
        if let Some(execution) = next.task_executions.get_mut(task_id) {
            execution.status = TaskStatus::Completed;
            execution.completed_at = Some(now);
            if execution.started_at.is_none() {
                execution.started_at = Some(now);
            }
        }
        next.completed_tasks.push(task_id.clone());
        next.current_tasks.retain(|id| id != task_id);
        engine_counters().record_task_completed();

        info!(
            workflow_id = %next.workflow_id(),
            instance_id = %next.id,
            task_id = %task_id,
            completed = next.completed_tasks.len(),
            total = next.plan.task_count(),
            "Task completed"
        );

        if !next.current_tasks.is_empty() {
            return Ok(next);
        }

        let next_level = next.current_level + 1;
        if next_level < next.plan.parallel_groups.len() {
            next.current_level = next_level;
            unlock_level(&mut next, next_level);
            debug!(
                instance_id = %next.id,
                level = next_level,
                current_tasks = ?next.current_tasks,
                "Next level unlocked"
            );
            return Ok(next);
        }

        next.machine = self.fire(&next, WorkflowEvent::Complete)?;
        next.completed_at = Some(now);
        engine_counters().record_workflow_completed();
        info!(
            workflow_id = %next.workflow_id(),
            instance_id = %next.id,
            "Workflow completed"
        );
        Ok(next)
    }

    /// Record a task failure. While attempts remain the task goes back to
    /// `Pending`; the failure that uses up the last attempt fails the task
    /// and the workflow.
    pub fn fail_task(
        &self,
        instance: &WorkflowInstance,
        task_id: &TaskId,
        error: impl Into<String>,
    ) -> Result<WorkflowInstance, WorkflowError> {
        self.record_failure(instance, task_id, error.into(), false)
    }

    /// Fail a task and the workflow regardless of remaining attempts.
    /// Used for errors that no retry can fix.
    pub fn fail_task_permanently(
        &self,
        instance: &WorkflowInstance,
        task_id: &TaskId,
        error: impl Into<String>,
    ) -> Result<WorkflowInstance, WorkflowError> {
        self.record_failure(instance, task_id, error.into(), true)
    }

    pub fn pause_workflow(&self, instance: &WorkflowInstance) -> Result<WorkflowInstance, WorkflowError> {
        let mut next = instance.clone();
        next.machine = self.fire(instance, WorkflowEvent::Pause)?;
        info!(instance_id = %next.id, "Workflow paused");
        Ok(next)
    }

    pub fn resume_workflow(&self, instance: &WorkflowInstance) -> Result<WorkflowInstance, WorkflowError> {
        let mut next = instance.clone();
        next.machine = self.fire(instance, WorkflowEvent::Resume)?;
        info!(instance_id = %next.id, "Workflow resumed");
        Ok(next)
    }

    /// Cancellation only changes state; in-flight task work is the
    /// executor's to stop.
    pub fn cancel_workflow(&self, instance: &WorkflowInstance) -> Result<WorkflowInstance, WorkflowError> {
        let mut next = instance.clone();
        next.machine = self.fire(instance, WorkflowEvent::Cancel)?;
        next.completed_at = Some(self.clock.now());
        engine_counters().record_workflow_cancelled();
        info!(instance_id = %next.id, "Workflow cancelled");
        Ok(next)
    }

    /// Fail the workflow directly, e.g. on timeout.
    pub fn fail_workflow(
        &self,
        instance: &WorkflowInstance,
        reason: impl Into<String>,
    ) -> Result<WorkflowInstance, WorkflowError> {
        let reason = reason.into();
        let mut next = instance.clone();
        next.machine = self.fire(instance, WorkflowEvent::Fail(reason.clone()))?;
        next.completed_at = Some(self.clock.now());
        next.error = Some(reason);
        engine_counters().record_workflow_failed();
        warn!(
            instance_id = %next.id,
            reason = next.error.as_deref().unwrap_or_default(),
            "Workflow failed"
        );
        Ok(next)
    }

    pub fn is_timed_out(&self, instance: &WorkflowInstance) -> bool {
        instance.is_timed_out(self.clock.now())
    }

    /// `Err(Timeout)` once the deadline has passed.
    pub fn check_deadline(&self, instance: &WorkflowInstance) -> Result<(), WorkflowError> {
        match instance.elapsed_past_timeout(self.clock.now()) {
            Some((timeout_ms, elapsed_ms)) => Err(WorkflowError::Timeout {
                instance_id: instance.id.clone(),
                timeout_ms,
                elapsed_ms,
            }),
            None => Ok(()),
        }
    }

    pub fn get_workflow_metrics(&self, instance: &WorkflowInstance) -> WorkflowMetrics {
        let total_tasks = instance.plan.task_count();
        let count = |status: TaskStatus| {
            instance
                .task_executions
                .values()
                .filter(|e| e.status == status)
                .count()
        };
        let running_tasks = count(TaskStatus::Running);
        let completed_tasks = count(TaskStatus::Completed);
        let failed_tasks = count(TaskStatus::Failed);
        // Tasks without an execution yet count as pending
        let pending_tasks = total_tasks - running_tasks - completed_tasks - failed_tasks;

        let finished = completed_tasks + failed_tasks;
        let success_rate = if finished == 0 {
            0.0
        } else {
            completed_tasks as f64 / finished as f64
        };

        let estimated_time_remaining_ms = if instance.is_terminal() {
            0
        } else {
            instance
                .plan
                .critical_path
                .iter()
                .filter(|id| !instance.completed_tasks.contains(id))
                .filter_map(|id| instance.definition.task(id))
                .map(|task| task.estimated_duration_ms)
                .fold(0u64, u64::saturating_add)
        };

        let actual_duration_ms = instance.started_at.map_or(0, |started| {
            let end = instance.completed_at.unwrap_or_else(|| self.clock.now());
            u64::try_from((end - started).num_milliseconds()).unwrap_or(0)
        });

        WorkflowMetrics {
            total_tasks,
            pending_tasks,
            running_tasks,
            completed_tasks,
            failed_tasks,
            success_rate,
            estimated_time_remaining_ms,
            actual_duration_ms,
        }
    }

    fn record_failure(
        &self,
        instance: &WorkflowInstance,
        task_id: &TaskId,
        error: String,
        permanent: bool,
    ) -> Result<WorkflowInstance, WorkflowError> {
        let execution = eligible_execution(instance, task_id)?;
        let task = instance
            .task(task_id)
            .ok_or_else(|| WorkflowError::UnknownTask(task_id.clone()))?;
        let max_attempts = instance.definition.max_retries_for(task);
        let attempts = execution.attempts + 1;

        let mut next = instance.clone();

        if !permanent && attempts < max_attempts {
            if let Some(execution) = next.task_executions.get_mut(task_id) {
                execution.status = TaskStatus::Pending;
                execution.attempts = attempts;
                execution.started_at = None;
                execution.error = Some(error.clone());
            }
            engine_counters().record_task_retried();
            warn!(
                instance_id = %next.id,
                task_id = %task_id,
                attempt = attempts,
                max_attempts,
                error = %error,
                "Task failed, will retry"
            );
            return Ok(next);
        }

        let now = self.clock.now();
        if let Some(execution) = next.task_executions.get_mut(task_id) {
            execution.status = TaskStatus::Failed;
            execution.attempts = attempts;
            execution.completed_at = Some(now);
            execution.error = Some(error.clone());
        }
        next.current_tasks.retain(|id| id != task_id);
        next.failed_tasks.push(task_id.clone());
        next.machine = self.fire(&next, WorkflowEvent::Fail(error.clone()))?;
        next.completed_at = Some(now);
        next.error = Some(error);
        engine_counters().record_task_failed();
        engine_counters().record_workflow_failed();

        warn!(
            workflow_id = %next.workflow_id(),
            instance_id = %next.id,
            task_id = %task_id,
            attempts,
            max_attempts,
            permanent,
            "Task failed, workflow failed"
        );
        Ok(next)
    }

    fn fire(
        &self,
        instance: &WorkflowInstance,
        event: WorkflowEvent,
    ) -> Result<WorkflowMachine, WorkflowError> {
        instance
            .machine
            .transition_at(event, self.clock.now())
            .map_err(|err| {
                warn!(
                    instance_id = %instance.id,
                    state = %err.state(),
                    event = ?err.event(),
                    "Rejected workflow event"
                );
                WorkflowError::Transition {
                    instance_id: instance.id.clone(),
                    state: *err.state(),
                    event: *err.event(),
                }
            })
    }
}

/// Make the tasks of `level` current, creating their executions.
fn unlock_level(instance: &mut WorkflowInstance, level: usize) {
    let group: Vec<TaskId> = instance
        .plan
        .group(level)
        .map(<[TaskId]>::to_vec)
        .unwrap_or_default();
    for task_id in &group {
        instance
            .task_executions
            .entry(task_id.clone())
            .or_insert_with(|| TaskExecution::pending(task_id.clone()));
    }
    instance.current_tasks = group;
}

/// The execution of `task_id`, provided the workflow is running and the
/// task is current and unfinished.
fn eligible_execution<'a>(
    instance: &'a WorkflowInstance,
    task_id: &TaskId,
) -> Result<&'a TaskExecution, WorkflowError> {
    if instance.task(task_id).is_none() {
        return Err(WorkflowError::UnknownTask(task_id.clone()));
    }

    let status = instance.status();
    if status != WorkflowState::Running {
        return Err(WorkflowError::not_eligible(
            task_id,
            format!("workflow is {status}"),
        ));
    }

    if instance.completed_tasks.contains(task_id) {
        return Err(WorkflowError::not_eligible(task_id, "already completed"));
    }

    if !instance.current_tasks.contains(task_id) {
        return Err(WorkflowError::not_eligible(task_id, "not in the current group"));
    }

    instance
        .task_executions
        .get(task_id)
        .ok_or_else(|| WorkflowError::not_eligible(task_id, "no execution recorded"))
}
