// Async driver: dispatches eligible tasks to an executor and feeds the
// results back through the orchestrator, one write at a time.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::{Id as JobId, JoinSet};
use tracing::{debug, info, warn, Instrument};

use super::clock::{Clock, SystemClock};
use super::engine::Orchestrator;
use super::error::WorkflowError;
use super::instance::WorkflowInstance;
use super::types::{WorkflowDefinition, WorkflowMetrics, WorkflowState};
use crate::config::OrchestratorConfig;
use crate::planner::{Task, TaskId};
use crate::retry::{RetryConfig, Retryable, TaskFailure};
use crate::telemetry::{create_workflow_span, generate_correlation_id};

/// Performs the real work behind a task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run one attempt of `task`. Implementations should stop early once
    /// `cancel` fires; the runner never aborts them.
    async fn execute(&self, task: &Task, cancel: CancelSignal) -> Result<(), TaskFailure>;

    /// Last resort after the final failed attempt. `None` means no fallback.
    async fn fallback(&self, _task: &Task) -> Option<Result<(), TaskFailure>> {
        None
    }
}

/// Read side of a run's stop signal, handed to executors.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the run is cancelled or has finished.
    pub async fn cancelled(&mut self) {
        // A closed channel means the run is gone, which counts as stopped
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Requests cancellation of the workflow a runner is driving.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Outcome of a run: the terminal instance plus the failure that ended
/// it, if any.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub instance: WorkflowInstance,
    pub metrics: WorkflowMetrics,
    pub failure: Option<WorkflowError>,
}

impl RunReport {
    pub fn status(&self) -> WorkflowState {
        self.instance.status()
    }
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub retry: RetryConfig,
    pub max_concurrent_tasks: usize,
    pub timeout_check_interval: Duration,
    /// Used when a definition has no timeout of its own
    pub default_timeout_ms: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default(), RetryConfig::default())
    }
}

impl RunnerSettings {
    pub fn from_config(orchestrator: &OrchestratorConfig, retry: RetryConfig) -> Self {
        Self {
            retry,
            max_concurrent_tasks: orchestrator.max_concurrent_tasks,
            timeout_check_interval: Duration::from_millis(orchestrator.timeout_check_interval_ms),
            default_timeout_ms: orchestrator.default_timeout_ms,
        }
    }
}

struct JobResult {
    task_id: TaskId,
    failure: Option<WorkflowError>,
}

/// Drives workflow instances to a terminal state.
pub struct WorkflowRunner<X, C = SystemClock> {
    orchestrator: Orchestrator<C>,
    executor: Arc<X>,
    settings: RunnerSettings,
    cancel: Arc<watch::Sender<bool>>,
}

impl<X, C> WorkflowRunner<X, C>
where
    X: TaskExecutor + 'static,
    C: Clock + Clone + 'static,
{
    pub fn new(orchestrator: Orchestrator<C>, executor: X, settings: RunnerSettings) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            orchestrator,
            executor: Arc::new(executor),
            settings,
            cancel: Arc::new(cancel),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<C> {
        &self.orchestrator
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    /// Create, start and drive an instance of `definition`.
    pub async fn run(&self, mut definition: WorkflowDefinition) -> Result<RunReport, WorkflowError> {
        if definition.timeout_ms.is_none() {
            definition.timeout_ms = self.settings.default_timeout_ms;
        }

        let instance = self.orchestrator.create_workflow_instance(definition)?;
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span(instance.workflow_id(), instance.id(), Some(&correlation_id));
        self.drive(instance).instrument(span).await
    }

    /// Drive an already created instance. A `Pending` instance is started
    /// and a `Paused` one resumed.
    pub async fn drive(&self, instance: WorkflowInstance) -> Result<RunReport, WorkflowError> {
        let instance = match instance.status() {
            WorkflowState::Pending => self.orchestrator.start_workflow(&instance)?,
            WorkflowState::Paused => self.orchestrator.resume_workflow(&instance)?,
            _ => instance,
        };
        let check_interval = self
            .settings
            .timeout_check_interval
            .max(Duration::from_millis(1));

        let concurrency = if instance.definition().allow_parallel {
            self.settings.max_concurrent_tasks.max(1)
        } else {
            1
        };
        let shared = Arc::new(Mutex::new(instance));
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut user_cancel = self.cancel.subscribe();
        let mut jobs: JoinSet<JobResult> = JoinSet::new();
        let mut in_flight: HashSet<TaskId> = HashSet::new();
        let mut job_tasks: HashMap<JobId, TaskId> = HashMap::new();
        let mut failure: Option<WorkflowError> = None;

        loop {
            {
                let mut guard = shared.lock().await;
                if guard.is_terminal() {
                    break;
                }

                if *user_cancel.borrow_and_update() {
                    match self.orchestrator.cancel_workflow(&guard) {
                        Ok(next) => *guard = next,
                        Err(err) => warn!(error = %err, "Cancel rejected"),
                    }
                    break;
                }

                if let Err(timeout) = self.orchestrator.check_deadline(&guard) {
                    warn!(error = %timeout, "Workflow deadline exceeded");
                    match self.orchestrator.fail_workflow(&guard, "timeout") {
                        Ok(next) => *guard = next,
                        Err(err) => warn!(error = %err, "Timeout failure rejected"),
                    }
                    failure = Some(timeout);
                    break;
                }

                let ready: Vec<TaskId> = guard
                    .pending_tasks()
                    .filter(|id| !in_flight.contains(*id))
                    .cloned()
                    .collect();
                for task_id in ready {
                    let Some(task) = guard.task(&task_id).cloned() else {
                        continue;
                    };
                    let delay = guard.retry_delay(&task_id, &self.settings.retry);
                    let max_attempts = guard.definition().max_retries_for(&task);
                    in_flight.insert(task_id.clone());
                    let handle = jobs.spawn(run_task(
                        self.orchestrator.clone(),
                        Arc::clone(&self.executor),
                        Arc::clone(&shared),
                        Arc::clone(&semaphore),
                        CancelSignal { rx: stop_rx.clone() },
                        task,
                        delay,
                        max_attempts,
                    ));
                    job_tasks.insert(handle.id(), task_id);
                }
            }

            tokio::select! {
                Some(joined) = jobs.join_next_with_id() => {
                    match joined {
                        Ok((job_id, result)) => {
                            job_tasks.remove(&job_id);
                            in_flight.remove(&result.task_id);
                            if let Some(err) = result.failure {
                                failure = Some(err);
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "Task job panicked");
                            if let Some(task_id) = job_tasks.remove(&err.id()) {
                                in_flight.remove(&task_id);
                                if let Some(err) = self.fail_crashed_task(&shared, task_id).await {
                                    failure = Some(err);
                                }
                            }
                        }
                    }
                }
                _ = user_cancel.changed() => {}
                _ = tokio::time::sleep(check_interval) => {}
            }
        }

        // Signal in-flight work to stop; it is left to finish on its own.
        stop_tx.send_replace(true);
        jobs.detach_all();

        let instance = shared.lock().await.clone();
        let metrics = self.orchestrator.get_workflow_metrics(&instance);
        info!(
            instance_id = %instance.id(),
            status = %instance.status(),
            completed = metrics.completed_tasks,
            failed = metrics.failed_tasks,
            duration_ms = metrics.actual_duration_ms,
            "Workflow run finished"
        );

        Ok(RunReport {
            instance,
            metrics,
            failure,
        })
    }

    /// A job that died without reporting leaves its task `Running`; fail it
    /// for good so the run can finish.
    async fn fail_crashed_task(
        &self,
        shared: &Mutex<WorkflowInstance>,
        task_id: TaskId,
    ) -> Option<WorkflowError> {
        const CRASHED: &str = "executor panicked";

        let mut guard = shared.lock().await;
        if guard.is_terminal() {
            return None;
        }
        match self
            .orchestrator
            .fail_task_permanently(&guard, &task_id, CRASHED)
        {
            Ok(next) => {
                *guard = next;
                Some(WorkflowError::TaskFailed {
                    task_id,
                    error: CRASHED.to_string(),
                })
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "Crashed task could not be failed");
                None
            }
        }
    }
}

/// One dispatch of one task: wait out any retry backoff, run it, then
/// apply the result under the instance lock.
#[allow(clippy::too_many_arguments)]
async fn run_task<X, C>(
    orchestrator: Orchestrator<C>,
    executor: Arc<X>,
    shared: Arc<Mutex<WorkflowInstance>>,
    semaphore: Arc<Semaphore>,
    cancel: CancelSignal,
    task: Task,
    delay: Duration,
    max_attempts: u32,
) -> JobResult
where
    X: TaskExecutor + 'static,
    C: Clock + Clone + 'static,
{
    let task_id = task.id.clone();
    let done = |failure| JobResult {
        task_id: task_id.clone(),
        failure,
    };

    if !delay.is_zero() {
        debug!(task_id = %task_id, delay_ms = delay.as_millis() as u64, "Waiting before retry");
        tokio::time::sleep(delay).await;
    }

    let Ok(_permit) = semaphore.acquire_owned().await else {
        return done(None);
    };
    if cancel.is_cancelled() {
        return done(None);
    }

    let attempts_before = {
        let mut guard = shared.lock().await;
        match orchestrator.start_task(&guard, &task_id) {
            Ok(next) => *guard = next,
            Err(err) => {
                debug!(task_id = %task_id, error = %err, "Task not started");
                return done(None);
            }
        }
        guard.execution(&task_id).map_or(0, |e| e.attempts)
    };

    let result = executor.execute(&task, cancel.clone()).await;

    // (error, final) where a final error fails the workflow
    let outcome: Result<(), (TaskFailure, bool)> = match result {
        Ok(()) => Ok(()),
        Err(failure) => {
            let last_attempt = attempts_before + 1 >= max_attempts;
            if failure.is_retryable() && !last_attempt {
                Err((failure, false))
            } else {
                match executor.fallback(&task).await {
                    Some(Ok(())) => {
                        info!(task_id = %task_id, error = %failure, "Task recovered by fallback");
                        Ok(())
                    }
                    Some(Err(fallback_failure)) => Err((fallback_failure, true)),
                    None => Err((failure, true)),
                }
            }
        }
    };

    let mut guard = shared.lock().await;
    if guard.is_terminal() {
        return done(None);
    }

    let applied = match &outcome {
        Ok(()) => orchestrator.complete_task(&guard, &task_id),
        Err((failure, false)) => orchestrator.fail_task(&guard, &task_id, failure.message.clone()),
        Err((failure, true)) => {
            orchestrator.fail_task_permanently(&guard, &task_id, failure.message.clone())
        }
    };

    match applied {
        Ok(next) => {
            *guard = next;
        }
        Err(err) => {
            warn!(task_id = %task_id, error = %err, "Task result rejected");
            return done(None);
        }
    }

    let failure = match outcome {
        Err((failure, true)) if failure.is_retryable() => Some(WorkflowError::RetryExhausted {
            task_id: task_id.clone(),
            attempts: attempts_before + 1,
        }),
        Err((failure, true)) => Some(WorkflowError::TaskFailed {
            task_id: task_id.clone(),
            error: failure.message,
        }),
        _ => None,
    };
    done(failure)
}
