use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Process-wide engine counters
#[derive(Debug, Default)]
pub struct EngineCounters {
    pub transitions_applied: AtomicU64,
    pub transitions_rejected: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_retried: AtomicU64,
    pub retry_attempts: AtomicU64,
    pub workflows_completed: AtomicU64,
    pub workflows_failed: AtomicU64,
    pub workflows_cancelled: AtomicU64,
}

impl EngineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition_applied(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition_rejected(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_retried(&self) {
        self.tasks_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workflow_completed(&self) {
        self.workflows_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workflow_failed(&self) {
        self.workflows_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workflow_cancelled(&self) {
        self.workflows_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            transitions_applied: self.transitions_applied.load(Ordering::Relaxed),
            transitions_rejected: self.transitions_rejected.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_retried: self.tasks_retried.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            workflows_completed: self.workflows_completed.load(Ordering::Relaxed),
            workflows_failed: self.workflows_failed.load(Ordering::Relaxed),
            workflows_cancelled: self.workflows_cancelled.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.snapshot();
        info!(
            transitions_applied = stats.transitions_applied,
            transitions_rejected = stats.transitions_rejected,
            tasks_completed = stats.tasks_completed,
            tasks_failed = stats.tasks_failed,
            tasks_retried = stats.tasks_retried,
            retry_attempts = stats.retry_attempts,
            workflows_completed = stats.workflows_completed,
            workflows_failed = stats.workflows_failed,
            workflows_cancelled = stats.workflows_cancelled,
            "Engine counters"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub transitions_applied: u64,
    pub transitions_rejected: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub retry_attempts: u64,
    pub workflows_completed: u64,
    pub workflows_failed: u64,
    pub workflows_cancelled: u64,
}

/// Global counters instance
static ENGINE_COUNTERS: std::sync::LazyLock<EngineCounters> =
    std::sync::LazyLock::new(EngineCounters::new);

pub fn engine_counters() -> &'static EngineCounters {
    &ENGINE_COUNTERS
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> u128 {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
        duration.as_millis()
    }
}
