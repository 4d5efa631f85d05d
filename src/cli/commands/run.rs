use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use super::{load_definition, Command};
use crate::config::ConductorConfig;
use crate::orchestrator::{
    CancelSignal, Orchestrator, RunReport, RunnerSettings, TaskExecutor, WorkflowRunner,
    WorkflowState,
};
use crate::planner::{Task, TaskId};
use crate::retry::TaskFailure;

/// Stands in for real work: sleeps for a scaled share of each task's
/// estimated duration and fails the tasks it was told to.
pub struct SimulatedExecutor {
    failing: HashSet<TaskId>,
    time_scale: f64,
}

impl SimulatedExecutor {
    pub fn new(failing: impl IntoIterator<Item = TaskId>, time_scale: f64) -> Self {
        Self {
            failing: failing.into_iter().collect(),
            time_scale: time_scale.max(0.0),
        }
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task, mut cancel: CancelSignal) -> Result<(), TaskFailure> {
        let millis = (task.estimated_duration_ms as f64 * self.time_scale).round() as u64;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => {}
            _ = cancel.cancelled() => return Err(TaskFailure::permanent("cancelled")),
        }

        if self.failing.contains(&task.id) {
            Err(TaskFailure::retryable(format!("simulated failure of {}", task.id)))
        } else {
            Ok(())
        }
    }
}

pub struct RunCommand {
    pub definition: PathBuf,
    pub fail: Vec<String>,
    pub time_scale: f64,
    pub config: ConductorConfig,
}

impl RunCommand {
    pub fn new(definition: PathBuf, config: ConductorConfig) -> Self {
        Self {
            definition,
            fail: Vec::new(),
            time_scale: 0.01,
            config,
        }
    }

    pub fn with_failing(mut self, fail: Vec<String>) -> Self {
        self.fail = fail;
        self
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }
}

impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let definition = load_definition(&self.definition, &self.config.orchestrator)?;
        let workflow_id = definition.id.clone();

        let executor = SimulatedExecutor::new(
            self.fail.iter().map(|id| TaskId::from(id.as_str())),
            self.time_scale,
        );
        // Backoff is scaled with the simulated durations
        let mut retry = self.config.retry.clone();
        retry.base_delay_ms = scale(retry.base_delay_ms, self.time_scale);
        retry.max_delay_ms = scale(retry.max_delay_ms, self.time_scale);
        let settings = RunnerSettings::from_config(&self.config.orchestrator, retry);

        let runner = WorkflowRunner::new(Orchestrator::new(), executor, settings);

        println!("▶️  Running workflow {workflow_id}...");
        let report = runner
            .run(definition)
            .await
            .with_context(|| format!("cannot run workflow '{workflow_id}'"))?;
        print_report(&report);

        if report.status() == WorkflowState::Completed {
            Ok(())
        } else {
            anyhow::bail!("workflow '{workflow_id}' ended {}", report.status())
        }
    }
}

fn scale(ms: u64, factor: f64) -> u64 {
    (ms as f64 * factor.max(0.0)).round() as u64
}

fn print_report(report: &RunReport) {
    let icon = match report.status() {
        WorkflowState::Completed => "✅",
        WorkflowState::Cancelled => "⏹️ ",
        _ => "❌",
    };
    let metrics = &report.metrics;

    println!("{icon} Workflow {}", report.status());
    println!(
        "   📋 Tasks: {} total, {} completed, {} failed, {} pending",
        metrics.total_tasks, metrics.completed_tasks, metrics.failed_tasks, metrics.pending_tasks
    );
    println!("   📈 Success rate: {:.0}%", metrics.success_rate * 100.0);
    println!("   ⏱️  Duration: {}ms", metrics.actual_duration_ms);
    for execution in report.instance.task_executions().values() {
        if execution.attempts > 0 {
            println!(
                "   🔁 {}: {} failed attempt(s), last error: {}",
                execution.task_id,
                execution.attempts,
                execution.error.as_deref().unwrap_or("-")
            );
        }
    }
    if let Some(failure) = &report.failure {
        println!("   💥 {failure}");
    }
}
