// Conductor Library - workflow orchestration core
// State machine, rule engine, retry executor, task planner and the
// orchestrator that binds them, plus the async runner used by the binary.

pub mod cli;
pub mod config;
pub mod observability;
pub mod orchestrator;
pub mod planner;
pub mod retry;
pub mod rules;
pub mod state_machine;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, ConductorConfig};
pub use observability::{engine_counters, EngineCounters, OperationTimer};
pub use orchestrator::{
    Clock, ManualClock, Orchestrator, RunReport, SystemClock, TaskExecutor, WorkflowDefinition,
    WorkflowError, WorkflowEvent, WorkflowInstance, WorkflowMetrics, WorkflowRunner,
    WorkflowState,
};
pub use planner::{plan, PlanningError, Task, TaskId, TaskPlan, TaskPlanner};
pub use retry::{
    execute_with_retry, execute_with_retry_and_fallback, RetryConfig, RetryError, RetryStrategy,
    TaskFailure,
};
pub use rules::{evaluate_rules, Rule, RuleEffect, RuleSet};
pub use state_machine::{StateMachine, TaggedEvent, Transition, TransitionError};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
