// Workflow Orchestrator - binds a task plan to the workflow lifecycle
//
// The orchestrator owns logical task state only. Running the tasks is up to
// a caller or the async `runner`, which serializes every write to an
// instance through one lock.

pub mod clock;
pub mod engine;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod runner;
pub mod types;


pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::Orchestrator;
pub use error::WorkflowError;
pub use instance::{WorkflowInstance, WorkflowSnapshot};
pub use lifecycle::{lifecycle_transitions, workflow_machine, WorkflowMachine};
pub use runner::{CancelHandle, CancelSignal, RunReport, RunnerSettings, TaskExecutor, WorkflowRunner};
pub use types::{
    TaskExecution, TaskStatus, WorkflowDefinition, WorkflowEvent, WorkflowEventTag,
    WorkflowMetrics, WorkflowState,
};
