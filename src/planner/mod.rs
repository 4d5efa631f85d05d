// Task Planner - pure DAG analysis from a task list to an execution plan
//
// Cycle check (three-color DFS), Kahn topological order with input-order
// tie breaking, level grouping, critical path and a time estimate.

pub mod error;
pub mod graph;
pub mod plan;
pub mod task;


pub use error::PlanningError;
pub use graph::DependencyGraph;
pub use plan::{plan, TaskPlan, TaskPlanner};
pub use task::{Task, TaskId};
