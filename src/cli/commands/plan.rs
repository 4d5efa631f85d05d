use anyhow::{Context, Result};
use std::path::PathBuf;

use super::{load_definition, Command};
use crate::config::OrchestratorConfig;
use crate::observability::OperationTimer;
use crate::planner::{TaskPlan, TaskPlanner};

pub struct PlanCommand {
    pub definition: PathBuf,
    pub sequential: bool,
    pub json: bool,
    pub defaults: OrchestratorConfig,
}

impl PlanCommand {
    pub fn new(definition: PathBuf, defaults: OrchestratorConfig) -> Self {
        Self {
            definition,
            sequential: false,
            json: false,
            defaults,
        }
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for PlanCommand {
    async fn execute(&self) -> Result<()> {
        let definition = load_definition(&self.definition, &self.defaults)?;
        let allow_parallel = definition.allow_parallel && !self.sequential;

        let timer = OperationTimer::new("plan");
        let plan = TaskPlanner::new()
            .allow_parallel(allow_parallel)
            .plan(&definition.tasks)
            .with_context(|| format!("cannot plan workflow '{}'", definition.id))?;
        timer.finish();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&definition.name, &plan, allow_parallel);
        }
        Ok(())
    }
}

fn print_plan(name: &str, plan: &TaskPlan, allow_parallel: bool) {
    println!("🗺️  Plan for {name} ({} tasks)", plan.task_count());
    println!();
    for (level, group) in plan.parallel_groups.iter().enumerate() {
        let members: Vec<&str> = group.iter().map(|id| id.as_str()).collect();
        println!("  Level {level}: {}", members.join(", "));
    }
    println!();

    let path: Vec<&str> = plan.critical_path.iter().map(|id| id.as_str()).collect();
    println!("🔥 Critical path: {}", path.join(" -> "));
    let mode = if allow_parallel { "parallel" } else { "sequential" };
    println!(
        "⏱️  Estimated total: {}ms ({mode})",
        plan.estimated_total_time_ms
    );
}
