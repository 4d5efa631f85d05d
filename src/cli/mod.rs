use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Dependency-aware workflow orchestration")]
#[command(long_about = "Conductor plans a set of dependent tasks into parallel levels, \
                       then drives them through a workflow lifecycle with task-level retries. \
                       Start with 'conductor plan <definition>' to inspect a workflow.")]
pub struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true, help = "Log as JSON instead of the pretty format")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the execution plan for a workflow definition
    Plan {
        /// Workflow definition file (.toml or .json)
        definition: PathBuf,
        /// Estimate as if every task ran one after another
        #[arg(long, help = "Sum all task durations instead of per-level maxima")]
        sequential: bool,
        /// Print the plan as JSON
        #[arg(long, help = "Print the plan as JSON")]
        json: bool,
    },
    /// Run a workflow definition with a simulated executor
    Run {
        /// Workflow definition file (.toml or .json)
        definition: PathBuf,
        /// Tasks whose every attempt fails
        #[arg(long = "fail", value_name = "TASK", help = "Make every attempt of this task fail (repeatable)")]
        fail: Vec<String>,
        /// Multiplier applied to estimated durations when simulating work
        #[arg(long, default_value = "0.01", help = "Scale factor for simulated task durations")]
        time_scale: f64,
    },
    /// Print the effective configuration as TOML
    Config,
}
