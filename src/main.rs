use anyhow::{Context, Result};
use clap::Parser;

use conductor::cli::commands::config::ConfigCommand;
use conductor::cli::commands::plan::PlanCommand;
use conductor::cli::commands::run::RunCommand;
use conductor::cli::commands::{show_how_to_start, Command};
use conductor::cli::{Cli, Commands};
use conductor::config::config;
use conductor::telemetry::{init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config().context("failed to load configuration")?.clone();
    init_telemetry(
        cli.json_logs || config.observability.json_logs,
        &config.observability.log_level,
    )?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        match cli.command {
            // No subcommand: explain how to get going
            None => show_how_to_start().await,
            Some(Commands::Plan {
                definition,
                sequential,
                json,
            }) => {
                PlanCommand::new(definition, config.orchestrator.clone())
                    .with_sequential(sequential)
                    .with_json(json)
                    .execute()
                    .await
            }
            Some(Commands::Run {
                definition,
                fail,
                time_scale,
            }) => {
                RunCommand::new(definition, config)
                    .with_failing(fail)
                    .with_time_scale(time_scale)
                    .execute()
                    .await
            }
            Some(Commands::Config) => ConfigCommand::new(config).execute().await,
        }
    });

    shutdown_telemetry();
    result
}
