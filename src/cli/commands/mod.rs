use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::config::OrchestratorConfig;
use crate::orchestrator::WorkflowDefinition;
use crate::planner::Task;

pub mod config;
pub mod plan;
pub mod run;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// On-disk form of a definition. Workflow-wide settings left out of the
/// file fall back to the `[orchestrator]` config section.
#[derive(Debug, Deserialize)]
struct DefinitionFile {
    id: String,
    name: String,
    tasks: Vec<Task>,
    max_retries: Option<u32>,
    timeout_ms: Option<u64>,
    allow_parallel: Option<bool>,
}

impl DefinitionFile {
    fn into_definition(self, defaults: &OrchestratorConfig) -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new(self.id, self.name, self.tasks)
            .with_max_retries(self.max_retries.unwrap_or(defaults.default_max_retries))
            .allow_parallel(self.allow_parallel.unwrap_or(defaults.allow_parallel));
        definition.timeout_ms = self.timeout_ms.or(defaults.default_timeout_ms);
        definition
    }
}

/// Read a workflow definition; the format follows the file extension.
pub fn load_definition(path: &Path, defaults: &OrchestratorConfig) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow definition {}", path.display()))?;

    let file: DefinitionFile = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("invalid TOML workflow definition {}", path.display()))?,
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON workflow definition {}", path.display()))?,
        _ => bail!(
            "unsupported definition format for {} (expected .toml or .json)",
            path.display()
        ),
    };
    Ok(file.into_definition(defaults))
}

pub async fn show_how_to_start() -> Result<()> {
    println!("🎼 Conductor - dependency-aware workflow orchestration");
    println!();
    println!("To get started:");
    println!("  🗺️  conductor plan <definition>   # Show levels, critical path and estimate");
    println!("  ▶️  conductor run <definition>    # Drive the workflow with simulated tasks");
    println!("  ⚙️  conductor config              # Print the effective configuration");
    println!();
    println!("💡 Definitions are TOML or JSON files with an id, a name and a list of tasks.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_toml_definition() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("build.toml");
        std::fs::write(
            &path,
            r#"
id = "build"
name = "Build"

[[tasks]]
id = "fetch"
name = "Fetch sources"
estimated_duration_ms = 100

[[tasks]]
id = "compile"
name = "Compile"
dependencies = ["fetch"]
max_retries = 5
"#,
        )
        .unwrap();

        let definition = load_definition(&path, &OrchestratorConfig::default()).unwrap();
        assert_eq!(definition.id, "build");
        assert_eq!(definition.max_retries, 3);
        assert!(definition.allow_parallel);
        assert_eq!(definition.tasks[1].max_retries, Some(5));
    }

    #[test]
    fn test_unset_settings_come_from_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{"id": "deploy", "name": "Deploy", "allow_parallel": true,
                "tasks": [{"id": "push", "name": "Push image"}]}"#,
        )
        .unwrap();
        let defaults = OrchestratorConfig {
            default_max_retries: 1,
            allow_parallel: false,
            default_timeout_ms: Some(30_000),
            ..OrchestratorConfig::default()
        };

        let definition = load_definition(&path, &defaults).unwrap();
        assert_eq!(definition.max_retries, 1);
        assert!(definition.allow_parallel);
        assert_eq!(definition.timeout_ms, Some(30_000));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("build.yaml");
        std::fs::write(&path, "id: build").unwrap();
        let err = load_definition(&path, &OrchestratorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unsupported definition format"));
    }
}
