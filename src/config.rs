use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::retry::RetryConfig;

/// Main configuration structure for Conductor
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct ConductorConfig {
    /// Backoff policy applied to retryable task failures
    pub retry: RetryConfig,
    /// Defaults for workflow instances and the async runner
    pub orchestrator: OrchestratorConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Used for definitions that do not set `max_retries`
    pub default_max_retries: u32,
    pub allow_parallel: bool,
    /// Used for definitions that do not set `timeout_ms`
    pub default_timeout_ms: Option<u64>,
    /// Upper bound on tasks the runner dispatches at once
    pub max_concurrent_tasks: usize,
    /// How often the runner checks the workflow deadline
    pub timeout_check_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            allow_parallel: true,
            default_timeout_ms: None,
            max_concurrent_tasks: 8,
            timeout_check_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level, overridden by RUST_LOG
    pub log_level: String,
    /// Emit JSON log lines instead of the pretty format
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ConductorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `conductor.toml` in the working directory
    /// 3. Environment variables (prefixed with CONDUCTOR_, nested with `__`)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("conductor.toml").exists() {
            builder = builder.add_source(File::with_name("conductor"));
        }

        builder = builder.add_source(
            Environment::with_prefix("CONDUCTOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load an explicit file on top of the defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path.as_ref()))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ConductorConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ConductorConfig::load_env_file();
        ConductorConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ConductorConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryStrategy;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ConductorConfig::default();
        assert_eq!(config.retry.strategy, RetryStrategy::ExponentialJitter);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.orchestrator.default_max_retries, 3);
        assert_eq!(config.orchestrator.max_concurrent_tasks, 8);
        assert!(config.orchestrator.default_timeout_ms.is_none());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conductor.toml");
        std::fs::write(
            &path,
            r#"
[retry]
strategy = "fixed"
max_attempts = 5
base_delay_ms = 250
max_delay_ms = 250

[orchestrator]
default_max_retries = 1
allow_parallel = false
default_timeout_ms = 60000
max_concurrent_tasks = 2
timeout_check_interval_ms = 500
"#,
        )
        .unwrap();

        let config = ConductorConfig::load_from(&path).unwrap();
        assert_eq!(config.retry, RetryConfig::fixed(5, 250));
        assert!(!config.orchestrator.allow_parallel);
        assert_eq!(config.orchestrator.default_timeout_ms, Some(60_000));
        // Untouched sections keep their defaults
        assert_eq!(config.observability, ObservabilityConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = ConductorConfig::default();
        config.observability.json_logs = true;
        config.orchestrator.default_timeout_ms = Some(5_000);
        config.save_to_file(&path).unwrap();

        let reloaded = ConductorConfig::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
