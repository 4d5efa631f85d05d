use anyhow::Result;

use super::Command;
use crate::config::ConductorConfig;

pub struct ConfigCommand {
    config: ConductorConfig,
}

impl ConfigCommand {
    pub fn new(config: ConductorConfig) -> Self {
        Self { config }
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        print!("{}", toml::to_string_pretty(&self.config)?);
        Ok(())
    }
}
