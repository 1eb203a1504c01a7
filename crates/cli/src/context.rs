//! Configuration assembly shared by every command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use nursery_fixtures::{FixtureConfig, LifecycleCoordinator};

/// Flags that locate the backend and the hook table
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Configuration file (TOML); missing file means defaults
    #[arg(long, default_value = "nursery.toml", env = "NURSERY_CONFIG", global = true)]
    pub config: PathBuf,

    /// Backend base URL, overrides config and NURSERY_API_URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Hook table YAML file or directory, replaces the built-in table
    #[arg(long, global = true)]
    pub hooks: Option<PathBuf>,
}

impl GlobalOptions {
    /// File, then `NURSERY_*` environment, then flags.
    pub fn load_config(&self) -> Result<FixtureConfig> {
        let mut config = FixtureConfig::load(&self.config)
            .with_context(|| format!("Failed to load config from {}", self.config.display()))?;
        config.apply_env()?;

        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(hooks) = &self.hooks {
            config.hooks_file = Some(hooks.clone());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn coordinator(&self) -> Result<LifecycleCoordinator> {
        let config = self.load_config()?;
        tracing::debug!(base_url = %config.api.base_url, "using backend");
        Ok(LifecycleCoordinator::from_config(&config)?)
    }
}
