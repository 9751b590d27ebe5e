//! Agent configuration.
//!
//! ```toml
//! [agent]
//! interval_secs = 10
//!
//! [[plugins.postgresql.servers]]
//! address = "host=db1 user=monitor sslmode=disable"
//! databases = ["app", "billing"]
//! ```
//!
//! Each `[plugins.<name>]` table is passed verbatim to the plugin registered
//! under that name.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::plugin::{Plugin, Registry};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Plugin {name}: {message}")]
    Plugin { name: String, message: String },
}

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent: AgentSettings,

    /// Per-plugin sections, keyed by registered plugin name.
    pub plugins: BTreeMap<String, toml::Table>,
}

/// Collection loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Seconds between collection passes; 0 runs a single pass.
    pub interval_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl AgentSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl AgentConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Creates the plugin registered as `name` and applies its section.
    ///
    /// A plugin without a section keeps its defaults.
    pub fn build_plugin(&self, registry: &Registry, name: &str) -> Result<Box<dyn Plugin>, ConfigError> {
        let mut plugin = registry.create(name).ok_or_else(|| ConfigError::Plugin {
            name: name.to_string(),
            message: "not registered".to_string(),
        })?;

        if let Some(section) = self.plugins.get(name) {
            plugin
                .configure(section.clone())
                .map_err(|e| ConfigError::Plugin {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(plugin)
    }

    /// Fails on sections naming plugins the registry does not know.
    pub fn check_plugins(&self, registry: &Registry) -> Result<(), ConfigError> {
        for name in self.plugins.keys() {
            if registry.create(name).is_none() {
                return Err(ConfigError::Plugin {
                    name: name.clone(),
                    message: "not registered".to_string(),
                });
            }
        }
        Ok(())
    }
}
