//! Configuration management for the ignition fabric.

mod sub_configs;

#[cfg(test)]
mod tests;

use std::path::Path;

use ignition_phase::PhaseConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub use sub_configs::{
    ClockConfig, CoordinatorConfig, FabricConfig, LoggingConfig, RuntimeConfig, SalienceConfig,
    SalienceWeights, ValidationConfig,
};

/// Environment variable selecting the environment-specific config file.
pub const ENV_VAR: &str = "IGNITION_ENV";

/// Prefix for environment overrides, e.g. `IGNITION__FABRIC__NODE_COUNT=64`.
pub const ENV_PREFIX: &str = "IGNITION";

/// Main configuration structure.
///
/// Every section falls back to its defaults, so a file only needs the keys
/// it changes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub fabric: FabricConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub phase: PhaseConfig,
    #[serde(default)]
    pub salience: SalienceConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order:
    /// 1. config/default.toml (base settings)
    /// 2. config/{IGNITION_ENV}.toml (environment-specific)
    /// 3. Environment variables with IGNITION__ prefix
    pub fn load() -> CoreResult<Self> {
        let env = std::env::var(ENV_VAR).unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| CoreError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section plus the constraints that span sections.
    pub fn validate(&self) -> CoreResult<()> {
        self.fabric.validate()?;
        self.clock.validate()?;
        self.phase
            .validate()
            .map_err(|e| CoreError::ConfigError(format!("phase: {}", e)))?;
        self.salience.validate()?;
        self.coordinator.validate()?;
        self.validation.validate()?;
        self.runtime.validate()?;
        self.logging.validate()?;

        if self.coordinator.min_nodes > self.fabric.node_count {
            return Err(CoreError::ConfigError(format!(
                "coordinator.min_nodes ({}) exceeds fabric.node_count ({})",
                self.coordinator.min_nodes, self.fabric.node_count
            )));
        }
        if self.salience.min_healthy_nodes > self.fabric.node_count {
            return Err(CoreError::ConfigError(format!(
                "salience.min_healthy_nodes ({}) exceeds fabric.node_count ({})",
                self.salience.min_healthy_nodes, self.fabric.node_count
            )));
        }
        if self.clock.master_count >= self.fabric.node_count {
            return Err(CoreError::ConfigError(format!(
                "clock.master_count ({}) must leave room for the grand master in {} nodes",
                self.clock.master_count, self.fabric.node_count
            )));
        }
        Ok(())
    }
}
