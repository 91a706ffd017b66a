//! Configuration module for crossfarm.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Optimizer, Dispatch, Storage, and Observability.

mod dispatch_config;
mod observability_config;
mod optimizer_config;
mod storage_config;

pub use dispatch_config::DispatchEnvConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use optimizer_config::{OptimizerEnvConfig, load_optimizer_file};
pub use storage_config::StorageEnvConfig;

use crate::application::optimization::OptimizerConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Main application configuration.
///
/// Aggregates all sub-configurations loaded from the environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub optimizer: OptimizerConfig,
    pub dispatch: DispatchEnvConfig,
    pub storage: StorageEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let optimizer = OptimizerEnvConfig::from_env().context("Failed to load optimizer config")?;
        let dispatch = DispatchEnvConfig::from_env().context("Failed to load dispatch config")?;

        Ok(Self {
            optimizer: optimizer.to_optimizer_config(),
            dispatch,
            storage: StorageEnvConfig::from_env(),
            observability: ObservabilityEnvConfig::from_env(),
        })
    }

    /// Replaces the optimizer section with the contents of a TOML file.
    pub fn with_optimizer_file(mut self, path: &Path) -> Result<Self> {
        self.optimizer = load_optimizer_file(path)?;
        Ok(self)
    }
}
