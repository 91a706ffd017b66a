//! Optimizer configuration from environment variables and TOML files.
//!
//! Environment values override the defaults; a TOML file passed on the
//! command line replaces both.

use crate::application::optimization::OptimizerConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

/// Optimizer environment configuration
#[derive(Debug, Clone)]
pub struct OptimizerEnvConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_chance: f64,
    pub max_jobs: Option<usize>,
    pub seed: Option<u64>,
    pub generation_deadline_ms: Option<u64>,
}

impl OptimizerEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = OptimizerConfig::default();

        let mutation_chance = Self::parse_f64("MUTATION_CHANCE", defaults.mutation_chance)?;
        if !(0.0..=1.0).contains(&mutation_chance) {
            anyhow::bail!("MUTATION_CHANCE must be between 0 and 1, got {}", mutation_chance);
        }

        Ok(Self {
            population_size: Self::parse_usize("POPULATION_SIZE", defaults.population_size)?,
            generations: Self::parse_usize("GENERATIONS", defaults.generations)?,
            mutation_chance,
            max_jobs: Self::parse_optional("MAX_JOBS")?,
            seed: Self::parse_optional("OPTIMIZER_SEED")?,
            generation_deadline_ms: Self::parse_optional("GENERATION_DEADLINE_MS")?,
        })
    }

    pub fn to_optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            population_size: self.population_size,
            generations: self.generations,
            mutation_chance: self.mutation_chance,
            max_jobs: self.max_jobs,
            seed: self.seed,
            generation_deadline_ms: self.generation_deadline_ms,
            ..OptimizerConfig::default()
        }
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match env::var(key) {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse::<T>()
                .map(Some)
                .context(format!("Failed to parse {}", key)),
            _ => Ok(None),
        }
    }
}

/// Loads a full optimizer configuration from a TOML file.
///
/// Missing keys fall back to the defaults.
pub fn load_optimizer_file(path: &Path) -> Result<OptimizerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read optimizer config {:?}", path))?;
    let config: OptimizerConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse optimizer config {:?}", path))?;

    if !(0.0..=1.0).contains(&config.mutation_chance) {
        anyhow::bail!(
            "mutation_chance must be between 0 and 1, got {}",
            config.mutation_chance
        );
    }
    Ok(config)
}
