//! Locations of price files and persisted models.

use std::env;
use std::path::PathBuf;

/// Storage environment configuration
#[derive(Debug, Clone)]
pub struct StorageEnvConfig {
    /// Directory holding one `{SYMBOL}.csv` per symbol
    pub price_data_dir: PathBuf,
    pub model_dir: PathBuf,
}

impl Default for StorageEnvConfig {
    fn default() -> Self {
        Self {
            price_data_dir: PathBuf::from("data/prices"),
            model_dir: PathBuf::from("data/models"),
        }
    }
}

impl StorageEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            price_data_dir: env::var("PRICE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.price_data_dir),
            model_dir: env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
        }
    }
}
