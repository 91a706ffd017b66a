//! Repository Pattern Abstractions
//!
//! Learned strategies are persisted per symbol through `ModelRepository`.
//! Implementations live in `infrastructure`: a JSON file store for the CLI and
//! an in-memory store for tests.

use crate::domain::optimization::StrategyModel;
use anyhow::Result;
use async_trait::async_trait;

/// Repository for persisting and retrieving learned window pairs
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Insert or replace the model for `model.symbol`
    async fn save(&self, model: &StrategyModel) -> Result<()>;

    /// Load the model for a symbol, if one was trained
    async fn load(&self, symbol: &str) -> Result<Option<StrategyModel>>;

    /// Symbols that have a trained model
    async fn symbols(&self) -> Result<Vec<String>>;
}
