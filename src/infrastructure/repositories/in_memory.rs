//! In-memory model repository.
//!
//! Thread-safe through `Arc<RwLock>`; data is lost on restart. Used by tests
//! and by runs that do not need to keep their models.

use crate::domain::optimization::{StrategyModel, normalize_symbol};
use crate::domain::repositories::ModelRepository;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryModelRepository {
    models: Arc<RwLock<BTreeMap<String, StrategyModel>>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self {
            models: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryModelRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn save(&self, model: &StrategyModel) -> Result<()> {
        self.models
            .write()
            .await
            .insert(normalize_symbol(&model.symbol), model.clone());
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Option<StrategyModel>> {
        Ok(self
            .models
            .read()
            .await
            .get(&normalize_symbol(symbol))
            .cloned())
    }

    async fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.models.read().await.keys().cloned().collect())
    }
}
