//! JSON file store for learned strategy models.
//!
//! All symbols share one `models.json` document keyed by symbol. Writes go to a
//! temp file that is renamed over the original.

use crate::domain::optimization::{StrategyModel, normalize_symbol};
use crate::domain::repositories::ModelRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

type ModelSet = BTreeMap<String, StrategyModel>;

pub struct JsonModelStore {
    file_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonModelStore {
    /// Store rooted at `dir`, created if missing.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create model directory {:?}", dir))?;

        Ok(Self {
            file_path: dir.join("models.json"),
            write_lock: Mutex::new(()),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    async fn read_all(&self) -> Result<ModelSet> {
        if !fs::try_exists(&self.file_path).await.unwrap_or(false) {
            return Ok(ModelSet::new());
        }

        let content = fs::read_to_string(&self.file_path)
            .await
            .context("Failed to read model file")?;
        serde_json::from_str(&content).context("Failed to parse model JSON")
    }

    async fn write_all(&self, models: &ModelSet) -> Result<()> {
        let content =
            serde_json::to_string_pretty(models).context("Failed to serialize models")?;

        let temp_path = self.file_path.with_extension("tmp");
        fs::write(&temp_path, content)
            .await
            .context("Failed to write temp file")?;
        fs::rename(&temp_path, &self.file_path)
            .await
            .context("Failed to rename temp file")?;
        Ok(())
    }
}

#[async_trait]
impl ModelRepository for JsonModelStore {
    async fn save(&self, model: &StrategyModel) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut models = self.read_all().await?;
        models.insert(normalize_symbol(&model.symbol), model.clone());
        self.write_all(&models).await?;

        info!(
            "JsonModelStore: Saved model for {} to {:?}",
            model.symbol, self.file_path
        );
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Option<StrategyModel>> {
        Ok(self.read_all().await?.remove(&normalize_symbol(symbol)))
    }

    async fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.read_all().await?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::Genotype;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_dir() -> PathBuf {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "crossfarm_test_{}_{}_{}_models",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id
        ))
    }

    #[tokio::test]
    async fn test_load_from_empty_store() {
        let dir = unique_dir();
        let store = JsonModelStore::open(&dir).await.unwrap();

        assert!(store.load("BTC").await.unwrap().is_none());
        assert!(store.symbols().await.unwrap().is_empty());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_models_survive_reopen() {
        let dir = unique_dir();
        let store = JsonModelStore::open(&dir).await.unwrap();
        let model = StrategyModel::new("BTC", Genotype::new(7, 30), 12.5);
        store.save(&model).await.unwrap();
        store
            .save(&StrategyModel::new("ETH", Genotype::new(2, 9), -1.0))
            .await
            .unwrap();

        let reopened = JsonModelStore::open(&dir).await.unwrap();
        assert_eq!(reopened.load("BTC").await.unwrap(), Some(model));
        assert_eq!(reopened.symbols().await.unwrap(), vec!["BTC", "ETH"]);
        assert!(!store.file_path().with_extension("tmp").exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = unique_dir();
        let store = JsonModelStore::open(&dir).await.unwrap();
        std::fs::write(store.file_path(), "{ not json").unwrap();

        assert!(store.load("BTC").await.is_err());
        std::fs::remove_dir_all(dir).ok();
    }
}
