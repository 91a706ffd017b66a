use crate::domain::optimization::normalize_symbol;
use crate::domain::ports::PriceDataService;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// One candle as stored in `{SYMBOL}.csv`.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRecord {
    /// Unix seconds
    pub time: i64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
}

/// Reads daily candles from a directory with one CSV file per symbol.
///
/// Series are cached after the first read.
#[derive(Clone)]
pub struct CsvPriceDataService {
    data_dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, Arc<Vec<f64>>>>>,
}

impl CsvPriceDataService {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol))
    }

    async fn closes(&self, symbol: &str) -> Result<Arc<Vec<f64>>> {
        let symbol = normalize_symbol(symbol);
        if let Some(closes) = self.cache.read().await.get(&symbol) {
            return Ok(Arc::clone(closes));
        }

        let path = self.path_for(&symbol);
        let closes = tokio::task::spawn_blocking(move || read_closes(&path))
            .await
            .context("CSV loader task failed")??;
        info!(
            "CsvPriceDataService: Loaded {} closes for {}",
            closes.len(),
            symbol
        );

        let closes = Arc::new(closes);
        self.cache
            .write()
            .await
            .insert(symbol, Arc::clone(&closes));
        Ok(closes)
    }
}

/// Close prices ordered by time; duplicate timestamps keep the last row.
pub fn read_closes(path: &Path) -> Result<Vec<f64>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut rdr = csv::Reader::from_reader(BufReader::new(file));

    let mut records: Vec<PriceRecord> = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let record: PriceRecord =
            result.with_context(|| format!("Invalid row {} in {:?}", line + 1, path))?;
        if !record.close.is_finite() {
            bail!("Non-finite close at row {} in {:?}", line + 1, path);
        }
        records.push(record);
    }

    records.sort_by_key(|r| r.time);
    records.dedup_by(|later, earlier| {
        if later.time == earlier.time {
            *earlier = later.clone();
            true
        } else {
            false
        }
    });

    Ok(records.into_iter().map(|r| r.close).collect())
}

#[async_trait]
impl PriceDataService for CsvPriceDataService {
    async fn historical_closes(&self, symbol: &str) -> Result<Vec<f64>> {
        Ok(self.closes(symbol).await?.as_ref().clone())
    }

    async fn latest_closes(&self, symbol: &str, count: usize) -> Result<Vec<f64>> {
        let closes = self.closes(symbol).await?;
        let start = closes.len().saturating_sub(count);
        Ok(closes[start..].to_vec())
    }
}
