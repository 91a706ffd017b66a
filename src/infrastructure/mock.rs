use crate::domain::messaging::{Envelope, Route};
use crate::domain::ports::{MessageTransport, PriceDataService};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tokio::sync::mpsc::Receiver;
use tracing::debug;

#[derive(Clone, Default)]
pub struct MockPriceDataService {
    closes: Arc<RwLock<HashMap<String, Vec<f64>>>>,
}

impl MockPriceDataService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_closes(&self, symbol: &str, closes: Vec<f64>) {
        self.closes.write().await.insert(symbol.to_string(), closes);
    }

    /// Oscillating random walk around 100, reproducible per seed.
    pub fn synthetic_closes(len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0_f64;
        (0..len)
            .map(|i| {
                let cycle = (i as f64 / 12.0).sin() * 0.8;
                price = (price + cycle + rng.random_range(-1.0..1.0)).max(1.0);
                price
            })
            .collect()
    }
}

#[async_trait]
impl PriceDataService for MockPriceDataService {
    async fn historical_closes(&self, symbol: &str) -> Result<Vec<f64>> {
        self.closes
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("No price history for {}", symbol))
    }

    async fn latest_closes(&self, symbol: &str, count: usize) -> Result<Vec<f64>> {
        let closes = self.historical_closes(symbol).await?;
        let start = closes.len().saturating_sub(count);
        Ok(closes[start..].to_vec())
    }
}

/// Transport wrapper that silently drops everything addressed to silenced receivers.
pub struct LossyTransport {
    inner: Arc<dyn MessageTransport>,
    silenced: RwLock<HashSet<String>>,
    dropped: AtomicUsize,
}

impl LossyTransport {
    pub fn new(inner: Arc<dyn MessageTransport>) -> Self {
        Self {
            inner,
            silenced: RwLock::new(HashSet::new()),
            dropped: AtomicUsize::new(0),
        }
    }

    pub async fn silence(&self, address: &str) {
        self.silenced.write().await.insert(address.to_string());
    }

    pub async fn restore(&self, address: &str) {
        self.silenced.write().await.remove(address);
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for LossyTransport {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        if self.silenced.read().await.contains(&envelope.receiver) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            debug!(
                "LossyTransport: Dropped {} to {}",
                envelope.performative, envelope.receiver
            );
            return Ok(());
        }
        self.inner.send(envelope).await
    }

    async fn subscribe(&self, route: Route) -> Result<Receiver<Envelope>> {
        self.inner.subscribe(route).await
    }

    async fn unsubscribe(&self, route: &Route) {
        self.inner.unsubscribe(route).await
    }
}
