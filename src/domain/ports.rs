use crate::domain::messaging::{Envelope, Route};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

/// Source of historical closing prices.
#[async_trait]
pub trait PriceDataService: Send + Sync {
    /// Full ordered close series for `symbol`, oldest first.
    async fn historical_closes(&self, symbol: &str) -> Result<Vec<f64>>;

    /// The most recent `count` closes (fewer if the series is shorter).
    async fn latest_closes(&self, symbol: &str, count: usize) -> Result<Vec<f64>>;
}

/// Point-to-point message delivery keyed by routes.
///
/// Messages may be lost. Nothing is duplicated or reordered within one correlation id.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<()>;
    async fn subscribe(&self, route: Route) -> Result<Receiver<Envelope>>;
    async fn unsubscribe(&self, route: &Route);
}
