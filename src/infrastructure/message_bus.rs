use crate::domain::messaging::{Envelope, Route};
use crate::domain::ports::MessageTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;

/// In-process point-to-point dispatcher.
///
/// Each subscription owns one route. Delivery tries the correlated route first,
/// then the `correlation_id: None` wildcard for the same address and topic.
/// Unroutable messages are dropped, which callers treat as loss.
///
/// Every envelope goes through its JSON wire form on `send`, so malformed
/// envelopes are rejected to the sender instead of reaching a subscriber.
pub struct MessageBus {
    routes: Arc<RwLock<HashMap<Route, Sender<Envelope>>>>,
    capacity: usize,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Get count of live routes (for testing)
    pub async fn route_count(&self) -> usize {
        self.routes.read().await.len()
    }

    async fn resolve(&self, envelope: &Envelope) -> Option<(Route, Sender<Envelope>)> {
        let routes = self.routes.read().await;
        [Route::exact_for(envelope), Route::wildcard_for(envelope)]
            .into_iter()
            .find_map(|route| routes.get(&route).cloned().map(|tx| (route, tx)))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            routes: Arc::clone(&self.routes),
            capacity: self.capacity,
        }
    }
}

#[async_trait]
impl MessageTransport for MessageBus {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        let raw = envelope.encode()?;
        let envelope = Envelope::decode(&raw)
            .with_context(|| format!("MessageBus: Rejected envelope from {}", envelope.sender))?;

        let Some((route, tx)) = self.resolve(&envelope).await else {
            debug!(
                "MessageBus: No route for {} from {}, dropping",
                Route::exact_for(&envelope),
                envelope.sender
            );
            return Ok(());
        };

        match tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    "MessageBus: Route {} is full, dropping message from {}",
                    route, dropped.sender
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("MessageBus: Route {} closed, removing", route);
                let mut routes = self.routes.write().await;
                if routes.get(&route).is_some_and(|current| current.is_closed()) {
                    routes.remove(&route);
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, route: Route) -> Result<Receiver<Envelope>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.routes.write().await.insert(route.clone(), tx).is_some() {
            warn!("MessageBus: Route {} re-subscribed, previous receiver detached", route);
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, route: &Route) {
        self.routes.write().await.remove(route);
    }
}
