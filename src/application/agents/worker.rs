use crate::domain::messaging::codec::{decode_genotypes, encode_fitness};
use crate::domain::messaging::{Envelope, Ontology, Performative, Route};
use crate::domain::optimization::WorkerId;
use crate::domain::optimization::cost_function::genotype_fitness;
use crate::domain::optimization::Genotype;
use crate::domain::ports::{MessageTransport, PriceDataService};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub address: String,
    pub symbol: String,
    /// Simulated extra work before each reply
    pub processing_delay: Duration,
}

/// Evaluates candidate batches against one price series, in request order.
pub fn evaluate_batch(genotypes: &[Genotype], prices: &[f64]) -> Vec<f64> {
    genotypes
        .par_iter()
        .map(|genotype| genotype_fitness(genotype, prices))
        .collect()
}

/// Stateless fitness worker listening on its own bus address.
pub struct StrategyWorker {
    config: WorkerConfig,
    price_service: Arc<dyn PriceDataService>,
    transport: Arc<dyn MessageTransport>,
}

/// Running worker; dropping it leaves the task running until the bus closes.
pub struct WorkerHandle {
    id: WorkerId,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn stop(self) {
        if self.shutdown_tx.send(true).is_err() {
            debug!("StrategyWorker {}: Task already stopped", self.id);
        }
        if let Err(e) = self.task.await {
            warn!("StrategyWorker {}: Task ended abnormally: {}", self.id, e);
        }
    }
}

impl StrategyWorker {
    pub fn new(
        config: WorkerConfig,
        price_service: Arc<dyn PriceDataService>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        Self {
            config,
            price_service,
            transport,
        }
    }

    pub fn id(&self) -> WorkerId {
        WorkerId::new(self.config.address.clone())
    }

    /// Fetches the price series once, subscribes to requests and starts serving.
    pub async fn start(self) -> Result<WorkerHandle> {
        let prices = self
            .price_service
            .historical_closes(&self.config.symbol)
            .await
            .with_context(|| {
                format!(
                    "Worker {} failed to load prices for {}",
                    self.config.address, self.config.symbol
                )
            })?;

        let route = Route::any(
            self.config.address.clone(),
            Performative::Request,
            Ontology::CostComputation,
        );
        let requests = self
            .transport
            .subscribe(route.clone())
            .await
            .with_context(|| format!("Worker {} failed to subscribe", self.config.address))?;

        info!(
            "StrategyWorker {}: Serving {} ({} closes)",
            self.config.address,
            self.config.symbol,
            prices.len()
        );

        let id = self.id();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.serve(Arc::new(prices), route, requests, shutdown_rx));

        Ok(WorkerHandle {
            id,
            shutdown_tx,
            task,
        })
    }

    async fn serve(
        self,
        prices: Arc<Vec<f64>>,
        route: Route,
        mut requests: Receiver<Envelope>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        let prices = Arc::clone(&prices);
                        let transport = Arc::clone(&self.transport);
                        let delay = self.config.processing_delay;
                        tokio::spawn(async move {
                            handle_request(request, prices, transport, delay).await;
                        });
                    }
                    None => break,
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.transport.unsubscribe(&route).await;
        info!("StrategyWorker {}: Stopped", self.config.address);
    }
}

async fn handle_request(
    request: Envelope,
    prices: Arc<Vec<f64>>,
    transport: Arc<dyn MessageTransport>,
    delay: Duration,
) {
    let reply = match decode_genotypes(&request.body) {
        Ok(genotypes) => {
            let count = genotypes.len();
            let evaluated =
                tokio::task::spawn_blocking(move || evaluate_batch(&genotypes, &prices)).await;

            match evaluated {
                Ok(values) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match encode_fitness(&values) {
                        Ok(body) => {
                            debug!(
                                "StrategyWorker {}: Evaluated {} genotypes for {}",
                                request.receiver, count, request.correlation_id
                            );
                            request.reply(body)
                        }
                        Err(e) => request.failure(e.to_string()),
                    }
                }
                Err(e) => {
                    error!("StrategyWorker {}: Evaluation panicked: {}", request.receiver, e);
                    request.failure("evaluation failed")
                }
            }
        }
        Err(e) => {
            warn!(
                "StrategyWorker {}: Rejecting request {}: {}",
                request.receiver, request.correlation_id, e
            );
            request.failure(e.to_string())
        }
    };

    if let Err(e) = transport.send(reply).await {
        warn!("StrategyWorker: Failed to send reply: {}", e);
    }
}
