use crate::application::optimization::{GeneticOptimizer, OptimizationOutcome};
use crate::domain::errors::StrategyError;
use crate::domain::messaging::{Envelope, Ontology, Performative, Route};
use crate::domain::optimization::cost_function::{CrossoverSignal, latest_signal};
use crate::domain::optimization::{Decision, StrategyModel, TrainingState, normalize_symbol};
use crate::domain::ports::{MessageTransport, PriceDataService};
use crate::domain::repositories::ModelRepository;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Model produced by a successful training run, with its generation history.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model: StrategyModel,
    pub outcome: OptimizationOutcome,
}

/// Owns the training lifecycle and decision serving for one symbol.
pub struct StrategyAgent {
    symbol: String,
    address: String,
    optimizer: Mutex<GeneticOptimizer>,
    price_service: Arc<dyn PriceDataService>,
    repository: Arc<dyn ModelRepository>,
    transport: Arc<dyn MessageTransport>,
    state: RwLock<TrainingState>,
}

impl StrategyAgent {
    pub fn new(
        symbol: impl AsRef<str>,
        optimizer: GeneticOptimizer,
        price_service: Arc<dyn PriceDataService>,
        repository: Arc<dyn ModelRepository>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        let symbol = normalize_symbol(symbol.as_ref());
        Self {
            address: format!("strategy-{}", symbol.to_lowercase()),
            symbol,
            optimizer: Mutex::new(optimizer),
            price_service,
            repository,
            transport,
            state: RwLock::new(TrainingState::Untrained),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Bus address decision requests are served on
    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn status(&self) -> TrainingState {
        self.state.read().await.clone()
    }

    /// Runs the optimizer and persists the winning window pair.
    pub async fn train(&self) -> Result<TrainingReport> {
        {
            let mut state = self.state.write().await;
            if matches!(*state, TrainingState::Training) {
                return Err(StrategyError::TrainingInProgress {
                    symbol: self.symbol.clone(),
                }
                .into());
            }
            *state = TrainingState::Training;
        }
        info!("StrategyAgent {}: Training started", self.symbol);

        match self.run_training().await {
            Ok(report) => {
                info!(
                    "StrategyAgent {}: Trained windows {} with fitness {:.4}",
                    self.symbol,
                    report.model.genotype(),
                    report.model.fitness
                );
                *self.state.write().await = TrainingState::Trained(report.model.clone());
                Ok(report)
            }
            Err(e) => {
                error!("StrategyAgent {}: Training failed: {:#}", self.symbol, e);
                *self.state.write().await = TrainingState::Failed(format!("{:#}", e));
                Err(e)
            }
        }
    }

    async fn run_training(&self) -> Result<TrainingReport> {
        let outcome = self
            .optimizer
            .lock()
            .await
            .run()
            .await
            .with_context(|| format!("Optimization failed for {}", self.symbol))?;

        let model = StrategyModel::new(self.symbol.clone(), outcome.best, outcome.fitness);
        self.repository
            .save(&model)
            .await
            .with_context(|| format!("Failed to persist model for {}", self.symbol))?;

        Ok(TrainingReport { model, outcome })
    }

    /// Current model, falling back to the persisted one.
    async fn model(&self) -> Result<StrategyModel> {
        if let TrainingState::Trained(model) = &*self.state.read().await {
            return Ok(model.clone());
        }

        let stored = self
            .repository
            .load(&self.symbol)
            .await
            .with_context(|| format!("Failed to load model for {}", self.symbol))?;
        let Some(model) = stored else {
            return Err(StrategyError::NotTrained {
                symbol: self.symbol.clone(),
            }
            .into());
        };

        let mut state = self.state.write().await;
        if matches!(*state, TrainingState::Untrained) {
            *state = TrainingState::Trained(model.clone());
        }
        Ok(model)
    }

    /// Buy when the latest close completes a buy crossover, Hold otherwise.
    pub async fn decide(&self) -> Result<Decision> {
        let model = self.model().await?;
        let need = model.short_window.max(model.long_window) as usize + 1;

        let closes = self
            .price_service
            .latest_closes(&self.symbol, need)
            .await
            .with_context(|| format!("Failed to fetch latest closes for {}", self.symbol))?;
        if closes.len() < need {
            return Err(StrategyError::InsufficientPrices {
                symbol: self.symbol.clone(),
                need,
                got: closes.len(),
            }
            .into());
        }

        let signal = latest_signal(
            model.short_window as usize,
            model.long_window as usize,
            &closes,
        );
        Ok(match signal {
            Some(CrossoverSignal::Buy) => Decision::Buy,
            _ => Decision::Hold,
        })
    }

    /// Answers decision requests on the agent's address until shutdown.
    pub async fn serve_decisions(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        let route = Route::any(self.address.clone(), Performative::Request, Ontology::Decision);
        let mut requests = self
            .transport
            .subscribe(route.clone())
            .await
            .with_context(|| format!("Failed to subscribe decisions for {}", self.symbol))?;
        info!("StrategyAgent {}: Serving decisions on {}", self.symbol, self.address);

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = requests.recv() => match request {
                        Some(request) => self.answer(request).await,
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
        }))
    }

    async fn answer(&self, request: Envelope) {
        let reply = match self.decide().await {
            Ok(decision) => request
                .reply(self.symbol.clone())
                .with_answer(decision.answer()),
            Err(e) => {
                warn!("StrategyAgent {}: Cannot decide: {:#}", self.symbol, e);
                request.failure(e.to_string())
            }
        };

        if let Err(e) = self.transport.send(reply).await {
            warn!("StrategyAgent {}: Failed to send decision: {}", self.symbol, e);
        }
    }
}
