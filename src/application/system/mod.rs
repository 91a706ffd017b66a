use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::application::agents::strategy_agent::StrategyAgent;
use crate::application::agents::worker::WorkerHandle;
use crate::application::bootstrap::WorkersBootstrap;
use crate::application::optimization::{GeneticOptimizer, JobManager, SharedJobManager};
use crate::config::Config;
use crate::domain::optimization::{WorkerId, normalize_symbol};
use crate::domain::ports::{MessageTransport, PriceDataService};
use crate::domain::repositories::ModelRepository;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::{CsvPriceDataService, JsonModelStore, MessageBus};

/// Running training setup for one symbol.
pub struct SystemHandle {
    pub agent: Arc<StrategyAgent>,
    pub manager: SharedJobManager,
    pub workers: Vec<WorkerHandle>,
}

impl SystemHandle {
    pub async fn shutdown(self) {
        for worker in self.workers {
            worker.stop().await;
        }
        info!("SystemHandle: Workers stopped");
    }
}

pub struct Application {
    pub config: Config,
    pub price_service: Arc<dyn PriceDataService>,
    pub repository: Arc<dyn ModelRepository>,
    pub transport: Arc<dyn MessageTransport>,
    pub metrics: Metrics,
}

impl Application {
    /// Wires CSV prices, the JSON model store and an in-process bus from `config`.
    pub async fn build(config: Config) -> Result<Self> {
        info!(
            "Building crossfarm Application (prices: {:?}, models: {:?})...",
            config.storage.price_data_dir, config.storage.model_dir
        );

        let price_service = Arc::new(CsvPriceDataService::new(&config.storage.price_data_dir));
        let repository = Arc::new(JsonModelStore::open(&config.storage.model_dir).await?);
        let transport = Arc::new(MessageBus::with_capacity(config.dispatch.bus_capacity));

        Ok(Self::with_services(
            config,
            price_service,
            repository,
            transport,
            Metrics::new()?,
        ))
    }

    pub fn with_services(
        config: Config,
        price_service: Arc<dyn PriceDataService>,
        repository: Arc<dyn ModelRepository>,
        transport: Arc<dyn MessageTransport>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            price_service,
            repository,
            transport,
            metrics,
        }
    }

    /// Starts the worker pool and a strategy agent able to train on it.
    pub async fn start(&self, symbol: &str) -> Result<SystemHandle> {
        let symbol = normalize_symbol(symbol);
        let workers = WorkersBootstrap::init(
            &symbol,
            &self.config.dispatch,
            self.price_service.clone(),
            self.transport.clone(),
        )
        .await?;

        let ids: Vec<WorkerId> = workers.iter().map(|w| w.id().clone()).collect();
        let manager =
            SharedJobManager::new(JobManager::new(ids).with_metrics(self.metrics.clone()));
        let agent = Arc::new(self.strategy_agent(&symbol, manager.clone()));

        Ok(SystemHandle {
            agent,
            manager,
            workers,
        })
    }

    /// Agent without workers; it can only serve decisions from stored models.
    pub fn decision_agent(&self, symbol: &str) -> Arc<StrategyAgent> {
        let manager = SharedJobManager::new(JobManager::new(Vec::new()));
        Arc::new(self.strategy_agent(symbol, manager))
    }

    fn strategy_agent(&self, symbol: &str, manager: SharedJobManager) -> StrategyAgent {
        let optimizer = GeneticOptimizer::new(
            manager,
            self.transport.clone(),
            self.config.optimizer.clone(),
        )
        .with_address(format!("optimizer-{}", symbol.to_lowercase()))
        .with_conversation_config(self.config.dispatch.conversation_config())
        .with_metrics(self.metrics.clone());

        StrategyAgent::new(
            symbol,
            optimizer,
            self.price_service.clone(),
            self.repository.clone(),
            self.transport.clone(),
        )
    }
}
