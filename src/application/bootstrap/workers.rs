use crate::application::agents::worker::{StrategyWorker, WorkerConfig, WorkerHandle};
use crate::config::DispatchEnvConfig;
use crate::domain::ports::{MessageTransport, PriceDataService};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct WorkersBootstrap;

impl WorkersBootstrap {
    /// Starts `dispatch.worker_count` fitness workers for `symbol`.
    ///
    /// Already started workers are stopped again if a later one fails.
    pub async fn init(
        symbol: &str,
        dispatch: &DispatchEnvConfig,
        price_service: Arc<dyn PriceDataService>,
        transport: Arc<dyn MessageTransport>,
    ) -> Result<Vec<WorkerHandle>> {
        let mut handles: Vec<WorkerHandle> = Vec::with_capacity(dispatch.worker_count);

        for index in 0..dispatch.worker_count {
            let config = WorkerConfig {
                address: worker_address(symbol, index),
                symbol: symbol.to_string(),
                processing_delay: dispatch.processing_delay(),
            };
            let started = StrategyWorker::new(config, price_service.clone(), transport.clone())
                .start()
                .await
                .with_context(|| format!("Failed to start worker {} for {}", index, symbol));

            match started {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        handle.stop().await;
                    }
                    return Err(e);
                }
            }
        }

        info!("WorkersBootstrap: {} workers serving {}", handles.len(), symbol);
        Ok(handles)
    }
}

pub fn worker_address(symbol: &str, index: usize) -> String {
    format!("worker-{}-{}", symbol.to_lowercase(), index)
}
