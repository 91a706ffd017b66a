//! Per-job request/reply exchange with a fitness worker.

use crate::application::optimization::job_manager::SharedJobManager;
use crate::domain::errors::{ConversationError, ProtocolError};
use crate::domain::messaging::codec::{decode_fitness, encode_genotypes};
use crate::domain::messaging::{Envelope, Ontology, Performative, Route};
use crate::domain::optimization::Job;
use crate::domain::ports::MessageTransport;
use crate::infrastructure::observability::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationConfig {
    /// How long one attempt waits for a correlated reply
    pub reply_timeout: Duration,
    /// Consecutive failed attempts against one worker before reassignment
    pub attempts: u32,
    /// `None` keeps reassigning forever
    pub max_reassignments: Option<usize>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(25),
            attempts: 2,
            max_reassignments: Some(16),
        }
    }
}

/// Drives one job until a worker returns an aligned result.
pub struct Conversation {
    requester: String,
    correlation_id: Uuid,
    job: Job,
    attempt_count: u32,
    reassignments: usize,
    manager: SharedJobManager,
    transport: Arc<dyn MessageTransport>,
    config: ConversationConfig,
    metrics: Option<Metrics>,
}

impl Conversation {
    pub fn new(
        requester: impl Into<String>,
        job: Job,
        manager: SharedJobManager,
        transport: Arc<dyn MessageTransport>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            requester: requester.into(),
            correlation_id: Uuid::new_v4(),
            job,
            attempt_count: 0,
            reassignments: 0,
            manager,
            transport,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn spawn(self) -> JoinHandle<Result<(), ConversationError>> {
        tokio::spawn(self.run())
    }

    /// Runs to completion: `Ok` once `job_done` accepted the result.
    pub async fn run(mut self) -> Result<(), ConversationError> {
        let reply_route = self.reply_route(Performative::Reply);
        let failure_route = self.reply_route(Performative::Failure);

        let mut replies = self
            .transport
            .subscribe(reply_route.clone())
            .await
            .map_err(transport_error)?;
        let mut failures = match self.transport.subscribe(failure_route.clone()).await {
            Ok(rx) => rx,
            Err(e) => {
                self.transport.unsubscribe(&reply_route).await;
                return Err(transport_error(e));
            }
        };

        let outcome = self.converse(&mut replies, &mut failures).await;

        self.transport.unsubscribe(&reply_route).await;
        self.transport.unsubscribe(&failure_route).await;
        outcome
    }

    async fn converse(
        &mut self,
        replies: &mut Receiver<Envelope>,
        failures: &mut Receiver<Envelope>,
    ) -> Result<(), ConversationError> {
        let body = encode_genotypes(&self.job.data).map_err(|e| ConversationError::Transport {
            reason: e.to_string(),
        })?;
        let attempts = self.config.attempts.max(1);

        loop {
            let request = Envelope::request(
                self.requester.clone(),
                self.job.worker_id.as_str(),
                Ontology::CostComputation,
                self.correlation_id,
                body.clone(),
            );

            match self.transport.send(request).await {
                Ok(()) => {
                    match tokio::time::timeout(
                        self.config.reply_timeout,
                        next_reply(replies, failures),
                    )
                    .await
                    {
                        Ok(Some(envelope)) => match self.accept(&envelope) {
                            Ok(values) => {
                                self.job.result = values;
                                self.manager.job_done(&self.job).await?;
                                debug!(
                                    "Conversation {}: Job {} completed by {}",
                                    self.correlation_id, self.job.job_id, envelope.sender
                                );
                                return Ok(());
                            }
                            Err(e) => {
                                warn!(
                                    "Conversation {}: Rejected reply from {}: {}",
                                    self.correlation_id, envelope.sender, e
                                );
                                self.record_failed_attempt(Some(&e));
                            }
                        },
                        Ok(None) => {
                            return Err(ConversationError::Transport {
                                reason: "reply channel closed".to_string(),
                            });
                        }
                        Err(_) => {
                            debug!(
                                "Conversation {}: No reply from {} within {:?}",
                                self.correlation_id, self.job.worker_id, self.config.reply_timeout
                            );
                            self.record_failed_attempt(None);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Conversation {}: Failed to send request to {}: {}",
                        self.correlation_id, self.job.worker_id, e
                    );
                    self.record_failed_attempt(None);
                }
            }

            self.attempt_count += 1;
            if self.attempt_count >= attempts {
                self.reassign().await?;
            }
        }
    }

    async fn reassign(&mut self) -> Result<(), ConversationError> {
        match self.config.max_reassignments {
            Some(limit) if self.reassignments >= limit => {
                let error = ConversationError::ReassignmentLimitExceeded {
                    job_id: self.job.job_id,
                    limit,
                };
                self.manager
                    .abort_batch(self.job.batch_id, &error.to_string())
                    .await;
                return Err(error);
            }
            _ => {}
        }

        let previous = self.job.worker_id.clone();
        self.job = self.manager.job_failed(&self.job).await?;
        self.reassignments += 1;
        self.attempt_count = 0;

        info!(
            "Conversation {}: Job {} moved from {} to {} (reassignment {})",
            self.correlation_id,
            self.job.job_id,
            previous,
            self.job.worker_id,
            self.reassignments
        );
        Ok(())
    }

    /// `None` means the worker never answered.
    fn record_failed_attempt(&self, error: Option<&ProtocolError>) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let worker = self.job.worker_id.as_str();
        match error {
            Some(ProtocolError::RemoteFailure { .. }) => metrics.inc_remote_failures(worker),
            Some(_) => metrics.inc_rejected_replies(worker),
            None => metrics.inc_reply_timeouts(worker),
        }
    }

    fn accept(&self, envelope: &Envelope) -> Result<Vec<f64>, ProtocolError> {
        match envelope.performative {
            Performative::Reply => decode_fitness(&envelope.body, self.job.len()),
            Performative::Failure => Err(ProtocolError::RemoteFailure {
                reason: envelope.body.clone(),
            }),
            other => Err(ProtocolError::UnexpectedPerformative {
                expected: "reply",
                actual: other.to_string(),
            }),
        }
    }

    fn reply_route(&self, performative: Performative) -> Route {
        Route::correlated(
            self.requester.clone(),
            performative,
            Ontology::CostComputation,
            self.correlation_id,
        )
    }
}

async fn next_reply(
    replies: &mut Receiver<Envelope>,
    failures: &mut Receiver<Envelope>,
) -> Option<Envelope> {
    tokio::select! {
        Some(envelope) = replies.recv() => Some(envelope),
        Some(envelope) = failures.recv() => Some(envelope),
        else => None,
    }
}

fn transport_error(error: anyhow::Error) -> ConversationError {
    ConversationError::Transport {
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::optimization::job_manager::JobManager;
    use crate::domain::errors::JobManagerError;
    use crate::domain::optimization::{Genotype, WorkerId};
    use crate::infrastructure::message_bus::MessageBus;

    fn fast_config() -> ConversationConfig {
        ConversationConfig {
            reply_timeout: Duration::from_millis(40),
            attempts: 2,
            max_reassignments: Some(4),
        }
    }

    /// Answers every request on `address` by echoing short windows as fitness.
    async fn echo_worker(bus: &MessageBus, address: &str) -> JoinHandle<()> {
        let mut requests = bus
            .subscribe(Route::any(
                address,
                Performative::Request,
                Ontology::CostComputation,
            ))
            .await
            .unwrap();
        let bus = bus.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let genotypes: Vec<Genotype> = serde_json::from_str(&request.body).unwrap();
                let values: Vec<f64> = genotypes.iter().map(|g| g.short_window as f64).collect();
                let reply = request.reply(serde_json::to_string(&values).unwrap());
                bus.send(reply).await.unwrap();
            }
        })
    }

    fn manager(workers: &[&str]) -> SharedJobManager {
        SharedJobManager::new(JobManager::new(
            workers.iter().map(|w| WorkerId::from(*w)),
        ))
    }

    #[tokio::test]
    async fn test_successful_exchange_completes_job() {
        let bus = MessageBus::new();
        let _worker = echo_worker(&bus, "w0").await;
        let manager = manager(&["w0"]);
        let jobs = manager
            .create_jobs(&[Genotype::new(3, 9), Genotype::new(5, 20)], None)
            .await
            .unwrap();

        Conversation::new(
            "optimizer",
            jobs[0].clone(),
            manager.clone(),
            Arc::new(bus.clone()),
            fast_config(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(manager.jobs_finished().await.unwrap(), vec![3.0, 5.0]);
        // reply routes are released
        assert_eq!(bus.route_count().await, 1);
    }

    #[tokio::test]
    async fn test_silent_worker_triggers_reassignment() {
        let bus = MessageBus::new();
        let _worker = echo_worker(&bus, "w1").await;
        let manager = manager(&["w0", "w1"]);
        let jobs = manager
            .create_jobs(&[Genotype::new(7, 9)], Some(1))
            .await
            .unwrap();
        assert_eq!(jobs[0].worker_id, WorkerId::from("w0"));

        Conversation::new(
            "optimizer",
            jobs[0].clone(),
            manager.clone(),
            Arc::new(bus),
            fast_config(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(manager.jobs_finished().await.unwrap(), vec![7.0]);
    }

    #[tokio::test]
    async fn test_failure_reply_counts_as_failed_attempt() {
        let bus = MessageBus::new();
        let mut requests = bus
            .subscribe(Route::any(
                "w0",
                Performative::Request,
                Ontology::CostComputation,
            ))
            .await
            .unwrap();
        let failing_bus = bus.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                failing_bus
                    .send(request.failure("no prices"))
                    .await
                    .unwrap();
            }
        });
        let _healthy = echo_worker(&bus, "w1").await;

        let manager = manager(&["w0", "w1"]);
        let jobs = manager
            .create_jobs(&[Genotype::new(2, 4)], Some(1))
            .await
            .unwrap();
        let metrics = Metrics::new().unwrap();

        Conversation::new(
            "optimizer",
            jobs[0].clone(),
            manager.clone(),
            Arc::new(bus),
            ConversationConfig {
                reply_timeout: Duration::from_secs(5),
                ..fast_config()
            },
        )
        .with_metrics(metrics.clone())
        .run()
        .await
        .unwrap();

        assert_eq!(manager.jobs_finished().await.unwrap(), vec![2.0]);
        let failures = &metrics.worker_failures_total;
        assert_eq!(failures.with_label_values(&["w0", "failure"]).get(), 2.0);
        assert_eq!(failures.with_label_values(&["w0", "timeout"]).get(), 0.0);
        assert_eq!(metrics.reply_timeouts_total.get(), 0.0);
    }

    #[tokio::test]
    async fn test_misaligned_reply_is_not_accepted() {
        let bus = MessageBus::new();
        let mut requests = bus
            .subscribe(Route::any(
                "w0",
                Performative::Request,
                Ontology::CostComputation,
            ))
            .await
            .unwrap();
        let short_bus = bus.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                short_bus
                    .send(request.reply("[1.0]".to_string()))
                    .await
                    .unwrap();
            }
        });

        let manager = manager(&["w0"]);
        let jobs = manager
            .create_jobs(&[Genotype::new(2, 4), Genotype::new(3, 6)], None)
            .await
            .unwrap();

        let metrics = Metrics::new().unwrap();
        let err = Conversation::new(
            "optimizer",
            jobs[0].clone(),
            manager.clone(),
            Arc::new(bus),
            ConversationConfig {
                reply_timeout: Duration::from_secs(5),
                max_reassignments: Some(1),
                ..fast_config()
            },
        )
        .with_metrics(metrics.clone())
        .run()
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ConversationError::ReassignmentLimitExceeded { limit: 1, .. }
        ));
        assert!(!manager.is_batch_open().await);
        // two attempts before and after the one reassignment
        let failures = &metrics.worker_failures_total;
        assert_eq!(failures.with_label_values(&["w0", "rejected"]).get(), 4.0);
        assert_eq!(metrics.reply_timeouts_total.get(), 0.0);
    }

    #[tokio::test]
    async fn test_reassignment_limit_aborts_batch() {
        let bus = MessageBus::new();
        let manager = manager(&["w0", "w1"]);
        let jobs = manager
            .create_jobs(&[Genotype::new(2, 4), Genotype::new(3, 5)], None)
            .await
            .unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.jobs_finished().await })
        };

        let err = Conversation::new(
            "optimizer",
            jobs[0].clone(),
            manager.clone(),
            Arc::new(bus),
            ConversationConfig {
                reply_timeout: Duration::from_millis(10),
                attempts: 1,
                max_reassignments: Some(2),
            },
        )
        .run()
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ConversationError::ReassignmentLimitExceeded { job_id: 0, limit: 2 }
        ));
        assert!(matches!(
            waiter.await.unwrap(),
            Err(JobManagerError::BatchAborted { .. })
        ));
    }

    #[tokio::test]
    async fn test_straggler_from_aborted_batch_cannot_abort_newer_batch() {
        let bus = MessageBus::new();
        let manager = manager(&["ghost"]);
        let stale = manager
            .create_jobs(&[Genotype::new(2, 4)], None)
            .await
            .unwrap();
        let straggler = Conversation::new(
            "optimizer",
            stale[0].clone(),
            manager.clone(),
            Arc::new(bus),
            ConversationConfig {
                reply_timeout: Duration::from_millis(30),
                attempts: 1,
                max_reassignments: Some(0),
            },
        )
        .spawn();

        manager.abort_batch(stale[0].batch_id, "deadline").await;
        let current = manager
            .create_jobs(&[Genotype::new(3, 6)], None)
            .await
            .unwrap();

        let err = straggler.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ConversationError::ReassignmentLimitExceeded { limit: 0, .. }
        ));
        assert!(manager.is_batch_open().await);
        assert_eq!(manager.outstanding_jobs().await, current.len());
    }

    #[test]
    fn test_default_config() {
        let config = ConversationConfig::default();
        assert_eq!(config.reply_timeout, Duration::from_secs(25));
        assert_eq!(config.attempts, 2);
        assert_eq!(config.max_reassignments, Some(16));
    }
}
