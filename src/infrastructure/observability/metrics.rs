//! Prometheus metrics definitions for crossfarm
//!
//! All metrics use the `crossfarm_` prefix and are read-only.

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the fitness dispatch core
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Jobs handed out by the job manager
    pub jobs_created_total: Counter,
    /// Jobs reported done
    pub jobs_completed_total: Counter,
    /// Jobs moved away from a failing worker
    pub job_reassignments_total: Counter,
    /// Attempts that got no reply in time or could not be sent
    pub reply_timeouts_total: Counter,
    /// Per-worker failures by kind: timeout, failure, rejected, reassigned
    pub worker_failures_total: CounterVec,
    /// Completed generations
    pub generations_total: Counter,
    /// Best fitness of the latest generation
    pub best_fitness: GenericGauge<AtomicF64>,
    /// Workers currently marked available
    pub workers_available: GenericGauge<AtomicF64>,
    /// Wall time from create_jobs to jobs_finished
    pub batch_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let jobs_created_total = Counter::with_opts(Opts::new(
            "crossfarm_jobs_created_total",
            "Total jobs created",
        ))?;
        registry.register(Box::new(jobs_created_total.clone()))?;

        let jobs_completed_total = Counter::with_opts(Opts::new(
            "crossfarm_jobs_completed_total",
            "Total jobs reported done",
        ))?;
        registry.register(Box::new(jobs_completed_total.clone()))?;

        let job_reassignments_total = Counter::with_opts(Opts::new(
            "crossfarm_job_reassignments_total",
            "Jobs reassigned away from a failing worker",
        ))?;
        registry.register(Box::new(job_reassignments_total.clone()))?;

        let reply_timeouts_total = Counter::with_opts(Opts::new(
            "crossfarm_reply_timeouts_total",
            "Cost computation attempts without any reply",
        ))?;
        registry.register(Box::new(reply_timeouts_total.clone()))?;

        let worker_failures_total = CounterVec::new(
            Opts::new(
                "crossfarm_worker_failures_total",
                "Failures per worker by kind",
            ),
            &["worker", "kind"],
        )?;
        registry.register(Box::new(worker_failures_total.clone()))?;

        let generations_total = Counter::with_opts(Opts::new(
            "crossfarm_generations_total",
            "Completed optimizer generations",
        ))?;
        registry.register(Box::new(generations_total.clone()))?;

        let best_fitness = Gauge::with_opts(Opts::new(
            "crossfarm_best_fitness",
            "Best fitness of the latest generation",
        ))?;
        registry.register(Box::new(best_fitness.clone()))?;

        let workers_available = Gauge::with_opts(Opts::new(
            "crossfarm_workers_available",
            "Workers currently marked available",
        ))?;
        registry.register(Box::new(workers_available.clone()))?;

        let batch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "crossfarm_batch_duration_seconds",
                "Time from job creation to batch completion",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        )?;
        registry.register(Box::new(batch_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            jobs_created_total,
            jobs_completed_total,
            job_reassignments_total,
            reply_timeouts_total,
            worker_failures_total,
            generations_total,
            best_fitness,
            workers_available,
            batch_duration_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    /// Record a job moved away from `worker`
    pub fn inc_reassignments(&self, worker: &str) {
        self.job_reassignments_total.inc();
        self.worker_failures_total
            .with_label_values(&[worker, "reassigned"])
            .inc();
    }

    /// Record an attempt against `worker` that got no reply
    pub fn inc_reply_timeouts(&self, worker: &str) {
        self.reply_timeouts_total.inc();
        self.worker_failures_total
            .with_label_values(&[worker, "timeout"])
            .inc();
    }

    /// Record a `Failure` answer from `worker`
    pub fn inc_remote_failures(&self, worker: &str) {
        self.worker_failures_total
            .with_label_values(&[worker, "failure"])
            .inc();
    }

    /// Record a reply from `worker` that could not be accepted
    pub fn inc_rejected_replies(&self, worker: &str) {
        self.worker_failures_total
            .with_label_values(&[worker, "rejected"])
            .inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default Metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        assert!(metrics.render().contains("crossfarm_"));
    }

    #[test]
    fn test_best_fitness_update() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.best_fitness.set(125.0);
        let output = metrics.render();
        assert!(output.contains("crossfarm_best_fitness 125"));
    }

    #[test]
    fn test_labelled_totals() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_reassignments("worker-0");
        metrics.inc_reassignments("worker-1");
        metrics.inc_reassignments("worker-0");
        metrics.inc_reply_timeouts("worker-0");

        assert_eq!(metrics.job_reassignments_total.get(), 3.0);
        assert_eq!(metrics.reply_timeouts_total.get(), 1.0);
        assert!(metrics.render().contains("worker-1"));
    }

    #[test]
    fn test_answered_failures_are_not_timeouts() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_remote_failures("worker-0");
        metrics.inc_rejected_replies("worker-0");
        metrics.inc_rejected_replies("worker-0");

        let failures = &metrics.worker_failures_total;
        assert_eq!(failures.with_label_values(&["worker-0", "failure"]).get(), 1.0);
        assert_eq!(failures.with_label_values(&["worker-0", "rejected"]).get(), 2.0);
        assert_eq!(failures.with_label_values(&["worker-0", "timeout"]).get(), 0.0);
        assert_eq!(metrics.reply_timeouts_total.get(), 0.0);
    }
}
