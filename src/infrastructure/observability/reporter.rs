//! Push-based metrics reporter for crossfarm
//!
//! Periodically outputs dispatch metrics as structured JSON to stdout.

use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Metrics snapshot for JSON output
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub dispatch: DispatchSnapshot,
}

#[derive(Debug, Serialize)]
pub struct DispatchSnapshot {
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub reassignments: u64,
    pub reply_timeouts: u64,
    pub generations: u64,
    pub best_fitness: f64,
    pub workers_available: u64,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
pub struct MetricsReporter {
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    /// Run the reporter in a loop, outputting metrics periodically
    pub async fn run(self) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::time::sleep(self.interval).await;
            self.report();
        }
    }

    /// Emit one snapshot
    pub fn report(&self) {
        let snapshot = self.collect_snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                // prefix lets log shippers filter metric lines
                println!("METRICS_JSON:{}", json);
                info!(
                    "Dispatch: {} jobs done / {} created | {} reassignments | best fitness {:.4}",
                    snapshot.dispatch.jobs_completed,
                    snapshot.dispatch.jobs_created,
                    snapshot.dispatch.reassignments,
                    snapshot.dispatch.best_fitness
                );
            }
            Err(e) => warn!("Failed to serialize metrics: {}", e),
        }
    }

    fn collect_snapshot(&self) -> MetricsSnapshot {
        let m = &self.metrics;
        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            dispatch: DispatchSnapshot {
                jobs_created: m.jobs_created_total.get() as u64,
                jobs_completed: m.jobs_completed_total.get() as u64,
                reassignments: m.job_reassignments_total.get() as u64,
                reply_timeouts: m.reply_timeouts_total.get() as u64,
                generations: m.generations_total.get() as u64,
                best_fitness: m.best_fitness.get(),
                workers_available: m.workers_available.get() as u64,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot_collection() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.jobs_created_total.inc_by(4.0);
        metrics.jobs_completed_total.inc_by(3.0);
        metrics.best_fitness.set(17.5);

        let reporter = MetricsReporter::new(metrics, 60);
        let snapshot = reporter.collect_snapshot();

        assert_eq!(snapshot.dispatch.jobs_created, 4);
        assert_eq!(snapshot.dispatch.jobs_completed, 3);
        assert_eq!(snapshot.dispatch.best_fitness, 17.5);
        assert!(!snapshot.timestamp.is_empty());
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = MetricsSnapshot {
            timestamp: "2026-01-10T10:00:00Z".to_string(),
            uptime_seconds: 3600,
            version: "0.3.1".to_string(),
            dispatch: DispatchSnapshot {
                jobs_created: 40,
                jobs_completed: 38,
                reassignments: 2,
                reply_timeouts: 4,
                generations: 20,
                best_fitness: 512.0,
                workers_available: 3,
            },
        };

        let json = serde_json::to_string(&snapshot).expect("Failed to serialize");
        assert!(json.contains("\"reassignments\":2"));
        assert!(json.contains("512"));
    }
}
