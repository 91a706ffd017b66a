//! Push-based observability for crossfarm
//!
//! Metrics are pushed as structured JSON logs; nothing listens for requests.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
