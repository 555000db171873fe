//! Logging and metrics for the edge worker.
//!
//! This crate provides:
//! - `init_logging` - Installs a `tracing` subscriber (JSON or human output)
//! - `WorkerMetrics` - Counters for how fetches, writes and lifecycle steps went

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
