//! Network access with timeouts and retries for the edge worker.
//!
//! This crate provides:
//! - `Network` - The transport seam the worker fetches through
//! - `FetchClient` - Timeout and retry wrapper around a `Network`
//! - `HttpNetwork` - `reqwest`-backed transport
//! - `StaticNetwork` - In-memory transport for development/testing
//! - `TimeoutConfig` - Per-attempt timeouts
//! - `RetryPolicy` - Retry strategies

mod client;
mod http_network;
mod retry;
mod static_network;
mod timeout;

pub use client::*;
pub use http_network::*;
pub use retry::*;
pub use static_network::*;
pub use timeout::*;
