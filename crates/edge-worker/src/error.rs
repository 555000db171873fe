//! Error types for the worker.

use edge_cache::{SkipReason, StorageError};
use edge_core::{ConfigError, WorkerState};
use edge_data::NetworkError;
use thiserror::Error;

/// Errors surfaced by lifecycle handling.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The event is not legal in the worker's current state.
    #[error("cannot handle {event} while {state}")]
    InvalidTransition {
        event: &'static str,
        state: WorkerState,
    },

    /// The new generation could not be opened.
    #[error("install failed: {0}")]
    Install(#[source] StorageError),

    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Why one manifest URL was not precached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrecacheError {
    #[error("{0}")]
    Network(NetworkError),

    #[error("server answered {0}")]
    Status(u16),

    #[error("not cacheable: {0}")]
    NotCacheable(SkipReason),

    #[error("storage: {0}")]
    Storage(String),

    #[error("install timed out")]
    TimedOut,
}

/// A manifest URL that failed to precache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("precache of {url} failed: {error}")]
pub struct PrecacheFailure {
    pub url: String,
    pub error: PrecacheError,
}
