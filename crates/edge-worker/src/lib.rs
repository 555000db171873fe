//! Network-first cache manager for a service-worker style host.
//!
//! This crate ties the worker together:
//! - `GenerationManager` - Versioned generations, precache and eviction
//! - `LifecycleController` - Dispatch of install, activate and fetch
//! - `WorkerHost` - Signals sent back to the host
//!
//! ```ignore
//! use edge_worker::prelude::*;
//!
//! let config = WorkerConfig::load("worker.toml")?;
//! let worker = LifecycleController::new(config, network, store)?;
//!
//! worker.dispatch(LifecycleEvent::Install).await?;
//! worker.dispatch(LifecycleEvent::Activate).await?;
//! let outcome = worker.fetch(&FetchRequest::get("/app.js")).await;
//! ```

mod controller;
mod error;
mod generation;

pub use controller::*;
pub use error::*;
pub use generation::*;

pub use edge_cache;
pub use edge_core;
pub use edge_data;
pub use edge_executor;
pub use edge_observability;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::*;
    pub use edge_cache::*;
    pub use edge_core::*;
    pub use edge_data::*;
    pub use edge_executor::*;
    pub use edge_observability::*;
}
