//! Core abstractions for the edge worker cache manager.
//!
//! This crate provides the fundamental types shared by every layer:
//! - `FetchRequest` / `FetchResponse` - Host-level request and response values
//! - `WorkerConfig` - Deploy-time worker configuration
//! - `LifecycleEvent` - Host-delivered lifecycle signals
//! - `WorkerState` - Worker lifecycle tracking
//! - `FetchState` - Per-request network-first state machine

mod config;
mod context;
mod error;
mod lifecycle;

pub use config::*;
pub use context::*;
pub use error::*;
pub use lifecycle::*;
