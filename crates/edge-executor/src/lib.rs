//! Network-first fetch handling.
//!
//! This crate decides how each intercepted request is answered:
//! - `NetworkFirst` - Network with timeout, cache on failure
//! - `FetchOutcome` - The response plus the state the request ended in
//! - `OfflineFallback` - What to serve when neither network nor cache can

mod fallback;
mod strategy;

pub use fallback::*;
pub use strategy::*;
