//! Generation-scoped cache storage for the edge worker.
//!
//! This crate provides:
//! - `RequestKey` / `RequestKeyBuilder` - Normalized request identity
//! - `StoredResponse` - A response copy owned by one generation
//! - `CacheStore` - The storage contract, keyed by `GenerationId`
//! - `InMemoryCacheStore` / `FileCacheStore` - Store implementations
//! - `StoragePolicy` - Which responses may be stored
//! - `CacheExplainHeaders` - Debug headers describing how a response was served
//!
//! # Example
//!
//! ```ignore
//! use edge_cache::{
//!     CacheStore, GenerationId, InMemoryCacheStore, RequestKeyBuilder, StoredResponse,
//! };
//!
//! let store = InMemoryCacheStore::new();
//! let handle = store.open(&GenerationId::new("edge-cache-v1")).await?;
//!
//! let key = RequestKeyBuilder::new().vary_on("Accept-Language").build(&request);
//! store.put(&handle, &key, StoredResponse::from_response(&response)).await?;
//! ```

mod error;
mod file;
mod headers;
mod key;
mod memory;
mod policy;
mod response;
mod store;

pub use error::*;
pub use file::*;
pub use headers::*;
pub use key::*;
pub use memory::*;
pub use policy::*;
pub use response::*;
pub use store::*;
