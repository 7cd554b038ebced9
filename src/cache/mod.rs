//! # Response Cache
//!
//! Content-addressed caching of AI responses with task-type-specific TTLs.
//! Split into the `CacheStore` capability (real store vs. no-op) and the
//! `CacheGateway` policy layer (fingerprinting, TTL selection, fail-open
//! behavior).

pub mod gateway;
pub mod store;

pub use gateway::{CacheEntry, CacheGateway};
pub use store::{CacheStore, MemoryStore, NoopStore, StoreError};
