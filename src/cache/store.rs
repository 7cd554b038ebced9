//! # Cache Backing Stores
//!
//! Capability seam for the key-value store behind the cache gateway. The
//! gateway never branches on "is the store up?"; absence of a backing
//! store is just the `NoopStore` implementation, selected at startup.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::time::{Duration, Instant};

/// Failure talking to the backing store. The gateway absorbs these
/// (fail-open); they never reach orchestration callers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key-value contract: get, set-with-TTL, delete-by-pattern.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
    /// Remove every key matching a glob pattern (`*` wildcard). Returns the
    /// number removed.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, StoreError>;
}

/// Store used when caching is disabled or the real backing store is absent.
/// Every lookup misses, every write succeeds silently.
#[derive(Debug, Default, Clone)]
pub struct NoopStore;

#[async_trait]
impl CacheStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete_matching(&self, _pattern: &str) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Instant,
}

/// In-process store. Entries expire lazily on read and are swept
/// opportunistically on write, so a quiet cache holds dead entries only
/// until the next write touches it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

/// Compile a glob pattern (`*` wildcard only) to an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, StoreError> {
    let literal_parts: Vec<String> = pattern.split('*').map(|p| regex::escape(p)).collect();
    let expr = format!("^{}$", literal_parts.join(".*"));
    Regex::new(&expr).map_err(|e| StoreError::Unavailable(format!("bad pattern: {e}")))
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired or absent; drop the dead entry if present.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.sweep_expired();
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, StoreError> {
        let matcher = glob_to_regex(pattern)?;
        let before = self.entries.len();
        self.entries.retain(|key, _| !matcher.is_match(key));
        Ok(before - self.entries.len())
    }
}
