//! # Cache Gateway
//!
//! Content-addressed cache of prior AI responses. Keys are a stable
//! fingerprint of (task type, normalized prompt, canonical context) so an
//! identical question hits regardless of which backend answered it last
//! time. The gateway is strictly best-effort: store failures are logged
//! and counted, never surfaced to orchestration callers.

use crate::cache::store::CacheStore;
use crate::config::CacheConfig;
use crate::metrics::{MetricLabels, MetricsSink};
use crate::models::{ModelResponse, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the gateway persists per fingerprint. Expiry itself is enforced by
/// the backing store's TTL; `created_at` rides along for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: ModelResponse,
    pub created_at: DateTime<Utc>,
}

pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl CacheGateway {
    pub fn new(
        store: Arc<dyn CacheStore>,
        config: CacheConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    /// Stable cache key for a task: `ai_cache:{task_type}:{hash16}`.
    ///
    /// The hash covers the task type, the normalized prompt, and the
    /// context in canonical (sorted-key) JSON. The serving backend is
    /// deliberately excluded so a hit can be served across failovers.
    pub fn fingerprint(&self, task: &Task) -> String {
        let normalized_prompt = normalize_prompt(&task.prompt);
        let context_json =
            serde_json::to_string(&task.context).unwrap_or_else(|_| "{}".to_string());

        let mut hasher = Sha256::new();
        hasher.update(task.task_type.as_str().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(normalized_prompt.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(context_json.as_bytes());
        let digest = hasher.finalize();

        let mut hash16 = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            hash16.push_str(&format!("{byte:02x}"));
        }
        format!("ai_cache:{}:{hash16}", task.task_type)
    }

    /// Fetch a prior response for an identical task, if one is still live.
    ///
    /// Never errors: store unavailability counts as a miss and is reported
    /// to the metrics sink as `cache_unavailable` (fail-open).
    pub async fn lookup(&self, task: &Task) -> Option<ModelResponse> {
        let key = self.fingerprint(task);
        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => {
                    debug!(key = %key, "✅ Cache HIT");
                    self.incr("cache_hits", task);
                    Some(entry.payload)
                }
                Err(e) => {
                    // Corrupt entry: treat as a miss and evict it.
                    warn!(key = %key, error = %e, "Corrupt cache entry dropped");
                    let _ = self.store.delete_matching(&key).await;
                    self.incr("cache_misses", task);
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache MISS");
                self.incr("cache_misses", task);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache unavailable, failing open");
                self.incr("cache_unavailable", task);
                None
            }
        }
    }

    /// Store a response under the task's fingerprint with the task-type TTL.
    ///
    /// The write happens on a detached task so a cancelled caller still
    /// populates the cache; errors are logged, never propagated.
    pub fn store(&self, task: &Task, payload: &ModelResponse) {
        let key = self.fingerprint(task);
        let ttl = self.config.ttl_for(task.task_type);
        let entry = CacheEntry {
            payload: payload.clone(),
            created_at: Utc::now(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.set(&key, raw, ttl).await {
                Ok(()) => {
                    debug!(key = %key, ttl_secs = ttl.as_secs(), "✅ Cached response")
                }
                Err(e) => warn!(key = %key, error = %e, "Cache store failed"),
            }
        });
    }

    /// Remove every entry matching a glob pattern. Returns count removed;
    /// zero on store unavailability (and on repeat invalidations).
    pub async fn invalidate(&self, pattern: &str) -> usize {
        match self.store.delete_matching(pattern).await {
            Ok(removed) => {
                info!(pattern = %pattern, removed, "🧹 Cache invalidated");
                removed
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    fn incr(&self, name: &str, task: &Task) {
        self.metrics.incr_counter(
            name,
            &MetricLabels::new("", task.task_type.as_str(), ""),
        );
    }
}

/// Trim, collapse internal whitespace, and bound the prompt to its first
/// 500 characters so trivially reformatted prompts share a fingerprint.
fn normalize_prompt(prompt: &str) -> String {
    let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(500).collect()
}
