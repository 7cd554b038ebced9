//! # Circuit Breaker Registry
//!
//! One breaker per backend, created lazily from configuration the first
//! time a backend is seen. The registry is the only component the
//! orchestrator and admin surface talk to; individual breakers never leak
//! outside `Arc`s handed out here.

use crate::config::BreakerSettings;
use crate::resilience::{BreakerSnapshot, CircuitBreaker};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: BreakerSettings,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
        }
    }

    /// Pre-create breakers for a known backend fleet so snapshots are
    /// complete before the first call.
    pub fn with_backends<'a>(settings: BreakerSettings, ids: impl Iterator<Item = &'a str>) -> Self {
        let registry = Self::new(settings);
        for id in ids {
            registry.get_or_create(id);
        }
        info!(breakers = registry.breakers.len(), "🛡️ Circuit breaker registry initialized");
        registry
    }

    pub fn get_or_create(&self, backend_id: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(backend_id.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    backend_id.to_string(),
                    self.settings.config_for(backend_id),
                ))
            })
            .clone()
    }

    /// True if the backend may be called right now. Consumes half-open
    /// probe budget; use [`would_allow`](Self::would_allow) for filtering.
    pub fn allow(&self, backend_id: &str) -> bool {
        self.get_or_create(backend_id).allow()
    }

    /// Non-consuming availability check for routing decisions.
    pub fn would_allow(&self, backend_id: &str) -> bool {
        self.get_or_create(backend_id).would_allow()
    }

    pub fn report_success(&self, backend_id: &str) {
        self.get_or_create(backend_id).record_success();
    }

    pub fn report_failure(&self, backend_id: &str, reason: &str) {
        self.get_or_create(backend_id).record_failure(reason);
    }

    /// Administrative override: force one breaker closed.
    pub fn reset(&self, backend_id: &str) {
        if let Some(breaker) = self.breakers.get(backend_id) {
            breaker.reset();
        }
    }

    /// Administrative override: force every breaker closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        info!(breakers = self.breakers.len(), "🚨 All circuit breakers reset");
    }

    pub fn snapshot(&self, backend_id: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(backend_id).map(|b| b.snapshot())
    }

    pub fn snapshot_all(&self) -> HashMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use std::time::Duration;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            default: CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                timeout: Duration::from_secs(60),
            },
            overrides: HashMap::new(),
        }
    }

    #[test]
    fn breakers_are_created_lazily_and_shared() {
        let registry = CircuitBreakerRegistry::new(settings());
        let a = registry.get_or_create("gpt-4o");
        let b = registry.get_or_create("gpt-4o");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn report_failure_drives_shared_state() {
        let registry = CircuitBreakerRegistry::new(settings());

        registry.report_failure("gemini-pro", "timeout");
        assert!(registry.allow("gemini-pro"));

        registry.report_failure("gemini-pro", "timeout");
        assert!(!registry.allow("gemini-pro"));
        assert_eq!(
            registry.snapshot("gemini-pro").unwrap().state,
            CircuitState::Open
        );
    }

    #[test]
    fn reset_all_closes_everything() {
        let registry =
            CircuitBreakerRegistry::with_backends(settings(), ["a", "b"].into_iter());
        registry.report_failure("a", "boom");
        registry.report_failure("a", "boom");
        registry.report_failure("b", "boom");
        registry.report_failure("b", "boom");

        registry.reset_all();
        let snapshots = registry.snapshot_all();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots
            .values()
            .all(|s| s.state == CircuitState::Closed));
    }

    #[test]
    fn snapshot_of_unknown_backend_is_none() {
        let registry = CircuitBreakerRegistry::new(settings());
        assert!(registry.snapshot("never-seen").is_none());
    }
}
