//! # Relay Configuration System
//!
//! Layered configuration for the orchestration core. Defaults carry the
//! production constants (TTL policy, breaker thresholds, tier quota table)
//! so the crate is fully functional with no config file; an optional
//! `config/relay.toml` and `RELAY_`-prefixed environment variables override
//! them, environment winning.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use model_relay::config::RelayConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::load()?;
//! let ttl = config.cache.ttl_for(model_relay::TaskType::CodeReview);
//! # Ok(())
//! # }
//! ```

use crate::error::{RelayError, Result};
use crate::models::{TaskType, Tier};
use crate::quota::TierLimits;
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub cache: CacheConfig,
    pub breakers: BreakerSettings,
    pub quotas: QuotaSettings,
    pub router: RouterConfig,
    pub validation: ValidationConfig,
}

impl RelayConfig {
    /// Load configuration with standard layering: built-in defaults, then
    /// `config/relay.toml` if present, then `RELAY_*` environment variables
    /// (`__` as section separator, e.g. `RELAY_CACHE__ENABLED=false`).
    pub fn load() -> Result<Self> {
        Self::load_from(std::path::Path::new("config/relay.toml"))
    }

    /// Load with an explicit config file path (still optional).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(config::Environment::with_prefix("RELAY").separator("__"));

        let loaded = builder
            .build()
            .map_err(|e| RelayError::Configuration(format!("failed to read configuration: {e}")))?;

        let config: RelayConfig = loaded
            .try_deserialize()
            .map_err(|e| RelayError::Configuration(format!("invalid configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would violate core invariants.
    pub fn validate(&self) -> Result<()> {
        if self.breakers.default.failure_threshold == 0 {
            return Err(RelayError::Configuration(
                "breakers.default.failure_threshold must be >= 1".into(),
            ));
        }
        if self.breakers.default.success_threshold == 0 {
            return Err(RelayError::Configuration(
                "breakers.default.success_threshold must be >= 1".into(),
            ));
        }
        if self.router.timeout_safety_factor < 1.0 {
            return Err(RelayError::Configuration(
                "router.timeout_safety_factor must be >= 1.0".into(),
            ));
        }
        self.quotas.validate()?;
        Ok(())
    }
}

/// Cache gateway tuning: enablement and the per-task-type TTL policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false the gateway is wired to the no-op store at construction.
    pub enabled: bool,
    /// Per-task-type TTL overrides, keyed by wire name.
    pub ttl_overrides_secs: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_overrides_secs: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Resolve the TTL for a task type: explicit override, then the built-in
    /// policy table, then the default.
    pub fn ttl_for(&self, task_type: TaskType) -> Duration {
        if let Some(secs) = self.ttl_overrides_secs.get(task_type.as_str()) {
            return Duration::from_secs(*secs);
        }
        let secs = match task_type {
            TaskType::StrategyAudit => 86_400,
            TaskType::RealTimeTutoring => 1_800,
            TaskType::CollaborationFacilitation => 3_600,
            TaskType::FrameworkAlignment => 7_200,
            TaskType::EthicalAssessment => 43_200,
            TaskType::CodeReview => 3_600,
            TaskType::CreativeIdeation => 7_200,
            TaskType::DocumentSynthesis => 14_400,
        };
        Duration::from_secs(secs)
    }
}

/// Circuit breaker defaults plus per-backend overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub default: CircuitBreakerConfig,
    /// Per-backend overrides keyed by backend id.
    pub overrides: HashMap<String, CircuitBreakerConfig>,
}

impl BreakerSettings {
    pub fn config_for(&self, backend_id: &str) -> CircuitBreakerConfig {
        self.overrides
            .get(backend_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Tier quota table, overridable per tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub overrides: HashMap<String, TierLimits>,
}

impl QuotaSettings {
    /// Limits for a tier: explicit override or the built-in table.
    pub fn limits_for(&self, tier: Tier) -> TierLimits {
        self.overrides
            .get(tier.as_str())
            .cloned()
            .unwrap_or_else(|| TierLimits::builtin(tier))
    }

    fn validate(&self) -> Result<()> {
        for (name, limits) in &self.overrides {
            if limits.requests_per_minute == 0 || limits.tokens_per_day == 0 {
                return Err(RelayError::Configuration(format!(
                    "quota override for tier '{name}' must have non-zero limits"
                )));
            }
        }
        Ok(())
    }
}

/// Router and backend-call tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-call timeout = backend nominal latency x this factor.
    pub timeout_safety_factor: f64,
    /// Floor so fast backends still get a workable timeout.
    pub min_call_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout_safety_factor: 10.0,
            min_call_timeout_ms: 2_000,
        }
    }
}

impl RouterConfig {
    pub fn call_timeout(&self, nominal_latency: Duration) -> Duration {
        let scaled = nominal_latency.mul_f64(self.timeout_safety_factor);
        scaled.max(Duration::from_millis(self.min_call_timeout_ms))
    }
}

/// Response quality gate tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Responses shorter than this always fail validation.
    pub min_response_length: usize,
    /// Phrases that mark a response as unusable, matched case-insensitively.
    pub denylist: Vec<String>,
    /// Minimum distinct-word ratio; filters degenerate repetition.
    pub min_distinct_word_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_response_length: 50,
            denylist: vec![
                "as an ai language model".to_string(),
                "i cannot help with that".to_string(),
            ],
            min_distinct_word_ratio: 0.2,
        }
    }
}
