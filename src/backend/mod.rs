//! # Backend Registry and Call Interface
//!
//! The seam between the orchestration core and external AI model providers.
//! Each provider is a `ModelBackend` trait object carrying a static
//! `BackendSpec` (capability flags, cost, nominal latency); the registry is
//! built once at startup and read-only afterwards. Transport concerns
//! (HTTP clients, SDKs, keys) live behind the trait; the core only sees
//! `invoke` and a typed `BackendError`.

use crate::models::{ModelResponse, TaskType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Typed transport failure from a backend call.
///
/// Timeouts are classified separately so operators can tell a slow provider
/// from a broken one, but the breaker treats every variant identically.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("provider error (status {status}): {message}")]
    Provider { status: u16, message: String },
}

/// Static description of a registered backend. Loaded at startup, read-only
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub id: String,
    /// Task types this backend can serve.
    pub capabilities: Vec<TaskType>,
    /// USD per 1k tokens; drives fallback ordering.
    pub cost_per_1k_tokens: f64,
    /// Largest output the backend can produce.
    pub max_tokens: u64,
    /// Typical round-trip latency; call timeouts derive from this.
    pub nominal_latency: Duration,
}

impl BackendSpec {
    pub fn supports(&self, task_type: TaskType) -> bool {
        self.capabilities.contains(&task_type)
    }
}

/// An external AI model endpoint capable of serving one or more task types.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn spec(&self) -> &BackendSpec;

    /// Perform the model call. Implementations report network, timeout, and
    /// provider failures through `BackendError`; they never panic on bad
    /// provider output.
    async fn invoke(
        &self,
        prompt: &str,
        context: &std::collections::BTreeMap<String, serde_json::Value>,
    ) -> Result<ModelResponse, BackendError>;
}

/// Process-scoped, read-only registry of backends, keyed by id.
///
/// Built once at startup and handed to the router and orchestrator by
/// reference, no ambient singleton.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        let id = backend.spec().id.clone();
        tracing::info!(
            backend = %id,
            capabilities = backend.spec().capabilities.len(),
            cost_per_1k = backend.spec().cost_per_1k_tokens,
            "🔌 Backend registered"
        );
        self.backends.insert(id, backend);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn ModelBackend>> {
        self.backends.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn specs(&self) -> impl Iterator<Item = &BackendSpec> {
        self.backends.values().map(|b| b.spec())
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Default specs mirroring the production model fleet. Providers wire real
/// clients to these ids; tests substitute mocks with the same specs.
pub fn default_specs() -> Vec<BackendSpec> {
    let all = TaskType::ALL.to_vec();
    vec![
        BackendSpec {
            id: "gpt-4o".to_string(),
            capabilities: all.clone(),
            cost_per_1k_tokens: 0.005,
            max_tokens: 128_000,
            nominal_latency: Duration::from_millis(800),
        },
        BackendSpec {
            id: "gpt-4-turbo".to_string(),
            capabilities: all.clone(),
            cost_per_1k_tokens: 0.01,
            max_tokens: 128_000,
            nominal_latency: Duration::from_millis(1_000),
        },
        BackendSpec {
            id: "claude-3-sonnet".to_string(),
            capabilities: all.clone(),
            cost_per_1k_tokens: 0.003,
            max_tokens: 200_000,
            nominal_latency: Duration::from_millis(600),
        },
        BackendSpec {
            id: "gemini-pro".to_string(),
            capabilities: all,
            cost_per_1k_tokens: 0.000_25,
            max_tokens: 32_000,
            nominal_latency: Duration::from_millis(500),
        },
    ]
}
