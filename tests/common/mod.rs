//! Shared test fixtures: scripted mock backends and orchestrator builders.

use async_trait::async_trait;
use model_relay::backend::{BackendError, BackendRegistry, BackendSpec, ModelBackend};
use model_relay::config::RelayConfig;
use model_relay::metrics::MemorySink;
use model_relay::models::ModelResponse;
use model_relay::Orchestrator;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a scripted backend returns on each call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed with a response long and varied enough to pass validation.
    Succeed { tokens_used: u64 },
    /// Succeed at transport level with content that fails validation.
    SucceedInvalid,
    /// Return a transport error.
    Fail,
    /// Sleep past any reasonable timeout before answering.
    Hang,
}

/// Call-counting backend that follows a runtime-switchable script.
pub struct ScriptedBackend {
    spec: BackendSpec,
    calls: AtomicU64,
    failing: AtomicBool,
    script: Script,
}

impl ScriptedBackend {
    pub fn new(spec: BackendSpec, script: Script) -> Arc<Self> {
        Arc::new(Self {
            spec,
            calls: AtomicU64::new(0),
            failing: AtomicBool::new(false),
            script,
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Flip the backend into (or out of) forced transport failure,
    /// overriding its script.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    async fn invoke(
        &self,
        prompt: &str,
        _context: &BTreeMap<String, Value>,
    ) -> Result<ModelResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("forced outage".to_string()));
        }
        match &self.script {
            Script::Succeed { tokens_used } => Ok(ModelResponse {
                text: format!(
                    "[{}] Considered analysis of the request follows, with concrete findings, \
                     clear recommendations, and a short summary of next steps for: {prompt}",
                    self.spec.id
                ),
                tokens_used: *tokens_used,
            }),
            Script::SucceedInvalid => Ok(ModelResponse {
                text: "As an AI language model, I cannot help with that.".to_string(),
                tokens_used: 5,
            }),
            Script::Fail => Err(BackendError::Provider {
                status: 500,
                message: "internal error".to_string(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("callers time out long before this")
            }
        }
    }
}

/// The production fleet as scripted mocks, returned alongside handles so
/// tests can count calls and force outages per backend.
pub fn scripted_fleet(script: Script) -> (BackendRegistry, Vec<Arc<ScriptedBackend>>) {
    let mut registry = BackendRegistry::new();
    let mut handles = Vec::new();
    for spec in model_relay::backend::default_specs() {
        let backend = ScriptedBackend::new(spec, script.clone());
        registry.register(backend.clone());
        handles.push(backend);
    }
    (registry, handles)
}

pub fn handle<'a>(handles: &'a [Arc<ScriptedBackend>], id: &str) -> &'a Arc<ScriptedBackend> {
    handles
        .iter()
        .find(|h| h.id() == id)
        .unwrap_or_else(|| panic!("no scripted backend named {id}"))
}

/// Orchestrator over a scripted fleet with default config and an in-memory
/// metrics sink.
pub fn orchestrator(script: Script) -> (Orchestrator, Vec<Arc<ScriptedBackend>>, MemorySink) {
    let (registry, handles) = scripted_fleet(script);
    let sink = MemorySink::new();
    let orchestrator =
        Orchestrator::with_sink(RelayConfig::default(), registry, Arc::new(sink.clone()));
    (orchestrator, handles, sink)
}
