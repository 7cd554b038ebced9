//! # Model Router
//!
//! Deterministic task-type → backend selection with breaker-aware
//! filtering. Each task type has a preference chain (tuned by hand for
//! quality on that workload); capable backends outside the chain are
//! appended as cost-ordered extras so a full provider outage still finds
//! any able model. OPEN breakers are always excluded, even when that
//! leaves no candidates at all.

pub mod validation;

pub use validation::ResponseValidator;

use crate::backend::BackendRegistry;
use crate::models::TaskType;
use crate::resilience::CircuitBreakerRegistry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Hand-tuned primary/fallback chains per task type.
fn preference_chain(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::StrategyAudit => &["gpt-4o", "claude-3-sonnet", "gpt-4-turbo"],
        TaskType::CodeReview => &["gpt-4o", "claude-3-sonnet"],
        TaskType::CreativeIdeation => &["claude-3-sonnet", "gpt-4o"],
        TaskType::EthicalAssessment => &["claude-3-sonnet", "gpt-4o"],
        TaskType::FrameworkAlignment => &["gpt-4o", "claude-3-sonnet"],
        TaskType::RealTimeTutoring => &["gpt-4o", "gemini-pro"],
        TaskType::CollaborationFacilitation => &["gpt-4o", "claude-3-sonnet"],
        TaskType::DocumentSynthesis => &["claude-3-sonnet", "gpt-4o"],
    }
}

pub struct ModelRouter {
    backends: Arc<BackendRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl ModelRouter {
    pub fn new(backends: Arc<BackendRegistry>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self { backends, breakers }
    }

    /// Ordered candidate backends for a task: preference chain first, then
    /// any other capable backend by ascending cost then ascending nominal
    /// latency. Backends whose breaker would reject the call are filtered
    /// out here; the orchestrator re-checks at call time since breaker
    /// state can change in between.
    ///
    /// Context flags bias ordering: `low_latency_required` prefers faster
    /// models, `cost_sensitive` prefers cheaper ones.
    pub fn route(&self, task_type: TaskType, context: &BTreeMap<String, Value>) -> Vec<String> {
        let chain = preference_chain(task_type);

        let mut candidates: Vec<&str> = Vec::new();
        for id in chain {
            if self.is_candidate(id, task_type) {
                candidates.push(id);
            }
        }

        // Capable backends outside the chain, cheapest (then fastest) first.
        let mut extras: Vec<&str> = self
            .backends
            .specs()
            .filter(|spec| {
                spec.supports(task_type)
                    && !chain.contains(&spec.id.as_str())
                    && self.breakers.would_allow(&spec.id)
            })
            .map(|spec| spec.id.as_str())
            .collect();
        extras.sort_by(|a, b| {
            let sa = self.backends.get(a).map(|x| x.spec());
            let sb = self.backends.get(b).map(|x| x.spec());
            match (sa, sb) {
                (Some(sa), Some(sb)) => sa
                    .cost_per_1k_tokens
                    .partial_cmp(&sb.cost_per_1k_tokens)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(sa.nominal_latency.cmp(&sb.nominal_latency)),
                _ => std::cmp::Ordering::Equal,
            }
        });
        candidates.extend(extras);

        if context_has_flag(context, "low_latency_required")
            || context_has_flag(context, "cost_sensitive")
        {
            self.rescore(&mut candidates, task_type, context);
        }

        debug!(
            task_type = %task_type,
            candidates = ?candidates,
            "🧭 Routed task"
        );
        candidates.into_iter().map(String::from).collect()
    }

    fn is_candidate(&self, id: &str, task_type: TaskType) -> bool {
        match self.backends.get(id) {
            Some(backend) => backend.spec().supports(task_type) && self.breakers.would_allow(id),
            None => false,
        }
    }

    /// Context-sensitive reordering: higher score first, stable for ties so
    /// the preference chain still breaks them.
    fn rescore(&self, candidates: &mut [&str], task_type: TaskType, ctx: &BTreeMap<String, Value>) {
        let chain = preference_chain(task_type);
        let score = |id: &str| -> f64 {
            let Some(spec) = self.backends.get(id).map(|b| b.spec()) else {
                return f64::MIN;
            };
            let mut score = 50.0;
            if chain.contains(&id) {
                score += 20.0;
            }
            if context_has_flag(ctx, "low_latency_required") {
                score -= spec.nominal_latency.as_millis() as f64 / 100.0;
            }
            if context_has_flag(ctx, "cost_sensitive") {
                score -= spec.cost_per_1k_tokens * 1000.0;
            }
            score
        };
        candidates.sort_by(|a, b| {
            score(b)
                .partial_cmp(&score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

fn context_has_flag(context: &BTreeMap<String, Value>, key: &str) -> bool {
    matches!(context.get(key), Some(Value::Bool(true)))
}
