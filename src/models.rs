//! # Core Data Model
//!
//! Task, tier, and result types shared by every orchestration component.
//! Task types are a closed enum so routing, caching, and validation rules
//! are checked for completeness at compile time instead of failing on a
//! missing dictionary key at runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Kinds of AI work the orchestrator knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    StrategyAudit,
    CodeReview,
    CreativeIdeation,
    EthicalAssessment,
    FrameworkAlignment,
    RealTimeTutoring,
    CollaborationFacilitation,
    DocumentSynthesis,
}

impl TaskType {
    /// All task types, in declaration order. Useful for building policy
    /// tables and exhaustive test grids.
    pub const ALL: [TaskType; 8] = [
        TaskType::StrategyAudit,
        TaskType::CodeReview,
        TaskType::CreativeIdeation,
        TaskType::EthicalAssessment,
        TaskType::FrameworkAlignment,
        TaskType::RealTimeTutoring,
        TaskType::CollaborationFacilitation,
        TaskType::DocumentSynthesis,
    ];

    /// Stable wire name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::StrategyAudit => "strategy_audit",
            TaskType::CodeReview => "code_review",
            TaskType::CreativeIdeation => "creative_ideation",
            TaskType::EthicalAssessment => "ethical_assessment",
            TaskType::FrameworkAlignment => "framework_alignment",
            TaskType::RealTimeTutoring => "real_time_tutoring",
            TaskType::CollaborationFacilitation => "collaboration_facilitation",
            TaskType::DocumentSynthesis => "document_synthesis",
        }
    }

    /// Static message returned to callers when every backend failed or none
    /// was available. Never exposes provider error strings.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            TaskType::StrategyAudit => {
                "Strategy audit temporarily unavailable. Please try again or contact support."
            }
            TaskType::RealTimeTutoring => {
                "I'm having trouble processing your request. Let me try a simpler approach. \
                 What specific question can I help you with?"
            }
            TaskType::CollaborationFacilitation => {
                "Collaboration assistance is temporarily limited. Please continue your \
                 discussion and I'll rejoin shortly."
            }
            _ => "Service temporarily unavailable. Please try again.",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota class bounding a user's request and token consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }
}

/// A unit of AI work submitted by a caller. Immutable once constructed.
///
/// `context` is a `BTreeMap` so its JSON serialization is deterministic,
/// which the cache gateway relies on for stable fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_type: TaskType,
    pub user_id: String,
    /// Quota tier of the submitting user, resolved by the caller's auth
    /// layer before the task reaches the core.
    #[serde(default = "default_tier")]
    pub tier: Tier,
    pub prompt: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

fn default_tier() -> Tier {
    Tier::Free
}

impl Task {
    pub fn new(task_type: TaskType, user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task_type,
            user_id: user_id.into(),
            tier: Tier::Free,
            prompt: prompt.into(),
            context: BTreeMap::new(),
            use_cache: true,
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// What a backend call yields on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    pub tokens_used: u64,
}

/// Terminal failure classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Request or token quota exceeded. Carries `retry_after` on the result.
    RateLimited,
    /// A specific backend's breaker rejected the call. Internal; usually
    /// absorbed into fallback and never the terminal kind on its own.
    CircuitOpen,
    /// Backend responded but the content failed the quality gate.
    ValidationFailed,
    /// No capable, breaker-admitted backend existed before any call.
    AllBackendsUnavailable,
    /// At least one backend was tried; every attempt failed.
    AllBackendsFailed,
    /// Cache backing store unreachable. Non-fatal, logged only.
    CacheUnavailable,
}

/// Outcome of a single `process` call. Transient; never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub success: bool,
    pub backend_used: Option<String>,
    pub payload: Option<ModelResponse>,
    pub error_kind: Option<ErrorKind>,
    pub retry_after: Option<Duration>,
    pub latency: Duration,
    pub from_cache: bool,
}

impl OrchestrationResult {
    pub fn cache_hit(payload: ModelResponse, latency: Duration) -> Self {
        Self {
            success: true,
            backend_used: None,
            payload: Some(payload),
            error_kind: None,
            retry_after: None,
            latency,
            from_cache: true,
        }
    }

    pub fn completed(backend: String, payload: ModelResponse, latency: Duration) -> Self {
        Self {
            success: true,
            backend_used: Some(backend),
            payload: Some(payload),
            error_kind: None,
            retry_after: None,
            latency,
            from_cache: false,
        }
    }

    /// Terminal rejection before any backend was contacted.
    pub fn rejected(kind: ErrorKind, retry_after: Option<Duration>, latency: Duration) -> Self {
        Self {
            success: false,
            backend_used: None,
            payload: None,
            error_kind: Some(kind),
            retry_after,
            latency,
            from_cache: false,
        }
    }

    /// Terminal failure with the task type's static fallback payload.
    pub fn failed_with_fallback(kind: ErrorKind, task_type: TaskType, latency: Duration) -> Self {
        Self {
            success: false,
            backend_used: None,
            payload: Some(ModelResponse {
                text: task_type.fallback_message().to_string(),
                tokens_used: 0,
            }),
            error_kind: Some(kind),
            retry_after: None,
            latency,
            from_cache: false,
        }
    }
}
