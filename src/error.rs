//! # Structured Error Handling
//!
//! Crate-wide error enum and `Result` alias. Per-request outcomes that are
//! part of normal control flow (rate-limit rejections, breaker rejections,
//! validation failures) are *not* errors; they surface as structured
//! `OrchestrationResult` values so callers can branch without exceptions.
//! `RelayError` covers the genuinely exceptional paths: bad configuration
//! and internal invariant breaks.

use crate::backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Daily token budget exceeded for user {user_id}: used {used} of {limit}")]
    TokenBudgetExceeded {
        user_id: String,
        used: u64,
        limit: u64,
    },

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
