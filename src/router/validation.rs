//! # Response Quality Gate
//!
//! Transport success is not semantic success: a backend can return HTTP 200
//! and still produce an answer too short, boilerplate-refusing, or
//! incoherent to show a user. Responses failing this gate are reported to
//! the backend's circuit breaker as failures and the orchestrator falls
//! back to the next candidate.

use crate::config::ValidationConfig;
use crate::models::TaskType;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    config: ValidationConfig,
}

impl ResponseValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Does this response meet the quality bar for its task type?
    pub fn validate(&self, text: &str, task_type: TaskType) -> bool {
        let trimmed = text.trim();
        if trimmed.len() < self.config.min_response_length {
            debug!(task_type = %task_type, length = trimmed.len(), "Response rejected: too short");
            return false;
        }

        let lowered = trimmed.to_lowercase();
        if let Some(phrase) = self
            .config
            .denylist
            .iter()
            .find(|phrase| lowered.contains(phrase.as_str()))
        {
            debug!(task_type = %task_type, phrase = %phrase, "Response rejected: denylisted phrase");
            return false;
        }

        if !self.is_coherent(&lowered) {
            debug!(task_type = %task_type, "Response rejected: repetition heuristic");
            return false;
        }

        self.structural_check(&lowered, task_type)
    }

    /// Degenerate-repetition heuristic: a real answer of any length uses a
    /// reasonable variety of words. Short responses are exempt, since the ratio
    /// is meaningless at small sample sizes.
    fn is_coherent(&self, lowered: &str) -> bool {
        let words: Vec<&str> = lowered.split_whitespace().collect();
        if words.len() < 20 {
            return true;
        }
        let distinct: HashSet<&str> = words.iter().copied().collect();
        let ratio = distinct.len() as f64 / words.len() as f64;
        ratio >= self.config.min_distinct_word_ratio
    }

    /// Task-type-specific structural requirements.
    fn structural_check(&self, lowered: &str, task_type: TaskType) -> bool {
        match task_type {
            TaskType::StrategyAudit => ["pillar", "score", "recommendation"]
                .iter()
                .any(|term| lowered.contains(term)),
            TaskType::FrameworkAlignment => ["clarity", "speed", "ingenuity", "framework"]
                .iter()
                .any(|term| lowered.contains(term)),
            _ => true,
        }
    }
}
