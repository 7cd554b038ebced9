//! # Orchestration Engine
//!
//! Ties the resilience, quota, cache, and routing components into the one
//! `process(task)` pipeline the transport layer calls.
//!
//! ## Control flow
//!
//! 1. Cache lookup (hit returns immediately; bypasses limiter and breakers)
//! 2. Rate-limit admission (all-or-nothing across windows; terminal on reject)
//! 3. Routing to an ordered, breaker-filtered candidate list
//! 4. Per-candidate attempt: call-time breaker re-check, timed call,
//!    semantic validation, breaker reporting, fallback to next candidate
//! 5. Terminal failure with a safe static payload when all candidates fail
//!
//! Steps 2-3 are terminal rejections with no backend contacted and no cost
//! incurred; step 4 failures are absorbed per-candidate.

pub mod core;

pub use core::Orchestrator;
