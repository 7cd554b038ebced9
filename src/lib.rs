#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Model Relay
//!
//! Resilient orchestration core for multi-backend AI request processing.
//!
//! ## Overview
//!
//! Model Relay sits between a transport layer (HTTP/WebSocket handlers) and
//! a fleet of AI model backends. Each request flows through a single
//! pipeline: response cache, per-user rate limiting, capability- and
//! health-aware routing, then breaker-guarded backend calls with semantic
//! validation and ordered fallback. The pipeline degrades gracefully: cache
//! outages are absorbed, single-backend outages reroute, and a total outage
//! yields a safe static payload instead of a provider error.
//!
//! ## Architecture
//!
//! - [`models`] - Task, tier, and result types shared by every component
//! - [`backend`] - The `ModelBackend` trait, backend specs, and the registry
//! - [`cache`] - Fail-open response cache keyed by task fingerprint
//! - [`resilience`] - Per-backend circuit breakers and their registry
//! - [`quota`] - Fixed-window request and token rate limiting per user tier
//! - [`router`] - Preference-chain routing and response validation
//! - [`orchestration`] - The `process(task)` pipeline tying it all together
//! - [`streaming`] - Producer/consumer channel for token-by-token delivery
//! - [`metrics`] - Counter/latency sink abstraction with in-memory aggregator
//! - [`config`] - Layered configuration (file + environment overrides)
//!
//! ## Usage
//!
//! ```no_run
//! use model_relay::backend::BackendRegistry;
//! use model_relay::{Orchestrator, RelayConfig, Task, TaskType};
//!
//! # async fn run(registry: BackendRegistry) -> anyhow::Result<()> {
//! let config = RelayConfig::load()?;
//! let orchestrator = Orchestrator::new(config, registry);
//!
//! let task = Task::new(TaskType::CodeReview, "user-42", "Review this diff");
//! let result = orchestrator.process(&task).await;
//! if result.success {
//!     println!("{}", result.payload.unwrap().text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod quota;
pub mod resilience;
pub mod router;
pub mod streaming;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use models::{ErrorKind, ModelResponse, OrchestrationResult, Task, TaskType, Tier};
pub use orchestration::Orchestrator;
