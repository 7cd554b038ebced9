//! # Resilience Module
//!
//! Fault tolerance for external AI model calls. One circuit breaker per
//! backend isolates a degrading provider before its latency cascades into
//! every request, and the registry gives the orchestrator and the admin
//! surface a single handle on the whole fleet.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: Closed/Open/HalfOpen gate per backend
//! - **Registry**: lazy per-backend creation from configuration, snapshots,
//!   administrative resets
//! - **Reporting discipline**: the orchestrator reports exactly one success
//!   or failure per allowed attempt; validation failures count as failures
//!
//! ## Usage
//!
//! ```rust
//! use model_relay::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     success_threshold: 2,
//!     timeout: Duration::from_secs(60),
//! };
//! let breaker = CircuitBreaker::new("gpt-4o".to_string(), config);
//!
//! if breaker.allow() {
//!     // ... perform the call ...
//!     breaker.record_success();
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod registry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use registry::CircuitBreakerRegistry;
