//! # Orchestration Core
//!
//! The single entry point HTTP/WebSocket handlers call. `process` ties the
//! leaf components together: cache first (cached answers are free), then
//! rate-limit admission, then breaker-aware routing with per-candidate
//! fallback, semantic validation, and metrics on every attempt.

use crate::backend::{BackendError, BackendRegistry};
use crate::cache::{CacheGateway, CacheStore, MemoryStore, NoopStore};
use crate::config::{RelayConfig, RouterConfig};
use crate::metrics::{MetricLabels, MetricsSink, NoopSink};
use crate::models::{ErrorKind, ModelResponse, OrchestrationResult, Task, TaskType};
use crate::quota::{RateLimiter, RejectReason};
use crate::resilience::CircuitBreakerRegistry;
use crate::router::{ModelRouter, ResponseValidator};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-task-type admission weight: structured audits cost more backend
/// work than a conversational turn, so they consume more request quota.
fn admission_weight(task_type: TaskType) -> u64 {
    match task_type {
        TaskType::StrategyAudit => 2,
        TaskType::DocumentSynthesis => 2,
        _ => 1,
    }
}

/// Process-scoped orchestrator. Built once at startup with every
/// collaborator passed in explicitly; cloned `Arc`s of the shared pieces
/// are handed to the admin surface separately.
pub struct Orchestrator {
    backends: Arc<BackendRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: Arc<RateLimiter>,
    cache: Arc<CacheGateway>,
    router: ModelRouter,
    validator: ResponseValidator,
    metrics: Arc<dyn MetricsSink>,
    router_config: RouterConfig,
}

impl Orchestrator {
    /// Standard construction from configuration. Cache backing store is
    /// selected here: in-memory when enabled, no-op otherwise (fail-open
    /// by construction, no availability checks downstream).
    pub fn new(config: RelayConfig, backends: BackendRegistry) -> Self {
        Self::with_sink(config, backends, Arc::new(NoopSink))
    }

    pub fn with_sink(
        config: RelayConfig,
        backends: BackendRegistry,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let store: Arc<dyn CacheStore> = if config.cache.enabled {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(NoopStore)
        };
        Self::with_store(config, backends, metrics, store)
    }

    /// Full construction with an explicit backing store (a Redis-backed
    /// `CacheStore` in production deployments, a scripted one in tests).
    pub fn with_store(
        config: RelayConfig,
        backends: BackendRegistry,
        metrics: Arc<dyn MetricsSink>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let backends = Arc::new(backends);
        let breakers = Arc::new(CircuitBreakerRegistry::with_backends(
            config.breakers.clone(),
            backends.ids(),
        ));
        let limiter = Arc::new(RateLimiter::new(config.quotas.clone()));
        let cache = Arc::new(CacheGateway::new(
            store,
            config.cache.clone(),
            Arc::clone(&metrics),
        ));
        let router = ModelRouter::new(Arc::clone(&backends), Arc::clone(&breakers));
        let validator = ResponseValidator::new(config.validation.clone());

        info!(
            backends = backends.len(),
            cache_enabled = config.cache.enabled,
            "🔧 Orchestrator initialized"
        );

        Self {
            backends,
            breakers,
            limiter,
            cache,
            router,
            validator,
            metrics,
            router_config: config.router.clone(),
        }
    }

    /// Shared breaker registry, for the admin surface (reset/snapshot).
    pub fn breakers(&self) -> Arc<CircuitBreakerRegistry> {
        Arc::clone(&self.breakers)
    }

    /// Shared rate limiter, for the admin surface (quota report/reset).
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Shared cache gateway, for the admin surface (invalidate-by-pattern).
    pub fn cache(&self) -> Arc<CacheGateway> {
        Arc::clone(&self.cache)
    }

    /// Run one task through the full pipeline. Never returns an `Err`:
    /// every outcome, including terminal failure, is a structured result.
    pub async fn process(&self, task: &Task) -> OrchestrationResult {
        let started = Instant::now();
        let task_name = task.task_type.as_str();

        // Step 1: cache. A hit bypasses the rate limiter and breakers
        // entirely; cached answers cost nothing.
        if task.use_cache {
            if let Some(payload) = self.cache.lookup(task).await {
                self.observe("orchestration_latency", "cache", task_name, "hit", started);
                return OrchestrationResult::cache_hit(payload, started.elapsed());
            }
        }

        // Step 2: admission. Request-count quota is consumed here,
        // regardless of the eventual backend outcome, so forced retries
        // cannot be farmed for free attempts.
        let admission = self.limiter.check_and_consume(
            &task.user_id,
            task.tier,
            admission_weight(task.task_type),
        );
        if !admission.allowed {
            let reason = match admission.rejected_by {
                Some(RejectReason::TokenBudget) => "token_budget",
                _ => "request_window",
            };
            self.incr("rate_limited", "", task_name, reason);
            debug!(user = %task.user_id, reason, "Request rejected by rate limiter");
            return OrchestrationResult::rejected(
                ErrorKind::RateLimited,
                admission.retry_after,
                started.elapsed(),
            );
        }

        // Step 3: routing.
        let candidates = self.router.route(task.task_type, &task.context);
        if candidates.is_empty() {
            warn!(task_type = %task.task_type, "No capable backend available before any call");
            self.incr("all_backends_unavailable", "", task_name, "unavailable");
            return OrchestrationResult::failed_with_fallback(
                ErrorKind::AllBackendsUnavailable,
                task.task_type,
                started.elapsed(),
            );
        }

        // Step 4: attempt candidates in order.
        for backend_id in &candidates {
            // Re-check at call time: breaker state may have moved since the
            // router filtered. This is the consuming check.
            if !self.breakers.allow(backend_id) {
                debug!(backend = %backend_id, "Breaker rejected candidate at call time");
                self.incr("ai_requests", backend_id, task_name, "circuit_open");
                continue;
            }

            match self.attempt(backend_id, task).await {
                Ok(payload) => {
                    self.breakers.report_success(backend_id);
                    if task.use_cache {
                        self.cache.store(task, &payload);
                    }
                    self.limiter
                        .consume_tokens(&task.user_id, task.tier, payload.tokens_used);
                    self.incr("ai_requests", backend_id, task_name, "success");
                    self.observe("ai_latency", backend_id, task_name, "success", started);
                    return OrchestrationResult::completed(
                        backend_id.clone(),
                        payload,
                        started.elapsed(),
                    );
                }
                Err(status) => {
                    // Transport error, timeout, or validation failure: all
                    // count against the breaker, then fall through to the
                    // next candidate.
                    self.incr("ai_requests", backend_id, task_name, status);
                }
            }
        }

        // Step 5: everything failed.
        warn!(
            task_type = %task.task_type,
            attempted = candidates.len(),
            "All candidate backends failed"
        );
        self.incr("all_backends_failed", "", task_name, "failed");
        OrchestrationResult::failed_with_fallback(
            ErrorKind::AllBackendsFailed,
            task.task_type,
            started.elapsed(),
        )
    }

    /// One backend attempt: timed call plus semantic validation. Reports
    /// failures to the breaker itself; success reporting is left to the
    /// caller so it happens exactly once alongside the bookkeeping.
    async fn attempt(&self, backend_id: &str, task: &Task) -> Result<ModelResponse, &'static str> {
        let Some(backend) = self.backends.get(backend_id) else {
            // Router produced an id the registry no longer knows; treat as
            // a transport failure so the breaker tracks it.
            self.breakers
                .report_failure(backend_id, "backend not registered");
            return Err("failure");
        };

        let timeout = self
            .router_config
            .call_timeout(backend.spec().nominal_latency);
        let call_started = Instant::now();

        let outcome =
            tokio::time::timeout(timeout, backend.invoke(&task.prompt, &task.context)).await;

        match outcome {
            Err(_elapsed) => {
                let err = BackendError::Timeout(timeout);
                self.breakers.report_failure(backend_id, &err.to_string());
                Err("timeout")
            }
            Ok(Err(err)) => {
                self.breakers.report_failure(backend_id, &err.to_string());
                Err("failure")
            }
            Ok(Ok(response)) => {
                if self.validator.validate(&response.text, task.task_type) {
                    debug!(
                        backend = %backend_id,
                        latency_ms = call_started.elapsed().as_millis() as u64,
                        tokens = response.tokens_used,
                        "🟢 Backend call succeeded"
                    );
                    Ok(response)
                } else {
                    // Transport success, semantic failure. The raw content
                    // is dropped, never surfaced.
                    self.breakers
                        .report_failure(backend_id, "response failed validation");
                    Err("validation_failed")
                }
            }
        }
    }

    fn incr(&self, name: &str, backend: &str, task_type: &str, status: &str) {
        self.metrics
            .incr_counter(name, &MetricLabels::new(backend, task_type, status));
    }

    fn observe(&self, name: &str, backend: &str, task_type: &str, status: &str, started: Instant) {
        let labels = MetricLabels::new(backend, task_type, status);
        self.metrics
            .observe_latency(name, &labels, started.elapsed());
    }
}
