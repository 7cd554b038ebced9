//! # Metrics Sink
//!
//! Fire-and-forget seam between the orchestration core and whatever
//! telemetry pipeline surrounds it. Exposition formatting (Prometheus and
//! friends) is explicitly out of scope; the core only labels and counts.
//! Sink implementations must never block or fail the caller.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Label set attached to every observation: (backend, task_type, status).
/// Empty strings mean "not applicable" (e.g. cache counters have no backend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetricLabels {
    pub backend: String,
    pub task_type: String,
    pub status: String,
}

impl MetricLabels {
    pub fn new(
        backend: impl Into<String>,
        task_type: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            backend: backend.into(),
            task_type: task_type.into(),
            status: status.into(),
        }
    }
}

/// Counters and latency observations, labeled by (backend, task_type,
/// status). All methods are infallible and must not block.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, labels: &MetricLabels);
    fn observe_latency(&self, name: &str, labels: &MetricLabels, latency: Duration);
}

/// Sink that discards everything. Default when no telemetry is wired.
#[derive(Debug, Default, Clone)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn incr_counter(&self, _name: &str, _labels: &MetricLabels) {}
    fn observe_latency(&self, _name: &str, _labels: &MetricLabels, _latency: Duration) {}
}

/// Aggregated view of one latency series.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

impl LatencyStats {
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }
}

/// In-process aggregating sink. Used by tests and by embedders that poll a
/// summary instead of streaming metrics out.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<RwLock<MemorySinkInner>>,
}

#[derive(Debug, Default)]
struct MemorySinkInner {
    counters: HashMap<(String, MetricLabels), u64>,
    latencies: HashMap<(String, MetricLabels), LatencyStats>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one counter series, zero if never incremented.
    pub fn counter(&self, name: &str, labels: &MetricLabels) -> u64 {
        self.inner
            .read()
            .counters
            .get(&(name.to_string(), labels.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of a counter across all label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.inner
            .read()
            .counters
            .iter()
            .filter(|((n, _), _)| n == name)
            .map(|(_, v)| *v)
            .sum()
    }

    pub fn latency(&self, name: &str, labels: &MetricLabels) -> Option<LatencyStats> {
        self.inner
            .read()
            .latencies
            .get(&(name.to_string(), labels.clone()))
            .cloned()
    }

    /// Flat summary of every series, for introspection endpoints and tests.
    pub fn summary(&self) -> MetricsSummary {
        let inner = self.inner.read();
        MetricsSummary {
            counters: inner
                .counters
                .iter()
                .map(|((name, labels), value)| CounterEntry {
                    name: name.clone(),
                    labels: labels.clone(),
                    value: *value,
                })
                .collect(),
            latencies: inner
                .latencies
                .iter()
                .map(|((name, labels), stats)| LatencyEntry {
                    name: name.clone(),
                    labels: labels.clone(),
                    stats: stats.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterEntry {
    pub name: String,
    pub labels: MetricLabels,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyEntry {
    pub name: String,
    pub labels: MetricLabels,
    pub stats: LatencyStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub counters: Vec<CounterEntry>,
    pub latencies: Vec<LatencyEntry>,
}

impl MetricsSink for MemorySink {
    fn incr_counter(&self, name: &str, labels: &MetricLabels) {
        let mut inner = self.inner.write();
        *inner
            .counters
            .entry((name.to_string(), labels.clone()))
            .or_insert(0) += 1;
    }

    fn observe_latency(&self, name: &str, labels: &MetricLabels, latency: Duration) {
        let mut inner = self.inner.write();
        let stats = inner
            .latencies
            .entry((name.to_string(), labels.clone()))
            .or_default();
        let ms = latency.as_millis() as u64;
        stats.count += 1;
        stats.total_ms += ms;
        stats.max_ms = stats.max_ms.max(ms);
    }
}
