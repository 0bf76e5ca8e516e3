//! Observability metrics for admission and aggregation.
//!
//! Counters are atomic and shared between clones, so a component and the
//! handles it gives out always report the same numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking admission limiter statistics.
#[derive(Debug, Clone, Default)]
pub struct AdmissionMetrics {
    inner: Arc<AdmissionMetricsInner>,
}

#[derive(Debug, Default)]
struct AdmissionMetricsInner {
    /// Total number of admitted actions
    admitted: AtomicU64,
    /// Total number of denied actions
    denied: AtomicU64,
    /// Total number of counters removed by garbage collection
    counters_collected: AtomicU64,
}

impl AdmissionMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied(&self) {
        self.inner.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_collected(&self, count: usize) {
        self.inner
            .counters_collected
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get the total number of admitted actions.
    pub fn admitted(&self) -> u64 {
        self.inner.admitted.load(Ordering::Relaxed)
    }

    /// Get the total number of denied actions.
    pub fn denied(&self) -> u64 {
        self.inner.denied.load(Ordering::Relaxed)
    }

    /// Get the total number of garbage-collected counters.
    pub fn counters_collected(&self) -> u64 {
        self.inner.counters_collected.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            admitted: self.admitted(),
            denied: self.denied(),
            counters_collected: self.counters_collected(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.admitted.store(0, Ordering::Relaxed);
        self.inner.denied.store(0, Ordering::Relaxed);
        self.inner.counters_collected.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of admission metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSnapshot {
    /// Total number of admitted actions
    pub admitted: u64,
    /// Total number of denied actions
    pub denied: u64,
    /// Total number of counters removed by garbage collection
    pub counters_collected: u64,
}

impl AdmissionSnapshot {
    /// Total number of checks.
    pub fn total_checks(&self) -> u64 {
        self.admitted.saturating_add(self.denied)
    }

    /// Ratio of denied checks (0.0 to 1.0), 0.0 when nothing was checked.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            0.0
        } else {
            self.denied as f64 / total as f64
        }
    }
}

/// Metrics tracking event aggregator statistics.
#[derive(Debug, Clone, Default)]
pub struct AggregationMetrics {
    inner: Arc<AggregationMetricsInner>,
}

#[derive(Debug, Default)]
struct AggregationMetricsInner {
    created: AtomicU64,
    merged: AtomicU64,
    suppressed: AtomicU64,
    rejected: AtomicU64,
    groups_pruned: AtomicU64,
}

impl AggregationMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_created(&self) {
        self.inner.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_merged(&self) {
        self.inner.merged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.inner.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pruned(&self, count: usize) {
        self.inner
            .groups_pruned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records opened.
    pub fn created(&self) -> u64 {
        self.inner.created.load(Ordering::Relaxed)
    }

    /// Events merged into an existing record.
    pub fn merged(&self) -> u64 {
        self.inner.merged.load(Ordering::Relaxed)
    }

    /// Self-actions discarded.
    pub fn suppressed(&self) -> u64 {
        self.inner.suppressed.load(Ordering::Relaxed)
    }

    /// Malformed events rejected.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Closed groups dropped from memory.
    pub fn groups_pruned(&self) -> u64 {
        self.inner.groups_pruned.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> AggregationSnapshot {
        AggregationSnapshot {
            created: self.created(),
            merged: self.merged(),
            suppressed: self.suppressed(),
            rejected: self.rejected(),
            groups_pruned: self.groups_pruned(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.created.store(0, Ordering::Relaxed);
        self.inner.merged.store(0, Ordering::Relaxed);
        self.inner.suppressed.store(0, Ordering::Relaxed);
        self.inner.rejected.store(0, Ordering::Relaxed);
        self.inner.groups_pruned.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of aggregation metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationSnapshot {
    /// Records opened
    pub created: u64,
    /// Events merged into an existing record
    pub merged: u64,
    /// Self-actions discarded
    pub suppressed: u64,
    /// Malformed events rejected
    pub rejected: u64,
    /// Closed groups dropped from memory
    pub groups_pruned: u64,
}

impl AggregationSnapshot {
    /// Events that produced or updated a record.
    pub fn accepted_events(&self) -> u64 {
        self.created.saturating_add(self.merged)
    }

    /// Share of accepted events folded into an existing record (0.0 to 1.0).
    pub fn merge_rate(&self) -> f64 {
        let total = self.accepted_events();
        if total == 0 {
            0.0
        } else {
            self.merged as f64 / total as f64
        }
    }
}
