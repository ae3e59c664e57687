//! Compaction metrics tracking
//!
//! Thread-safe counters for a compaction pass, shared between the job and
//! the invoking binary via cheap clones.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::info;

/// Thread-safe metrics for a compaction run
#[derive(Debug, Clone, Default)]
pub struct CompactionMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    rules_applied: AtomicUsize,
    periods_compacted: AtomicUsize,
    delete_batches: AtomicUsize,
    snapshots_deleted: AtomicU64,
}

impl CompactionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rule_applied(&self) {
        self.inner.rules_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_period_compacted(&self) {
        self.inner.periods_compacted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete_batch(&self, deleted: u64) {
        self.inner.delete_batches.fetch_add(1, Ordering::Relaxed);
        self.inner
            .snapshots_deleted
            .fetch_add(deleted, Ordering::Relaxed);
    }

    pub fn rules_applied(&self) -> usize {
        self.inner.rules_applied.load(Ordering::Relaxed)
    }

    pub fn periods_compacted(&self) -> usize {
        self.inner.periods_compacted.load(Ordering::Relaxed)
    }

    pub fn delete_batches(&self) -> usize {
        self.inner.delete_batches.load(Ordering::Relaxed)
    }

    pub fn snapshots_deleted(&self) -> u64 {
        self.inner.snapshots_deleted.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            rules_applied: self.rules_applied(),
            periods_compacted: self.periods_compacted(),
            delete_batches: self.delete_batches(),
            snapshots_deleted: self.snapshots_deleted(),
        }
    }
}

/// Point-in-time summary of compaction metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSummary {
    pub rules_applied: usize,
    pub periods_compacted: usize,
    pub delete_batches: usize,
    pub snapshots_deleted: u64,
}

impl MetricsSummary {
    /// Log the summary at info level
    pub fn log(&self) {
        info!(
            rules_applied = self.rules_applied,
            periods_compacted = self.periods_compacted,
            delete_batches = self.delete_batches,
            snapshots_deleted = self.snapshots_deleted,
            "Compaction metrics summary"
        );
    }
}
