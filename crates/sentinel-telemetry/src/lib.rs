//! Atomic throughput counters for the pipeline. Cheap to update on every
//! event, snapshotted into [`PipelineMetrics`] for health reporting and the
//! `SystemMetrics` broadcast topic.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct MetricsRegistry {
    events_processed: AtomicU64,
    events_ignored: AtomicU64,
    events_persisted: AtomicU64,
    correlations_detected: AtomicU64,
    broadcasts_sent: AtomicU64,
    empty_embeddings: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.events_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_correlations(&self, count: u64) {
        self.correlations_detected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_embedding(&self) {
        self.empty_embeddings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineMetrics {
        PipelineMetrics {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            events_persisted: self.events_persisted.load(Ordering::Relaxed),
            correlations_detected: self.correlations_detected.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            empty_embeddings: self.empty_embeddings.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    pub events_processed: u64,
    pub events_ignored: u64,
    pub events_persisted: u64,
    pub correlations_detected: u64,
    pub broadcasts_sent: u64,
    pub empty_embeddings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let registry = MetricsRegistry::new();
        registry.record_processed();
        registry.record_processed();
        registry.record_ignored();
        registry.record_persisted();
        registry.record_correlations(3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.events_processed, 2);
        assert_eq!(snapshot.events_ignored, 1);
        assert_eq!(snapshot.events_persisted, 1);
        assert_eq!(snapshot.correlations_detected, 3);
    }
}
