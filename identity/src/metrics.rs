//! Resolution counters
//!
//! Every identity-resolution failure mode is observable here rather than
//! silent: degraded inputs, discarded detections, and mutations that could
//! not complete all tick a counter.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ResolverMetrics {
    pub resolved_matched: AtomicU64,
    pub resolved_created: AtomicU64,
    pub resolved_pending: AtomicU64,
    /// Resolutions that ran without an embedding (position-only fallback).
    pub degraded_no_embedding: AtomicU64,
    /// Registry mutations abandoned after bounded retries.
    pub mutation_failures: AtomicU64,
    /// Malformed detections dropped before association.
    pub discarded_detections: AtomicU64,
    pub identities_expired: AtomicU64,
    pub identities_merged: AtomicU64,
}

impl ResolverMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            resolved_matched: self.resolved_matched.load(Ordering::Relaxed),
            resolved_created: self.resolved_created.load(Ordering::Relaxed),
            resolved_pending: self.resolved_pending.load(Ordering::Relaxed),
            degraded_no_embedding: self.degraded_no_embedding.load(Ordering::Relaxed),
            mutation_failures: self.mutation_failures.load(Ordering::Relaxed),
            discarded_detections: self.discarded_detections.load(Ordering::Relaxed),
            identities_expired: self.identities_expired.load(Ordering::Relaxed),
            identities_merged: self.identities_merged.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters, cheap to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub resolved_matched: u64,
    pub resolved_created: u64,
    pub resolved_pending: u64,
    pub degraded_no_embedding: u64,
    pub mutation_failures: u64,
    pub discarded_detections: u64,
    pub identities_expired: u64,
    pub identities_merged: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = ResolverMetrics::default();
        ResolverMetrics::incr(&metrics.resolved_created);
        ResolverMetrics::add(&metrics.discarded_detections, 3);

        let snap = metrics.snapshot();
        assert_eq!(snap.resolved_created, 1);
        assert_eq!(snap.discarded_detections, 3);
        assert_eq!(snap.resolved_matched, 0);
    }
}
