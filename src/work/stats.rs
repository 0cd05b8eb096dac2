//! Partition statistics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Statistics for one index partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionStats {
    /// Number of batches that completed without error.
    pub batches_applied: u64,

    /// Number of batches with at least one failed operation.
    pub batches_failed: u64,

    /// Number of operations that reached the engine.
    pub operations_applied: u64,

    /// Number of failed operations.
    pub operations_failed: u64,

    /// Total time spent applying batches.
    pub total_batch_time_ms: u64,

    /// Average time per batch.
    pub avg_batch_time_ms: f64,

    /// Number of commits performed.
    pub commit_count: u64,

    /// Last commit timestamp.
    pub last_commit_time: Option<DateTime<Utc>>,

    /// Number of writers opened.
    pub writer_opens: u64,

    /// Number of forced lock releases.
    pub force_unlocks: u64,

    /// Number of forced merges.
    pub optimizations: u64,
}

impl PartitionStats {
    /// Update statistics with a finished batch.
    pub fn record_batch(&mut self, applied: u64, failed: u64, elapsed_ms: u64) {
        self.operations_applied += applied;
        self.operations_failed += failed;
        if failed == 0 {
            self.batches_applied += 1;
        } else {
            self.batches_failed += 1;
        }

        self.total_batch_time_ms += elapsed_ms;
        let batches = self.batches_applied + self.batches_failed;
        self.avg_batch_time_ms = self.total_batch_time_ms as f64 / batches as f64;
    }

    /// Record a commit operation.
    pub fn record_commit(&mut self) {
        self.commit_count += 1;
        self.last_commit_time = Some(Utc::now());
    }

    pub fn record_writer_open(&mut self) {
        self.writer_opens += 1;
    }

    pub fn record_force_unlock(&mut self) {
        self.force_unlocks += 1;
    }

    pub fn record_optimization(&mut self) {
        self.optimizations += 1;
    }
}

/// Shared, lock-protected statistics of one partition.
pub type SharedStats = Arc<RwLock<PartitionStats>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_batches() {
        let mut stats = PartitionStats::default();
        stats.record_batch(3, 0, 10);
        stats.record_batch(1, 2, 20);

        assert_eq!(stats.batches_applied, 1);
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.operations_applied, 4);
        assert_eq!(stats.operations_failed, 2);
        assert!((stats.avg_batch_time_ms - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_commit() {
        let mut stats = PartitionStats::default();
        assert!(stats.last_commit_time.is_none());
        stats.record_commit();
        assert_eq!(stats.commit_count, 1);
        assert!(stats.last_commit_time.is_some());

        let json = serde_json::to_string(&stats).unwrap();
        let restored: PartitionStats = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.commit_count, 1);
    }
}
