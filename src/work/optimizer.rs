//! Forced merges driven by write volume.

use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

use crate::config::OptimizerConfig;
use crate::engine::EngineWriter;
use crate::error::Result;

/// Counts applied operations and batches of one partition and forces a
/// merge once a configured limit is reached.
#[derive(Debug, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
    operations: AtomicU64,
    transactions: AtomicU64,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Optimizer {
            config,
            operations: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Operations and batches counted since the last merge.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.operations.load(Ordering::Acquire),
            self.transactions.load(Ordering::Acquire),
        )
    }

    /// Account for a successful batch. Returns true when a merge ran.
    pub fn after_batch(&self, operations: usize, writer: &dyn EngineWriter) -> Result<bool> {
        if !self.config.is_enabled() {
            return Ok(false);
        }

        let operations =
            self.operations.fetch_add(operations as u64, Ordering::AcqRel) + operations as u64;
        let transactions = self.transactions.fetch_add(1, Ordering::AcqRel) + 1;

        let operation_limit_reached = self
            .config
            .operation_limit
            .is_some_and(|limit| operations >= limit);
        let transaction_limit_reached = self
            .config
            .transaction_limit
            .is_some_and(|limit| transactions >= limit);

        if operation_limit_reached || transaction_limit_reached {
            info!(
                "Optimizing after {operations} operations in {transactions} transactions"
            );
            self.optimize(writer)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Force a merge now and reset the counters.
    pub fn optimize(&self, writer: &dyn EngineWriter) -> Result<()> {
        self.operations.store(0, Ordering::Release);
        self.transactions.store(0, Ordering::Release);
        writer.force_merge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{IndexDirectory, MemoryDirectory};

    #[test]
    fn test_operation_limit() {
        let directory = MemoryDirectory::new("books");
        let writer = directory.open_writer().unwrap();
        let optimizer = Optimizer::new(OptimizerConfig {
            operation_limit: Some(5),
            transaction_limit: None,
        });

        assert!(!optimizer.after_batch(3, writer.as_ref()).unwrap());
        assert_eq!(optimizer.counters(), (3, 1));
        assert!(optimizer.after_batch(2, writer.as_ref()).unwrap());
        assert_eq!(optimizer.counters(), (0, 0));
        assert_eq!(directory.merge_count(), 1);
    }

    #[test]
    fn test_transaction_limit() {
        let directory = MemoryDirectory::new("books");
        let writer = directory.open_writer().unwrap();
        let optimizer = Optimizer::new(OptimizerConfig {
            operation_limit: None,
            transaction_limit: Some(2),
        });

        assert!(!optimizer.after_batch(100, writer.as_ref()).unwrap());
        assert!(optimizer.after_batch(1, writer.as_ref()).unwrap());
    }

    #[test]
    fn test_disabled() {
        let directory = MemoryDirectory::new("books");
        let writer = directory.open_writer().unwrap();
        let optimizer = Optimizer::default();
        assert!(!optimizer.after_batch(1_000_000, writer.as_ref()).unwrap());
        assert_eq!(optimizer.counters(), (0, 0));
        assert_eq!(directory.merge_count(), 0);
    }
}
