//! Cached near-real-time snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::{EngineWriter, IndexSnapshot};
use crate::error::Result;

/// Holds the latest snapshot taken from an open writer.
///
/// Readers clone the cached snapshot under the read lock; a refresh swaps
/// in a new one under the write lock.
#[derive(Debug, Default)]
pub struct NearRealTimeReaders {
    snapshot: RwLock<Option<Arc<dyn IndexSnapshot>>>,
}

impl NearRealTimeReaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot with a fresh one from `writer`.
    pub fn refresh(&self, writer: &dyn EngineWriter) -> Result<()> {
        let snapshot = writer.near_real_time_snapshot()?;
        *self.snapshot.write() = Some(snapshot);
        Ok(())
    }

    pub fn current(&self) -> Option<Arc<dyn IndexSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn clear(&self) {
        self.snapshot.write().take();
    }
}
