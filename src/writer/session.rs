//! Writer sessions and their commit/close policies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineWriter, IndexDirectory, IndexSnapshot};
use crate::error::Result;
use crate::work::error_context::{ErrorContextBuilder, ErrorHandler};
use crate::work::stats::{PartitionStats, SharedStats};
use crate::writer::holder::WriterHolder;
use crate::writer::near_real_time::NearRealTimeReaders;

/// When a session commits and closes its writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriterPolicy {
    /// One entity type per partition. Commits after every successful batch
    /// and keeps the writer open.
    #[default]
    Exclusive,
    /// Several entity types share the partition. The last batch using the
    /// writer closes it.
    Shared,
    /// Like exclusive, but refreshes a cached snapshot instead of
    /// committing after each batch.
    NearRealTime,
}

/// Whether a session currently holds an open writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Closed,
    Open,
}

/// Owner of one partition's writer.
#[derive(Debug)]
pub struct WriterSession {
    holder: WriterHolder,
    policy: WriterPolicy,
    close_after_streaming: bool,
    users: AtomicUsize,
    failure_pending: AtomicBool,
    lifecycle: Mutex<()>,
    readers: NearRealTimeReaders,
    stats: SharedStats,
}

impl WriterSession {
    pub fn new<S: Into<String>>(
        partition_id: S,
        directory: Arc<dyn IndexDirectory>,
        policy: WriterPolicy,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        let stats: SharedStats = Arc::new(RwLock::new(PartitionStats::default()));
        WriterSession {
            holder: WriterHolder::new(
                partition_id.into(),
                directory,
                error_handler,
                Arc::clone(&stats),
            ),
            policy,
            close_after_streaming: false,
            users: AtomicUsize::new(0),
            failure_pending: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            readers: NearRealTimeReaders::new(),
            stats,
        }
    }

    /// With the shared policy, close the writer when the last streaming
    /// user leaves instead of keeping it open.
    pub fn with_close_after_streaming(mut self, close: bool) -> Self {
        self.close_after_streaming = close;
        self
    }

    pub fn partition_id(&self) -> &str {
        self.holder.partition_id()
    }

    pub fn policy(&self) -> WriterPolicy {
        self.policy
    }

    pub fn state(&self) -> SessionState {
        self.holder.state()
    }

    /// Number of batches currently using the writer (shared policy only).
    pub fn users(&self) -> usize {
        self.users.load(Ordering::Acquire)
    }

    pub fn directory(&self) -> &Arc<dyn IndexDirectory> {
        self.holder.directory()
    }

    pub fn error_handler(&self) -> &Arc<dyn ErrorHandler> {
        self.holder.error_handler()
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Return the writer, opening it if needed. `None` means the writer
    /// could not be opened; the failure went to `context` or to the error
    /// handler.
    pub fn get_writer(
        &self,
        context: Option<&ErrorContextBuilder>,
    ) -> Option<Arc<dyn EngineWriter>> {
        match self.policy {
            WriterPolicy::Shared => {
                let _lifecycle = self.lifecycle.lock();
                let writer = self.holder.get_writer(context)?;
                self.users.fetch_add(1, Ordering::AcqRel);
                Some(writer)
            }
            WriterPolicy::Exclusive | WriterPolicy::NearRealTime => {
                self.holder.get_writer(context)
            }
        }
    }

    /// Commit the open writer, if any.
    pub fn commit(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.holder.commit();
    }

    /// Close the open writer, if any.
    pub fn close(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.holder.close();
        self.readers.clear();
    }

    /// Best-effort close, then release the write lock unconditionally.
    pub fn force_unlock(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.force_unlock_locked();
    }

    fn force_unlock_locked(&self) {
        self.holder.force_unlock();
        self.readers.clear();
    }

    /// Tell the session a user of [`get_writer`](Self::get_writer) is done.
    ///
    /// `failure` is true when any operation failed; `streaming` is true for
    /// single operations applied outside of a batch.
    pub fn after_batch_applied(&self, failure: bool, streaming: bool) {
        let _lifecycle = self.lifecycle.lock();
        match self.policy {
            WriterPolicy::Exclusive => {
                if failure {
                    self.force_unlock_locked();
                } else if !streaming && !self.holder.commit() {
                    self.force_unlock_locked();
                }
            }
            WriterPolicy::Shared => self.shared_exit(failure, streaming),
            WriterPolicy::NearRealTime => {
                if failure {
                    self.force_unlock_locked();
                } else if !streaming {
                    self.refresh_readers();
                }
            }
        }
    }

    fn shared_exit(&self, failure: bool, streaming: bool) {
        if failure {
            self.failure_pending.store(true, Ordering::Release);
        }

        let previous = self
            .users
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |users| {
                users.checked_sub(1)
            })
            .unwrap_or_else(|_| {
                warn!(
                    "Writer of partition '{}' released more often than acquired",
                    self.partition_id()
                );
                0
            });

        if previous <= 1 {
            if self.failure_pending.swap(false, Ordering::AcqRel) {
                self.force_unlock_locked();
            } else if !streaming || self.close_after_streaming {
                debug!("Last user of partition '{}' closes the writer", self.partition_id());
                self.holder.close();
            }
        } else if !failure && !streaming && !self.holder.commit() {
            self.failure_pending.store(true, Ordering::Release);
        }
    }

    fn refresh_readers(&self) {
        let Some(writer) = self.holder.current() else {
            return;
        };
        if let Err(e) = self.readers.refresh(writer.as_ref()) {
            self.error_handler().handle_exception(
                &format!(
                    "Unable to refresh the near-real-time reader of partition '{}'",
                    self.partition_id()
                ),
                &e,
            );
        }
    }

    /// A read-only snapshot of the partition.
    ///
    /// The near-real-time policy serves its cached snapshot, which includes
    /// uncommitted changes; the other policies read the last commit.
    pub fn open_reader(&self) -> Result<Arc<dyn IndexSnapshot>> {
        if self.policy == WriterPolicy::NearRealTime {
            if let Some(snapshot) = self.readers.current() {
                return Ok(snapshot);
            }
            if let Some(writer) = self.holder.current() {
                self.readers.refresh(writer.as_ref())?;
                if let Some(snapshot) = self.readers.current() {
                    return Ok(snapshot);
                }
            }
        }
        self.directory().open_snapshot()
    }
}
