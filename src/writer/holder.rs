//! Ownership of the one engine writer of a partition.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::engine::{EngineWriter, IndexDirectory};
use crate::error::SearchSyncError;
use crate::work::error_context::{ErrorContextBuilder, ErrorHandler};
use crate::work::stats::SharedStats;
use crate::writer::SessionState;

/// Opens, commits and closes the writer of one partition.
///
/// Engine failures never escape: they are recorded into the batch's error
/// context when one is supplied and routed to the error handler otherwise.
#[derive(Debug)]
pub struct WriterHolder {
    partition_id: String,
    directory: Arc<dyn IndexDirectory>,
    error_handler: Arc<dyn ErrorHandler>,
    writer: Mutex<Option<Arc<dyn EngineWriter>>>,
    stats: SharedStats,
}

impl WriterHolder {
    pub fn new(
        partition_id: String,
        directory: Arc<dyn IndexDirectory>,
        error_handler: Arc<dyn ErrorHandler>,
        stats: SharedStats,
    ) -> Self {
        WriterHolder {
            partition_id,
            directory,
            error_handler,
            writer: Mutex::new(None),
            stats,
        }
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn directory(&self) -> &Arc<dyn IndexDirectory> {
        &self.directory
    }

    pub fn error_handler(&self) -> &Arc<dyn ErrorHandler> {
        &self.error_handler
    }

    pub fn state(&self) -> SessionState {
        match self.writer.lock().as_ref() {
            Some(writer) if !writer.is_closed() => SessionState::Open,
            _ => SessionState::Closed,
        }
    }

    /// The open writer, if any, without opening one.
    pub fn current(&self) -> Option<Arc<dyn EngineWriter>> {
        self.writer
            .lock()
            .as_ref()
            .filter(|writer| !writer.is_closed())
            .cloned()
    }

    /// Return the open writer, opening it first if needed.
    pub fn get_writer(
        &self,
        context: Option<&ErrorContextBuilder>,
    ) -> Option<Arc<dyn EngineWriter>> {
        let mut slot = self.writer.lock();
        if let Some(writer) = slot.as_ref()
            && !writer.is_closed()
        {
            return Some(Arc::clone(writer));
        }

        match self.directory.open_writer() {
            Ok(writer) => {
                info!("Opened index writer for partition '{}'", self.partition_id);
                self.stats.write().record_writer_open();
                *slot = Some(Arc::clone(&writer));
                Some(writer)
            }
            Err(e) => {
                *slot = None;
                let error = SearchSyncError::writer_unavailable(format!(
                    "Unable to open index writer for partition '{}': {e}",
                    self.partition_id
                ));
                match context {
                    Some(context) => context.record_cause(error),
                    None => self
                        .error_handler
                        .handle_exception("Unable to open index writer", &error),
                }
                None
            }
        }
    }

    /// Commit the open writer. Returns false when the commit failed.
    pub fn commit(&self) -> bool {
        let slot = self.writer.lock();
        let Some(writer) = slot.as_ref() else {
            return true;
        };
        match writer.commit() {
            Ok(()) => {
                debug!("Committed partition '{}'", self.partition_id);
                self.stats.write().record_commit();
                true
            }
            Err(e) => {
                self.error_handler.handle_exception(
                    &format!("Unable to commit partition '{}'", self.partition_id),
                    &e,
                );
                false
            }
        }
    }

    /// Close the writer. A failed close force-releases the write lock.
    pub fn close(&self) {
        let mut slot = self.writer.lock();
        let Some(writer) = slot.take() else {
            return;
        };
        match writer.close() {
            Ok(()) => {
                info!("Closed index writer for partition '{}'", self.partition_id);
                self.stats.write().record_commit();
            }
            Err(e) => {
                self.unlock_directory();
                self.error_handler.handle_exception(
                    &format!("Unable to close partition '{}'", self.partition_id),
                    &e,
                );
            }
        }
    }

    /// Close the writer on a best-effort basis, then clear the write lock
    /// whatever happened.
    pub fn force_unlock(&self) {
        let mut slot = self.writer.lock();
        if let Some(writer) = slot.take()
            && let Err(e) = writer.close()
        {
            warn!(
                "Ignoring close failure while force-unlocking partition '{}': {e}",
                self.partition_id
            );
        }
        self.unlock_directory();
    }

    fn unlock_directory(&self) {
        warn!("Force-unlocking partition '{}'", self.partition_id);
        self.stats.write().record_force_unlock();
        if let Err(e) = self.directory.force_unlock() {
            self.error_handler.handle_exception(
                &format!("Unable to release the write lock of partition '{}'", self.partition_id),
                &e,
            );
        }
    }
}
