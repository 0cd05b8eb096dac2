//! The per-partition batch queue.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, SearchSyncError};
use crate::work::error_context::ErrorContext;
use crate::work::executor::WorkQueueExecutor;
use crate::work::operation::IndexOperation;

enum QueueMessage {
    Batch {
        operations: Vec<IndexOperation>,
        completion: Option<Sender<ErrorContext>>,
    },
    Flush(Sender<()>),
    Shutdown,
}

/// A bounded queue drained by one thread, so the batches of a partition are
/// applied one after the other in submission order.
///
/// Submitting to a full queue blocks until the drainer catches up.
#[derive(Debug)]
pub struct BatchQueue {
    partition_id: String,
    sender: Sender<QueueMessage>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    /// Held shared while sending and exclusively by shutdown, so nothing is
    /// enqueued behind the shutdown marker.
    running: RwLock<bool>,
}

impl BatchQueue {
    /// Start the draining thread.
    pub fn start(executor: Arc<WorkQueueExecutor>, capacity: usize) -> Result<Self> {
        let partition_id = executor.partition_id().to_string();
        let (sender, receiver) = bounded(capacity.max(1));

        let worker = thread::Builder::new()
            .name(format!("searchsync-queue-{partition_id}"))
            .spawn(move || drain(executor, receiver))?;
        info!("Started batch queue for partition '{partition_id}'");

        Ok(BatchQueue {
            partition_id,
            sender,
            worker: Mutex::new(Some(worker)),
            running: RwLock::new(true),
        })
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    /// Number of messages waiting to be drained.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Enqueue a batch without waiting for it.
    pub fn submit(&self, operations: Vec<IndexOperation>) -> Result<()> {
        self.send(QueueMessage::Batch {
            operations,
            completion: None,
        })
    }

    /// Enqueue a batch and wait until it has been applied.
    pub fn submit_and_wait(&self, operations: Vec<IndexOperation>) -> Result<ErrorContext> {
        let (completion, done) = bounded(1);
        self.send(QueueMessage::Batch {
            operations,
            completion: Some(completion),
        })?;
        done.recv().map_err(|_| self.stopped())
    }

    /// Wait until every batch submitted so far has been applied.
    pub fn flush(&self) -> Result<()> {
        let (completion, done) = bounded(1);
        self.send(QueueMessage::Flush(completion))?;
        done.recv().map_err(|_| self.stopped())
    }

    /// Drain the remaining batches, then stop the thread.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut running = self.running.write();
            if !*running {
                return Ok(());
            }
            *running = false;
            if self.sender.send(QueueMessage::Shutdown).is_err() {
                warn!(
                    "Batch queue of partition '{}' stopped unexpectedly",
                    self.partition_id
                );
            }
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.join().map_err(|_| {
                SearchSyncError::internal(format!(
                    "Batch queue thread of partition '{}' panicked",
                    self.partition_id
                ))
            })?;
        }
        info!("Stopped batch queue for partition '{}'", self.partition_id);
        Ok(())
    }

    fn send(&self, message: QueueMessage) -> Result<()> {
        let running = self.running.read();
        if !*running {
            return Err(self.stopped());
        }
        self.sender.send(message).map_err(|_| self.stopped())
    }

    fn stopped(&self) -> SearchSyncError {
        SearchSyncError::invalid_operation(format!(
            "Batch queue of partition '{}' is shut down",
            self.partition_id
        ))
    }
}

impl Drop for BatchQueue {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn drain(executor: Arc<WorkQueueExecutor>, receiver: Receiver<QueueMessage>) {
    while let Ok(message) = receiver.recv() {
        match message {
            QueueMessage::Batch {
                operations,
                completion,
            } => {
                let context = executor.apply_batch(&operations);
                if let Some(completion) = completion {
                    let _ = completion.send(context);
                }
            }
            QueueMessage::Flush(completion) => {
                let _ = completion.send(());
            }
            QueueMessage::Shutdown => break,
        }
    }
    debug!(
        "Batch queue thread of partition '{}' exiting",
        executor.partition_id()
    );
}
