//! The indexing backend facade.
//!
//! [`IndexingBackend`] owns every registered partition: its writer session,
//! executor and batch queue. Mutation producers only talk to the backend.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use searchsync::backend::IndexingBackend;
//! use searchsync::config::{BackendConfig, ExecutionMode, PartitionConfig};
//! use searchsync::document::ValueType;
//! use searchsync::engine::{IndexSnapshot, TantivyDirectory};
//! use searchsync::schema::{IndexSchema, SchemaRegistry};
//! use searchsync::work::{EntityRef, IndexOperation, JsonPayload};
//!
//! let mut schemas = SchemaRegistry::new();
//! schemas
//!     .register(IndexSchema::builder("book").field("title", ValueType::Text).build()?)?;
//!
//! let backend = IndexingBackend::new(BackendConfig::default(), Arc::new(schemas));
//! backend.register_partition(
//!     PartitionConfig::new("books"),
//!     Arc::new(TantivyDirectory::create_in_ram("books")?),
//! )?;
//!
//! let add = IndexOperation::add(
//!     EntityRef::new("book", "1"),
//!     JsonPayload::new(serde_json::json!({"title": "The Rust Book"})),
//! );
//! backend.apply_batch("books", vec![add], ExecutionMode::Sync)?;
//! assert_eq!(backend.open_reader("books")?.num_entities()?, 1);
//!
//! backend.shutdown_all()?;
//! # Ok::<(), searchsync::error::SearchSyncError>(())
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use log::info;
use parking_lot::RwLock;

use crate::config::{BackendConfig, ExecutionMode, PartitionConfig};
use crate::engine::{IndexDirectory, IndexSnapshot};
use crate::error::{Result, SearchSyncError};
use crate::schema::SchemaProvider;
use crate::work::error_context::{ErrorHandler, LogErrorHandler};
use crate::work::executor::WorkQueueExecutor;
use crate::work::operation::IndexOperation;
use crate::work::queue::BatchQueue;
use crate::work::stats::PartitionStats;
use crate::writer::WriterSession;

#[derive(Debug)]
struct Partition {
    config: PartitionConfig,
    session: Arc<WriterSession>,
    executor: Arc<WorkQueueExecutor>,
    queue: BatchQueue,
    lock: Arc<RwLock<()>>,
}

/// Applies index operations to a set of independently writable partitions.
#[derive(Debug)]
pub struct IndexingBackend {
    config: BackendConfig,
    schemas: Arc<dyn SchemaProvider>,
    error_handler: Arc<dyn ErrorHandler>,
    partitions: RwLock<AHashMap<String, Arc<Partition>>>,
}

impl IndexingBackend {
    /// Create a backend without partitions. Failures are logged.
    pub fn new(config: BackendConfig, schemas: Arc<dyn SchemaProvider>) -> Self {
        IndexingBackend {
            config,
            schemas,
            error_handler: Arc::new(LogErrorHandler),
            partitions: RwLock::new(AHashMap::new()),
        }
    }

    /// Route failures to `handler` instead of the log.
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Create a backend and register every partition of `config`, opening
    /// each partition's directory through `open_directory`.
    pub fn open<F>(
        config: BackendConfig,
        schemas: Arc<dyn SchemaProvider>,
        error_handler: Arc<dyn ErrorHandler>,
        open_directory: F,
    ) -> Result<Self>
    where
        F: Fn(&PartitionConfig) -> Result<Arc<dyn IndexDirectory>>,
    {
        config.validate()?;
        let partitions = config.partitions.clone();
        let backend = IndexingBackend::new(config, schemas).with_error_handler(error_handler);
        for partition in partitions {
            let directory = open_directory(&partition)?;
            backend.register_partition(partition, directory)?;
        }
        Ok(backend)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Register a partition and start its batch queue.
    pub fn register_partition(
        &self,
        config: PartitionConfig,
        directory: Arc<dyn IndexDirectory>,
    ) -> Result<()> {
        config.validate()?;
        let mut partitions = self.partitions.write();
        if partitions.contains_key(&config.partition_id) {
            return Err(SearchSyncError::invalid_argument(format!(
                "Partition '{}' already registered",
                config.partition_id
            )));
        }

        let session = Arc::new(
            WriterSession::new(
                config.partition_id.clone(),
                directory,
                config.writer_policy,
                Arc::clone(&self.error_handler),
            )
            .with_close_after_streaming(config.close_shared_writer_after_streaming),
        );
        let lock = Arc::new(RwLock::new(()));
        let executor = Arc::new(WorkQueueExecutor::new(
            Arc::clone(&session),
            Arc::clone(&self.schemas),
            Arc::clone(&lock),
            self.config.effective_thread_pool_size(&config),
            config.optimizer,
        )?);
        let queue = BatchQueue::start(Arc::clone(&executor), config.max_queue_length)?;

        info!(
            "Registered partition '{}' with {:?} writer policy and {} workers",
            config.partition_id,
            config.writer_policy,
            executor.thread_pool_size()
        );
        partitions.insert(
            config.partition_id.clone(),
            Arc::new(Partition {
                config,
                session,
                executor,
                queue,
                lock,
            }),
        );
        Ok(())
    }

    /// Ids of the registered partitions, sorted.
    pub fn partition_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.partitions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The configuration a partition was registered with.
    pub fn partition_config(&self, partition_id: &str) -> Result<PartitionConfig> {
        Ok(self.partition(partition_id)?.config.clone())
    }

    fn partition(&self, partition_id: &str) -> Result<Arc<Partition>> {
        self.partitions
            .read()
            .get(partition_id)
            .cloned()
            .ok_or_else(|| {
                SearchSyncError::not_found(format!("Partition '{partition_id}' is not registered"))
            })
    }

    /// Apply a batch to a partition.
    ///
    /// In sync mode the call returns once the batch is applied, with
    /// [`SearchSyncError::BatchFailed`] if any operation failed. In async
    /// mode it returns once the batch is queued.
    pub fn apply_batch(
        &self,
        partition_id: &str,
        operations: Vec<IndexOperation>,
        mode: ExecutionMode,
    ) -> Result<()> {
        let partition = self.partition(partition_id)?;
        match mode {
            ExecutionMode::Async => partition.queue.submit(operations),
            ExecutionMode::Sync => {
                let context = partition.queue.submit_and_wait(operations)?;
                if context.has_errors() {
                    Err(SearchSyncError::BatchFailed(Box::new(context)))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Apply one streaming operation on the calling thread.
    pub fn apply_single(&self, partition_id: &str, operation: &IndexOperation) -> Result<()> {
        self.partition(partition_id)?.executor.apply_single(operation)
    }

    /// The writer session of a partition, for maintenance work.
    pub fn writer_session(&self, partition_id: &str) -> Result<Arc<WriterSession>> {
        Ok(Arc::clone(&self.partition(partition_id)?.session))
    }

    /// A read-only snapshot of a partition.
    pub fn open_reader(&self, partition_id: &str) -> Result<Arc<dyn IndexSnapshot>> {
        self.partition(partition_id)?.session.open_reader()
    }

    /// Wait until every batch queued on the partition has been applied.
    pub fn flush(&self, partition_id: &str) -> Result<()> {
        self.partition(partition_id)?.queue.flush()
    }

    /// Force a merge of the partition.
    pub fn optimize(&self, partition_id: &str) -> Result<()> {
        self.partition(partition_id)?.executor.optimize()
    }

    pub fn stats(&self, partition_id: &str) -> Result<PartitionStats> {
        Ok(self.partition(partition_id)?.session.stats().read().clone())
    }

    /// Drain the partition's queue, close its writer and unregister it.
    pub fn shutdown(&self, partition_id: &str) -> Result<()> {
        let partition = self.partitions.write().remove(partition_id).ok_or_else(|| {
            SearchSyncError::not_found(format!("Partition '{partition_id}' is not registered"))
        })?;
        partition.queue.shutdown()?;
        {
            let _exclusive = partition.lock.write();
            partition.session.close();
        }
        info!("Shut down partition '{partition_id}'");
        Ok(())
    }

    /// Shut down every partition. All partitions are attempted; the first
    /// error is returned.
    pub fn shutdown_all(&self) -> Result<()> {
        let mut first_error = None;
        for partition_id in self.partition_ids() {
            if let Err(e) = self.shutdown(&partition_id)
                && first_error.is_none()
            {
                first_error = Some(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for IndexingBackend {
    fn drop(&mut self) {
        let _ = self.shutdown_all();
    }
}
