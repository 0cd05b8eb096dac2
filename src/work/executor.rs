//! Applies batches of index operations to one partition.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use parking_lot::RwLock;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::OptimizerConfig;
use crate::engine::EngineWriter;
use crate::error::{Result, SearchSyncError};
use crate::schema::SchemaProvider;
use crate::work::error_context::{ErrorContext, ErrorContextBuilder};
use crate::work::operation::IndexOperation;
use crate::work::optimizer::Optimizer;
use crate::writer::WriterSession;

/// Runs the operations of a batch in parallel against the partition's
/// writer and reports the outcome to the writer session.
///
/// Batches and single operations hold the partition lock in shared mode
/// while they run; [`optimize`](Self::optimize) and partition shutdown take
/// it exclusively.
#[derive(Debug)]
pub struct WorkQueueExecutor {
    partition_id: String,
    session: Arc<WriterSession>,
    schemas: Arc<dyn SchemaProvider>,
    thread_pool: ThreadPool,
    partition_lock: Arc<RwLock<()>>,
    optimizer: Optimizer,
}

impl WorkQueueExecutor {
    /// Create an executor with its own worker pool.
    pub fn new(
        session: Arc<WriterSession>,
        schemas: Arc<dyn SchemaProvider>,
        partition_lock: Arc<RwLock<()>>,
        thread_pool_size: usize,
        optimizer: OptimizerConfig,
    ) -> Result<Self> {
        let partition_id = session.partition_id().to_string();
        let thread_name = partition_id.clone();
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(thread_pool_size)
            .thread_name(move |i| format!("searchsync-{thread_name}-{i}"))
            .build()
            .map_err(|e| SearchSyncError::internal(format!("Failed to create thread pool: {e}")))?;

        Ok(WorkQueueExecutor {
            partition_id,
            session,
            schemas,
            thread_pool,
            partition_lock,
            optimizer: Optimizer::new(optimizer),
        })
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn session(&self) -> &Arc<WriterSession> {
        &self.session
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn thread_pool_size(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Apply a batch and return its error context.
    ///
    /// Failures are also reported to the session's error handler. The call
    /// returns only after every operation of the batch has finished.
    pub fn apply_batch(&self, operations: &[IndexOperation]) -> ErrorContext {
        let context = ErrorContextBuilder::new(&self.partition_id);
        if operations.is_empty() {
            return context.build();
        }

        let start = Instant::now();
        let _partition = self.partition_lock.read();
        debug!(
            "Applying batch {} of {} operations to partition '{}'",
            context.batch_id(),
            operations.len(),
            self.partition_id
        );

        let Some(writer) = self.session.get_writer(Some(&context)) else {
            return self.fail_unavailable(context, operations, start);
        };

        self.thread_pool.scope(|scope| {
            for operation in operations {
                let writer = &writer;
                let context = &context;
                let schemas = &self.schemas;
                scope.spawn(move |_| {
                    run_operation(operation, writer.as_ref(), schemas.as_ref(), context)
                });
            }
        });

        let failure = context.has_errors();
        if !failure {
            self.account_for_batch(operations.len(), writer.as_ref());
        }
        drop(writer);
        self.session.after_batch_applied(failure, false);

        let context = context.build();
        self.finish(&context, start);
        context
    }

    /// Apply one operation on the calling thread.
    ///
    /// The writer session treats it as streaming work: it is not committed
    /// on its own and does not count towards optimization.
    pub fn apply_single(&self, operation: &IndexOperation) -> Result<()> {
        let start = Instant::now();
        let _partition = self.partition_lock.read();
        let context = ErrorContextBuilder::new(&self.partition_id);

        let Some(writer) = self.session.get_writer(Some(&context)) else {
            let context =
                self.fail_unavailable(context, std::slice::from_ref(operation), start);
            return Err(SearchSyncError::BatchFailed(Box::new(context)));
        };

        run_operation(operation, writer.as_ref(), self.schemas.as_ref(), &context);
        drop(writer);

        let failure = context.has_errors();
        self.session.after_batch_applied(failure, true);

        let context = context.build();
        self.finish(&context, start);
        if failure {
            Err(SearchSyncError::BatchFailed(Box::new(context)))
        } else {
            Ok(())
        }
    }

    /// Force a merge of the partition, excluding every batch while it runs.
    pub fn optimize(&self) -> Result<()> {
        let _partition = self.partition_lock.write();
        let writer = self.session.get_writer(None).ok_or_else(|| {
            SearchSyncError::writer_unavailable(format!(
                "Cannot optimize partition '{}': writer unavailable",
                self.partition_id
            ))
        })?;
        let result = self.optimizer.optimize(writer.as_ref());
        drop(writer);
        self.session.after_batch_applied(result.is_err(), false);
        result?;
        self.session.stats().write().record_optimization();
        info!("Optimized partition '{}'", self.partition_id);
        Ok(())
    }

    fn account_for_batch(&self, operations: usize, writer: &dyn EngineWriter) {
        match self.optimizer.after_batch(operations, writer) {
            Ok(true) => self.session.stats().write().record_optimization(),
            Ok(false) => {}
            Err(e) => self.session.error_handler().handle_exception(
                &format!("Unable to optimize partition '{}'", self.partition_id),
                &e,
            ),
        }
    }

    fn fail_unavailable(
        &self,
        context: ErrorContextBuilder,
        operations: &[IndexOperation],
        start: Instant,
    ) -> ErrorContext {
        context.fail_all(
            operations,
            SearchSyncError::writer_unavailable(format!(
                "cannot apply work, partition '{}' previously failed",
                self.partition_id
            )),
        );
        let context = context.build();
        self.finish(&context, start);
        context
    }

    fn finish(&self, context: &ErrorContext, start: Instant) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.session.stats().write().record_batch(
            context.operations_that_worked().len() as u64,
            context.failing_operations().len() as u64,
            elapsed_ms,
        );
        if context.has_errors() {
            self.session.error_handler().handle(context);
        } else {
            debug!(
                "Applied batch {} to partition '{}' in {elapsed_ms}ms",
                context.batch_id(),
                self.partition_id
            );
        }
    }
}

fn run_operation(
    operation: &IndexOperation,
    writer: &dyn EngineWriter,
    schemas: &dyn SchemaProvider,
    context: &ErrorContextBuilder,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| operation.apply(writer, schemas)));
    match outcome {
        Ok(Ok(())) => context.record_applied(operation),
        Ok(Err(e)) => context.record_failure(operation, e),
        Err(payload) => context.record_failure(
            operation,
            SearchSyncError::internal(format!(
                "Operation {operation} panicked: {}",
                panic_message(payload.as_ref())
            )),
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
