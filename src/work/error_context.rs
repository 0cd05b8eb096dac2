//! Per-batch error accounting.
//!
//! Every batch gets an [`ErrorContextBuilder`] shared by the workers
//! applying its operations. Once the batch is over the builder is turned
//! into an immutable [`ErrorContext`], which is what error handlers and
//! batch callers see.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::error;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::SearchSyncError;
use crate::work::operation::IndexOperation;

/// An operation that did not reach the engine, and why.
#[derive(Debug, Clone)]
pub struct FailedOperation {
    pub operation: IndexOperation,
    pub error: Arc<SearchSyncError>,
}

/// Outcome of one batch.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    batch_id: Uuid,
    partition_id: String,
    created_at: DateTime<Utc>,
    applied: Vec<IndexOperation>,
    failed: Vec<FailedOperation>,
    operation_at_fault: Option<IndexOperation>,
    cause: Option<Arc<SearchSyncError>>,
}

impl ErrorContext {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Operations that failed, each with its own error.
    pub fn failing_operations(&self) -> &[FailedOperation] {
        &self.failed
    }

    /// Operations that reached the engine.
    pub fn operations_that_worked(&self) -> &[IndexOperation] {
        &self.applied
    }

    /// The first operation that failed.
    pub fn operation_at_fault(&self) -> Option<&IndexOperation> {
        self.operation_at_fault.as_ref()
    }

    /// The first error recorded for the batch.
    pub fn cause(&self) -> Option<&SearchSyncError> {
        self.cause.as_deref()
    }

    pub fn has_errors(&self) -> bool {
        self.cause.is_some() || !self.failed.is_empty()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} on partition '{}': {} failed, {} applied",
            self.batch_id,
            self.partition_id,
            self.failed.len(),
            self.applied.len()
        )?;
        if let Some(operation) = &self.operation_at_fault {
            write!(f, "; first failure: {operation}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "; cause: {cause}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BuilderState {
    applied: Vec<IndexOperation>,
    failed: Vec<FailedOperation>,
    operation_at_fault: Option<IndexOperation>,
    cause: Option<Arc<SearchSyncError>>,
}

/// Collects the outcome of a batch while its operations run.
#[derive(Debug)]
pub struct ErrorContextBuilder {
    batch_id: Uuid,
    partition_id: String,
    state: Mutex<BuilderState>,
}

impl ErrorContextBuilder {
    pub fn new<S: Into<String>>(partition_id: S) -> Self {
        ErrorContextBuilder {
            batch_id: Uuid::new_v4(),
            partition_id: partition_id.into(),
            state: Mutex::new(BuilderState::default()),
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn record_applied(&self, operation: &IndexOperation) {
        self.state.lock().applied.push(operation.clone());
    }

    /// Record a failed operation. The first failure becomes the batch cause.
    pub fn record_failure(&self, operation: &IndexOperation, error: SearchSyncError) {
        let error = Arc::new(error);
        let mut state = self.state.lock();
        if state.operation_at_fault.is_none() {
            state.operation_at_fault = Some(operation.clone());
        }
        if state.cause.is_none() {
            state.cause = Some(Arc::clone(&error));
        }
        state.failed.push(FailedOperation {
            operation: operation.clone(),
            error,
        });
    }

    /// Record an error not tied to any operation, such as a writer that
    /// could not be opened.
    pub fn record_cause(&self, error: SearchSyncError) {
        let mut state = self.state.lock();
        if state.cause.is_none() {
            state.cause = Some(Arc::new(error));
        }
    }

    /// Mark every operation as failed with a single shared error.
    pub fn fail_all(&self, operations: &[IndexOperation], error: SearchSyncError) {
        let error = Arc::new(error);
        let mut state = self.state.lock();
        if state.cause.is_none() {
            state.cause = Some(Arc::clone(&error));
        }
        if state.operation_at_fault.is_none() {
            state.operation_at_fault = operations.first().cloned();
        }
        state
            .failed
            .extend(operations.iter().cloned().map(|operation| FailedOperation {
                operation,
                error: Arc::clone(&error),
            }));
    }

    pub fn has_errors(&self) -> bool {
        let state = self.state.lock();
        state.cause.is_some() || !state.failed.is_empty()
    }

    pub fn build(self) -> ErrorContext {
        let state = self.state.into_inner();
        ErrorContext {
            batch_id: self.batch_id,
            partition_id: self.partition_id,
            created_at: Utc::now(),
            applied: state.applied,
            failed: state.failed,
            operation_at_fault: state.operation_at_fault,
            cause: state.cause,
        }
    }
}

/// Receives the failures the backend does not propagate to a caller.
///
/// Implementations must not panic.
pub trait ErrorHandler: Send + Sync + fmt::Debug {
    /// A batch finished with errors.
    fn handle(&self, context: &ErrorContext);

    /// An error outside of any batch, e.g. while committing in the background.
    fn handle_exception(&self, message: &str, error: &SearchSyncError);
}

/// Logs every failure at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, context: &ErrorContext) {
        error!("Indexing failure in {context}");
        for failed in context.failing_operations() {
            error!("  {}: {}", failed.operation, failed.error);
        }
    }

    fn handle_exception(&self, message: &str, error: &SearchSyncError) {
        error!("{message}: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::operation::EntityRef;

    fn delete(id: &str) -> IndexOperation {
        IndexOperation::delete(EntityRef::new("book", id))
    }

    #[test]
    fn test_first_failure_is_at_fault() {
        let builder = ErrorContextBuilder::new("books");
        builder.record_applied(&delete("1"));
        builder.record_failure(&delete("2"), SearchSyncError::engine("rejected"));
        builder.record_failure(&delete("3"), SearchSyncError::engine("also rejected"));
        assert!(builder.has_errors());

        let context = builder.build();
        assert_eq!(context.partition_id(), "books");
        assert_eq!(context.operations_that_worked().len(), 1);
        assert_eq!(context.failing_operations().len(), 2);
        assert_eq!(
            context.operation_at_fault().and_then(|o| o.entity()).map(|e| e.id.as_str()),
            Some("2")
        );
        assert_eq!(
            context.cause().map(ToString::to_string),
            Some("Engine error: rejected".to_string())
        );
        assert!(context.to_string().contains("2 failed, 1 applied"));
    }

    #[test]
    fn test_fail_all_shares_one_cause() {
        let builder = ErrorContextBuilder::new("books");
        let operations = vec![delete("1"), delete("2")];
        builder.fail_all(
            &operations,
            SearchSyncError::writer_unavailable("partition 'books' previously failed"),
        );
        let context = builder.build();

        assert_eq!(context.failing_operations().len(), 2);
        assert!(context.operations_that_worked().is_empty());
        assert!(matches!(
            context.cause(),
            Some(SearchSyncError::WriterUnavailable(_))
        ));
    }

    #[test]
    fn test_empty_context() {
        let context = ErrorContextBuilder::new("books").build();
        assert!(!context.has_errors());
        assert!(context.cause().is_none());
        LogErrorHandler.handle(&context);
    }
}
