//! Work execution.
//!
//! Index operations reach a partition through its [`BatchQueue`], whose
//! single draining thread hands each batch to the [`WorkQueueExecutor`].
//! The executor fans the operations of a batch out to a rayon pool and
//! joins them before the next batch starts.

pub mod error_context;
pub mod executor;
pub mod operation;
pub mod optimizer;
pub mod queue;
pub mod stats;

pub use error_context::{
    ErrorContext, ErrorContextBuilder, ErrorHandler, FailedOperation, LogErrorHandler,
};
pub use executor::WorkQueueExecutor;
pub use operation::{EntityPayload, EntityRef, FnPayload, IndexOperation, JsonPayload};
pub use optimizer::Optimizer;
pub use queue::BatchQueue;
pub use stats::PartitionStats;
