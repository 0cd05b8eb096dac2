//! Error types for the searchsync library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`SearchSyncError`] enum. Schema violations raised while assembling a
//! document surface directly to the caller; engine failures raised while a
//! batch is running are collected into an
//! [`ErrorContext`](crate::work::error_context::ErrorContext) and only reach a
//! batch caller wrapped in [`SearchSyncError::BatchFailed`].
//!
//! # Examples
//!
//! ```
//! use searchsync::error::{Result, SearchSyncError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(SearchSyncError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

use crate::work::error_context::ErrorContext;

/// The main error type for searchsync operations.
#[derive(Error, Debug)]
pub enum SearchSyncError {
    /// I/O errors raised by the index engine (open, commit, close, write).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Schema-related errors (wrong field kind, codec type mismatch, invalid declarations).
    #[error("Schema error: {0}")]
    Schema(String),

    /// A field path that is not part of the indexing schema.
    #[error("Unknown field '{path}'")]
    UnknownField { path: String },

    /// A second value for a single-valued field within one document instance.
    #[error("Multiple values assigned to single-valued field '{path}'")]
    MultiValueOnSingleValuedField { path: String },

    /// A document or operation rejected by the index engine.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Errors raised by the embedded tantivy index.
    #[error("Index engine error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// The partition write lock could not be obtained.
    #[error("Lock error: {0}")]
    Lock(String),

    /// The writer for a partition could not be opened.
    #[error("Writer unavailable: {0}")]
    WriterUnavailable(String),

    /// A batch finished with at least one failed operation.
    #[error("Batch failed: {0}")]
    BatchFailed(Box<ErrorContext>),

    /// Invalid operation for the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Something looked up by name does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SearchSyncError.
pub type Result<T> = std::result::Result<T, SearchSyncError>;

impl SearchSyncError {
    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::Schema(msg.into())
    }

    /// Create a new unknown field error.
    pub fn unknown_field<S: Into<String>>(path: S) -> Self {
        SearchSyncError::UnknownField { path: path.into() }
    }

    /// Create a new single-valued field violation.
    pub fn multi_value_on_single_valued_field<S: Into<String>>(path: S) -> Self {
        SearchSyncError::MultiValueOnSingleValuedField { path: path.into() }
    }

    /// Create a new engine error.
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::Engine(msg.into())
    }

    /// Create a new lock error.
    pub fn lock<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::Lock(msg.into())
    }

    /// Create a new writer unavailable error.
    pub fn writer_unavailable<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::WriterUnavailable(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::InvalidOperation(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::Other(format!("Invalid argument: {}", msg.into()))
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::NotFound(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::Other(format!("Internal error: {}", msg.into()))
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SearchSyncError::Other(msg.into())
    }

    /// Whether this error is a schema violation raised by the document assembler.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            SearchSyncError::Schema(_)
                | SearchSyncError::UnknownField { .. }
                | SearchSyncError::MultiValueOnSingleValuedField { .. }
        )
    }

    /// The error context carried by a failed batch, if any.
    pub fn error_context(&self) -> Option<&ErrorContext> {
        match self {
            SearchSyncError::BatchFailed(context) => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SearchSyncError::schema("Test schema error");
        assert_eq!(error.to_string(), "Schema error: Test schema error");

        let error = SearchSyncError::unknown_field("author.name");
        assert_eq!(error.to_string(), "Unknown field 'author.name'");

        let error = SearchSyncError::multi_value_on_single_valued_field("title");
        assert_eq!(
            error.to_string(),
            "Multiple values assigned to single-valued field 'title'"
        );
        assert!(error.is_schema_error());
        assert!(!SearchSyncError::engine("rejected").is_schema_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::other("disk full");
        let error = SearchSyncError::from(io_error);

        match error {
            SearchSyncError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
        assert!(error.error_context().is_none());
    }

    #[test]
    fn test_tantivy_error_conversion() {
        let error = SearchSyncError::from(tantivy::TantivyError::InvalidArgument(
            "bad segment".to_string(),
        ));
        assert!(matches!(error, SearchSyncError::Tantivy(_)));
        assert!(error.to_string().starts_with("Index engine error:"));
        assert!(!error.is_schema_error());
    }
}
