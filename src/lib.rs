//! # Searchsync
//!
//! The indexing backend of a search integration layer: it keeps a full-text
//! index synchronized with application data.
//!
//! ## Features
//!
//! - Document assembly from nested object graphs (flattened and nested objects)
//! - Open-ended "dynamic" sub-schemas with field templates
//! - Writer sessions with exclusive, shared and near-real-time policies
//! - Per-partition batch queues applied in parallel on rayon pools
//! - Per-batch error contexts isolating failing operations
//! - An embedded tantivy index engine behind a pluggable engine seam

pub mod assembly;
pub mod backend;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod schema;
pub mod work;
pub mod writer;

pub mod prelude {
    pub use crate::assembly::{DocumentTreeBuilder, ElementId};
    pub use crate::backend::IndexingBackend;
    pub use crate::config::{BackendConfig, ExecutionMode, OptimizerConfig, PartitionConfig};
    pub use crate::document::{DocumentTree, FieldValue, ValueType};
    pub use crate::engine::{IndexDirectory, IndexSnapshot, MemoryDirectory, TantivyDirectory};
    pub use crate::error::{Result, SearchSyncError};
    pub use crate::schema::{IndexSchema, ObjectStructure, SchemaRegistry, TemplateTarget};
    pub use crate::work::{
        EntityPayload, EntityRef, ErrorContext, ErrorHandler, FnPayload, IndexOperation,
        JsonPayload,
    };
    pub use crate::writer::{SessionState, WriterPolicy, WriterSession};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
