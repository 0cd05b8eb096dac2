//! Indexing schema.
//!
//! An [`IndexSchema`] describes every addressable path of one entity type:
//! value fields with their codec, object fields stored either flattened into
//! the owning document or as nested child documents, cardinality, and whether
//! a sub-schema is open-ended ("dynamic"). Schemas are immutable once built
//! and shared between threads through `Arc`.
//!
//! # Example
//!
//! ```
//! use searchsync::document::ValueType;
//! use searchsync::schema::{IndexSchema, ObjectStructure};
//!
//! let schema = IndexSchema::builder("book")
//!     .field("title", ValueType::Text)
//!     .multi_valued_field("tags", ValueType::Keyword)
//!     .object("author", ObjectStructure::Flattened, |author| {
//!         author.field("name", ValueType::Text)
//!     })
//!     .multi_valued_object("chapters", ObjectStructure::Nested, |chapter| {
//!         chapter.field("title", ValueType::Text)
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert!(schema.node("author.name").is_some());
//! assert!(schema.node("chapters.title").is_some());
//! ```

pub mod index_schema;
pub mod node;

pub use index_schema::{IndexSchema, IndexSchemaBuilder, ObjectSchemaBuilder, SchemaProvider, SchemaRegistry};
pub use node::{FieldTemplate, NodeKind, ObjectStructure, SchemaNode, TemplateTarget};
