//! Document model handed to the index engine.
//!
//! An entity is indexed as a [`tree::DocumentTree`]: an ordered sequence of
//! [`tree::DocumentNode`]s written atomically. Values enter the tree as
//! [`field_value::FieldValue`]s and are stored as
//! [`codec::EncodedValue`]s produced by a per-field [`codec::FieldCodec`].
//!
//! # Supported Field Types
//!
//! - **Text** - Analyzed text for full-text search
//! - **Keyword** - Exact-match strings
//! - **Integer** - i64 integer values
//! - **Float** - f64 floating-point values
//! - **Boolean** - true/false values
//! - **DateTime** - UTC timestamps
//! - **Binary** - Raw binary data

pub mod codec;
pub mod field_value;
pub mod tree;

pub use codec::{DefaultCodec, EncodedValue, FieldCodec, ValueType};
pub use field_value::FieldValue;
pub use tree::{DocumentKind, DocumentNode, DocumentTree};
