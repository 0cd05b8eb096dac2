//! Document assembly.
//!
//! A [`DocumentTreeBuilder`] turns the value and object calls an entity
//! payload makes into a [`DocumentTree`](crate::document::DocumentTree),
//! checking every call against the entity's
//! [`IndexSchema`](crate::schema::IndexSchema). Schema violations surface
//! immediately to the caller.

pub mod builder;
pub mod element;

pub use builder::DocumentTreeBuilder;
pub use element::{ElementId, ElementKind};
