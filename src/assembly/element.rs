//! Arena entries of the document builder.

use std::sync::Arc;

use ahash::AHashSet;

use crate::document::tree::{DocumentKind, DocumentNode};
use crate::schema::SchemaNode;

/// Handle to an element (the root, or one object instance) of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    /// The root element of every builder.
    pub const ROOT: ElementId = ElementId(0);
}

/// What an element writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// The entity itself.
    Root,
    /// A flattened object instance sharing its parent's document.
    Flattened,
    /// A nested object instance with its own child document.
    Nested,
    /// A null object; absorbs every call without writing.
    Absent,
}

#[derive(Debug)]
pub(crate) struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) node: Option<Arc<SchemaNode>>,
    pub(crate) parent: Option<ElementId>,
    pub(crate) document: usize,
    /// Single-valued paths already assigned in this instance.
    pub(crate) encountered: AHashSet<String>,
}

impl Element {
    pub(crate) fn root() -> Self {
        Element {
            kind: ElementKind::Root,
            node: None,
            parent: None,
            document: 0,
            encountered: AHashSet::new(),
        }
    }

    pub(crate) fn child(
        kind: ElementKind,
        node: Arc<SchemaNode>,
        parent: ElementId,
        document: usize,
    ) -> Self {
        Element {
            kind,
            node: Some(node),
            parent: Some(parent),
            document,
            encountered: AHashSet::new(),
        }
    }

    /// Absolute object path; empty for the root.
    pub(crate) fn path(&self) -> &str {
        self.node.as_deref().map(SchemaNode::path).unwrap_or("")
    }
}

/// A document under construction and the nested children registered on it.
#[derive(Debug)]
pub(crate) struct DocumentBuffer {
    pub(crate) node: DocumentNode,
    pub(crate) nested_children: Vec<usize>,
}

impl DocumentBuffer {
    pub(crate) fn new(kind: DocumentKind, nested_path: Option<String>) -> Self {
        DocumentBuffer {
            node: DocumentNode::new(kind, nested_path),
            nested_children: Vec::new(),
        }
    }
}
