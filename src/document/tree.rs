//! The assembled document structure handed to the index engine.
//!
//! A [`DocumentTree`] holds every engine document representing one logical
//! entity. Nested children always precede their structural parent, and the
//! root document is the last node; engines relying on block-join semantics
//! need exactly this order.

use std::collections::BTreeSet;

use ahash::AHashMap;

use crate::document::codec::EncodedValue;

/// Names of the metadata fields injected when a tree is built.
pub mod metadata {
    /// Entity id, on the root document.
    pub const ID: &str = "__id";
    /// Entity id, on every document of the tree.
    pub const ROOT_ID: &str = "__root_id";
    /// Logical entity type, on every document.
    pub const ENTITY_TYPE: &str = "__entity_type";
    /// Document type marker, `root` or `child`.
    pub const TYPE: &str = "__type";
    /// Tenant identifier, when the entity belongs to a tenant.
    pub const TENANT_ID: &str = "__tenant_id";
    /// Routing key, when one was supplied.
    pub const ROUTING_KEY: &str = "__routing_key";
    /// Path of the nested object field a child document was created for.
    pub const NESTED_PATH: &str = "__nested_path";
    /// Field names promoted from existence markers.
    pub const FIELD_NAMES: &str = "__field_names";

    pub const TYPE_ROOT: &str = "root";
    pub const TYPE_CHILD: &str = "child";

    /// Whether a field name is reserved for metadata.
    pub fn is_reserved(name: &str) -> bool {
        name.starts_with("__")
    }
}

/// Whether a node is the entity itself or a nested child document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Root,
    Child,
}

/// One engine document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    kind: DocumentKind,
    nested_path: Option<String>,
    fields: AHashMap<String, Vec<EncodedValue>>,
    field_names: BTreeSet<String>,
}

impl DocumentNode {
    /// Create an empty node.
    pub fn new(kind: DocumentKind, nested_path: Option<String>) -> Self {
        DocumentNode {
            kind,
            nested_path,
            fields: AHashMap::new(),
            field_names: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// The nested object path this child document stands for; `None` for the root.
    pub fn nested_path(&self) -> Option<&str> {
        self.nested_path.as_deref()
    }

    /// Append a value to a field.
    pub fn add_value<S: Into<String>>(&mut self, name: S, value: EncodedValue) {
        self.fields.entry(name.into()).or_default().push(value);
    }

    /// Record that an object field exists in this document.
    pub fn mark_field_present<S: Into<String>>(&mut self, name: S) {
        self.field_names.insert(name.into());
    }

    /// All values of a field, in insertion order.
    pub fn values(&self, name: &str) -> &[EncodedValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first text value of a field.
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.values(name).first().and_then(EncodedValue::as_text)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names recorded as present by the existence markers.
    pub fn field_names_present(&self) -> &BTreeSet<String> {
        &self.field_names
    }

    pub fn fields(&self) -> &AHashMap<String, Vec<EncodedValue>> {
        &self.fields
    }

    /// Whether any value of `field` equals `value`.
    pub fn matches(&self, field: &str, value: &EncodedValue) -> bool {
        self.values(field).iter().any(|v| v == value)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.first_text(metadata::TENANT_ID)
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.first_text(metadata::ROUTING_KEY)
    }

    pub fn root_id(&self) -> Option<&str> {
        self.first_text(metadata::ROOT_ID)
    }

    /// Move the existence markers into the indexed `__field_names` field.
    pub(crate) fn promote_field_names(&mut self) {
        let names: Vec<EncodedValue> = self
            .field_names
            .iter()
            .map(|name| EncodedValue::Text(name.clone()))
            .collect();
        if !names.is_empty() {
            self.fields
                .entry(metadata::FIELD_NAMES.to_string())
                .or_default()
                .extend(names);
        }
    }
}

/// The ordered documents representing one logical indexed entity.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTree {
    entity_type: String,
    id: String,
    tenant_id: Option<String>,
    routing_key: Option<String>,
    nodes: Vec<DocumentNode>,
}

impl DocumentTree {
    pub(crate) fn new(
        entity_type: String,
        id: String,
        tenant_id: Option<String>,
        routing_key: Option<String>,
        nodes: Vec<DocumentNode>,
    ) -> Self {
        debug_assert!(matches!(
            nodes.last().map(DocumentNode::kind),
            Some(DocumentKind::Root)
        ));
        DocumentTree {
            entity_type,
            id,
            tenant_id,
            routing_key,
            nodes,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }

    /// The root document (always the last node).
    pub fn root(&self) -> &DocumentNode {
        &self.nodes[self.nodes.len() - 1]
    }

    /// The nested child documents, in tree order.
    pub fn children(&self) -> &[DocumentNode] {
        &self.nodes[..self.nodes.len() - 1]
    }

    pub fn nodes(&self) -> &[DocumentNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<DocumentNode> {
        self.nodes
    }

    /// Number of engine documents, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_values_and_markers() {
        let mut node = DocumentNode::new(DocumentKind::Root, None);
        node.add_value("tags", EncodedValue::from("a"));
        node.add_value("tags", EncodedValue::from("b"));
        node.mark_field_present("author");
        node.mark_field_present("author");
        node.promote_field_names();

        assert_eq!(node.values("tags").len(), 2);
        assert!(node.matches("tags", &EncodedValue::from("b")));
        assert!(node.values("missing").is_empty());
        assert_eq!(
            node.values(metadata::FIELD_NAMES),
            &[EncodedValue::from("author")]
        );
    }

    #[test]
    fn test_tree_root_is_last() {
        let child = DocumentNode::new(DocumentKind::Child, Some("chapters".into()));
        let root = DocumentNode::new(DocumentKind::Root, None);
        let tree = DocumentTree::new("book".into(), "1".into(), None, None, vec![child, root]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.root().kind(), DocumentKind::Root);
        assert_eq!(tree.children()[0].nested_path(), Some("chapters"));
        assert!(metadata::is_reserved(metadata::ID));
    }
}
