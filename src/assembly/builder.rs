//! Per-entity document tree builder.

use std::sync::Arc;

use ahash::AHashMap;

use crate::assembly::element::{DocumentBuffer, Element, ElementId, ElementKind};
use crate::document::codec::EncodedValue;
use crate::document::field_value::FieldValue;
use crate::document::tree::{DocumentKind, DocumentNode, DocumentTree, metadata};
use crate::error::{Result, SearchSyncError};
use crate::schema::index_schema::validate_field_name;
use crate::schema::node::join_path;
use crate::schema::{IndexSchema, NodeKind, ObjectStructure, SchemaNode};

/// Assembles the documents of one entity from a sequence of value and
/// object calls.
///
/// Elements are kept in an arena and refer to their parent by
/// [`ElementId`]. Flattened object instances share their parent's document
/// but keep their own single-valued cardinality; nested instances get a
/// child document of their own.
#[derive(Debug)]
pub struct DocumentTreeBuilder {
    schema: Arc<IndexSchema>,
    elements: Vec<Element>,
    documents: Vec<DocumentBuffer>,
    dynamic_nodes: AHashMap<String, Arc<SchemaNode>>,
}

impl DocumentTreeBuilder {
    /// Create a builder for one entity of the schema's entity type.
    pub fn new(schema: Arc<IndexSchema>) -> Self {
        DocumentTreeBuilder {
            schema,
            elements: vec![Element::root()],
            documents: vec![DocumentBuffer::new(DocumentKind::Root, None)],
            dynamic_nodes: AHashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    /// The root element.
    pub fn root(&self) -> ElementId {
        ElementId::ROOT
    }

    pub fn element_kind(&self, element: ElementId) -> ElementKind {
        self.element(element).kind
    }

    /// Absolute object path of an element; empty for the root.
    pub fn element_path(&self, element: ElementId) -> &str {
        self.element(element).path()
    }

    /// Number of documents allocated so far, root included.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Resolve `field` relative to `element`.
    ///
    /// `field` is a single name, never a dotted path: values of sub-objects
    /// go through [`add_object_field`](Self::add_object_field). Declared
    /// nodes are looked up first; unknown names under a dynamic object are
    /// resolved through the nearest matching field template.
    pub fn resolve(&mut self, element: ElementId, field: &str) -> Result<Arc<SchemaNode>> {
        let parent_path = self.element(element).path().to_string();
        validate_field_name(&parent_path, field)?;
        let path = join_path(&parent_path, field);

        if let Some(node) = self.schema.node(&path) {
            return Ok(Arc::clone(node));
        }
        if let Some(node) = self.dynamic_nodes.get(&path) {
            return Ok(Arc::clone(node));
        }

        let node = self
            .instantiate_from_template(element, &parent_path, field)
            .ok_or_else(|| SearchSyncError::unknown_field(path.clone()))?;
        let node = Arc::new(node);
        self.dynamic_nodes.insert(path, Arc::clone(&node));
        Ok(node)
    }

    /// Add one value to a value field of `element`.
    pub fn add_value<V: Into<FieldValue>>(
        &mut self,
        element: ElementId,
        field: &str,
        value: V,
    ) -> Result<()> {
        if self.element(element).kind == ElementKind::Absent {
            return Ok(());
        }

        let value = value.into();
        let node = self.resolve(element, field)?;
        let codec = match node.kind() {
            NodeKind::Value { codec, .. } => Arc::clone(codec),
            NodeKind::Object { .. } => {
                return Err(SearchSyncError::schema(format!(
                    "'{}' is an object field, not a value field",
                    node.path()
                )));
            }
        };

        let single_valued = !node.is_multi_valued();
        if single_valued && self.element(element).encountered.contains(node.path()) {
            return Err(SearchSyncError::multi_value_on_single_valued_field(
                node.path(),
            ));
        }

        let encoded = if value.is_null() {
            None
        } else {
            Some(codec.encode(&value)?)
        };

        if single_valued {
            self.elements[element.0]
                .encountered
                .insert(node.path().to_string());
        }

        if let Some(encoded) = encoded {
            let document = self.element(element).document;
            self.documents[document]
                .node
                .add_value(node.path(), encoded);
            if node.is_dynamic() {
                self.mark_existence(element);
            }
        }
        Ok(())
    }

    /// Add a present object instance under `element`.
    pub fn add_object_field(&mut self, element: ElementId, field: &str) -> Result<ElementId> {
        self.object_field(element, field, false)
    }

    /// Record a null object under `element`; the returned element absorbs
    /// every call made on it.
    pub fn add_null_object_field(&mut self, element: ElementId, field: &str) -> Result<ElementId> {
        self.object_field(element, field, true)
    }

    fn object_field(&mut self, element: ElementId, field: &str, null: bool) -> Result<ElementId> {
        if self.element(element).kind == ElementKind::Absent {
            return Ok(element);
        }

        let node = self.resolve(element, field)?;
        let structure = node.structure().ok_or_else(|| {
            SearchSyncError::schema(format!(
                "'{}' is a value field, not an object field",
                node.path()
            ))
        })?;

        if !node.is_multi_valued()
            && !self.elements[element.0]
                .encountered
                .insert(node.path().to_string())
        {
            return Err(SearchSyncError::multi_value_on_single_valued_field(
                node.path(),
            ));
        }

        let parent_document = self.element(element).document;
        let child = if null {
            Element::child(ElementKind::Absent, node, element, parent_document)
        } else {
            match structure {
                ObjectStructure::Flattened => {
                    Element::child(ElementKind::Flattened, node, element, parent_document)
                }
                ObjectStructure::Nested => {
                    let document = self.documents.len();
                    self.documents.push(DocumentBuffer::new(
                        DocumentKind::Child,
                        Some(node.path().to_string()),
                    ));
                    self.documents[parent_document]
                        .nested_children
                        .push(document);
                    Element::child(ElementKind::Nested, node, element, document)
                }
            }
        };

        let id = ElementId(self.elements.len());
        self.elements.push(child);
        Ok(id)
    }

    /// Finish the entity and produce its document tree, nested children
    /// first and the root last.
    pub fn build(self, tenant_id: Option<&str>, id: &str, routing_key: Option<&str>) -> DocumentTree {
        let entity_type = self.schema.entity_type().to_string();
        let mut buffers: Vec<Option<DocumentBuffer>> =
            self.documents.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(buffers.len());
        collect_post_order(0, &mut buffers, &mut nodes);

        for node in &mut nodes {
            node.promote_field_names();
            inject_metadata(node, &entity_type, tenant_id, id, routing_key);
        }

        DocumentTree::new(
            entity_type,
            id.to_string(),
            tenant_id.map(str::to_string),
            routing_key.map(str::to_string),
            nodes,
        )
    }

    fn element(&self, element: ElementId) -> &Element {
        &self.elements[element.0]
    }

    fn is_dynamic(&self, element: &Element) -> bool {
        match &element.node {
            Some(node) => node.is_dynamic(),
            None => self.schema.is_root_dynamic(),
        }
    }

    fn instantiate_from_template(
        &self,
        element: ElementId,
        parent_path: &str,
        field: &str,
    ) -> Option<SchemaNode> {
        let mut current = Some(element);
        while let Some(id) = current {
            let candidate = self.element(id);
            if !self.is_dynamic(candidate) {
                return None;
            }
            let templates = match &candidate.node {
                Some(node) => node.templates(),
                None => self.schema.root_templates(),
            };
            if let Some(template) = templates.iter().find(|t| t.matches(field)) {
                return Some(template.instantiate(parent_path, field));
            }
            current = candidate.parent;
        }
        None
    }

    /// Mark the object path of `element` as present in the document holding
    /// it, then keep walking up while the marked object is dynamic.
    fn mark_existence(&mut self, element: ElementId) {
        let mut current = element;
        loop {
            let candidate = self.element(current);
            let (Some(parent), Some(node)) = (candidate.parent, candidate.node.clone()) else {
                break;
            };
            let document = self.element(parent).document;
            self.documents[document]
                .node
                .mark_field_present(node.path());
            if !node.is_dynamic() {
                break;
            }
            current = parent;
        }
    }
}

fn collect_post_order(
    index: usize,
    buffers: &mut [Option<DocumentBuffer>],
    out: &mut Vec<DocumentNode>,
) {
    let Some(buffer) = buffers[index].take() else {
        return;
    };
    for child in &buffer.nested_children {
        collect_post_order(*child, buffers, out);
    }
    out.push(buffer.node);
}

fn inject_metadata(
    node: &mut DocumentNode,
    entity_type: &str,
    tenant_id: Option<&str>,
    id: &str,
    routing_key: Option<&str>,
) {
    let type_marker = match node.kind() {
        DocumentKind::Root => {
            node.add_value(metadata::ID, EncodedValue::from(id));
            metadata::TYPE_ROOT
        }
        DocumentKind::Child => {
            if let Some(path) = node.nested_path().map(str::to_string) {
                node.add_value(metadata::NESTED_PATH, EncodedValue::Text(path));
            }
            metadata::TYPE_CHILD
        }
    };
    node.add_value(metadata::TYPE, EncodedValue::from(type_marker));
    node.add_value(metadata::ROOT_ID, EncodedValue::from(id));
    node.add_value(metadata::ENTITY_TYPE, EncodedValue::from(entity_type));
    if let Some(tenant_id) = tenant_id {
        node.add_value(metadata::TENANT_ID, EncodedValue::from(tenant_id));
    }
    if let Some(routing_key) = routing_key {
        node.add_value(metadata::ROUTING_KEY, EncodedValue::from(routing_key));
    }
}
