//! Index mutations and the entity payloads feeding the assembler.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::assembly::{DocumentTreeBuilder, ElementId};
use crate::document::field_value::FieldValue;
use crate::document::tree::DocumentTree;
use crate::engine::{DeleteQuery, EngineWriter};
use crate::error::{Result, SearchSyncError};
use crate::schema::SchemaProvider;

/// Identifies one indexed entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: String,
    pub tenant_id: Option<String>,
    pub routing_key: Option<String>,
}

impl EntityRef {
    pub fn new<T: Into<String>, I: Into<String>>(entity_type: T, id: I) -> Self {
        EntityRef {
            entity_type: entity_type.into(),
            id: id.into(),
            tenant_id: None,
            routing_key: None,
        }
    }

    pub fn with_tenant<S: Into<String>>(mut self, tenant_id: S) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_routing_key<S: Into<String>>(mut self, routing_key: S) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.id)?;
        if let Some(tenant_id) = &self.tenant_id {
            write!(f, "@{tenant_id}")?;
        }
        Ok(())
    }
}

/// The state of an entity, replayed as value and object calls on a
/// document builder.
pub trait EntityPayload: Send + Sync + fmt::Debug {
    fn contribute(&self, builder: &mut DocumentTreeBuilder, root: ElementId) -> Result<()>;
}

/// A payload backed by a closure.
pub struct FnPayload<F> {
    contribute: F,
}

impl<F> FnPayload<F>
where
    F: Fn(&mut DocumentTreeBuilder, ElementId) -> Result<()> + Send + Sync,
{
    pub fn new(contribute: F) -> Self {
        FnPayload { contribute }
    }
}

impl<F> fmt::Debug for FnPayload<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPayload").finish_non_exhaustive()
    }
}

impl<F> EntityPayload for FnPayload<F>
where
    F: Fn(&mut DocumentTreeBuilder, ElementId) -> Result<()> + Send + Sync,
{
    fn contribute(&self, builder: &mut DocumentTreeBuilder, root: ElementId) -> Result<()> {
        (self.contribute)(builder, root)
    }
}

/// A payload walking a JSON object against the schema.
///
/// Arrays supply the values (or object instances) of multi-valued fields;
/// `null` is an explicit null value or null object.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPayload(Value);

impl JsonPayload {
    pub fn new(value: Value) -> Self {
        JsonPayload(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for JsonPayload {
    fn from(value: Value) -> Self {
        JsonPayload(value)
    }
}

impl EntityPayload for JsonPayload {
    fn contribute(&self, builder: &mut DocumentTreeBuilder, root: ElementId) -> Result<()> {
        match &self.0 {
            Value::Object(fields) => contribute_object(builder, root, fields),
            other => Err(SearchSyncError::schema(format!(
                "Entity payload must be a JSON object, got {}",
                json_type_name(other)
            ))),
        }
    }
}

fn contribute_object(
    builder: &mut DocumentTreeBuilder,
    element: ElementId,
    fields: &Map<String, Value>,
) -> Result<()> {
    for (name, value) in fields {
        let node = builder.resolve(element, name)?;
        match value {
            Value::Array(items) => {
                for item in items {
                    if node.is_object() {
                        contribute_instance(builder, element, name, item)?;
                    } else {
                        builder.add_value(element, name, json_to_field_value(node.path(), item)?)?;
                    }
                }
            }
            _ if node.is_object() => contribute_instance(builder, element, name, value)?,
            _ => builder.add_value(element, name, json_to_field_value(node.path(), value)?)?,
        }
    }
    Ok(())
}

fn contribute_instance(
    builder: &mut DocumentTreeBuilder,
    element: ElementId,
    name: &str,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Null => builder.add_null_object_field(element, name).map(|_| ()),
        Value::Object(fields) => {
            let child = builder.add_object_field(element, name)?;
            contribute_object(builder, child, fields)
        }
        other => Err(SearchSyncError::schema(format!(
            "Expected an object for '{name}', got {}",
            json_type_name(other)
        ))),
    }
}

fn json_to_field_value(path: &str, value: &Value) -> Result<FieldValue> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(FieldValue::Integer(i)),
            None => n
                .as_f64()
                .map(FieldValue::Float)
                .ok_or_else(|| SearchSyncError::schema(format!("Unsupported number for '{path}'"))),
        },
        Value::String(s) => Ok(FieldValue::Text(s.clone())),
        other => Err(SearchSyncError::schema(format!(
            "Expected a value for '{path}', got {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One index mutation.
#[derive(Debug, Clone)]
pub enum IndexOperation {
    Add {
        entity: EntityRef,
        payload: Arc<dyn EntityPayload>,
    },
    Update {
        entity: EntityRef,
        payload: Arc<dyn EntityPayload>,
    },
    Delete {
        entity: EntityRef,
    },
    PurgeAll {
        entity_type: String,
        tenant_id: Option<String>,
    },
}

impl IndexOperation {
    pub fn add<P: EntityPayload + 'static>(entity: EntityRef, payload: P) -> Self {
        IndexOperation::Add {
            entity,
            payload: Arc::new(payload),
        }
    }

    pub fn update<P: EntityPayload + 'static>(entity: EntityRef, payload: P) -> Self {
        IndexOperation::Update {
            entity,
            payload: Arc::new(payload),
        }
    }

    pub fn delete(entity: EntityRef) -> Self {
        IndexOperation::Delete { entity }
    }

    pub fn purge_all<S: Into<String>>(entity_type: S, tenant_id: Option<String>) -> Self {
        IndexOperation::PurgeAll {
            entity_type: entity_type.into(),
            tenant_id,
        }
    }

    /// Short name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexOperation::Add { .. } => "add",
            IndexOperation::Update { .. } => "update",
            IndexOperation::Delete { .. } => "delete",
            IndexOperation::PurgeAll { .. } => "purge-all",
        }
    }

    /// The targeted entity; `None` for purge-all.
    pub fn entity(&self) -> Option<&EntityRef> {
        match self {
            IndexOperation::Add { entity, .. }
            | IndexOperation::Update { entity, .. }
            | IndexOperation::Delete { entity } => Some(entity),
            IndexOperation::PurgeAll { .. } => None,
        }
    }

    pub fn entity_type(&self) -> &str {
        match self {
            IndexOperation::PurgeAll { entity_type, .. } => entity_type,
            _ => self
                .entity()
                .map(|e| e.entity_type.as_str())
                .unwrap_or_default(),
        }
    }

    /// Apply the operation through an open writer.
    pub(crate) fn apply(&self, writer: &dyn EngineWriter, schemas: &dyn SchemaProvider) -> Result<()> {
        match self {
            IndexOperation::Add { entity, payload } => {
                let tree = assemble(entity, payload.as_ref(), schemas)?;
                writer.add_documents(tree)
            }
            IndexOperation::Update { entity, payload } => {
                let tree = assemble(entity, payload.as_ref(), schemas)?;
                let query = DeleteQuery::entity(
                    &entity.entity_type,
                    &entity.id,
                    entity.tenant_id.as_deref(),
                );
                writer.update_documents(&query, tree)
            }
            IndexOperation::Delete { entity } => writer.delete_documents(&DeleteQuery::entity(
                &entity.entity_type,
                &entity.id,
                entity.tenant_id.as_deref(),
            )),
            IndexOperation::PurgeAll {
                entity_type,
                tenant_id,
            } => writer.delete_documents(&DeleteQuery::entity_type(
                entity_type,
                tenant_id.as_deref(),
            )),
        }
    }
}

impl fmt::Display for IndexOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexOperation::PurgeAll {
                entity_type,
                tenant_id,
            } => {
                write!(f, "purge-all {entity_type}")?;
                if let Some(tenant_id) = tenant_id {
                    write!(f, "@{tenant_id}")?;
                }
                Ok(())
            }
            _ => match self.entity() {
                Some(entity) => write!(f, "{} {entity}", self.kind()),
                None => write!(f, "{}", self.kind()),
            },
        }
    }
}

/// Build the document tree of an entity from its payload.
pub fn assemble(
    entity: &EntityRef,
    payload: &dyn EntityPayload,
    schemas: &dyn SchemaProvider,
) -> Result<DocumentTree> {
    let schema = schemas.schema(&entity.entity_type).ok_or_else(|| {
        SearchSyncError::not_found(format!(
            "No schema registered for entity type '{}'",
            entity.entity_type
        ))
    })?;
    let mut builder = DocumentTreeBuilder::new(schema);
    let root = builder.root();
    payload.contribute(&mut builder, root)?;
    Ok(builder.build(
        entity.tenant_id.as_deref(),
        &entity.id,
        entity.routing_key.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::codec::{EncodedValue, ValueType};
    use crate::engine::{IndexDirectory, IndexSnapshot, MemoryDirectory};
    use crate::schema::{IndexSchema, ObjectStructure, SchemaRegistry};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                IndexSchema::builder("book")
                    .field("title", ValueType::Text)
                    .field("pages", ValueType::Integer)
                    .multi_valued_field("tags", ValueType::Keyword)
                    .multi_valued_object("authors", ObjectStructure::Flattened, |a| {
                        a.field("name", ValueType::Text)
                    })
                    .multi_valued_object("chapters", ObjectStructure::Nested, |c| {
                        c.field("title", ValueType::Text)
                    })
                    .object("publisher", ObjectStructure::Flattened, |p| {
                        p.field("name", ValueType::Text)
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_json_payload_assembly() {
        let payload = JsonPayload::new(json!({
            "title": "Rust",
            "pages": 320,
            "tags": ["lang", "systems"],
            "authors": [{"name": "Ann"}, {"name": "Bob"}],
            "chapters": [{"title": "Intro"}],
            "publisher": null
        }));
        let tree = assemble(&EntityRef::new("book", "1"), &payload, &registry()).unwrap();

        assert_eq!(tree.len(), 2);
        let root = tree.root();
        assert_eq!(root.values("tags").len(), 2);
        assert_eq!(root.values("authors.name").len(), 2);
        assert_eq!(root.values("pages"), &[EncodedValue::Long(320)]);
        assert!(!root.has_field("publisher.name"));
        assert_eq!(tree.children()[0].first_text("chapters.title"), Some("Intro"));
    }

    #[test]
    fn test_json_payload_errors() {
        let registry = registry();
        let entity = EntityRef::new("book", "1");

        let not_object = JsonPayload::new(json!(["x"]));
        assert!(assemble(&entity, &not_object, &registry).is_err());

        let bad_object = JsonPayload::new(json!({"publisher": "acme"}));
        assert!(assemble(&entity, &bad_object, &registry).unwrap_err().is_schema_error());

        let unknown = JsonPayload::new(json!({"isbn": "123"}));
        assert!(matches!(
            assemble(&entity, &unknown, &registry),
            Err(SearchSyncError::UnknownField { .. })
        ));

        let unregistered = EntityRef::new("movie", "1");
        assert!(matches!(
            assemble(&unregistered, &JsonPayload::new(json!({})), &registry),
            Err(SearchSyncError::NotFound(_))
        ));
    }

    #[test]
    fn test_apply_operations() {
        let registry = registry();
        let directory = MemoryDirectory::new("books");
        let writer = directory.open_writer().unwrap();

        let payload = FnPayload::new(|builder: &mut DocumentTreeBuilder, root| {
            builder.add_value(root, "title", "Rust")?;
            let chapter = builder.add_object_field(root, "chapters")?;
            builder.add_value(chapter, "title", "Intro")
        });
        let add = IndexOperation::add(EntityRef::new("book", "1"), payload);
        add.apply(writer.as_ref(), &registry).unwrap();
        IndexOperation::add(EntityRef::new("book", "2"), JsonPayload::new(json!({"title": "Go"})))
            .apply(writer.as_ref(), &registry)
            .unwrap();
        writer.commit().unwrap();
        assert_eq!(directory.open_snapshot().unwrap().num_docs(), 3);

        IndexOperation::delete(EntityRef::new("book", "1"))
            .apply(writer.as_ref(), &registry)
            .unwrap();
        writer.commit().unwrap();
        assert_eq!(directory.open_snapshot().unwrap().num_docs(), 1);

        IndexOperation::purge_all("book", None)
            .apply(writer.as_ref(), &registry)
            .unwrap();
        writer.commit().unwrap();
        assert_eq!(directory.open_snapshot().unwrap().num_docs(), 0);
    }

    #[test]
    fn test_display() {
        let entity = EntityRef::new("book", "7").with_tenant("acme");
        assert_eq!(IndexOperation::delete(entity).to_string(), "delete book#7@acme");
        assert_eq!(
            IndexOperation::purge_all("book", None).to_string(),
            "purge-all book"
        );
    }
}
