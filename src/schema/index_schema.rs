//! Schema declaration, validation and lookup.

use std::fmt;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::document::codec::{DefaultCodec, FieldCodec, ValueType};
use crate::document::tree::metadata;
use crate::error::{Result, SearchSyncError};
use crate::schema::node::{
    FieldTemplate, NodeKind, ObjectStructure, SchemaNode, TemplateTarget, join_path,
};

/// The immutable indexing schema of one entity type.
#[derive(Debug)]
pub struct IndexSchema {
    entity_type: String,
    nodes: AHashMap<String, Arc<SchemaNode>>,
    root_dynamic: bool,
    root_templates: Vec<FieldTemplate>,
}

impl IndexSchema {
    /// Start declaring the schema of an entity type.
    pub fn builder<S: Into<String>>(entity_type: S) -> IndexSchemaBuilder {
        IndexSchemaBuilder {
            entity_type: entity_type.into(),
            root: ObjectSchemaBuilder::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Look up a declared node by absolute path.
    pub fn node(&self, path: &str) -> Option<&Arc<SchemaNode>> {
        self.nodes.get(path)
    }

    /// Whether unknown root fields may be resolved through templates.
    pub fn is_root_dynamic(&self) -> bool {
        self.root_dynamic
    }

    /// Templates declared on the root object.
    pub fn root_templates(&self) -> &[FieldTemplate] {
        &self.root_templates
    }

    /// All declared nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<SchemaNode>> {
        self.nodes.values()
    }

    /// Number of declared nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

enum FieldDeclaration {
    Value {
        name: String,
        value_type: ValueType,
        codec: Option<Arc<dyn FieldCodec>>,
        multi_valued: bool,
    },
    Object {
        name: String,
        structure: ObjectStructure,
        multi_valued: bool,
        object: ObjectSchemaBuilder,
    },
}

impl FieldDeclaration {
    fn name(&self) -> &str {
        match self {
            FieldDeclaration::Value { name, .. } | FieldDeclaration::Object { name, .. } => name,
        }
    }
}

struct TemplateDeclaration {
    name: String,
    glob: String,
    target: TemplateTarget,
    multi_valued: bool,
}

/// Declares the fields of one object (or of the schema root).
#[derive(Default)]
pub struct ObjectSchemaBuilder {
    fields: Vec<FieldDeclaration>,
    templates: Vec<TemplateDeclaration>,
    dynamic: bool,
}

impl fmt::Debug for ObjectSchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSchemaBuilder")
            .field(
                "fields",
                &self.fields.iter().map(FieldDeclaration::name).collect::<Vec<_>>(),
            )
            .field("templates", &self.templates.len())
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

impl ObjectSchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a single-valued value field.
    pub fn field<S: Into<String>>(self, name: S, value_type: ValueType) -> Self {
        self.value_field(name.into(), value_type, None, false)
    }

    /// Declare a multi-valued value field.
    pub fn multi_valued_field<S: Into<String>>(self, name: S, value_type: ValueType) -> Self {
        self.value_field(name.into(), value_type, None, true)
    }

    /// Declare a value field encoded by a custom codec.
    pub fn field_with_codec<S: Into<String>>(
        self,
        name: S,
        value_type: ValueType,
        codec: Arc<dyn FieldCodec>,
        multi_valued: bool,
    ) -> Self {
        self.value_field(name.into(), value_type, Some(codec), multi_valued)
    }

    /// Declare a single-valued object field.
    pub fn object<S, F>(self, name: S, structure: ObjectStructure, declare: F) -> Self
    where
        S: Into<String>,
        F: FnOnce(ObjectSchemaBuilder) -> ObjectSchemaBuilder,
    {
        self.object_field(name.into(), structure, false, declare)
    }

    /// Declare a multi-valued object field.
    pub fn multi_valued_object<S, F>(self, name: S, structure: ObjectStructure, declare: F) -> Self
    where
        S: Into<String>,
        F: FnOnce(ObjectSchemaBuilder) -> ObjectSchemaBuilder,
    {
        self.object_field(name.into(), structure, true, declare)
    }

    /// Make this object open-ended; every node below it is dynamic.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Declare a template for unknown field names. Implies [`dynamic`](Self::dynamic).
    pub fn template<S: Into<String>, G: Into<String>>(
        mut self,
        name: S,
        glob: G,
        target: TemplateTarget,
        multi_valued: bool,
    ) -> Self {
        self.dynamic = true;
        self.templates.push(TemplateDeclaration {
            name: name.into(),
            glob: glob.into(),
            target,
            multi_valued,
        });
        self
    }

    fn value_field(
        mut self,
        name: String,
        value_type: ValueType,
        codec: Option<Arc<dyn FieldCodec>>,
        multi_valued: bool,
    ) -> Self {
        self.fields.push(FieldDeclaration::Value {
            name,
            value_type,
            codec,
            multi_valued,
        });
        self
    }

    fn object_field<F>(
        mut self,
        name: String,
        structure: ObjectStructure,
        multi_valued: bool,
        declare: F,
    ) -> Self
    where
        F: FnOnce(ObjectSchemaBuilder) -> ObjectSchemaBuilder,
    {
        self.fields.push(FieldDeclaration::Object {
            name,
            structure,
            multi_valued,
            object: declare(ObjectSchemaBuilder::new()),
        });
        self
    }

    fn build_templates(templates: Vec<TemplateDeclaration>) -> Result<Vec<FieldTemplate>> {
        templates
            .into_iter()
            .map(|t| {
                let template = FieldTemplate::new(t.name, t.glob, t.target)?;
                Ok(if t.multi_valued {
                    template.multi_valued()
                } else {
                    template
                })
            })
            .collect()
    }

    fn register(
        self,
        parent_path: &str,
        dynamic: bool,
        nodes: &mut AHashMap<String, Arc<SchemaNode>>,
    ) -> Result<()> {
        let mut seen = AHashSet::new();
        for declaration in self.fields {
            let name = declaration.name().to_string();
            validate_field_name(parent_path, &name)?;
            if !seen.insert(name.clone()) {
                return Err(SearchSyncError::schema(format!(
                    "Duplicate field '{}'",
                    join_path(parent_path, &name)
                )));
            }

            match declaration {
                FieldDeclaration::Value {
                    value_type,
                    codec,
                    multi_valued,
                    ..
                } => {
                    let codec = codec.unwrap_or_else(|| Arc::new(DefaultCodec(value_type)));
                    let node = SchemaNode::new(
                        parent_path,
                        &name,
                        NodeKind::Value { value_type, codec },
                        multi_valued,
                        dynamic,
                    );
                    nodes.insert(node.path().to_string(), Arc::new(node));
                }
                FieldDeclaration::Object {
                    structure,
                    multi_valued,
                    object,
                    ..
                } => {
                    let object_dynamic = dynamic || object.dynamic;
                    let ObjectSchemaBuilder {
                        fields,
                        templates,
                        ..
                    } = object;
                    let node = SchemaNode::new(
                        parent_path,
                        &name,
                        NodeKind::Object {
                            structure,
                            templates: Self::build_templates(templates)?,
                        },
                        multi_valued,
                        object_dynamic,
                    );
                    let path = node.path().to_string();
                    nodes.insert(path.clone(), Arc::new(node));

                    let children = ObjectSchemaBuilder {
                        fields,
                        templates: Vec::new(),
                        dynamic: object_dynamic,
                    };
                    children.register(&path, object_dynamic, nodes)?;
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_field_name(parent_path: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('.') {
        return Err(SearchSyncError::schema(format!(
            "Invalid field name '{name}' under '{parent_path}': names must be non-empty and must not contain '.'"
        )));
    }
    if metadata::is_reserved(name) {
        return Err(SearchSyncError::schema(format!(
            "Field name '{name}' is reserved for metadata"
        )));
    }
    Ok(())
}

/// Declares the schema of one entity type.
#[derive(Debug)]
pub struct IndexSchemaBuilder {
    entity_type: String,
    root: ObjectSchemaBuilder,
}

impl IndexSchemaBuilder {
    /// Declare a single-valued root value field.
    pub fn field<S: Into<String>>(mut self, name: S, value_type: ValueType) -> Self {
        self.root = self.root.field(name, value_type);
        self
    }

    /// Declare a multi-valued root value field.
    pub fn multi_valued_field<S: Into<String>>(mut self, name: S, value_type: ValueType) -> Self {
        self.root = self.root.multi_valued_field(name, value_type);
        self
    }

    /// Declare a root value field encoded by a custom codec.
    pub fn field_with_codec<S: Into<String>>(
        mut self,
        name: S,
        value_type: ValueType,
        codec: Arc<dyn FieldCodec>,
        multi_valued: bool,
    ) -> Self {
        self.root = self
            .root
            .field_with_codec(name, value_type, codec, multi_valued);
        self
    }

    /// Declare a single-valued root object field.
    pub fn object<S, F>(mut self, name: S, structure: ObjectStructure, declare: F) -> Self
    where
        S: Into<String>,
        F: FnOnce(ObjectSchemaBuilder) -> ObjectSchemaBuilder,
    {
        self.root = self.root.object(name, structure, declare);
        self
    }

    /// Declare a multi-valued root object field.
    pub fn multi_valued_object<S, F>(
        mut self,
        name: S,
        structure: ObjectStructure,
        declare: F,
    ) -> Self
    where
        S: Into<String>,
        F: FnOnce(ObjectSchemaBuilder) -> ObjectSchemaBuilder,
    {
        self.root = self.root.multi_valued_object(name, structure, declare);
        self
    }

    /// Make the root object open-ended.
    pub fn dynamic(mut self) -> Self {
        self.root = self.root.dynamic();
        self
    }

    /// Declare a root-level template for unknown field names.
    pub fn template<S: Into<String>, G: Into<String>>(
        mut self,
        name: S,
        glob: G,
        target: TemplateTarget,
        multi_valued: bool,
    ) -> Self {
        self.root = self.root.template(name, glob, target, multi_valued);
        self
    }

    /// Validate the declarations and build the immutable schema.
    pub fn build(self) -> Result<IndexSchema> {
        if self.entity_type.is_empty() {
            return Err(SearchSyncError::schema("Entity type must not be empty"));
        }

        let ObjectSchemaBuilder {
            fields,
            templates,
            dynamic,
        } = self.root;
        let root_templates = ObjectSchemaBuilder::build_templates(templates)?;

        let mut nodes = AHashMap::new();
        ObjectSchemaBuilder {
            fields,
            templates: Vec::new(),
            dynamic,
        }
        .register("", dynamic, &mut nodes)?;

        Ok(IndexSchema {
            entity_type: self.entity_type,
            nodes,
            root_dynamic: dynamic,
            root_templates,
        })
    }
}

/// Supplies the schema of each entity type indexed in a partition.
pub trait SchemaProvider: Send + Sync + fmt::Debug {
    fn schema(&self, entity_type: &str) -> Option<Arc<IndexSchema>>;
}

/// A fixed set of schemas keyed by entity type.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    schemas: AHashMap<String, Arc<IndexSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema; an entity type may only be registered once.
    pub fn register(&mut self, schema: IndexSchema) -> Result<Arc<IndexSchema>> {
        let entity_type = schema.entity_type().to_string();
        if self.schemas.contains_key(&entity_type) {
            return Err(SearchSyncError::invalid_argument(format!(
                "Schema for entity type '{entity_type}' already registered"
            )));
        }
        let schema = Arc::new(schema);
        self.schemas.insert(entity_type, Arc::clone(&schema));
        Ok(schema)
    }

    /// Registered entity types.
    pub fn entity_types(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }
}

impl SchemaProvider for SchemaRegistry {
    fn schema(&self, entity_type: &str) -> Option<Arc<IndexSchema>> {
        self.schemas.get(entity_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_schema() -> IndexSchema {
        IndexSchema::builder("book")
            .field("title", ValueType::Text)
            .object("author", ObjectStructure::Flattened, |a| {
                a.field("name", ValueType::Text)
            })
            .object("attributes", ObjectStructure::Flattened, |a| {
                a.field("color", ValueType::Keyword).template(
                    "strings",
                    "*_s",
                    TemplateTarget::Value(ValueType::Keyword),
                    false,
                )
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_paths_and_kinds() {
        let schema = book_schema();
        assert_eq!(schema.entity_type(), "book");
        assert_eq!(schema.len(), 5);

        let author_name = schema.node("author.name").unwrap();
        assert_eq!(author_name.parent_path(), "author");
        assert_eq!(author_name.value_type(), Some(ValueType::Text));
        assert!(!author_name.is_dynamic());

        let author = schema.node("author").unwrap();
        assert_eq!(author.structure(), Some(ObjectStructure::Flattened));
    }

    #[test]
    fn test_dynamic_is_inherited() {
        let schema = book_schema();
        let attributes = schema.node("attributes").unwrap();
        assert!(attributes.is_dynamic());
        assert_eq!(attributes.templates().len(), 1);
        assert!(schema.node("attributes.color").unwrap().is_dynamic());
        assert!(!schema.node("title").unwrap().is_dynamic());
    }

    #[test]
    fn test_invalid_declarations() {
        let duplicate = IndexSchema::builder("book")
            .field("title", ValueType::Text)
            .field("title", ValueType::Keyword)
            .build();
        assert!(duplicate.is_err());

        let dotted = IndexSchema::builder("book")
            .field("a.b", ValueType::Text)
            .build();
        assert!(dotted.is_err());

        let reserved = IndexSchema::builder("book")
            .field("__id", ValueType::Text)
            .build();
        assert!(reserved.is_err());

        assert!(IndexSchema::builder("").build().is_err());
    }

    #[test]
    fn test_registry() {
        let mut registry = SchemaRegistry::new();
        registry.register(book_schema()).unwrap();
        assert!(registry.register(book_schema()).is_err());
        assert!(registry.schema("book").is_some());
        assert!(registry.schema("movie").is_none());
        assert_eq!(registry.entity_types(), vec!["book"]);
    }
}
