//! Schema nodes: one addressable path of an entity's object graph.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::codec::{DefaultCodec, FieldCodec, ValueType};
use crate::error::{Result, SearchSyncError};

/// How the values of an object field are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectStructure {
    /// Sub-object fields are merged into the owning document.
    Flattened,
    /// Each sub-object is a separate child document.
    Nested,
}

/// What a field template creates when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateTarget {
    Value(ValueType),
    Object(ObjectStructure),
}

/// A rule resolving unknown field names under a dynamic object.
#[derive(Debug, Clone)]
pub struct FieldTemplate {
    name: String,
    glob: String,
    pattern: Regex,
    target: TemplateTarget,
    multi_valued: bool,
}

impl FieldTemplate {
    /// Create a template matching field names against a glob (`*` and `?` wildcards).
    pub fn new<S: Into<String>, G: Into<String>>(
        name: S,
        glob: G,
        target: TemplateTarget,
    ) -> Result<Self> {
        let glob = glob.into();
        let pattern = Regex::new(&glob_to_regex(&glob)).map_err(|e| {
            SearchSyncError::schema(format!("Invalid template glob '{glob}': {e}"))
        })?;
        Ok(FieldTemplate {
            name: name.into(),
            glob,
            pattern,
            target,
            multi_valued: false,
        })
    }

    /// Mark fields created by this template as multi-valued.
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn glob(&self) -> &str {
        &self.glob
    }

    pub fn target(&self) -> TemplateTarget {
        self.target
    }

    /// Whether a (relative) field name matches this template.
    pub fn matches(&self, field_name: &str) -> bool {
        self.pattern.is_match(field_name)
    }

    /// Create the dynamic node for `field_name` under `parent_path`.
    pub(crate) fn instantiate(&self, parent_path: &str, field_name: &str) -> SchemaNode {
        let kind = match self.target {
            TemplateTarget::Value(value_type) => NodeKind::Value {
                value_type,
                codec: Arc::new(DefaultCodec(value_type)),
            },
            TemplateTarget::Object(structure) => NodeKind::Object {
                structure,
                templates: Vec::new(),
            },
        };
        SchemaNode::new(parent_path, field_name, kind, self.multi_valued, true)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let escaped = regex::escape(glob)
        .replace("\\*", ".*")
        .replace("\\?", ".");
    format!("^{escaped}$")
}

/// Join a parent path and a relative field name with a dot.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// Storage kind of a schema node.
#[derive(Clone)]
pub enum NodeKind {
    Value {
        value_type: ValueType,
        codec: Arc<dyn FieldCodec>,
    },
    Object {
        structure: ObjectStructure,
        templates: Vec<FieldTemplate>,
    },
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Value { value_type, codec } => f
                .debug_struct("Value")
                .field("value_type", value_type)
                .field("codec", codec)
                .finish(),
            NodeKind::Object {
                structure,
                templates,
            } => f
                .debug_struct("Object")
                .field("structure", structure)
                .field("templates", &templates.len())
                .finish(),
        }
    }
}

/// One addressable path in the entity's object graph.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    path: String,
    name: String,
    parent_path: String,
    kind: NodeKind,
    multi_valued: bool,
    dynamic: bool,
}

impl SchemaNode {
    pub(crate) fn new(
        parent_path: &str,
        name: &str,
        kind: NodeKind,
        multi_valued: bool,
        dynamic: bool,
    ) -> Self {
        SchemaNode {
            path: join_path(parent_path, name),
            name: name.to_string(),
            parent_path: parent_path.to_string(),
            kind,
            multi_valued,
            dynamic,
        }
    }

    /// Absolute dotted path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name relative to the parent object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the parent object, empty for root fields.
    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, NodeKind::Object { .. })
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind, NodeKind::Value { .. })
    }

    /// Object storage structure, `None` for value fields.
    pub fn structure(&self) -> Option<ObjectStructure> {
        match &self.kind {
            NodeKind::Object { structure, .. } => Some(*structure),
            NodeKind::Value { .. } => None,
        }
    }

    /// Declared value type, `None` for object fields.
    pub fn value_type(&self) -> Option<ValueType> {
        match &self.kind {
            NodeKind::Value { value_type, .. } => Some(*value_type),
            NodeKind::Object { .. } => None,
        }
    }

    /// Field templates declared on this object.
    pub fn templates(&self) -> &[FieldTemplate] {
        match &self.kind {
            NodeKind::Object { templates, .. } => templates,
            NodeKind::Value { .. } => &[],
        }
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    /// Whether the node belongs to an open-ended sub-schema.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_glob_matching() {
        let template =
            FieldTemplate::new("texts", "*_txt", TemplateTarget::Value(ValueType::Text)).unwrap();
        assert!(template.matches("title_txt"));
        assert!(!template.matches("title_txt2"));
        assert!(!template.matches("title"));

        let single = FieldTemplate::new("one", "a?c", TemplateTarget::Value(ValueType::Text))
            .unwrap();
        assert!(single.matches("abc"));
        assert!(!single.matches("a.c.d"));
    }

    #[test]
    fn test_template_instantiation_is_dynamic() {
        let template =
            FieldTemplate::new("objects", "*", TemplateTarget::Object(ObjectStructure::Nested))
                .unwrap()
                .multi_valued();
        let node = template.instantiate("attributes", "color");

        assert_eq!(node.path(), "attributes.color");
        assert_eq!(node.parent_path(), "attributes");
        assert_eq!(node.structure(), Some(ObjectStructure::Nested));
        assert!(node.is_dynamic());
        assert!(node.is_multi_valued());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "title"), "title");
        assert_eq!(join_path("author", "name"), "author.name");
    }
}
