//! Nodes of a self-describing document.
//!
//! A metaschema is an instance of itself: the root of the draft-07
//! metaschema is described by the draft-07 metaschema. A [`MetaschemaNode`]
//! walks such a document with the describing schemas taken from the same
//! document, so no schema has to exist before the metaschema does.

use std::fmt;

use jsi_ptr::{Ptr, Token, Value};

use crate::error::Result;
use crate::node::{Document, Node};
use crate::registry::Registry;
use crate::schema::{is_schema_shaped, Draft, Schema};
use crate::schema_set::SchemaSet;

#[derive(Clone)]
pub struct MetaschemaNode {
    document: Document,
    node_ptr: Ptr,
    metaschema_root_ptr: Ptr,
    root_schema_ptr: Ptr,
    draft: Draft,
    registry: Registry,
    schemas: SchemaSet,
}

impl MetaschemaNode {
    /// The node at `root_schema_ptr`, described by the metaschema at
    /// `metaschema_root_ptr`. Both pointers are into `document`; for a
    /// metaschema on its own both are the root.
    pub fn new(
        document: Document,
        draft: Draft,
        registry: Registry,
        metaschema_root_ptr: Ptr,
        root_schema_ptr: Ptr,
    ) -> Result<MetaschemaNode> {
        let metaschema = Schema::from_node(
            Node::new(document.clone(), metaschema_root_ptr.clone()),
            draft,
            registry.clone(),
        );
        let indicated = SchemaSet::from_iter([metaschema]);
        let node = Node::new(document.clone(), root_schema_ptr.clone());
        let schemas = indicated.inplace_applicator_schemas(&node.content()?)?;
        Ok(MetaschemaNode {
            document,
            node_ptr: root_schema_ptr.clone(),
            metaschema_root_ptr,
            root_schema_ptr,
            draft,
            registry,
            schemas,
        })
    }

    pub fn node(&self) -> Node {
        Node::new(self.document.clone(), self.node_ptr.clone())
    }

    pub fn node_ptr(&self) -> &Ptr {
        &self.node_ptr
    }

    pub fn metaschema_root_ptr(&self) -> &Ptr {
        &self.metaschema_root_ptr
    }

    pub fn root_schema_ptr(&self) -> &Ptr {
        &self.root_schema_ptr
    }

    pub fn draft(&self) -> Draft {
        self.draft
    }

    /// The schemas from this document that describe this node.
    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    pub fn content(&self) -> Result<Value> {
        Ok(self.node().content()?)
    }

    /// The node at `token` below this one, described by whatever this
    /// node's schemas apply to it.
    pub fn get(&self, token: impl Into<Token>) -> Result<MetaschemaNode> {
        let content = self.content()?;
        let child_ptr = Ptr::new([token.into()]).resolve_against(&content)?;
        let Some(token) = child_ptr.last() else {
            return Ok(self.clone());
        };
        let applied = self.schemas.child_applicator_schemas(token, &content)?;
        let child = self.node().descendant(&child_ptr);
        let schemas = applied.inplace_applicator_schemas(&child.content()?)?;
        Ok(MetaschemaNode {
            node_ptr: child.ptr().clone(),
            schemas,
            ..self.clone()
        })
    }

    pub fn child_node(&self, token: impl Into<Token>) -> Result<MetaschemaNode> {
        self.get(token)
    }

    pub fn descendant_node(&self, rel: &Ptr) -> Result<MetaschemaNode> {
        let mut current = self.clone();
        for token in rel.tokens() {
            current = current.get(token)?;
        }
        Ok(current)
    }

    /// The parent, recomputed from the root schema down.
    pub fn parent_node(&self) -> Result<MetaschemaNode> {
        let parent = self.node_ptr.parent()?;
        let rel = parent.relative_to(&self.root_schema_ptr)?;
        let root = MetaschemaNode::new(
            self.document.clone(),
            self.draft,
            self.registry.clone(),
            self.metaschema_root_ptr.clone(),
            self.root_schema_ptr.clone(),
        )?;
        root.descendant_node(&rel)
    }

    /// Whether this node is the metaschema, and so describes schemas.
    pub fn describes_schema(&self) -> bool {
        self.node_ptr == self.metaschema_root_ptr
    }

    /// Whether the metaschema applies to this node, making it a schema.
    pub fn is_schema(&self) -> bool {
        self.schemas.iter().any(|s| s.ptr() == &self.metaschema_root_ptr)
    }

    /// This node read as a schema, if it is one.
    pub fn as_schema(&self) -> Result<Option<Schema>> {
        if !self.is_schema() || !is_schema_shaped(&self.content()?) {
            return Ok(None);
        }
        Ok(Some(Schema::from_node(self.node(), self.draft, self.registry.clone())))
    }
}

impl fmt::Debug for MetaschemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaschemaNode")
            .field("node_ptr", &self.node_ptr.fragment())
            .field("metaschema_root_ptr", &self.metaschema_root_ptr.fragment())
            .field("root_schema_ptr", &self.root_schema_ptr.fragment())
            .field("draft", &self.draft)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A cut-down self-describing metaschema.
    fn tiny() -> MetaschemaNode {
        let document = Document::new(
            json!({
                "properties": {
                    "properties": {"additionalProperties": {"$ref": "#"}},
                    "title": {"type": "string"}
                },
                "title": "tiny"
            }),
            None,
        );
        MetaschemaNode::new(document, Draft::Draft07, Registry::new(), Ptr::root(), Ptr::root()).unwrap()
    }

    #[test]
    fn test_root_describes_itself() {
        let root = tiny();
        assert!(root.describes_schema());
        assert!(root.is_schema());
        assert!(root.as_schema().unwrap().is_some());
    }

    #[test]
    fn test_descendants_keep_the_fixed_pointers() {
        let root = tiny();
        let title_schema = root.get("properties").unwrap().get("title").unwrap();
        assert_eq!(title_schema.node_ptr().pointer(), "/properties/title");
        assert_eq!(title_schema.metaschema_root_ptr(), &Ptr::root());
        assert_eq!(title_schema.root_schema_ptr(), &Ptr::root());
        assert!(title_schema.is_schema());
        assert!(!title_schema.describes_schema());

        let properties = root.get("properties").unwrap();
        assert!(!properties.is_schema());
        assert!(properties.as_schema().unwrap().is_none());
    }

    #[test]
    fn test_parent_node() {
        let root = tiny();
        let deep = root.descendant_node(&Ptr::from_pointer("/properties/title/type").unwrap()).unwrap();
        let parent = deep.parent_node().unwrap();
        assert_eq!(parent.node_ptr().pointer(), "/properties/title");
        assert!(parent.is_schema());
        assert!(root.parent_node().is_err());
    }
}
