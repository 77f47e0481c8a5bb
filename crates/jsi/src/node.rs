//! Documents and locations within them.
//!
//! A [`Document`] is a shared handle to one raw JSON tree plus the base URI
//! it was loaded from. A [`Node`] is a `(document, pointer)` pair: its
//! content is computed on demand by evaluating the pointer, so a node keeps
//! working after the document is written in place.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use jsi_ptr::{PointerError, Ptr, Token, Value};
use parking_lot::RwLock;
use url::Url;

use crate::error::{Error, Result, SNIPPET_LEN};
use crate::reference::{Ref, Referrer};
use crate::registry::Registry;

/// Shared storage for one document.
///
/// Cloning a `Document` clones the handle; every clone observes in-place
/// writes made through any other. Equality and hashing are by handle
/// identity, never by content.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    root: RwLock<Value>,
    base_uri: Option<Url>,
}

impl Document {
    pub fn new(root: impl Into<Value>, base_uri: Option<Url>) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                root: RwLock::new(root.into()),
                base_uri: base_uri.map(|uri| crate::uri::normalize(&uri)),
            }),
        }
    }

    /// Current root value. Later in-place writes do not affect the
    /// returned value.
    pub fn root(&self) -> Value {
        self.inner.root.read().clone()
    }

    /// The absolute, fragment-free URI this document was loaded from.
    pub fn base_uri(&self) -> Option<&Url> {
        self.inner.base_uri.as_ref()
    }

    pub fn same(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Writes `value` at `ptr`, in place. Every node over this document
    /// observes the write.
    pub(crate) fn assign(&self, ptr: &Ptr, value: Value) -> Result<(), PointerError> {
        let mut root = self.inner.root.write();
        ptr.assign(&mut root, value)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("base_uri", &self.base_uri().map(Url::as_str))
            .field("root", &self.root().snippet(80))
            .finish()
    }
}

/// A location in a document.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Node {
    document: Document,
    ptr: Ptr,
}

impl Node {
    pub fn new(document: Document, ptr: Ptr) -> Self {
        Self { document, ptr }
    }

    /// The root node of a new document holding `value`.
    pub fn root_of(value: impl Into<Value>, base_uri: Option<Url>) -> Self {
        Self::new(Document::new(value, base_uri), Ptr::root())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn ptr(&self) -> &Ptr {
        &self.ptr
    }

    /// The value at this location.
    ///
    /// # Errors
    ///
    /// [`PointerError::Resolution`] if the location no longer exists.
    pub fn content(&self) -> Result<Value, PointerError> {
        let root = self.document.root();
        self.ptr.evaluate(&root).cloned()
    }

    pub fn document_root_node(&self) -> Node {
        Node::new(self.document.clone(), Ptr::root())
    }

    pub fn parent_node(&self) -> Result<Node, PointerError> {
        Ok(Node::new(self.document.clone(), self.ptr.parent()?))
    }

    /// The location one token below this one. Its existence is not checked.
    pub fn child(&self, token: impl Into<Token>) -> Node {
        Node::new(self.document.clone(), self.ptr.child(token))
    }

    /// The location `rel` below this one. Its existence is not checked.
    pub fn descendant(&self, rel: &Ptr) -> Node {
        Node::new(self.document.clone(), &self.ptr + rel)
    }

    /// Every ancestor of this node from the parent up to the document root.
    pub fn ancestors(&self) -> impl Iterator<Item = Node> + '_ {
        (0..self.ptr.len())
            .rev()
            .map(move |n| Node::new(self.document.clone(), self.ptr.take(n)))
    }

    /// The `$ref` string of this node's content, if it is an object carrying
    /// one.
    pub fn ref_uri(&self) -> Result<Option<String>> {
        let content = self.content()?;
        Ok(content.get("$ref").and_then(Value::as_str).map(str::to_string))
    }

    /// Follows a `$ref` at this location in plain-document mode, or returns
    /// this node when there is none.
    pub fn deref(&self, registry: &Registry) -> Result<Node> {
        match self.ref_uri()? {
            Some(uri) => {
                Ref::new(uri, Some(Referrer::Node(self.clone())), registry.clone())?.deref_node()
            }
            None => Ok(self.clone()),
        }
    }

    pub(crate) fn not_subscriptable(&self, content: &Value) -> Error {
        Error::NotSubscriptable {
            pointer: self.ptr.fragment(),
            kind: content.kind(),
            snippet: content.snippet(SNIPPET_LEN),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.document.base_uri() {
            Some(base) => write!(f, "Node({base}{})", self.ptr.fragment()),
            None => write!(f, "Node({})", self.ptr.fragment()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_follows_in_place_writes() {
        let node = Node::root_of(json!({"a": {"b": 1}}), None);
        let a = node.child("a");
        assert_eq!(a.content().unwrap().to_json(), json!({"b": 1}));

        node.document()
            .assign(&Ptr::from_pointer("/a/b").unwrap(), Value::from(2i64))
            .unwrap();
        assert_eq!(a.content().unwrap().to_json(), json!({"b": 2}));
    }

    #[test]
    fn test_snapshot_is_unaffected_by_writes() {
        let node = Node::root_of(json!({"a": 1}), None);
        let before = node.document().root();
        node.document().assign(&Ptr::new(["a"]), Value::from(5i64)).unwrap();
        assert_eq!(before.to_json(), json!({"a": 1}));
        assert_eq!(node.content().unwrap().to_json(), json!({"a": 5}));
    }

    #[test]
    fn test_relationships() {
        let node = Node::root_of(json!({"a": [{"b": null}]}), None);
        let deep = node.descendant(&Ptr::new([Token::from("a"), Token::from(0), Token::from("b")]));
        assert_eq!(deep.parent_node().unwrap().ptr().pointer(), "/a/0");
        assert_eq!(deep.document_root_node(), node);
        let ancestors: Vec<String> = deep.ancestors().map(|n| n.ptr().pointer()).collect();
        assert_eq!(ancestors, vec!["/a/0", "/a", ""]);
        assert!(node.parent_node().is_err());
    }

    #[test]
    fn test_identity_is_by_document_handle() {
        let a = Node::root_of(json!({}), None);
        let b = Node::root_of(json!({}), None);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_missing_location() {
        let node = Node::root_of(json!({"a": 1}), None).child("zzz");
        assert!(matches!(node.content(), Err(PointerError::Resolution { .. })));
    }
}
