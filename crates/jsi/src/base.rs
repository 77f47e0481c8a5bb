//! Instances wrapped with the schemas that describe them.
//!
//! A [`Jsi`] pairs a location in an instance document with the set of
//! schemas applying there. Subscripting with [`Jsi::get`] runs child
//! application against those schemas and wraps the child in turn, so a
//! whole document can be walked with every node knowing its schemas.
//!
//! Wrappers never point at each other. A descendant remembers only the
//! pointer and schemas of the wrapper it was reached from (its root), and
//! recomputes anything between the two by walking down again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsi_ptr::{Ptr, Token, Value};
use parking_lot::Mutex;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};
use crate::node::{Document, Node};
use crate::reference::{Ref, Referrer};
use crate::registry::Registry;
use crate::schema::{is_schema_shaped, Schema, ValidationResult};
use crate::schema_set::SchemaSet;

/// Anything a schema or wrapper can be built over.
///
/// Only [`Instance::Value`] is a raw instance; the other variants exist so
/// that passing a wrapper by mistake is reported instead of nesting one
/// abstraction layer inside another.
#[derive(Clone, Debug)]
pub enum Instance {
    Value(Value),
    Jsi(Jsi),
    Schema(Schema),
}

impl Instance {
    /// The raw instance.
    ///
    /// # Errors
    ///
    /// [`Error::InstanceIsWrapper`] for a [`Jsi`] or a [`Schema`].
    pub fn into_raw(self) -> Result<Value> {
        match self {
            Instance::Value(value) => Ok(value),
            Instance::Jsi(_) => Err(Error::InstanceIsWrapper { wrapper: "Jsi" }),
            Instance::Schema(_) => Err(Error::InstanceIsWrapper { wrapper: "Schema" }),
        }
    }

    /// The raw content, unwrapping a wrapper if given one.
    pub fn into_content(self) -> Result<Value> {
        match self {
            Instance::Value(value) => Ok(value),
            Instance::Jsi(jsi) => jsi.content(),
            Instance::Schema(schema) => schema.content(),
        }
    }
}

impl From<Value> for Instance {
    fn from(value: Value) -> Self {
        Instance::Value(value)
    }
}

impl From<serde_json::Value> for Instance {
    fn from(value: serde_json::Value) -> Self {
        Instance::Value(value.into())
    }
}

impl From<Jsi> for Instance {
    fn from(jsi: Jsi) -> Self {
        Instance::Jsi(jsi)
    }
}

impl From<Schema> for Instance {
    fn from(schema: Schema) -> Self {
        Instance::Schema(schema)
    }
}

/// Options for wrapping a new instance document.
#[derive(Clone, Debug, Default)]
pub struct JsiOptions {
    /// The URI the instance document was retrieved from.
    pub base_uri: Option<Url>,
    /// The registry `$ref`s in the instance resolve in. Defaults to the
    /// registry of the first schema, else an empty one.
    pub registry: Option<Registry>,
}

/// Which subscripting protocol an instance supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Mapping,
    Sequence,
    Scalar,
}

impl Shape {
    fn of(value: &Value) -> Shape {
        match value {
            Value::Object(_) => Shape::Mapping,
            Value::Array(_) => Shape::Sequence,
            _ => Shape::Scalar,
        }
    }
}

/// The result of subscripting: a wrapper where schemas apply, else the raw
/// value.
#[derive(Clone, Debug, PartialEq)]
pub enum Child {
    Jsi(Jsi),
    Value(Value),
}

impl Child {
    pub fn as_jsi(&self) -> Option<&Jsi> {
        match self {
            Child::Jsi(jsi) => Some(jsi),
            Child::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Child::Jsi(_) => None,
            Child::Value(value) => Some(value),
        }
    }

    pub fn into_jsi(self) -> Option<Jsi> {
        match self {
            Child::Jsi(jsi) => Some(jsi),
            Child::Value(_) => None,
        }
    }

    /// The raw content either way.
    pub fn content(&self) -> Result<Value> {
        match self {
            Child::Jsi(jsi) => jsi.content(),
            Child::Value(value) => Ok(value.clone()),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(self.content()?.to_json())
    }
}

impl From<Child> for Instance {
    fn from(child: Child) -> Self {
        match child {
            Child::Jsi(jsi) => Instance::Jsi(jsi),
            Child::Value(value) => Instance::Value(value),
        }
    }
}

/// A wrapped instance.
#[derive(Clone)]
pub struct Jsi {
    inner: Arc<JsiInner>,
}

struct JsiInner {
    node: Node,
    /// The schemas this wrapper was created with.
    indicated: SchemaSet,
    /// `indicated` plus everything in-place application brings in, for
    /// the content at construction time.
    schemas: SchemaSet,
    root: Option<Arc<RootHandle>>,
    shape: Shape,
    registry: Registry,
    memo: Mutex<HashMap<Token, Memo>>,
}

/// The wrapper a descendant was reached from, kept as data.
#[derive(Clone, Debug)]
struct RootHandle {
    ptr: Ptr,
    indicated: SchemaSet,
}

#[derive(Clone)]
struct Memo {
    value: Option<Value>,
    child: Option<Child>,
}

impl Jsi {
    /// Wraps `instance` in a new document described by `schemas`.
    ///
    /// # Errors
    ///
    /// [`Error::InstanceIsWrapper`] when given a `Jsi` or a [`Schema`], and
    /// any error from applying the schemas.
    pub fn new(instance: impl Into<Instance>, schemas: SchemaSet, options: JsiOptions) -> Result<Jsi> {
        let value = instance.into().into_raw()?;
        let registry = match options.registry {
            Some(registry) => registry,
            None => schemas.first().map(|s| s.registry().clone()).unwrap_or_default(),
        };
        let node = Node::new(Document::new(value, options.base_uri), Ptr::root());
        Jsi::build(node, schemas, None, registry)
    }

    /// Wraps `instance` with no schemas.
    pub fn simple_wrap(instance: impl Into<Instance>, options: JsiOptions) -> Result<Jsi> {
        Jsi::new(instance, SchemaSet::new(), options)
    }

    fn build(node: Node, indicated: SchemaSet, root: Option<Arc<RootHandle>>, registry: Registry) -> Result<Jsi> {
        let content = node.content()?;
        let schemas = indicated.inplace_applicator_schemas(&content)?;
        Ok(Jsi {
            inner: Arc::new(JsiInner {
                node,
                indicated,
                schemas,
                root,
                shape: Shape::of(&content),
                registry,
                memo: Mutex::new(HashMap::new()),
            }),
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn node(&self) -> &Node {
        &self.inner.node
    }

    pub fn document(&self) -> &Document {
        self.inner.node.document()
    }

    pub fn ptr(&self) -> &Ptr {
        self.inner.node.ptr()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Whether both handles are the same wrapper, as handed out by the
    /// subscript memo.
    pub fn same(&self, other: &Jsi) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Every schema describing this instance, in-place applicators included.
    pub fn schemas(&self) -> &SchemaSet {
        &self.inner.schemas
    }

    /// The schemas this wrapper was created with, before in-place
    /// application.
    pub fn indicated_schemas(&self) -> &SchemaSet {
        &self.inner.indicated
    }

    /// The shape of the content when this wrapper was created.
    pub fn shape(&self) -> Shape {
        self.inner.shape
    }

    pub fn content(&self) -> Result<Value> {
        Ok(self.inner.node.content()?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(self.content()?.to_json())
    }

    pub fn child_node(&self, token: impl Into<Token>) -> Node {
        self.inner.node.child(token)
    }

    pub fn descendant_node(&self, rel: &Ptr) -> Node {
        self.inner.node.descendant(rel)
    }

    /// The node of the wrapper this one was reached from, or this node.
    pub fn root_node(&self) -> Node {
        match &self.inner.root {
            Some(root) => Node::new(self.document().clone(), root.ptr.clone()),
            None => self.inner.node.clone(),
        }
    }

    // ── Subscripting ────────────────────────────────────────────────────

    /// The child at `token`.
    ///
    /// A token the instance does not have is looked up through this node's
    /// `$ref`, if it has one; failing that, a `default` declared by the
    /// child's schemas is filled in on a modified copy. `None` means the
    /// child is absent and nothing supplied it.
    ///
    /// # Errors
    ///
    /// [`Error::NotSubscriptable`] on a scalar, [`Error::InvalidToken`] for
    /// a key on an array or an index on an object, and any resolution
    /// error from `$ref` or schema application.
    pub fn get(&self, token: impl Into<Token>) -> Result<Option<Child>> {
        self.get_visiting(token.into(), &mut Vec::new())
    }

    fn get_visiting(&self, token: Token, visited: &mut Vec<Node>) -> Result<Option<Child>> {
        let content = self.content()?;
        let (token, value) = self.check_token(&content, &token)?;

        if let Some(memo) = self.inner.memo.lock().get(&token) {
            let same = match (&memo.value, &value) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            };
            if same {
                return Ok(memo.child.clone());
            }
        }
        trace!(jsi = ?self, token = %token, "subscript");

        if value.is_none() && !visited.contains(self.node()) {
            visited.push(self.node().clone());
            if let Some(target) = self.try_deref()? {
                return target.get_visiting(token, visited);
            }
        }

        let child_schemas = self.inner.schemas.child_applicator_schemas(&token, &content)?;
        let child = match value.clone() {
            Some(value) => {
                if child_schemas.is_empty() {
                    Some(Child::Value(value))
                } else {
                    let jsi = Jsi::build(
                        self.child_node(token.clone()),
                        child_schemas,
                        Some(self.root_handle()),
                        self.inner.registry.clone(),
                    )?;
                    if value.is_container() || jsi.schemas().describes_schema() {
                        Some(Child::Jsi(jsi))
                    } else {
                        Some(Child::Value(value))
                    }
                }
            }
            None if !fills_slot(&content, &token) => None,
            None => match single_default(&child_schemas)? {
                Some(default) => {
                    let slot = Ptr::new([token.clone()]);
                    let copy = self.try_modified_copy(|mut container| {
                        slot.assign(&mut container, default)?;
                        Ok(container)
                    })?;
                    copy.get(token.clone())?
                }
                None => None,
            },
        };

        self.inner.memo.lock().insert(
            token,
            Memo {
                value,
                child: child.clone(),
            },
        );
        Ok(child)
    }

    /// Validates `token` against the content's shape, normalizing array
    /// positions, and fetches the child value if present.
    fn check_token(&self, content: &Value, token: &Token) -> Result<(Token, Option<Value>)> {
        match content {
            Value::Object(members) => match token.as_key() {
                Some(key) => Ok((token.clone(), members.get(key).cloned())),
                None => Err(self.invalid_token(token, content)),
            },
            Value::Array(items) => match token.to_index() {
                Some(index) => Ok((Token::Index(index), items.get(index).cloned())),
                None => Err(self.invalid_token(token, content)),
            },
            _ => Err(self.inner.node.not_subscriptable(content)),
        }
    }

    fn invalid_token(&self, token: &Token, content: &Value) -> Error {
        Error::InvalidToken {
            pointer: self.ptr().fragment(),
            token: token.to_string(),
            kind: content.kind(),
        }
    }

    /// Writes `value` at `token` in the shared document. Every wrapper
    /// over the document observes the write; a wrapper passed as `value`
    /// is stored as its content.
    pub fn set(&self, token: impl Into<Token>, value: impl Into<Instance>) -> Result<()> {
        let content = self.content()?;
        let (token, _) = self.check_token(&content, &token.into())?;
        let value = value.into().into_content()?;
        self.inner.memo.lock().clear();
        self.document().assign(&self.ptr().child(token), value)?;
        Ok(())
    }

    /// Always a wrapper for the child at `token`, with no `$ref` or
    /// `default` handling. The child must exist.
    fn child_jsi(&self, token: &Token) -> Result<Jsi> {
        let content = self.content()?;
        let (token, _) = self.check_token(&content, token)?;
        let child_schemas = self.inner.schemas.child_applicator_schemas(&token, &content)?;
        Jsi::build(
            self.child_node(token),
            child_schemas,
            Some(self.root_handle()),
            self.inner.registry.clone(),
        )
    }

    fn descendant_jsi(&self, rel: &Ptr) -> Result<Jsi> {
        let mut current = self.clone();
        for token in rel.tokens() {
            current = current.child_jsi(token)?;
        }
        Ok(current)
    }

    // ── Containers ──────────────────────────────────────────────────────

    /// Object keys, in document order.
    pub fn keys(&self) -> Result<Vec<String>> {
        match self.content()? {
            Value::Object(members) => Ok(members.keys().cloned().collect()),
            other => Err(self.inner.node.not_subscriptable(&other)),
        }
    }

    pub fn len(&self) -> Result<usize> {
        match self.content()? {
            Value::Object(members) => Ok(members.len()),
            Value::Array(items) => Ok(items.len()),
            other => Err(self.inner.node.not_subscriptable(&other)),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains_key(&self, token: impl Into<Token>) -> Result<bool> {
        let content = self.content()?;
        Ok(self.check_token(&content, &token.into())?.1.is_some())
    }

    /// Every child with its token, in document order.
    pub fn children(&self) -> Result<Vec<(Token, Child)>> {
        let tokens: Vec<Token> = match self.content()? {
            Value::Object(members) => members.keys().map(Token::from).collect(),
            Value::Array(items) => (0..items.len()).map(Token::Index).collect(),
            other => return Err(self.inner.node.not_subscriptable(&other)),
        };
        let mut children = Vec::with_capacity(tokens.len());
        for token in tokens {
            if let Some(child) = self.get(token.clone())? {
                children.push((token, child));
            }
        }
        Ok(children)
    }

    // ── Copies ──────────────────────────────────────────────────────────

    /// A wrapper over a new document in which `f` has replaced this node's
    /// content. Only the path from the document root down to this node is
    /// copied; the original document and its wrappers are untouched.
    pub fn modified_copy<F>(&self, f: F) -> Result<Jsi>
    where
        F: FnOnce(Value) -> Value,
    {
        self.try_modified_copy(|value| Ok(f(value)))
    }

    /// Fallible form of [`modified_copy`](Self::modified_copy).
    pub fn try_modified_copy<F>(&self, f: F) -> Result<Jsi>
    where
        F: FnOnce(Value) -> Result<Value>,
    {
        let handle = self.root_handle();
        let rel = self.ptr().relative_to(&handle.ptr).map_err(|_| {
            Error::Bug(format!(
                "root pointer {} is not an ancestor of {}",
                handle.ptr.fragment(),
                self.ptr().fragment()
            ))
        })?;
        let root_value = self.ptr().try_modified_document_copy(&self.document().root(), f)?;
        let document = Document::new(root_value, self.document().base_uri().cloned());
        let root = Jsi::build(
            Node::new(document, handle.ptr.clone()),
            handle.indicated.clone(),
            None,
            self.inner.registry.clone(),
        )?;
        root.descendant_jsi(&rel)
    }

    fn root_handle(&self) -> Arc<RootHandle> {
        match &self.inner.root {
            Some(root) => root.clone(),
            None => Arc::new(RootHandle {
                ptr: self.ptr().clone(),
                indicated: self.inner.indicated.clone(),
            }),
        }
    }

    fn rebuild_root(&self) -> Result<Jsi> {
        match &self.inner.root {
            Some(root) => Jsi::build(
                Node::new(self.document().clone(), root.ptr.clone()),
                root.indicated.clone(),
                None,
                self.inner.registry.clone(),
            ),
            None => Ok(self.clone()),
        }
    }

    // ── References ──────────────────────────────────────────────────────

    /// The target of this node's `$ref`, or this wrapper when it has none.
    pub fn deref(&self) -> Result<Jsi> {
        Ok(self.try_deref()?.unwrap_or_else(|| self.clone()))
    }

    /// The target of this node's `$ref`, if it has one. A target inside
    /// this wrapper's root is reached from the root, so it carries the
    /// schemas that apply there; any other target is described by this
    /// wrapper's schemas.
    pub fn try_deref(&self) -> Result<Option<Jsi>> {
        let Some(uri) = self.inner.node.ref_uri()? else {
            return Ok(None);
        };
        let target = Ref::new(
            uri,
            Some(Referrer::Node(self.inner.node.clone())),
            self.inner.registry.clone(),
        )?
        .deref_node()?;

        let handle = self.root_handle();
        if target.document().same(self.document()) && handle.ptr.is_ancestor_of(target.ptr()) {
            let rel = target.ptr().relative_to(&handle.ptr)?;
            return Ok(Some(self.rebuild_root()?.descendant_jsi(&rel)?));
        }
        Ok(Some(Jsi::build(
            target,
            self.inner.indicated.clone(),
            None,
            self.inner.registry.clone(),
        )?))
    }

    // ── Ancestry ────────────────────────────────────────────────────────

    /// Wrappers for each ancestor of this node up to its root, nearest
    /// first. An ancestor whose schemas cannot be worked out is wrapped
    /// without schemas.
    pub fn parent_jsis(&self) -> Result<Vec<Jsi>> {
        let Some(handle) = &self.inner.root else {
            return Ok(Vec::new());
        };
        let rel = self.ptr().relative_to(&handle.ptr)?;
        let mut chain = vec![self.rebuild_root()?];
        for token in rel.tokens().iter().take(rel.len().saturating_sub(1)) {
            let Some(current) = chain.last() else {
                break;
            };
            let next = match current.child_jsi(token) {
                Ok(next) => next,
                Err(err) if err.is_resolution() => Jsi::build(
                    current.child_node(token),
                    SchemaSet::new(),
                    Some(handle.clone()),
                    self.inner.registry.clone(),
                )?,
                Err(err) => return Err(err),
            };
            chain.push(next);
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn parent_jsi(&self) -> Result<Option<Jsi>> {
        Ok(self.parent_jsis()?.into_iter().next())
    }

    // ── Schemas ─────────────────────────────────────────────────────────

    pub fn is_valid(&self) -> Result<bool> {
        self.inner.indicated.instance_valid(&self.content()?)
    }

    pub fn validate(&self) -> Result<ValidationResult> {
        self.inner.indicated.validate(&self.content()?)
    }

    /// This instance read as a schema, when its schemas describe schemas.
    pub fn as_schema(&self) -> Option<Schema> {
        let dialect = self.inner.schemas.iter().find_map(Schema::described_dialect)?;
        let content = self.content().ok()?;
        if !is_schema_shaped(&content) {
            return None;
        }
        Some(Schema::from_node(
            self.inner.node.clone(),
            dialect.draft,
            self.inner.registry.clone(),
        ))
    }
}

/// Whether a value stored at `token` lands right there: any object key, or
/// the array position just past the end.
fn fills_slot(content: &Value, token: &Token) -> bool {
    match (content, token) {
        (Value::Array(items), Token::Index(index)) => *index <= items.len(),
        _ => true,
    }
}

/// The one `default` the schemas agree on, if they declare exactly one.
fn single_default(schemas: &SchemaSet) -> Result<Option<Value>> {
    let mut defaults: Vec<Value> = Vec::new();
    for schema in schemas {
        if let Some(default) = schema.keyword("default")? {
            if !defaults.contains(&default) {
                defaults.push(default);
            }
        }
    }
    Ok(if defaults.len() == 1 { defaults.pop() } else { None })
}

impl PartialEq for Jsi {
    fn eq(&self, other: &Self) -> bool {
        self.inner.node == other.inner.node && self.inner.indicated == other.inner.indicated
    }
}

impl fmt::Debug for Jsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Jsi({:?}, {:?})", self.inner.node, self.inner.indicated)
    }
}
