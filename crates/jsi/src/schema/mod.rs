//! Schemas.
//!
//! A [`Schema`] is a location in a document read under one [`Draft`]'s
//! rules, together with the [`Registry`] its references resolve in. Schemas
//! are cheap handles: two schemas at the same location of the same document
//! are equal, whichever way they were reached.

mod application;
pub mod draft;
mod inplace;
pub(crate) mod pattern;
pub mod validation;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use jsi_ptr::{Ptr, Token, Value};
use tracing::trace;
use url::Url;

use crate::base::{Instance, Jsi, JsiOptions};
use crate::error::{Error, Result, SNIPPET_LEN};
use crate::node::{Document, Node};
use crate::reference::{Ref, Referrer};
use crate::registry::{Dialect, Registry, Resource};
use crate::schema_set::SchemaSet;
use crate::uri;

pub use draft::Draft;
pub use validation::{ValidationError, ValidationResult};

use draft::SubschemaKind;

/// How a schema document is read and whether it is registered.
#[derive(Clone, Debug, Default)]
pub struct SchemaOptions {
    /// Overrides the draft named by the document's `$schema`.
    pub draft: Option<Draft>,
    /// The URI the document was retrieved from.
    pub base_uri: Option<Url>,
    /// Register the document (and its embedded `$id`s) in the registry.
    pub register: bool,
}

/// Whether `value` can be read as a schema.
pub(crate) fn is_schema_shaped(value: &Value) -> bool {
    value.is_object() || value.is_boolean()
}

#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

struct SchemaInner {
    node: Node,
    draft: Draft,
    registry: Registry,
    schema_uri: OnceLock<Option<Url>>,
    ref_target: OnceLock<Schema>,
}

impl Schema {
    /// Creates a schema over a new document holding `value`.
    ///
    /// The draft comes from `options.draft`, else from the dialect registered
    /// for the document's `$schema`, else draft-07.
    ///
    /// # Errors
    ///
    /// [`Error::InstanceIsWrapper`] when given a [`Jsi`] or a `Schema`,
    /// [`Error::NotASchema`] when `value` is neither an object nor a boolean,
    /// and any registration error when `options.register` is set.
    pub fn new(value: impl Into<Instance>, registry: &Registry, options: SchemaOptions) -> Result<Schema> {
        let value = value.into().into_raw()?;
        let draft = match options.draft {
            Some(draft) => draft,
            None => Self::draft_for(&value, registry),
        };
        let node = Node::new(Document::new(value, options.base_uri), Ptr::root());
        let schema = Schema::from_node(node, draft, registry.clone());
        schema.check_shape()?;
        if options.register {
            registry.register(&Resource::schema(&schema))?;
        }
        Ok(schema)
    }

    /// A schema at `node`, with no check that its content is schema-shaped.
    pub fn from_node(node: Node, draft: Draft, registry: Registry) -> Schema {
        Schema {
            inner: Arc::new(SchemaInner {
                node,
                draft,
                registry,
                schema_uri: OnceLock::new(),
                ref_target: OnceLock::new(),
            }),
        }
    }

    fn draft_for(value: &Value, registry: &Registry) -> Draft {
        let Some(metaschema) = value.get("$schema").and_then(Value::as_str) else {
            return Draft::default();
        };
        match registry.find_dialect(metaschema) {
            Ok(dialect) => dialect.draft,
            Err(_) => Draft::from_metaschema_uri(metaschema).unwrap_or_default(),
        }
    }

    fn check_shape(&self) -> Result<()> {
        let content = self.content()?;
        if is_schema_shaped(&content) {
            Ok(())
        } else {
            Err(self.not_a_schema(&content))
        }
    }

    fn not_a_schema(&self, content: &Value) -> Error {
        Error::NotASchema {
            location: format!("{:?}", self.inner.node),
            snippet: content.snippet(SNIPPET_LEN),
        }
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

    pub fn draft(&self) -> Draft {
        self.inner.draft
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The raw schema content.
    pub fn content(&self) -> Result<Value> {
        Ok(self.inner.node.content()?)
    }

    pub fn keyword(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.content()?.get(name).cloned())
    }

    pub fn has_keyword(&self, name: &str) -> Result<bool> {
        Ok(self.content()?.get(name).is_some())
    }

    // ── Identification ──────────────────────────────────────────────────

    /// The raw `$id` (or draft-04 `id`) string.
    pub fn id(&self) -> Result<Option<String>> {
        let content = self.content()?;
        Ok(content
            .get(self.draft().id_keyword())
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// The absolute URI this schema's id declares, when it declares one that
    /// is not just an anchor.
    pub fn absolute_uri(&self) -> Result<Option<Url>> {
        absolute_id_at(self.node(), self.draft())
    }

    /// Plain-name anchors: `$anchor`, and the fragment of an id.
    pub fn anchors(&self) -> Result<Vec<String>> {
        let content = self.content()?;
        let mut anchors = Vec::new();
        if let Some(anchor) = content.get("$anchor").and_then(Value::as_str) {
            anchors.push(anchor.to_string());
        }
        if let Some(id) = content.get(self.draft().id_keyword()).and_then(Value::as_str) {
            if let (_, Some(fragment)) = uri::split_fragment(id) {
                if !fragment.is_empty() && !fragment.starts_with('/') {
                    anchors.push(fragment.to_string());
                }
            }
        }
        Ok(anchors)
    }

    /// The URI relative references in this schema resolve against: the
    /// nearest id-declared URI at or above it, else the document's base URI.
    pub fn resource_base_uri(&self) -> Result<Option<Url>> {
        resource_base_at(self.node(), self.draft())
    }

    /// The canonical URI of this schema: the nearest id-declared URI at or
    /// above it with the remaining path as a pointer fragment, else the
    /// document's base URI with the full path as a fragment.
    pub fn schema_uri(&self) -> Option<&Url> {
        self.inner
            .schema_uri
            .get_or_init(|| self.compute_schema_uri().ok().flatten())
            .as_ref()
    }

    fn compute_schema_uri(&self) -> Result<Option<Url>> {
        let node = self.node();
        for candidate in std::iter::once(node.clone()).chain(node.ancestors()) {
            if let Some(uri) = absolute_id_at(&candidate, self.draft())? {
                let rel = node.ptr().relative_to(candidate.ptr())?;
                return Ok(Some(with_pointer_fragment(uri, &rel)));
            }
        }
        Ok(node
            .document()
            .base_uri()
            .map(|base| with_pointer_fragment(base.clone(), node.ptr())))
    }

    /// The nearest schema at or above this one that declares an absolute
    /// URI, else the document root.
    pub fn resource_root(&self) -> Result<Schema> {
        let node = self.node();
        for candidate in std::iter::once(node.clone()).chain(node.ancestors()) {
            if absolute_id_at(&candidate, self.draft())?.is_some() {
                return Ok(self.at(candidate));
            }
        }
        Ok(self.at(node.document_root_node()))
    }

    fn at(&self, node: Node) -> Schema {
        Schema::from_node(node, self.draft(), self.registry().clone())
    }

    // ── Dialects ────────────────────────────────────────────────────────

    /// The dialect this schema is the metaschema of, if any.
    pub fn described_dialect(&self) -> Option<Dialect> {
        let uri = self.schema_uri()?;
        if uri::fragment(uri).is_some() {
            return None;
        }
        self.registry().find_dialect(uri.as_str()).ok()
    }

    /// Whether instances of this schema are themselves schemas.
    pub fn describes_schema(&self) -> bool {
        self.described_dialect().is_some()
    }

    /// Whether this schema expects an array, judging by `type` and the
    /// array keywords it uses.
    pub fn describes_array(&self) -> Result<bool> {
        self.describes_kind(
            "array",
            &["items", "additionalItems", "contains", "minItems", "maxItems", "uniqueItems"],
        )
    }

    /// Whether this schema expects an object, judging by `type` and the
    /// object keywords it uses.
    pub fn describes_hash(&self) -> Result<bool> {
        self.describes_kind(
            "object",
            &[
                "properties",
                "patternProperties",
                "additionalProperties",
                "required",
                "minProperties",
                "maxProperties",
                "dependencies",
                "propertyNames",
            ],
        )
    }

    fn describes_kind(&self, type_name: &str, keywords: &[&str]) -> Result<bool> {
        let content = self.content()?;
        let typed = match content.get("type") {
            Some(Value::String(t)) => &**t == type_name,
            Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(type_name)),
            _ => false,
        };
        Ok(typed || keywords.iter().any(|k| content.get(k).is_some()))
    }

    // ── Navigation ──────────────────────────────────────────────────────

    /// The schema at `ptr` below this one.
    ///
    /// # Errors
    ///
    /// A pointer resolution error when `ptr` does not evaluate, and
    /// [`Error::NotASchema`] when it lands on something that is neither an
    /// object nor a boolean.
    pub fn subschema(&self, ptr: &Ptr) -> Result<Schema> {
        let content = self.content()?;
        let resolved = ptr.resolve_against(&content)?;
        let target = resolved.evaluate(&content)?;
        let schema = self.at(self.node().descendant(&resolved));
        if !is_schema_shaped(target) {
            return Err(schema.not_a_schema(target));
        }
        Ok(schema)
    }

    /// Immediate subschemas, in document order, found through this draft's
    /// subschema keywords. Values of keywords such as `enum` or `default`
    /// are never visited.
    pub fn subschemas(&self) -> Result<Vec<Schema>> {
        let content = self.content()?;
        let Some(keywords) = content.as_object() else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for (keyword, value) in keywords.iter() {
            let Some(kind) = self.draft().subschema_kind(keyword) else {
                continue;
            };
            let base = Ptr::new([keyword.as_str()]);
            match (kind, value) {
                (SubschemaKind::Single | SubschemaKind::SingleOrArray, v) if is_schema_shaped(v) => {
                    found.push(self.at(self.node().descendant(&base)));
                }
                (SubschemaKind::Array | SubschemaKind::SingleOrArray, Value::Array(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        if is_schema_shaped(item) {
                            found.push(self.at(self.node().descendant(&base.child(i))));
                        }
                    }
                }
                (SubschemaKind::Map | SubschemaKind::MapOfSchemaOrArray, Value::Object(members)) => {
                    for (name, member) in members.iter() {
                        if is_schema_shaped(member) {
                            found.push(self.at(self.node().descendant(&base.child(name))));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(found)
    }

    /// Every schema below this one, depth first in document order.
    pub fn descendant_schemas(&self) -> Result<Vec<Schema>> {
        let mut found = Vec::new();
        let mut stack: Vec<Schema> = self.subschemas()?.into_iter().rev().collect();
        while let Some(schema) = stack.pop() {
            stack.extend(schema.subschemas()?.into_iter().rev());
            found.push(schema);
        }
        Ok(found)
    }

    /// Schemas in this resource carrying the anchor `name`. Embedded
    /// resources (subschemas with an absolute id of their own) are not
    /// searched.
    pub fn find_anchor(&self, name: &str) -> Result<Vec<Schema>> {
        let mut found = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(schema) = stack.pop() {
            if schema.anchors()?.iter().any(|a| a == name) {
                found.push(schema.clone());
            }
            for child in schema.subschemas()?.into_iter().rev() {
                if child.absolute_uri()?.is_none() {
                    stack.push(child);
                }
            }
        }
        Ok(found)
    }

    // ── References ──────────────────────────────────────────────────────

    /// A reference for this schema's `$ref`, if it has one.
    pub fn reference(&self) -> Result<Option<Ref>> {
        match self.node().ref_uri()? {
            Some(uri) => Ok(Some(Ref::new(
                uri,
                Some(Referrer::Schema(self.clone())),
                self.registry().clone(),
            )?)),
            None => Ok(None),
        }
    }

    /// The schema this schema's `$ref` points at. Resolved once per schema
    /// handle.
    pub fn ref_target(&self) -> Result<Option<Schema>> {
        if let Some(target) = self.inner.ref_target.get() {
            return Ok(Some(target.clone()));
        }
        let Some(reference) = self.reference()? else {
            return Ok(None);
        };
        let target = reference.deref_schema()?;
        Ok(Some(self.inner.ref_target.get_or_init(|| target).clone()))
    }

    // ── Application ─────────────────────────────────────────────────────

    /// Schemas applying to the child `token` of `instance`.
    pub fn child_applicator_schemas(&self, token: &Token, instance: &Value) -> Result<Vec<Schema>> {
        application::child_applicators(self, token, instance)
    }

    /// Schemas applying to the property `name` regardless of the instance.
    pub fn subschemas_for_property(&self, name: &str) -> Result<Vec<Schema>> {
        application::property_applicators(self, name)
    }

    /// Schemas applying to array position `index` regardless of the
    /// instance. `contains` is not considered.
    pub fn subschemas_for_index(&self, index: usize) -> Result<Vec<Schema>> {
        application::item_applicators(self, index)
    }

    /// Schemas applying to `instance` itself: this schema, or its `$ref`
    /// target, and whatever `allOf`, `anyOf`, `oneOf`, the conditionals and
    /// `dependencies` bring in.
    pub fn inplace_applicator_schemas(&self, instance: &Value) -> Result<Vec<Schema>> {
        inplace::inplace_applicators(self, instance)
    }

    /// The single schema that best describes `instance`: follows `$ref`,
    /// then the first validating branch of `oneOf`, `allOf` and `anyOf` in
    /// that order.
    pub fn match_to_instance(&self, instance: &Value) -> Result<Schema> {
        self.match_to_instance_visiting(instance, &mut Vec::new())
    }

    fn match_to_instance_visiting(&self, instance: &Value, visited: &mut Vec<Node>) -> Result<Schema> {
        if visited.contains(self.node()) {
            return Ok(self.clone());
        }
        visited.push(self.node().clone());
        if let Some(target) = self.ref_target()? {
            return target.match_to_instance_visiting(instance, visited);
        }
        let content = self.content()?;
        for keyword in ["oneOf", "allOf", "anyOf"] {
            let Some(Value::Array(branches)) = content.get(keyword) else {
                continue;
            };
            for i in 0..branches.len() {
                let branch = self.subschema(&Ptr::new([Token::from(keyword), Token::Index(i)]))?;
                if branch.instance_valid(instance)? {
                    trace!(schema = ?self, keyword, branch = i, "matched branch");
                    return branch.match_to_instance_visiting(instance, visited);
                }
            }
        }
        Ok(self.clone())
    }

    // ── Validation ──────────────────────────────────────────────────────

    /// Every keyword failure of `instance` against this schema.
    pub fn validate(&self, instance: &Value) -> Result<ValidationResult> {
        validation::validate(self, instance, true)
    }

    pub fn instance_valid(&self, instance: &Value) -> Result<bool> {
        Ok(validation::validate(self, instance, false)?.is_valid())
    }

    // ── Instances ───────────────────────────────────────────────────────

    /// Wraps `instance` as described by this schema.
    pub fn new_jsi(&self, instance: impl Into<Instance>, options: JsiOptions) -> Result<Jsi> {
        SchemaSet::from_iter([self.clone()]).new_jsi(instance, options)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.inner.node == other.inner.node
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.node.hash(state);
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.schema_uri() {
            Some(uri) => write!(f, "Schema({uri})"),
            None => write!(f, "Schema({})", self.ptr().fragment()),
        }
    }
}

// ── URI derivation ──────────────────────────────────────────────────────

/// The absolute, fragment-free URI declared by the id of the object at
/// `node`, resolved against the base URI of its parent.
fn absolute_id_at(node: &Node, draft: Draft) -> Result<Option<Url>> {
    let content = node.content()?;
    let Some(id) = content.get(draft.id_keyword()).and_then(Value::as_str) else {
        return Ok(None);
    };
    let base = match node.parent_node() {
        Ok(parent) => resource_base_at(&parent, draft)?,
        Err(_) => node.document().base_uri().cloned(),
    };
    Ok(uri::join(base.as_ref(), id)?
        .filter(|joined| uri::fragment(joined).is_none())
        .map(|joined| uri::normalize(&joined)))
}

/// The base URI in effect at `node`.
fn resource_base_at(node: &Node, draft: Draft) -> Result<Option<Url>> {
    let root = node.document().root();
    let mut base = node.document().base_uri().cloned();
    for depth in 0..=node.ptr().len() {
        let content = node.ptr().take(depth).evaluate(&root)?;
        let Some(id) = content.get(draft.id_keyword()).and_then(Value::as_str) else {
            continue;
        };
        if let Some(joined) = uri::join(base.as_ref(), id)? {
            if uri::fragment(&joined).is_none() {
                base = Some(uri::normalize(&joined));
            }
        }
    }
    Ok(base)
}

fn with_pointer_fragment(mut uri: Url, rel: &Ptr) -> Url {
    if !rel.is_root() {
        let fragment = rel.fragment();
        uri.set_fragment(Some(&fragment[1..]));
    }
    uri
}
