//! URI-keyed store of resources, vocabularies and dialects.
//!
//! Keys are absolute URIs with the fragment removed. Each kind keeps its own
//! table of resolved entries plus a table of autoloaders, callbacks that
//! produce an entry the first time its URI is looked up.
//!
//! ```
//! use jsi::{Node, Registry, Resource};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! registry
//!     .autoload_uri("http://example.com/doc.json", |req| {
//!         Ok(Resource::document(Node::root_of(json!({"a": 1}), Some(req.uri.clone()))))
//!     })
//!     .unwrap();
//! let found = registry.find("http://example.com/doc.json#ignored").unwrap();
//! assert_eq!(found.node().content().unwrap().to_json(), json!({"a": 1}));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{debug, trace, warn};
use url::Url;

use crate::base::{Child, Jsi, Shape};
use crate::error::{Error, Result, SNIPPET_LEN};
use crate::node::Node;
use crate::schema::{Draft, Schema};
use crate::uri;

/// What an autoloader is given when it is invoked.
pub struct AutoloadRequest<'a> {
    /// The registry being searched. Loaders may register further resources
    /// in it; the registry lock is reentrant.
    pub registry: &'a Registry,
    /// The normalized URI being looked up.
    pub uri: &'a Url,
}

pub type Autoload<T> = Arc<dyn Fn(&AutoloadRequest<'_>) -> Result<T> + Send + Sync>;

// ── Entries ─────────────────────────────────────────────────────────────

/// A registered document location, with the draft to read it under when it
/// is a schema.
///
/// Resources are stored as locations rather than as [`Schema`] handles so
/// that schemas, which refer to their registry, never end up owned by it.
#[derive(Clone, Debug)]
pub struct Resource {
    node: Node,
    draft: Option<Draft>,
    /// Schemas found inside a plain document, registered along with it.
    embedded: Vec<Resource>,
}

impl Resource {
    pub fn schema(schema: &Schema) -> Self {
        Self {
            node: schema.node().clone(),
            draft: Some(schema.draft()),
            embedded: Vec::new(),
        }
    }

    /// A plain document location. Only a document root with a base URI has
    /// a URI to be registered under.
    pub fn document(node: Node) -> Self {
        Self {
            node,
            draft: None,
            embedded: Vec::new(),
        }
    }

    /// A schema resource when `jsi` is an instance of a metaschema,
    /// otherwise a plain document resource carrying every outermost schema
    /// found below it.
    ///
    /// # Errors
    ///
    /// Any error from subscripting `jsi`'s descendants.
    pub fn from_jsi(jsi: &Jsi) -> Result<Self> {
        if let Some(schema) = jsi.as_schema() {
            return Ok(Self::schema(&schema));
        }
        let mut embedded = Vec::new();
        collect_embedded(jsi, &mut embedded)?;
        Ok(Self {
            node: jsi.node().clone(),
            draft: None,
            embedded,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn draft(&self) -> Option<Draft> {
        self.draft
    }

    pub fn is_schema(&self) -> bool {
        self.draft.is_some()
    }

    /// This resource as a schema governed by `registry`.
    ///
    /// # Errors
    ///
    /// [`Error::NotASchema`] for a plain document resource.
    pub fn to_schema(&self, registry: &Registry) -> Result<Schema> {
        match self.draft {
            Some(draft) => Ok(Schema::from_node(self.node.clone(), draft, registry.clone())),
            None => Err(Error::NotASchema {
                location: format!("{:?}", self.node),
                snippet: self
                    .node
                    .content()
                    .map(|c| c.snippet(SNIPPET_LEN))
                    .unwrap_or_default(),
            }),
        }
    }

    /// Same location, or equal content at the same pointer.
    fn same(&self, other: &Resource) -> bool {
        if self.node.ptr() != other.node.ptr() {
            return false;
        }
        if self.node.document().same(other.node.document()) {
            return true;
        }
        match (self.node.content(), other.node.content()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

fn collect_embedded(jsi: &Jsi, out: &mut Vec<Resource>) -> Result<()> {
    for (_, child) in jsi.children()? {
        let Child::Jsi(child) = child else { continue };
        match child.as_schema() {
            Some(schema) => out.push(Resource::schema(&schema)),
            None if child.shape() != Shape::Scalar => collect_embedded(&child, out)?,
            None => {}
        }
    }
    Ok(())
}

/// A named set of keywords.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    pub uri: Url,
    pub keywords: Vec<String>,
}

impl Vocabulary {
    pub fn new<I, S>(uri: Url, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uri: uri::normalize(&uri),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

/// The rules a metaschema imposes on the schemas it describes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialect {
    /// URI of the metaschema.
    pub uri: Url,
    pub draft: Draft,
    pub vocabularies: Vec<Url>,
}

impl Dialect {
    pub fn new(uri: Url, draft: Draft) -> Self {
        Self {
            uri: uri::normalize(&uri),
            draft,
            vocabularies: Vec::new(),
        }
    }

    pub fn with_vocabularies(mut self, vocabularies: impl IntoIterator<Item = Url>) -> Self {
        self.vocabularies = vocabularies.into_iter().map(|v| uri::normalize(&v)).collect();
        self
    }
}

// ── Tables ──────────────────────────────────────────────────────────────

struct Table<T> {
    kind: &'static str,
    entries: HashMap<Url, T>,
    autoloads: HashMap<Url, Autoload<T>>,
}

impl<T: Clone> Table<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            autoloads: HashMap::new(),
        }
    }

    fn contains(&self, uri: &Url) -> bool {
        self.entries.contains_key(uri) || self.autoloads.contains_key(uri)
    }

    /// Fails when `uri` holds an entry that is not `same` as `value`.
    fn check_store(&self, uri: &Url, value: &T, same: impl Fn(&T, &T) -> bool) -> Result<bool> {
        match self.entries.get(uri) {
            Some(existing) if same(existing, value) => Ok(false),
            Some(_) => {
                warn!(uri = %uri, kind = self.kind, "registry collision");
                Err(Error::Collision {
                    uri: uri.to_string(),
                    kind: self.kind,
                })
            }
            None => Ok(true),
        }
    }

    fn uris(&self) -> impl Iterator<Item = &Url> {
        self.entries.keys().chain(self.autoloads.keys())
    }
}

impl<T: Clone> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
            autoloads: self.autoloads.clone(),
        }
    }
}

#[derive(Clone)]
struct State {
    resources: Table<Resource>,
    vocabularies: Table<Vocabulary>,
    dialects: Table<Dialect>,
    frozen: bool,
}

impl State {
    fn new() -> Self {
        Self {
            resources: Table::new("resource"),
            vocabularies: Table::new("vocabulary"),
            dialects: Table::new("dialect"),
            frozen: false,
        }
    }

    fn check_mutable(&self, action: &'static str, uri: &Url) -> Result<()> {
        if self.frozen {
            return Err(Error::Frozen {
                action,
                uri: uri.to_string(),
            });
        }
        Ok(())
    }
}

fn key(uri: &str) -> Result<Url> {
    Ok(uri::normalize(&Url::parse(uri)?))
}

// ── Registry ────────────────────────────────────────────────────────────

/// Shared, lockable registry handle. Clones refer to the same registry; use
/// [`Registry::dup`] for an independent copy.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<ReentrantMutex<RefCell<State>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("uris", &self.known_uris())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(State::new()))),
        }
    }

    /// A registry that already knows the draft-04, draft-06 and draft-07
    /// metaschemas and their dialects.
    pub fn with_metaschemas() -> Result<Self> {
        let registry = Self::new();
        crate::metaschemas::register(&registry)?;
        Ok(registry)
    }

    pub fn same(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Resources ───────────────────────────────────────────────────────

    /// Registers `resource` under its own URIs and every embedded schema
    /// under its `$id`.
    ///
    /// Nothing is stored when any of those URIs already holds a different
    /// resource.
    pub fn register(&self, resource: &Resource) -> Result<()> {
        let guard = self.inner.lock();
        if guard.borrow().frozen {
            return Err(Error::Frozen {
                action: "register",
                uri: format!("{:?}", resource.node),
            });
        }
        let pending = self.registrable(resource)?;
        let mut state = guard.borrow_mut();
        let mut fresh: Vec<(Url, Resource)> = Vec::new();
        for (uri, entry) in pending {
            state.check_mutable("register", &uri)?;
            if !state.resources.check_store(&uri, &entry, Resource::same)? {
                continue;
            }
            match fresh.iter().find(|(u, _)| *u == uri) {
                Some((_, earlier)) if earlier.same(&entry) => {}
                Some(_) => {
                    warn!(uri = %uri, "registry collision within one resource");
                    return Err(Error::Collision {
                        uri: uri.to_string(),
                        kind: "resource",
                    });
                }
                None => fresh.push((uri, entry)),
            }
        }
        for (uri, entry) in fresh {
            debug!(uri = %uri, pointer = %entry.node.ptr(), "registered resource");
            state.resources.entries.insert(uri, entry);
        }
        Ok(())
    }

    /// Creates a schema from `value` and registers it.
    pub fn register_schema_document(
        &self,
        value: impl Into<jsi_ptr::Value>,
        options: crate::schema::SchemaOptions,
    ) -> Result<Schema> {
        let schema = Schema::new(crate::base::Instance::Value(value.into()), self, options)?;
        self.register(&Resource::schema(&schema))?;
        Ok(schema)
    }

    fn registrable(&self, resource: &Resource) -> Result<Vec<(Url, Resource)>> {
        let mut out = Vec::new();
        let node = &resource.node;
        if node.ptr().is_root() {
            if let Some(base) = node.document().base_uri() {
                out.push((base.clone(), resource.clone()));
            }
        }
        let roots: Vec<Schema> = match resource.draft {
            Some(draft) => vec![Schema::from_node(node.clone(), draft, self.clone())],
            None => resource
                .embedded
                .iter()
                .filter_map(|e| e.draft.map(|d| Schema::from_node(e.node.clone(), d, self.clone())))
                .collect(),
        };
        for root in roots {
            for schema in std::iter::once(root.clone()).chain(root.descendant_schemas()?) {
                if let Some(uri) = schema.absolute_uri()? {
                    out.push((uri, Resource::schema(&schema)));
                }
            }
        }
        Ok(out)
    }

    /// Registers a loader to be run the first time `uri` is looked up.
    ///
    /// # Errors
    ///
    /// [`Error::Collision`] if `uri` already has a loader or a resource.
    pub fn autoload_uri<F>(&self, uri: &str, loader: F) -> Result<()>
    where
        F: Fn(&AutoloadRequest<'_>) -> Result<Resource> + Send + Sync + 'static,
    {
        let uri = key(uri)?;
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        state.check_mutable("autoload", &uri)?;
        add_autoload(&mut state.resources, uri, Arc::new(loader))
    }

    /// The resource at `uri`, running its autoloader if needed.
    ///
    /// An autoloader runs at most once: it is removed before it is invoked
    /// and only restored if it fails.
    pub fn find(&self, uri: &str) -> Result<Resource> {
        let uri = key(uri)?;
        self.find_in(
            &uri,
            |state| &mut state.resources,
            |registry, resource| registry.register(&resource),
        )
    }

    pub fn is_registered(&self, uri: &str) -> bool {
        let Ok(uri) = key(uri) else { return false };
        self.inner.lock().borrow().resources.contains(&uri)
    }

    // ── Vocabularies ────────────────────────────────────────────────────

    pub fn register_vocabulary(&self, vocabulary: Vocabulary) -> Result<()> {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        store_simple(&mut state, |s| &mut s.vocabularies, vocabulary.uri.clone(), vocabulary)
    }

    pub fn autoload_vocabulary_uri<F>(&self, uri: &str, loader: F) -> Result<()>
    where
        F: Fn(&AutoloadRequest<'_>) -> Result<Vocabulary> + Send + Sync + 'static,
    {
        let uri = key(uri)?;
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        state.check_mutable("autoload", &uri)?;
        add_autoload(&mut state.vocabularies, uri, Arc::new(loader))
    }

    pub fn find_vocabulary(&self, uri: &str) -> Result<Vocabulary> {
        let uri = key(uri)?;
        self.find_in(
            &uri,
            |state| &mut state.vocabularies,
            |registry, vocabulary| registry.register_vocabulary(vocabulary),
        )
    }

    pub fn is_vocabulary_registered(&self, uri: &str) -> bool {
        let Ok(uri) = key(uri) else { return false };
        self.inner.lock().borrow().vocabularies.contains(&uri)
    }

    // ── Dialects ────────────────────────────────────────────────────────

    pub fn register_dialect(&self, dialect: Dialect) -> Result<()> {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        store_simple(&mut state, |s| &mut s.dialects, dialect.uri.clone(), dialect)
    }

    pub fn autoload_dialect_uri<F>(&self, uri: &str, loader: F) -> Result<()>
    where
        F: Fn(&AutoloadRequest<'_>) -> Result<Dialect> + Send + Sync + 'static,
    {
        let uri = key(uri)?;
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        state.check_mutable("autoload", &uri)?;
        add_autoload(&mut state.dialects, uri, Arc::new(loader))
    }

    pub fn find_dialect(&self, uri: &str) -> Result<Dialect> {
        let uri = key(uri)?;
        self.find_in(
            &uri,
            |state| &mut state.dialects,
            |registry, dialect| registry.register_dialect(dialect),
        )
    }

    pub fn is_dialect_registered(&self, uri: &str) -> bool {
        let Ok(uri) = key(uri) else { return false };
        self.inner.lock().borrow().dialects.contains(&uri)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Makes every later mutation fail with [`Error::Frozen`], including
    /// running autoloaders.
    pub fn freeze(&self) {
        self.inner.lock().borrow_mut().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().borrow().frozen
    }

    /// An independent, unfrozen copy. Autoloaders are shared with the copy.
    pub fn dup(&self) -> Registry {
        let mut state = self.inner.lock().borrow().clone();
        state.frozen = false;
        Registry {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(state))),
        }
    }

    /// Every resource URI, stored or autoloadable, sorted.
    pub fn known_uris(&self) -> Vec<String> {
        let guard = self.inner.lock();
        let state = guard.borrow();
        let mut uris: Vec<String> = state.resources.uris().map(Url::to_string).collect();
        uris.sort();
        uris.dedup();
        uris
    }

    fn find_in<T, S, R>(&self, uri: &Url, select: S, store: R) -> Result<T>
    where
        T: Clone,
        S: Fn(&mut State) -> &mut Table<T>,
        R: FnOnce(&Registry, T) -> Result<()>,
    {
        let guard = self.inner.lock();
        let loader = {
            let mut state = guard.borrow_mut();
            if let Some(found) = select(&mut *state).entries.get(uri) {
                trace!(uri = %uri, "registry hit");
                return Ok(found.clone());
            }
            let Some(loader) = select(&mut *state).autoloads.get(uri).cloned() else {
                let kind = select(&mut *state).kind;
                drop(state);
                return Err(self.not_found(uri, kind));
            };
            state.check_mutable("autoload", uri)?;
            select(&mut *state).autoloads.remove(uri);
            loader
        };

        debug!(uri = %uri, "running autoloader");
        let loaded = loader(&AutoloadRequest {
            registry: self,
            uri,
        })
        .and_then(|value| store(self, value));
        if let Err(err) = loaded {
            select(&mut *guard.borrow_mut())
                .autoloads
                .insert(uri.clone(), loader);
            return Err(err);
        }

        let mut state = guard.borrow_mut();
        let found = select(&mut *state).entries.get(uri).cloned();
        let kind = select(&mut *state).kind;
        drop(state);
        found.ok_or_else(|| self.not_found(uri, kind))
    }

    fn not_found(&self, uri: &Url, kind: &'static str) -> Error {
        let known_uris = match kind {
            "resource" => self.known_uris(),
            _ => {
                let guard = self.inner.lock();
                let state = guard.borrow();
                let table_uris: Vec<&Url> = match kind {
                    "vocabulary" => state.vocabularies.uris().collect(),
                    _ => state.dialects.uris().collect(),
                };
                let mut uris: Vec<String> = table_uris.into_iter().map(Url::to_string).collect();
                uris.sort();
                uris
            }
        };
        Error::ResourceNotFound {
            uri: uri.to_string(),
            referrer: None,
            known_uris,
        }
    }
}

fn add_autoload<T: Clone>(table: &mut Table<T>, uri: Url, loader: Autoload<T>) -> Result<()> {
    if table.contains(&uri) {
        warn!(uri = %uri, kind = table.kind, "autoload collision");
        return Err(Error::Collision {
            uri: uri.to_string(),
            kind: table.kind,
        });
    }
    debug!(uri = %uri, kind = table.kind, "registered autoloader");
    table.autoloads.insert(uri, loader);
    Ok(())
}

fn store_simple<T, S>(state: &mut State, select: S, uri: Url, value: T) -> Result<()>
where
    T: Clone + PartialEq,
    S: Fn(&mut State) -> &mut Table<T>,
{
    state.check_mutable("register", &uri)?;
    let table = select(state);
    if table.check_store(&uri, &value, |a, b| a == b)? {
        debug!(uri = %uri, kind = table.kind, "registered");
        table.entries.insert(uri, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(value: serde_json::Value, uri: &str) -> Resource {
        Resource::document(Node::root_of(value, Some(Url::parse(uri).unwrap())))
    }

    #[test]
    fn test_register_and_find() {
        let registry = Registry::new();
        registry.register(&doc(json!({"a": 1}), "http://example.com/a.json")).unwrap();
        assert!(registry.is_registered("http://example.com/a.json#/a"));
        let found = registry.find("http://example.com/a.json").unwrap();
        assert_eq!(found.node().content().unwrap().to_json(), json!({"a": 1}));
        assert!(!found.is_schema());
    }

    #[test]
    fn test_same_resource_twice_is_a_noop() {
        let registry = Registry::new();
        let resource = doc(json!({"a": 1}), "http://example.com/a.json");
        registry.register(&resource).unwrap();
        registry.register(&resource).unwrap();
        // equal content at the same pointer counts as the same resource
        registry.register(&doc(json!({"a": 1}), "http://example.com/a.json")).unwrap();
    }

    #[test]
    fn test_collision() {
        let registry = Registry::new();
        registry.register(&doc(json!({"a": 1}), "http://example.com/a.json")).unwrap();
        let err = registry
            .register(&doc(json!({"a": 2}), "http://example.com/a.json"))
            .unwrap_err();
        assert!(matches!(err, Error::Collision { kind: "resource", .. }));
    }

    #[test]
    fn test_relative_uri_is_rejected() {
        let registry = Registry::new();
        assert!(matches!(
            registry.find("a.json"),
            Err(Error::InvalidUri(url::ParseError::RelativeUrlWithoutBase))
        ));
    }

    #[test]
    fn test_not_found_lists_known_uris() {
        let registry = Registry::new();
        registry.register(&doc(json!({}), "http://example.com/b.json")).unwrap();
        registry
            .autoload_uri("http://example.com/a.json", |_| {
                Err(Error::Bug("unused".into()))
            })
            .unwrap();
        match registry.find("http://example.com/c.json").unwrap_err() {
            Error::ResourceNotFound { known_uris, .. } => assert_eq!(
                known_uris,
                vec!["http://example.com/a.json", "http://example.com/b.json"]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_autoload_runs_once() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry
            .autoload_uri("http://example.com/lazy.json", move |req| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Resource::document(Node::root_of(json!([1]), Some(req.uri.clone()))))
            })
            .unwrap();
        for _ in 0..3 {
            registry.find("http://example.com/lazy.json").unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_autoload_can_be_retried() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry
            .autoload_uri("http://example.com/flaky.json", move |req| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(Error::Bug("first attempt fails".into()));
                }
                Ok(Resource::document(Node::root_of(json!(null), Some(req.uri.clone()))))
            })
            .unwrap();
        assert!(registry.find("http://example.com/flaky.json").is_err());
        assert!(registry.find("http://example.com/flaky.json").is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_autoload_collision() {
        let registry = Registry::new();
        let loader = |req: &AutoloadRequest<'_>| -> Result<Resource> {
            Ok(Resource::document(Node::root_of(json!(1), Some(req.uri.clone()))))
        };
        registry.autoload_uri("http://example.com/x", loader).unwrap();
        assert!(matches!(
            registry.autoload_uri("http://example.com/x", loader),
            Err(Error::Collision { .. })
        ));
    }

    #[test]
    fn test_autoloader_that_registers_elsewhere() {
        let registry = Registry::new();
        registry
            .autoload_uri("http://example.com/wanted", |_| {
                let other = Url::parse("http://example.com/other").unwrap();
                Ok(Resource::document(Node::root_of(json!({}), Some(other))))
            })
            .unwrap();
        let err = registry.find("http://example.com/wanted").unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert!(registry.is_registered("http://example.com/other"));
    }

    #[test]
    fn test_freeze_and_dup() {
        let registry = Registry::new();
        registry.freeze();
        assert!(matches!(
            registry.register(&doc(json!({}), "http://example.com/a")),
            Err(Error::Frozen { .. })
        ));

        let copy = registry.dup();
        assert!(!copy.is_frozen());
        copy.register(&doc(json!({}), "http://example.com/a")).unwrap();
        assert!(copy.is_registered("http://example.com/a"));
        assert!(!registry.is_registered("http://example.com/a"));
    }

    #[test]
    fn test_frozen_rejects_resources_without_uris() {
        let registry = Registry::new();
        registry.freeze();
        let anonymous = Resource::document(Node::root_of(json!({}), None));
        assert!(matches!(registry.register(&anonymous), Err(Error::Frozen { .. })));
    }

    #[test]
    fn test_schemas_embedded_in_an_instance_are_registered() {
        let registry = Registry::with_metaschemas().unwrap();
        let document_schema = Schema::new(
            json!({
                "properties": {
                    "defs": {"additionalProperties": {"$ref": "http://json-schema.org/draft-07/schema#"}}
                }
            }),
            &registry,
            crate::schema::SchemaOptions::default(),
        )
        .unwrap();
        let instance = document_schema
            .new_jsi(
                json!({"defs": {"a": {"$id": "http://example.com/a.json", "items": {"$id": "b.json"}}}}),
                crate::base::JsiOptions::default(),
            )
            .unwrap();

        let resource = Resource::from_jsi(&instance).unwrap();
        assert!(!resource.is_schema());
        registry.register(&resource).unwrap();

        assert!(registry.is_registered("http://example.com/a.json"));
        assert!(registry.is_registered("http://example.com/b.json"));
        let a = registry.find("http://example.com/a.json").unwrap();
        assert!(a.is_schema());
        assert_eq!(a.node().ptr().pointer(), "/defs/a");
    }

    #[test]
    fn test_concurrent_finds_autoload_once() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry
            .autoload_uri("http://example.com/shared.json", move |req| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(10));
                Ok(Resource::document(Node::root_of(json!({"n": 1}), Some(req.uri.clone()))))
            })
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.find("http://example.com/shared.json").map(|r| r.node().clone()))
            })
            .collect();
        let nodes: Vec<Node> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(nodes.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_concurrent_conflicting_registrations_have_one_winner() {
        let registry = Registry::new();
        let handles: Vec<_> = (0..8i64)
            .map(|n| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register(&doc(json!({"n": n}), "http://example.com/contended.json")))
            })
            .collect();
        let results: Vec<Result<()>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, Error::Collision { kind: "resource", .. })));
        assert_eq!(registry.known_uris(), vec!["http://example.com/contended.json"]);
    }

    #[test]
    fn test_dialects_and_vocabularies_are_separate_namespaces() {
        let registry = Registry::new();
        let uri = Url::parse("http://example.com/meta").unwrap();
        registry
            .register_vocabulary(Vocabulary::new(uri.clone(), ["type", "enum"]))
            .unwrap();
        registry
            .register_dialect(Dialect::new(uri.clone(), Draft::Draft06))
            .unwrap();
        assert!(!registry.is_registered("http://example.com/meta"));
        assert_eq!(registry.find_dialect("http://example.com/meta#").unwrap().draft, Draft::Draft06);
        assert_eq!(
            registry.find_vocabulary("http://example.com/meta").unwrap().keywords,
            vec!["type", "enum"]
        );
        assert!(matches!(
            registry.register_dialect(Dialect::new(uri, Draft::Draft04)),
            Err(Error::Collision { kind: "dialect", .. })
        ));
    }

    #[test]
    fn test_dialect_autoload() {
        let registry = Registry::new();
        registry
            .autoload_dialect_uri("http://example.com/d", |req| {
                Ok(Dialect::new(req.uri.clone(), Draft::Draft04))
            })
            .unwrap();
        assert!(registry.is_dialect_registered("http://example.com/d"));
        assert_eq!(registry.find_dialect("http://example.com/d").unwrap().draft, Draft::Draft04);
    }
}
