//! `$ref` resolution.
//!
//! A [`Ref`] pairs a URI reference with the location it was found at and the
//! registry to look other documents up in. A reference made from a schema is
//! resolved in schema mode: same-document references start at the nearest
//! enclosing resource root, pointer fragments must land on a schema, and
//! plain-name fragments are looked up as anchors. A reference made from a
//! plain document node only follows URIs and pointers.

use std::fmt;
use std::sync::OnceLock;

use jsi_ptr::Ptr;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result, SNIPPET_LEN};
use crate::node::Node;
use crate::registry::Registry;
use crate::schema::Schema;
use crate::uri;

/// Where a reference was found.
#[derive(Clone, Debug)]
pub enum Referrer {
    Schema(Schema),
    Node(Node),
}

impl Referrer {
    fn describe(&self) -> String {
        match self {
            Referrer::Schema(schema) => format!("{schema:?}"),
            Referrer::Node(node) => format!("{node:?}"),
        }
    }
}

/// What a reference resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    Schema(Schema),
    Node(Node),
}

impl Resolved {
    pub fn node(&self) -> &Node {
        match self {
            Resolved::Schema(schema) => schema.node(),
            Resolved::Node(node) => node,
        }
    }

    pub fn as_schema(&self) -> Option<&Schema> {
        match self {
            Resolved::Schema(schema) => Some(schema),
            Resolved::Node(_) => None,
        }
    }
}

pub struct Ref {
    uri: String,
    referrer: Option<Referrer>,
    registry: Registry,
    resolved: OnceLock<Resolved>,
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("uri", &self.uri)
            .field("referrer", &self.referrer)
            .field("resolved", &self.resolved.get().is_some())
            .finish()
    }
}

impl Ref {
    /// # Errors
    ///
    /// [`Error::InvalidUri`] if the part before the fragment is not a URI
    /// reference.
    pub fn new(uri: impl Into<String>, referrer: Option<Referrer>, registry: Registry) -> Result<Self> {
        let uri = uri.into();
        let (resource, _) = uri::split_fragment(&uri);
        if !resource.is_empty() {
            match Url::parse(resource) {
                Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Self {
            uri,
            referrer,
            registry,
            resolved: OnceLock::new(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn referrer(&self) -> Option<&Referrer> {
        self.referrer.as_ref()
    }

    fn schema_mode(&self) -> bool {
        !matches!(self.referrer, Some(Referrer::Node(_)))
    }

    /// Resolves once; later calls return the same target. Failures are not
    /// remembered, so a reference can succeed after the registry learns
    /// the missing resource.
    pub fn resolve(&self) -> Result<&Resolved> {
        if let Some(done) = self.resolved.get() {
            return Ok(done);
        }
        let resolved = self.resolve_uncached()?;
        trace!(uri = %self.uri, target = ?resolved.node(), "resolved reference");
        Ok(self.resolved.get_or_init(|| resolved))
    }

    /// The target, which must be a schema.
    pub fn deref_schema(&self) -> Result<Schema> {
        match self.resolve()? {
            Resolved::Schema(schema) => Ok(schema.clone()),
            Resolved::Node(node) => Err(not_a_schema(node)),
        }
    }

    /// The target location, schema or not.
    pub fn deref_node(&self) -> Result<Node> {
        Ok(self.resolve()?.node().clone())
    }

    fn resolve_uncached(&self) -> Result<Resolved> {
        let (resource, fragment) = uri::split_fragment(&self.uri);

        let root = if resource.is_empty() {
            match &self.referrer {
                Some(Referrer::Schema(schema)) => Resolved::Schema(schema.resource_root()?),
                Some(Referrer::Node(node)) => Resolved::Node(node.document_root_node()),
                None => return Err(self.resource_not_found()),
            }
        } else {
            match self.find_resource_root(resource)? {
                Some(root) => root,
                None => match self.schemas_map_fallback()? {
                    Some(found) => return Ok(found),
                    None => return Err(self.resource_not_found()),
                },
            }
        };

        let resolved = match fragment {
            None | Some("") => root,
            Some(fragment) if fragment.starts_with('/') => self.resolve_pointer(root, fragment)?,
            Some(anchor) => self.resolve_anchor(root, anchor)?,
        };

        if self.schema_mode() {
            if let Resolved::Node(node) = &resolved {
                return Err(not_a_schema(node));
            }
        }
        Ok(resolved)
    }

    /// Looks the non-fragment part up in the registry. `None` when it is
    /// relative with no base, or not registered.
    fn find_resource_root(&self, resource: &str) -> Result<Option<Resolved>> {
        let base = match &self.referrer {
            Some(Referrer::Schema(schema)) => schema.resource_base_uri()?,
            Some(Referrer::Node(node)) => node.document().base_uri().cloned(),
            None => None,
        };
        let Some(absolute) = uri::join(base.as_ref(), resource)? else {
            return Ok(None);
        };
        let found = match self.registry.find(absolute.as_str()) {
            Ok(found) => found,
            Err(Error::ResourceNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        match found.draft() {
            Some(_) => Ok(Some(Resolved::Schema(found.to_schema(&self.registry)?))),
            None => Ok(Some(Resolved::Node(found.node().clone()))),
        }
    }

    /// References by bare name into a top-level `schemas` object, as in
    /// Google discovery documents.
    fn schemas_map_fallback(&self) -> Result<Option<Resolved>> {
        let Some(Referrer::Schema(referrer)) = &self.referrer else {
            return Ok(None);
        };
        let root = referrer.node().document_root_node();
        let content = root.content()?;
        if content.get("schemas").and_then(|s| s.get(&self.uri)).is_none() {
            return Ok(None);
        }
        let document_root = Schema::from_node(root, referrer.draft(), self.registry.clone());
        let ptr = Ptr::new(["schemas", self.uri.as_str()]);
        Ok(Some(Resolved::Schema(document_root.subschema(&ptr)?)))
    }

    fn resolve_pointer(&self, root: Resolved, fragment: &str) -> Result<Resolved> {
        let not_found = |message: String| Error::FragmentNotFound {
            uri: self.uri.clone(),
            fragment: fragment.to_string(),
            message,
        };
        let ptr = Ptr::from_fragment(&format!("#{fragment}"))?;
        match root {
            Resolved::Schema(schema) => match schema.subschema(&ptr) {
                Ok(found) => Ok(Resolved::Schema(found)),
                Err(Error::Pointer(err)) => Err(not_found(err.to_string())),
                Err(err) => Err(err),
            },
            Resolved::Node(node) => {
                let content = node.content()?;
                let resolved = ptr
                    .resolve_against(&content)
                    .map_err(|err| not_found(err.to_string()))?;
                Ok(Resolved::Node(node.descendant(&resolved)))
            }
        }
    }

    fn resolve_anchor(&self, root: Resolved, anchor: &str) -> Result<Resolved> {
        let not_found = |message: String| Error::FragmentNotFound {
            uri: self.uri.clone(),
            fragment: anchor.to_string(),
            message,
        };
        let Resolved::Schema(root) = root else {
            return Err(not_found(
                "plain-name fragments only identify schemas".to_string(),
            ));
        };
        let mut found = root.find_anchor(anchor)?;
        match found.len() {
            0 => Err(not_found(format!("no schema under {root:?} has this anchor"))),
            1 => Ok(Resolved::Schema(found.remove(0))),
            _ => {
                let candidates: Vec<String> = found.iter().map(|s| format!("{s:?}")).collect();
                Err(not_found(format!(
                    "anchor is ambiguous between {}",
                    candidates.join(", ")
                )))
            }
        }
    }

    fn resource_not_found(&self) -> Error {
        Error::ResourceNotFound {
            uri: self.uri.clone(),
            referrer: self.referrer.as_ref().map(Referrer::describe),
            known_uris: self.registry.known_uris(),
        }
    }
}

fn not_a_schema(node: &Node) -> Error {
    Error::NotASchema {
        location: format!("{node:?}"),
        snippet: node
            .content()
            .map(|c| c.snippet(SNIPPET_LEN))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Resource;
    use serde_json::json;

    fn node(value: serde_json::Value, base: Option<&str>) -> Node {
        Node::root_of(value, base.map(|b| Url::parse(b).unwrap()))
    }

    #[test]
    fn test_same_document_pointer() {
        let root = node(json!({"a": {"$ref": "#/b"}, "b": [1, 2]}), None);
        let reference = Ref::new(
            "#/b/1",
            Some(Referrer::Node(root.child("a"))),
            Registry::new(),
        )
        .unwrap();
        let target = reference.deref_node().unwrap();
        assert_eq!(target.ptr().pointer(), "/b/1");
        assert_eq!(target.content().unwrap().to_json(), json!(2));
    }

    #[test]
    fn test_resolution_is_memoized() {
        let root = node(json!({"b": {}}), None);
        let reference = Ref::new("#/b", Some(Referrer::Node(root)), Registry::new()).unwrap();
        let first = reference.resolve().unwrap() as *const Resolved;
        let second = reference.resolve().unwrap() as *const Resolved;
        assert_eq!(first, second);
    }

    #[test]
    fn test_cross_document_via_registry() {
        let registry = Registry::new();
        registry
            .register(&Resource::document(node(
                json!({"defs": {"x": true}}),
                Some("http://example.com/other.json"),
            )))
            .unwrap();
        let referrer = node(json!({}), Some("http://example.com/dir/../here.json"));
        let reference = Ref::new(
            "other.json#/defs/x",
            Some(Referrer::Node(referrer)),
            registry,
        )
        .unwrap();
        let target = reference.deref_node().unwrap();
        assert_eq!(
            target.document().base_uri().map(Url::as_str),
            Some("http://example.com/other.json")
        );
        assert_eq!(target.ptr().pointer(), "/defs/x");
    }

    #[test]
    fn test_error_kinds() {
        let registry = Registry::new();
        let root = node(json!({"a": 1}), None);

        let missing_fragment =
            Ref::new("#/zzz", Some(Referrer::Node(root.clone())), registry.clone()).unwrap();
        assert!(matches!(
            missing_fragment.resolve(),
            Err(Error::FragmentNotFound { .. })
        ));

        let relative_without_base =
            Ref::new("other.json", Some(Referrer::Node(root)), registry.clone()).unwrap();
        assert!(matches!(
            relative_without_base.resolve(),
            Err(Error::ResourceNotFound { referrer: Some(_), .. })
        ));

        let no_referrer = Ref::new("#/a", None, registry).unwrap();
        assert!(matches!(
            no_referrer.resolve(),
            Err(Error::ResourceNotFound { referrer: None, .. })
        ));
    }

    #[test]
    fn test_invalid_uri_is_rejected_eagerly() {
        assert!(matches!(
            Ref::new("http://[::1", None, Registry::new()),
            Err(Error::InvalidUri(_))
        ));
    }
}
