//! JSON Schema application and reference resolution.
//!
//! Given a [`Schema`] and an instance, [`Schema::new_jsi`] produces a
//! [`Jsi`]: a wrapper around the instance that knows which subschemas
//! describe it. Subscripting a `Jsi` works out which subschemas describe
//! the child (per draft-04, draft-06 or draft-07 rules), following `$ref`
//! through a [`Registry`] of documents, and wraps the child in turn.
//!
//! Documents are persistent trees ([`jsi_ptr::Value`]). [`Jsi::set`] writes
//! into the shared document in place; [`Jsi::modified_copy`] produces a new
//! document that shares every subtree off the modified path with the old
//! one.
//!
//! # Example
//!
//! ```
//! use jsi::{Child, JsiOptions, Registry, Schema, SchemaOptions};
//! use serde_json::json;
//!
//! let registry = Registry::with_metaschemas().unwrap();
//! let schema = Schema::new(
//!     json!({
//!         "properties": {"address": {"$ref": "#/definitions/address"}},
//!         "definitions": {"address": {"properties": {"city": {"default": "Utrecht"}}}}
//!     }),
//!     &registry,
//!     SchemaOptions::default(),
//! )
//! .unwrap();
//!
//! let person = schema.new_jsi(json!({"address": {}}), JsiOptions::default()).unwrap();
//! let address = person.get("address").unwrap().and_then(Child::into_jsi).unwrap();
//! let described_by: Vec<String> = address.schemas().iter().map(|s| s.ptr().pointer()).collect();
//! // `$ref` stands in for the schema holding it
//! assert_eq!(described_by, ["/definitions/address"]);
//!
//! // absent, so filled in from `default` on a copy
//! let city = address.get("city").unwrap().unwrap();
//! assert_eq!(city.to_json().unwrap(), json!("Utrecht"));
//! assert_eq!(person.to_json().unwrap(), json!({"address": {}}));
//! ```

pub mod base;
pub mod error;
pub mod metaschema_node;
pub mod metaschemas;
pub mod node;
pub mod reference;
pub mod registry;
pub mod schema;
pub mod schema_set;
pub mod uri;

pub use base::{Child, Instance, Jsi, JsiOptions, Shape};
pub use error::{Error, Result};
pub use metaschema_node::MetaschemaNode;
pub use node::{Document, Node};
pub use reference::{Ref, Referrer, Resolved};
pub use registry::{Autoload, AutoloadRequest, Dialect, Registry, Resource, Vocabulary};
pub use schema::{Draft, Schema, SchemaOptions, ValidationError, ValidationResult};
pub use schema_set::SchemaSet;

pub use jsi_ptr::{Map, PointerError, Ptr, Token, Value};
