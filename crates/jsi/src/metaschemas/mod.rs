//! The draft-04, draft-06 and draft-07 metaschemas, bundled.

use jsi_ptr::Ptr;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::metaschema_node::MetaschemaNode;
use crate::node::Document;
use crate::registry::{Dialect, Registry, Resource};
use crate::schema::{Draft, Schema};

const DRAFT04: &str = include_str!("draft-04.json");
const DRAFT06: &str = include_str!("draft-06.json");
const DRAFT07: &str = include_str!("draft-07.json");

fn source(draft: Draft) -> &'static str {
    match draft {
        Draft::Draft04 => DRAFT04,
        Draft::Draft06 => DRAFT06,
        Draft::Draft07 => DRAFT07,
    }
}

/// Adds an autoloader and a dialect for each bundled metaschema. The
/// documents are parsed on first use.
pub(crate) fn register(registry: &Registry) -> Result<()> {
    for draft in Draft::ALL {
        registry.autoload_uri(draft.metaschema_uri(), move |request| {
            Ok(Resource::schema(&load(draft, request.registry)?))
        })?;
        registry.register_dialect(Dialect::new(Url::parse(draft.metaschema_uri())?, draft))?;
    }
    Ok(())
}

/// The metaschema of `draft` as a schema in `registry`, read as an instance
/// of itself.
pub fn load(draft: Draft, registry: &Registry) -> Result<Schema> {
    debug!(%draft, "loading bundled metaschema");
    let value: serde_json::Value = serde_json::from_str(source(draft))
        .map_err(|err| Error::Bug(format!("bundled {draft} metaschema does not parse: {err}")))?;
    let document = Document::new(value, None);
    let root = MetaschemaNode::new(document, draft, registry.clone(), Ptr::root(), Ptr::root())?;
    root.as_schema()?
        .ok_or_else(|| Error::Bug(format!("bundled {draft} metaschema does not describe itself")))
}
