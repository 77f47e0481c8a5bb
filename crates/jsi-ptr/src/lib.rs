//! JSON Pointer (RFC 6901) over a structurally shared document tree.
//!
//! A [`Ptr`] is an immutable sequence of [`Token`]s. It parses from and
//! formats to both the plain pointer form (`/a/b`) and the URI fragment form
//! (`#/a/b`), evaluates against a [`Value`], and produces modified copies of
//! a document that only duplicate the path to the changed node.
//!
//! # Example
//!
//! ```
//! use jsi_ptr::{Ptr, Value};
//! use serde_json::json;
//!
//! let doc = Value::from(json!({"foo": {"bar": 42}, "other": [1, 2]}));
//! let ptr = Ptr::from_pointer("/foo/bar").unwrap();
//! assert_eq!(ptr.evaluate(&doc).unwrap(), &Value::from(42i64));
//!
//! let copy = ptr.modified_document_copy(&doc, |_| Value::from(43i64)).unwrap();
//! assert_eq!(copy.to_json(), json!({"foo": {"bar": 43}, "other": [1, 2]}));
//! assert!(copy.get("other").unwrap().ptr_eq(doc.get("other").unwrap()));
//! ```

use thiserror::Error;

pub mod ptr;
pub mod token;
pub mod value;

pub use ptr::Ptr;
pub use token::Token;
pub use value::{Map, Value};

/// Unescapes a JSON Pointer path component.
///
/// Per RFC 6901, `~1` is replaced with `/` and `~0` is replaced with `~`.
///
/// ```
/// use jsi_ptr::unescape_component;
///
/// assert_eq!(unescape_component("a~0b"), "a~b");
/// assert_eq!(unescape_component("c~1d"), "c/d");
/// ```
pub fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    // Order matters: ~1 must be replaced before ~0
    component.replace("~1", "/").replace("~0", "~")
}

/// Escapes a JSON Pointer path component.
///
/// Per RFC 6901, `~` is replaced with `~0` and `/` is replaced with `~1`.
///
/// ```
/// use jsi_ptr::escape_component;
///
/// assert_eq!(escape_component("a~b"), "a~0b");
/// assert_eq!(escape_component("c/d"), "c~1d");
/// ```
pub fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    // Order matters: ~ must be escaped before /
    component.replace('~', "~0").replace('/', "~1")
}

/// Check if a string represents a valid non-negative integer array index.
///
/// ```
/// use jsi_ptr::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("123"));
/// assert!(!is_valid_index("-1"));
/// assert!(!is_valid_index("01"));
/// ```
pub fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    // First char can't be leading zero unless it's just "0"
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(u8::is_ascii_digit)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointerError {
    /// Malformed pointer or fragment string.
    #[error("invalid pointer syntax ({reason}): {input:?}")]
    Syntax { input: String, reason: &'static str },
    /// A well-formed pointer that does not evaluate against the document.
    #[error("could not resolve {pointer:?} at token {token:?}: {reason}")]
    Resolution {
        pointer: String,
        token: String,
        reason: String,
    },
    #[error("the root pointer has no parent")]
    NoParent,
    #[error("{ancestor:?} is not an ancestor of {pointer:?}")]
    NotAncestor { ancestor: String, pointer: String },
    #[error("cannot assign below {pointer:?}: a {kind} is not an object or array")]
    NotContainer { pointer: String, kind: &'static str },
}
