//! Error types for schema application and reference resolution.

use jsi_ptr::PointerError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Longest snippet of schema or instance content quoted in a message.
pub(crate) const SNIPPET_LEN: usize = 400;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Malformed pointer input, or a pointer that does not evaluate.
    #[error(transparent)]
    Pointer(#[from] PointerError),

    /// No resource root could be established for a reference.
    #[error(
        "could not find a resource for {uri:?}{}{}",
        referrer.as_ref().map(|r| format!(" (referenced from {r})")).unwrap_or_default(),
        known_uris_suffix(known_uris)
    )]
    ResourceNotFound {
        uri: String,
        referrer: Option<String>,
        known_uris: Vec<String>,
    },

    /// A resource root was found but the fragment does not identify
    /// anything in it (missing pointer target, unknown or ambiguous anchor).
    #[error("could not resolve fragment {fragment:?} of {uri:?}: {message}")]
    FragmentNotFound {
        uri: String,
        fragment: String,
        message: String,
    },

    /// A reference target had to be a schema and is not one.
    #[error("not a schema: {location}\n{snippet}")]
    NotASchema { location: String, snippet: String },

    /// Two distinct resources claimed the same URI.
    #[error("{kind} collision: a different {kind} is already registered at {uri}")]
    Collision { uri: String, kind: &'static str },

    #[error("the registry is frozen; cannot {action} {uri}")]
    Frozen { action: &'static str, uri: String },

    /// A wrapper was passed where a raw instance was required.
    #[error("expected a raw instance, got a {wrapper}; use its content instead")]
    InstanceIsWrapper { wrapper: &'static str },

    /// Subscripting or assigning into a value that is neither an object nor
    /// an array.
    #[error("cannot subscript the {kind} at {pointer}\n{snippet}")]
    NotSubscriptable {
        pointer: String,
        kind: &'static str,
        snippet: String,
    },

    /// A key token used on an array, or an index token used on an object.
    #[error("token {token:?} cannot subscript the {kind} at {pointer}")]
    InvalidToken {
        pointer: String,
        token: String,
        kind: &'static str,
    },

    #[error("invalid URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("invalid regular expression {pattern:?} at {location}: {message}")]
    InvalidPattern {
        pattern: String,
        location: String,
        message: String,
    },

    /// An internal invariant did not hold.
    #[error("internal error (this is a bug): {0}")]
    Bug(String),
}

impl Error {
    /// Whether this is a resolution failure of any level: pointer
    /// evaluation, a missing resource, or an unresolvable fragment.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::Pointer(PointerError::Resolution { .. })
                | Error::ResourceNotFound { .. }
                | Error::FragmentNotFound { .. }
        )
    }
}

fn known_uris_suffix(known: &[String]) -> String {
    if known.is_empty() {
        return "; no URIs are registered".to_string();
    }
    format!("; known URIs:\n  {}", known.join("\n  "))
}
