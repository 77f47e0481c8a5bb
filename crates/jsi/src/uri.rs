//! URI helpers for registry keys and reference joining.

use url::Url;

/// Registry key form: absolute with the fragment removed. Scheme and host
/// case and dot segments are already normalized by parsing.
pub fn normalize(uri: &Url) -> Url {
    let mut uri = uri.clone();
    uri.set_fragment(None);
    uri
}

/// Splits a URI reference at its first `#`.
pub(crate) fn split_fragment(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('#') {
        Some((resource, fragment)) => (resource, Some(fragment)),
        None => (reference, None),
    }
}

/// Resolves `reference` to an absolute URI: as-is when it parses on its own,
/// otherwise against `base`. `None` when it is relative and there is no base.
pub(crate) fn join(base: Option<&Url>, reference: &str) -> Result<Option<Url>, url::ParseError> {
    match Url::parse(reference) {
        Ok(absolute) => Ok(Some(absolute)),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(reference).map(Some),
            None => Ok(None),
        },
        Err(err) => Err(err),
    }
}

/// The non-empty fragment of `uri`, if any.
pub(crate) fn fragment(uri: &Url) -> Option<&str> {
    uri.fragment().filter(|f| !f.is_empty())
}
