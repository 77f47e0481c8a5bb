//! Compiled `pattern` and `patternProperties` regular expressions.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;

use crate::error::{Error, Result};

fn cache() -> &'static Mutex<HashMap<String, Regex>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Compiles `pattern`, reusing an earlier compilation of the same source.
/// `location` names where the pattern was found, for the error message.
pub(crate) fn compile(pattern: &str, location: impl FnOnce() -> String) -> Result<Regex> {
    if let Some(regex) = cache().lock().get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(pattern).map_err(|err| Error::InvalidPattern {
        pattern: pattern.to_string(),
        location: location(),
        message: err.to_string(),
    })?;
    cache().lock().insert(pattern.to_string(), regex.clone());
    Ok(regex)
}
