//! Reference tokens.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One step of a [`Ptr`](crate::Ptr): an object key or an array index.
///
/// Parsing a pointer string always yields [`Token::Key`]; array positions
/// become [`Token::Index`] once a pointer is resolved against a document
/// (see [`Ptr::resolve_against`](crate::Ptr::resolve_against)).
///
/// Equality, ordering and hashing go by the pointer text, so `Index(0)`
/// equals `Key("0")` and a pointer equals its own parse.
#[derive(Clone, Debug)]
pub enum Token {
    Index(usize),
    Key(String),
}

impl Token {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Token::Key(k) => Some(k.as_str()),
            Token::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Token::Index(i) => Some(*i),
            Token::Key(_) => None,
        }
    }

    /// Array index this token denotes, accepting RFC 6901 index strings.
    pub fn to_index(&self) -> Option<usize> {
        match self {
            Token::Index(i) => Some(*i),
            Token::Key(k) if crate::is_valid_index(k) => k.parse().ok(),
            Token::Key(_) => None,
        }
    }
}

impl Token {
    fn text(&self) -> Cow<'_, str> {
        match self {
            Token::Index(i) => Cow::Owned(i.to_string()),
            Token::Key(k) => Cow::Borrowed(k),
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Token) -> bool {
        match (self, other) {
            (Token::Index(a), Token::Index(b)) => a == b,
            (Token::Key(a), Token::Key(b)) => a == b,
            _ => self.text() == other.text(),
        }
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text().hash(state);
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Token) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Token) -> Ordering {
        self.text().cmp(&other.text())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Index(i) => write!(f, "{i}"),
            Token::Key(k) => f.write_str(k),
        }
    }
}

impl From<usize> for Token {
    fn from(i: usize) -> Self {
        Token::Index(i)
    }
}

impl From<&str> for Token {
    fn from(k: &str) -> Self {
        Token::Key(k.to_string())
    }
}

impl From<String> for Token {
    fn from(k: String) -> Self {
        Token::Key(k)
    }
}

impl From<&String> for Token {
    fn from(k: &String) -> Self {
        Token::Key(k.clone())
    }
}

impl From<&Token> for Token {
    fn from(t: &Token) -> Self {
        t.clone()
    }
}
