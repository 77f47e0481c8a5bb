//! Immutable JSON pointers over [`Value`] documents.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::token::Token;
use crate::value::Value;
use crate::{escape_component, unescape_component, PointerError};

/// Characters escaped when a pointer is written as a URI fragment.
const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A location in a document, as a sequence of reference tokens.
///
/// Pointers are values: equality and hashing go by token content, and every
/// derived pointer is a new value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptr {
    tokens: Vec<Token>,
}

impl Ptr {
    /// The empty pointer, referring to the whole document.
    pub fn root() -> Self {
        Ptr { tokens: Vec::new() }
    }

    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        Ptr {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse an RFC 6901 pointer such as `/a/b~1c`.
    ///
    /// # Errors
    ///
    /// [`PointerError::Syntax`] if the string is non-empty and does not start
    /// with `/`.
    pub fn from_pointer(pointer: &str) -> Result<Self, PointerError> {
        if pointer.is_empty() {
            return Ok(Ptr::root());
        }
        if !pointer.starts_with('/') {
            return Err(PointerError::Syntax {
                input: pointer.to_string(),
                reason: "a pointer must be empty or start with `/`",
            });
        }
        Ok(Ptr {
            tokens: pointer
                .split('/')
                .skip(1)
                .map(|component| Token::Key(unescape_component(component)))
                .collect(),
        })
    }

    /// Parse a URI fragment such as `#/a/b%20c`.
    ///
    /// # Errors
    ///
    /// [`PointerError::Syntax`] if the fragment has no leading `#`, does not
    /// percent-decode to UTF-8, or the remainder is not a valid pointer.
    pub fn from_fragment(fragment: &str) -> Result<Self, PointerError> {
        let decoded = percent_decode_str(fragment)
            .decode_utf8()
            .map_err(|_| PointerError::Syntax {
                input: fragment.to_string(),
                reason: "fragment does not decode to UTF-8",
            })?;
        let pointer = decoded.strip_prefix('#').ok_or_else(|| PointerError::Syntax {
            input: fragment.to_string(),
            reason: "a fragment must start with `#`",
        })?;
        Self::from_pointer(pointer)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn last(&self) -> Option<&Token> {
        self.tokens.last()
    }

    /// RFC 6901 string form.
    pub fn pointer(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            out.push('/');
            out.push_str(&escape_component(&token.to_string()));
        }
        out
    }

    /// URI fragment form: `#` followed by the percent-escaped pointer.
    pub fn fragment(&self) -> String {
        format!("#{}", utf8_percent_encode(&self.pointer(), FRAGMENT))
    }

    // ── Arithmetic ────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// [`PointerError::NoParent`] for the root pointer.
    pub fn parent(&self) -> Result<Ptr, PointerError> {
        match self.tokens.split_last() {
            Some((_, init)) => Ok(Ptr {
                tokens: init.to_vec(),
            }),
            None => Err(PointerError::NoParent),
        }
    }

    /// The first `n` tokens (all of them if `n` exceeds the length).
    pub fn take(&self, n: usize) -> Ptr {
        Ptr {
            tokens: self.tokens.iter().take(n).cloned().collect(),
        }
    }

    pub fn child(&self, token: impl Into<Token>) -> Ptr {
        let mut tokens = self.tokens.clone();
        tokens.push(token.into());
        Ptr { tokens }
    }

    /// Whether `other` lies at or below this pointer.
    pub fn is_ancestor_of(&self, other: &Ptr) -> bool {
        other.tokens.len() >= self.tokens.len()
            && other.tokens[..self.tokens.len()] == self.tokens[..]
    }

    /// The pointer from `ancestor` down to this one.
    ///
    /// # Errors
    ///
    /// [`PointerError::NotAncestor`] if `ancestor` is not an ancestor of (or
    /// equal to) this pointer.
    pub fn relative_to(&self, ancestor: &Ptr) -> Result<Ptr, PointerError> {
        if !ancestor.is_ancestor_of(self) {
            return Err(PointerError::NotAncestor {
                ancestor: ancestor.pointer(),
                pointer: self.pointer(),
            });
        }
        Ok(Ptr {
            tokens: self.tokens[ancestor.tokens.len()..].to_vec(),
        })
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    /// The value this pointer refers to within `document`.
    ///
    /// # Errors
    ///
    /// [`PointerError::Resolution`] for a missing key, an index that is out of
    /// range or malformed, the `-` token, or a step into a scalar.
    pub fn evaluate<'a>(&self, document: &'a Value) -> Result<&'a Value, PointerError> {
        let mut current = document;
        for depth in 0..self.tokens.len() {
            current = self.step(current, depth)?.1;
        }
        Ok(current)
    }

    /// Like [`evaluate`](Self::evaluate), but returns this pointer with array
    /// positions normalized to [`Token::Index`].
    ///
    /// # Errors
    ///
    /// Same as [`evaluate`](Self::evaluate).
    pub fn resolve_against(&self, document: &Value) -> Result<Ptr, PointerError> {
        let mut current = document;
        let mut tokens = Vec::with_capacity(self.tokens.len());
        for depth in 0..self.tokens.len() {
            let (token, child) = self.step(current, depth)?;
            tokens.push(token);
            current = child;
        }
        Ok(Ptr { tokens })
    }

    fn step<'a>(&self, value: &'a Value, depth: usize) -> Result<(Token, &'a Value), PointerError> {
        let token = &self.tokens[depth];
        match value {
            Value::Array(items) => {
                if token.as_key() == Some("-") {
                    return Err(self.resolution_error(
                        depth,
                        "`-` refers to the nonexistent element after the end of an array".to_string(),
                    ));
                }
                let index = token.to_index().ok_or_else(|| {
                    self.resolution_error(depth, "token is not an array index".to_string())
                })?;
                let child = items.get(index).ok_or_else(|| {
                    self.resolution_error(
                        depth,
                        format!("index out of range for an array of length {}", items.len()),
                    )
                })?;
                Ok((Token::Index(index), child))
            }
            Value::Object(members) => {
                let key = token.as_key().ok_or_else(|| {
                    self.resolution_error(depth, "an index cannot subscript an object".to_string())
                })?;
                let child = members.get(key).ok_or_else(|| {
                    self.resolution_error(depth, format!("key not found in {}", value.snippet(200)))
                })?;
                Ok((token.clone(), child))
            }
            other => Err(self.resolution_error(
                depth,
                format!("cannot subscript a {} value", other.kind()),
            )),
        }
    }

    fn resolution_error(&self, depth: usize, reason: String) -> PointerError {
        PointerError::Resolution {
            pointer: self.pointer(),
            token: self.tokens[depth].to_string(),
            reason,
        }
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// A copy of `document` in which the value at this pointer is replaced by
    /// `f(value)`.
    ///
    /// Only the containers on the path from the root to the target are
    /// copied, and only shallowly; every subtree off that path keeps its
    /// identity. If `f` hands back its argument unchanged, the result is
    /// `document` itself.
    ///
    /// # Errors
    ///
    /// [`PointerError::Resolution`] if this pointer does not evaluate
    /// against `document`.
    pub fn modified_document_copy<F>(&self, document: &Value, f: F) -> Result<Value, PointerError>
    where
        F: FnOnce(Value) -> Value,
    {
        self.try_modified_document_copy(document, |value| Ok(f(value)))
    }

    /// Fallible form of [`modified_document_copy`](Self::modified_document_copy).
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or a resolution failure converted into `E`.
    pub fn try_modified_document_copy<F, E>(&self, document: &Value, f: F) -> Result<Value, E>
    where
        F: FnOnce(Value) -> Result<Value, E>,
        E: From<PointerError>,
    {
        self.copy_from(0, document, f)
    }

    fn copy_from<F, E>(&self, depth: usize, node: &Value, f: F) -> Result<Value, E>
    where
        F: FnOnce(Value) -> Result<Value, E>,
        E: From<PointerError>,
    {
        if depth == self.tokens.len() {
            return f(node.clone());
        }
        let (token, child) = self.step(node, depth)?;
        let new_child = self.copy_from(depth + 1, child, f)?;
        if new_child.ptr_eq(child) {
            return Ok(node.clone());
        }
        // `node` is still referenced by the caller, so make_mut detaches a
        // shallow copy of this level.
        let mut copy = node.clone();
        match token {
            Token::Index(index) => {
                if let Some(items) = copy.make_array_mut() {
                    items[index] = new_child;
                }
            }
            Token::Key(key) => {
                if let Some(members) = copy.make_object_mut() {
                    members.insert(key, new_child);
                }
            }
        }
        Ok(copy)
    }

    /// Store `value` at this pointer, in place.
    ///
    /// Every container on the path must exist. The final token may name a
    /// new object member, or the array position just past the end. Storage
    /// shared with other documents is detached before it is written, so
    /// they are never affected.
    ///
    /// # Errors
    ///
    /// [`PointerError::Resolution`] if the path to the parent does not
    /// evaluate, or the last token does not fit the parent (including an
    /// array position beyond the end);
    /// [`PointerError::NotContainer`] if the parent is a scalar.
    pub fn assign(&self, document: &mut Value, value: Value) -> Result<(), PointerError> {
        let Some(last) = self.tokens.len().checked_sub(1) else {
            *document = value;
            return Ok(());
        };
        let mut current = document;
        for depth in 0..last {
            current = self.step_mut(current, depth)?;
        }
        match current {
            Value::Array(items) => {
                let index = self.tokens[last].to_index().ok_or_else(|| {
                    self.resolution_error(last, "token is not an array index".to_string())
                })?;
                if index > items.len() {
                    return Err(self.resolution_error(
                        last,
                        format!("index beyond the end of an array of length {}", items.len()),
                    ));
                }
                let items = std::sync::Arc::make_mut(items);
                if index < items.len() {
                    items[index] = value;
                } else {
                    items.push(value);
                }
                Ok(())
            }
            Value::Object(members) => {
                let key = self.tokens[last].as_key().ok_or_else(|| {
                    self.resolution_error(last, "an index cannot subscript an object".to_string())
                })?;
                std::sync::Arc::make_mut(members).insert(key.to_string(), value);
                Ok(())
            }
            other => Err(PointerError::NotContainer {
                pointer: self.take(last).pointer(),
                kind: other.kind(),
            }),
        }
    }

    fn step_mut<'a>(&self, value: &'a mut Value, depth: usize) -> Result<&'a mut Value, PointerError> {
        // Check on the shared view first so a failed lookup never detaches storage.
        self.step(value, depth)?;
        let token = &self.tokens[depth];
        let child = match value {
            Value::Array(items) => match token.to_index() {
                Some(index) => std::sync::Arc::make_mut(items).get_mut(index),
                None => None,
            },
            Value::Object(members) => match token.as_key() {
                Some(key) => std::sync::Arc::make_mut(members).get_mut(key),
                None => None,
            },
            _ => None,
        };
        child.ok_or_else(|| self.resolution_error(depth, "path changed during assignment".to_string()))
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fragment())
    }
}

impl std::ops::Add for &Ptr {
    type Output = Ptr;

    fn add(self, rhs: &Ptr) -> Ptr {
        let mut tokens = self.tokens.clone();
        tokens.extend(rhs.tokens.iter().cloned());
        Ptr { tokens }
    }
}

impl std::ops::Add for Ptr {
    type Output = Ptr;

    fn add(mut self, rhs: Ptr) -> Ptr {
        self.tokens.extend(rhs.tokens);
        self
    }
}

impl From<Vec<Token>> for Ptr {
    fn from(tokens: Vec<Token>) -> Self {
        Ptr { tokens }
    }
}

impl FromIterator<Token> for Ptr {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Ptr {
            tokens: iter.into_iter().collect(),
        }
    }
}
