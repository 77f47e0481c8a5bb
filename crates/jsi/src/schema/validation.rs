//! Instance validation against drafts 04, 06 and 07.
//!
//! The validator walks a schema and an instance together, recording one
//! [`ValidationError`] per failing keyword. Branch keywords (`anyOf`,
//! `oneOf`, `not`, `contains`, `if`) probe their subschemas without
//! recording, and only report at the branching keyword itself.
//!
//! `format` is an annotation here and never fails.

use std::fmt;

use jsi_ptr::{Map, Ptr, Token, Value};
use serde_json::Number;
use tracing::{debug, trace};
use url::Url;

use super::{pattern, Draft, Schema};
use crate::error::Result;
use crate::node::Node;

/// One failing keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Where in the instance the failure is.
    pub instance_ptr: Ptr,
    /// The failing keyword's location in its schema document.
    pub schema_ptr: Ptr,
    /// The canonical URI of the schema holding the keyword, when it has one.
    pub schema_uri: Option<Url>,
    pub keyword: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_ptr.is_root() {
            write!(f, "(root): {} [{}]", self.message, self.schema_ptr.fragment())
        } else {
            write!(
                f,
                "{}: {} [{}]",
                self.instance_ptr.pointer(),
                self.message,
                self.schema_ptr.fragment()
            )
        }
    }
}

/// The errors from validating one instance. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }

    /// Appends the errors of `other`.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Validates `instance` against `schema`. Without `collect_all`, stops at
/// the first failure.
pub(crate) fn validate(schema: &Schema, instance: &Value, collect_all: bool) -> Result<ValidationResult> {
    let mut validator = Validator {
        collect_all,
        errors: Vec::new(),
        active: Vec::new(),
    };
    validator.visit(schema, instance, &Ptr::root())?;
    trace!(schema = ?schema, errors = validator.errors.len(), "validated");
    Ok(ValidationResult {
        errors: validator.errors,
    })
}

struct Validator {
    collect_all: bool,
    errors: Vec<ValidationError>,
    /// `$ref` sites being followed, each with the instance location it was
    /// followed at. Meeting one again means a reference cycle that consumes
    /// no instance; it is treated as passing.
    active: Vec<(Node, Ptr)>,
}

impl Validator {
    fn stopped(&self) -> bool {
        !self.collect_all && !self.errors.is_empty()
    }

    /// Records a failure of `keyword`. An empty keyword is the schema
    /// itself (the `false` schema).
    fn fail(&mut self, schema: &Schema, keyword: &str, at: &Ptr, message: String) {
        if self.stopped() {
            return;
        }
        let schema_ptr = if keyword.is_empty() {
            schema.ptr().clone()
        } else {
            schema.ptr().child(keyword)
        };
        self.errors.push(ValidationError {
            instance_ptr: at.clone(),
            schema_ptr,
            schema_uri: schema.schema_uri().cloned(),
            keyword: keyword.to_string(),
            message,
        });
    }

    /// Whether `instance` is valid against `schema`, recording nothing.
    fn probe(&mut self, schema: &Schema, instance: &Value, at: &Ptr) -> Result<bool> {
        let errors = std::mem::take(&mut self.errors);
        let collect_all = std::mem::replace(&mut self.collect_all, false);
        let outcome = self.visit(schema, instance, at);
        let valid = self.errors.is_empty();
        self.errors = errors;
        self.collect_all = collect_all;
        outcome?;
        Ok(valid)
    }

    fn visit(&mut self, schema: &Schema, instance: &Value, at: &Ptr) -> Result<()> {
        let content = schema.content()?;
        let keywords = match &content {
            Value::Bool(true) => return Ok(()),
            Value::Bool(false) => {
                self.fail(schema, "", at, "no value is valid against the false schema".into());
                return Ok(());
            }
            Value::Object(keywords) => keywords,
            _ => return Ok(()),
        };

        if keywords.contains_key("$ref") {
            let site = (schema.node().clone(), at.clone());
            if self.active.contains(&site) {
                debug!(schema = ?schema, instance = %at, "reference cycle, not followed");
                return Ok(());
            }
            if let Some(target) = schema.ref_target()? {
                self.active.push(site);
                let outcome = self.visit(&target, instance, at);
                self.active.pop();
                return outcome;
            }
        }

        self.check_generic(schema, keywords, instance, at)?;
        match instance {
            Value::Number(n) => self.check_number(schema, keywords, n, at)?,
            Value::String(s) => self.check_string(schema, keywords, s, at)?,
            Value::Array(items) => self.check_array(schema, keywords, items, at)?,
            Value::Object(members) => self.check_object(schema, keywords, instance, members, at)?,
            _ => {}
        }
        if self.stopped() {
            return Ok(());
        }
        self.check_combinators(schema, keywords, instance, at)
    }

    fn check_generic(&mut self, schema: &Schema, keywords: &Map, instance: &Value, at: &Ptr) -> Result<()> {
        if let Some(types) = keywords.get("type") {
            let names: Vec<&str> = match types {
                Value::String(name) => vec![&**name],
                Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            if !names.is_empty() && !names.iter().any(|name| has_type(schema.draft(), instance, name)) {
                self.fail(
                    schema,
                    "type",
                    at,
                    format!("{} is not of type {}", instance.kind(), names.join(", ")),
                );
            }
        }
        if let Some(Value::Array(allowed)) = keywords.get("enum") {
            if !allowed.iter().any(|v| json_equal(v, instance)) {
                self.fail(schema, "enum", at, format!("{} is not one of the enumerated values", instance.snippet(60)));
            }
        }
        if schema.draft().has_keyword_const() {
            if let Some(expected) = keywords.get("const") {
                if !json_equal(expected, instance) {
                    self.fail(schema, "const", at, format!("expected {}", expected.snippet(60)));
                }
            }
        }
        Ok(())
    }

    fn check_number(&mut self, schema: &Schema, keywords: &Map, n: &Number, at: &Ptr) -> Result<()> {
        let Some(x) = n.as_f64() else {
            return Ok(());
        };
        if let Some(m) = keywords.get("multipleOf").and_then(Value::as_number) {
            if !is_multiple_of(n, m) {
                self.fail(schema, "multipleOf", at, format!("{n} is not a multiple of {m}"));
            }
        }

        let draft = schema.draft();
        for (bound, exclusive, upper) in [("maximum", "exclusiveMaximum", true), ("minimum", "exclusiveMinimum", false)] {
            let beyond = |limit: f64, strict: bool| match (upper, strict) {
                (true, true) => x >= limit,
                (true, false) => x > limit,
                (false, true) => x <= limit,
                (false, false) => x < limit,
            };
            if draft.boolean_exclusive_bounds() {
                let strict = keywords.get(exclusive).and_then(Value::as_bool).unwrap_or(false);
                if let Some(limit) = keywords.get(bound).and_then(Value::as_f64) {
                    if beyond(limit, strict) {
                        let keyword = if strict { exclusive } else { bound };
                        self.fail(schema, keyword, at, format!("{n} exceeds the {bound} of {limit}"));
                    }
                }
            } else {
                if let Some(limit) = keywords.get(bound).and_then(Value::as_f64) {
                    if beyond(limit, false) {
                        self.fail(schema, bound, at, format!("{n} exceeds the {bound} of {limit}"));
                    }
                }
                if let Some(limit) = keywords.get(exclusive).and_then(Value::as_f64) {
                    if beyond(limit, true) {
                        self.fail(schema, exclusive, at, format!("{n} exceeds the {exclusive} of {limit}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_string(&mut self, schema: &Schema, keywords: &Map, s: &str, at: &Ptr) -> Result<()> {
        let length = s.chars().count() as u64;
        if let Some(max) = keywords.get("maxLength").and_then(Value::as_u64) {
            if length > max {
                self.fail(schema, "maxLength", at, format!("longer than {max} characters"));
            }
        }
        if let Some(min) = keywords.get("minLength").and_then(Value::as_u64) {
            if length < min {
                self.fail(schema, "minLength", at, format!("shorter than {min} characters"));
            }
        }
        if let Some(source) = keywords.get("pattern").and_then(Value::as_str) {
            let regex = pattern::compile(source, || schema.ptr().child("pattern").fragment())?;
            if !regex.is_match(s) {
                self.fail(schema, "pattern", at, format!("does not match {source:?}"));
            }
        }
        Ok(())
    }

    fn check_array(&mut self, schema: &Schema, keywords: &Map, items: &[Value], at: &Ptr) -> Result<()> {
        let count = items.len() as u64;
        if let Some(max) = keywords.get("maxItems").and_then(Value::as_u64) {
            if count > max {
                self.fail(schema, "maxItems", at, format!("more than {max} items"));
            }
        }
        if let Some(min) = keywords.get("minItems").and_then(Value::as_u64) {
            if count < min {
                self.fail(schema, "minItems", at, format!("fewer than {min} items"));
            }
        }
        if keywords.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
            let duplicate = (0..items.len()).find(|&i| (0..i).any(|j| json_equal(&items[i], &items[j])));
            if let Some(i) = duplicate {
                self.fail(schema, "uniqueItems", at, format!("item {i} is a duplicate"));
            }
        }

        match keywords.get("items") {
            Some(Value::Array(tuple)) => {
                for (i, item) in items.iter().enumerate() {
                    let ptr = if i < tuple.len() {
                        Ptr::new([Token::from("items"), Token::Index(i)])
                    } else if keywords.contains_key("additionalItems") {
                        Ptr::new(["additionalItems"])
                    } else {
                        break;
                    };
                    self.visit(&schema.subschema(&ptr)?, item, &at.child(i))?;
                    if self.stopped() {
                        return Ok(());
                    }
                }
            }
            Some(_) => {
                let each = schema.subschema(&Ptr::new(["items"]))?;
                for (i, item) in items.iter().enumerate() {
                    self.visit(&each, item, &at.child(i))?;
                    if self.stopped() {
                        return Ok(());
                    }
                }
            }
            None => {}
        }

        if schema.draft().has_keyword_contains() && keywords.contains_key("contains") {
            let contains = schema.subschema(&Ptr::new(["contains"]))?;
            let mut found = false;
            for (i, item) in items.iter().enumerate() {
                if self.probe(&contains, item, &at.child(i))? {
                    found = true;
                    break;
                }
            }
            if !found {
                self.fail(schema, "contains", at, "no item is valid against contains".into());
            }
        }
        Ok(())
    }

    fn check_object(
        &mut self,
        schema: &Schema,
        keywords: &Map,
        instance: &Value,
        members: &Map,
        at: &Ptr,
    ) -> Result<()> {
        let count = members.len() as u64;
        if let Some(max) = keywords.get("maxProperties").and_then(Value::as_u64) {
            if count > max {
                self.fail(schema, "maxProperties", at, format!("more than {max} properties"));
            }
        }
        if let Some(min) = keywords.get("minProperties").and_then(Value::as_u64) {
            if count < min {
                self.fail(schema, "minProperties", at, format!("fewer than {min} properties"));
            }
        }
        if let Some(Value::Array(required)) = keywords.get("required") {
            let missing: Vec<&str> = required
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| !members.contains_key(*name))
                .collect();
            if !missing.is_empty() {
                self.fail(schema, "required", at, format!("missing required properties: {}", missing.join(", ")));
            }
        }

        self.check_properties(schema, keywords, members, at)?;
        if self.stopped() {
            return Ok(());
        }

        if let Some(Value::Object(dependencies)) = keywords.get("dependencies") {
            for (name, dependency) in dependencies.iter() {
                if !members.contains_key(name) {
                    continue;
                }
                match dependency {
                    Value::Array(names) => {
                        let missing: Vec<&str> = names
                            .iter()
                            .filter_map(Value::as_str)
                            .filter(|n| !members.contains_key(*n))
                            .collect();
                        if !missing.is_empty() {
                            self.fail(
                                schema,
                                "dependencies",
                                at,
                                format!("{name:?} requires {}", missing.join(", ")),
                            );
                        }
                    }
                    _ => {
                        let dependent = schema.subschema(&Ptr::new(["dependencies", name.as_str()]))?;
                        self.visit(&dependent, instance, at)?;
                    }
                }
                if self.stopped() {
                    return Ok(());
                }
            }
        }

        if schema.draft().has_keyword_property_names() && keywords.contains_key("propertyNames") {
            let names = schema.subschema(&Ptr::new(["propertyNames"]))?;
            for name in members.keys() {
                self.visit(&names, &Value::from(name.as_str()), &at.child(name))?;
                if self.stopped() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn check_properties(&mut self, schema: &Schema, keywords: &Map, members: &Map, at: &Ptr) -> Result<()> {
        let properties = keywords.get("properties").and_then(Value::as_object);
        let patterns = keywords.get("patternProperties").and_then(Value::as_object);
        let additional = keywords.contains_key("additionalProperties");
        if properties.is_none() && patterns.is_none() && !additional {
            return Ok(());
        }

        for (name, member) in members.iter() {
            let child_at = at.child(name);
            let mut matched = false;
            if properties.is_some_and(|p| p.contains_key(name)) {
                matched = true;
                let property = schema.subschema(&Ptr::new(["properties", name.as_str()]))?;
                self.visit(&property, member, &child_at)?;
            }
            for source in patterns.into_iter().flat_map(Map::keys) {
                let regex = pattern::compile(source, || {
                    schema.ptr().child("patternProperties").child(source).fragment()
                })?;
                if regex.is_match(name) {
                    matched = true;
                    let by_pattern = schema.subschema(&Ptr::new(["patternProperties", source.as_str()]))?;
                    self.visit(&by_pattern, member, &child_at)?;
                }
            }
            if !matched && additional {
                let rest = schema.subschema(&Ptr::new(["additionalProperties"]))?;
                if rest.content()?.as_bool() == Some(false) {
                    self.fail(schema, "additionalProperties", &child_at, format!("{name:?} is not allowed"));
                } else {
                    self.visit(&rest, member, &child_at)?;
                }
            }
            if self.stopped() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn check_combinators(&mut self, schema: &Schema, keywords: &Map, instance: &Value, at: &Ptr) -> Result<()> {
        for branch in branches(schema, keywords, "allOf")? {
            self.visit(&branch, instance, at)?;
            if self.stopped() {
                return Ok(());
            }
        }

        let any_of = branches(schema, keywords, "anyOf")?;
        if !any_of.is_empty() {
            let mut valid = false;
            for branch in &any_of {
                if self.probe(branch, instance, at)? {
                    valid = true;
                    break;
                }
            }
            if !valid {
                self.fail(schema, "anyOf", at, "not valid against any branch of anyOf".into());
            }
        }

        let one_of = branches(schema, keywords, "oneOf")?;
        if !one_of.is_empty() {
            let mut valid = 0;
            for branch in &one_of {
                if self.probe(branch, instance, at)? {
                    valid += 1;
                }
            }
            if valid != 1 {
                self.fail(schema, "oneOf", at, format!("valid against {valid} branches of oneOf, expected 1"));
            }
        }

        if keywords.contains_key("not") {
            let not = schema.subschema(&Ptr::new(["not"]))?;
            if self.probe(&not, instance, at)? {
                self.fail(schema, "not", at, "valid against the schema in not".into());
            }
        }

        if schema.draft().has_conditionals() && keywords.contains_key("if") {
            let condition = schema.subschema(&Ptr::new(["if"]))?;
            let consequence = if self.probe(&condition, instance, at)? { "then" } else { "else" };
            if keywords.contains_key(consequence) {
                self.visit(&schema.subschema(&Ptr::new([consequence]))?, instance, at)?;
            }
        }
        Ok(())
    }
}

fn branches(schema: &Schema, keywords: &Map, keyword: &str) -> Result<Vec<Schema>> {
    let Some(Value::Array(items)) = keywords.get(keyword) else {
        return Ok(Vec::new());
    };
    (0..items.len())
        .map(|i| schema.subschema(&Ptr::new([Token::from(keyword), Token::Index(i)])))
        .collect()
}

fn has_type(draft: Draft, instance: &Value, name: &str) -> bool {
    match (name, instance) {
        ("null", Value::Null) | ("boolean", Value::Bool(_)) | ("number", Value::Number(_)) => true,
        ("string", Value::String(_)) | ("array", Value::Array(_)) | ("object", Value::Object(_)) => true,
        ("integer", Value::Number(n)) => {
            n.is_i64()
                || n.is_u64()
                || (draft.integral_floats_are_integers() && n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0))
        }
        _ => false,
    }
}

fn is_multiple_of(n: &Number, m: &Number) -> bool {
    if let (Some(a), Some(b)) = (n.as_i64(), m.as_i64()) {
        // i64::MIN % -1 overflows; every integer is a multiple of -1
        return b != 0 && a.checked_rem(b).map_or(true, |r| r == 0);
    }
    let (Some(a), Some(b)) = (n.as_f64(), m.as_f64()) else {
        return true;
    };
    if b == 0.0 {
        return false;
    }
    let quotient = a / b;
    quotient.is_finite() && (quotient - quotient.round()).abs() <= 1e-9 * quotient.abs().max(1.0)
}

/// JSON equality, where numbers compare by value (`1` equals `1.0`).
pub(crate) fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y.iter()).all(|(x, y)| json_equal(x, y)),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => a == b,
    }
}
