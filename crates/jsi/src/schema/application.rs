//! Child application: which subschemas describe a child of an instance.
//!
//! Arrays use `items`/`additionalItems` (and, from draft-07, `contains`).
//! Objects use `properties`, then `patternProperties`, then
//! `additionalProperties`, each level only when the previous one did not
//! match. Which subschemas apply says nothing about validity.

use jsi_ptr::{Map, Ptr, Token, Value};

use super::{pattern, Draft, Schema};
use crate::error::Result;

pub(crate) fn child_applicators(schema: &Schema, token: &Token, instance: &Value) -> Result<Vec<Schema>> {
    let content = schema.content()?;
    let Some(keywords) = content.as_object() else {
        return Ok(Vec::new());
    };
    let mut applied = Vec::new();
    match instance {
        Value::Array(items) => {
            let Some(index) = token.to_index() else {
                return Ok(applied);
            };
            match schema.draft() {
                Draft::Draft04 | Draft::Draft06 => {
                    apply_items(schema, keywords, index, &mut applied)?;
                }
                Draft::Draft07 => {
                    apply_items(schema, keywords, index, &mut applied)?;
                    if let Some(child) = items.get(index) {
                        apply_contains(schema, keywords, child, &mut applied)?;
                    }
                }
            }
        }
        Value::Object(_) => {
            if let Some(name) = token.as_key() {
                apply_properties(schema, keywords, name, &mut applied)?;
            }
        }
        _ => {}
    }
    Ok(applied)
}

pub(crate) fn item_applicators(schema: &Schema, index: usize) -> Result<Vec<Schema>> {
    let content = schema.content()?;
    let mut applied = Vec::new();
    if let Some(keywords) = content.as_object() {
        apply_items(schema, keywords, index, &mut applied)?;
    }
    Ok(applied)
}

pub(crate) fn property_applicators(schema: &Schema, name: &str) -> Result<Vec<Schema>> {
    let content = schema.content()?;
    let mut applied = Vec::new();
    if let Some(keywords) = content.as_object() {
        apply_properties(schema, keywords, name, &mut applied)?;
    }
    Ok(applied)
}

fn apply_items(schema: &Schema, keywords: &Map, index: usize, applied: &mut Vec<Schema>) -> Result<()> {
    match keywords.get("items") {
        Some(Value::Array(tuple)) => {
            if index < tuple.len() {
                applied.push(schema.subschema(&Ptr::new([Token::from("items"), Token::Index(index)]))?);
            } else if keywords.contains_key("additionalItems") {
                applied.push(schema.subschema(&Ptr::new(["additionalItems"]))?);
            }
        }
        Some(_) => applied.push(schema.subschema(&Ptr::new(["items"]))?),
        None => {}
    }
    Ok(())
}

fn apply_contains(schema: &Schema, keywords: &Map, child: &Value, applied: &mut Vec<Schema>) -> Result<()> {
    if keywords.contains_key("contains") {
        let contains = schema.subschema(&Ptr::new(["contains"]))?;
        if contains.instance_valid(child)? {
            applied.push(contains);
        }
    }
    Ok(())
}

fn apply_properties(schema: &Schema, keywords: &Map, name: &str, applied: &mut Vec<Schema>) -> Result<()> {
    if let Some(Value::Object(properties)) = keywords.get("properties") {
        if properties.contains_key(name) {
            applied.push(schema.subschema(&Ptr::new(["properties", name]))?);
            return Ok(());
        }
    }

    let mut matched = false;
    if let Some(Value::Object(patterns)) = keywords.get("patternProperties") {
        for source in patterns.keys() {
            let regex = pattern::compile(source, || {
                schema.ptr().child("patternProperties").child(source).fragment()
            })?;
            if regex.is_match(name) {
                applied.push(schema.subschema(&Ptr::new(["patternProperties", source.as_str()]))?);
                matched = true;
            }
        }
    }

    if !matched && keywords.contains_key("additionalProperties") {
        applied.push(schema.subschema(&Ptr::new(["additionalProperties"]))?);
    }
    Ok(())
}
