//! In-place application: which schemas describe an instance itself.

use jsi_ptr::{Ptr, Token, Value};

use super::{is_schema_shaped, Schema};
use crate::error::Result;
use crate::node::Node;

pub(crate) fn inplace_applicators(schema: &Schema, instance: &Value) -> Result<Vec<Schema>> {
    let mut applied = Vec::new();
    collect(schema, instance, &mut Vec::new(), &mut applied)?;
    Ok(applied)
}

/// `visited` holds the `$ref` locations followed on the way to `schema`; a
/// reference seen again is not followed, and its schema applies as is.
fn collect(schema: &Schema, instance: &Value, visited: &mut Vec<Node>, applied: &mut Vec<Schema>) -> Result<()> {
    if !visited.contains(schema.node()) {
        if let Some(target) = schema.ref_target()? {
            // In these drafts `$ref` replaces its sibling keywords.
            visited.push(schema.node().clone());
            let result = collect(&target, instance, visited, applied);
            visited.pop();
            return result;
        }
    }

    if !applied.contains(schema) {
        applied.push(schema.clone());
    }

    let content = schema.content()?;
    let Some(keywords) = content.as_object() else {
        return Ok(());
    };

    for branch in branches(schema, keywords.get("allOf"), "allOf")? {
        collect(&branch, instance, visited, applied)?;
    }

    let any_of = branches(schema, keywords.get("anyOf"), "anyOf")?;
    if !any_of.is_empty() {
        let valid = valid_branches(&any_of, instance)?;
        let chosen = if valid.is_empty() { any_of } else { valid };
        for branch in chosen {
            collect(&branch, instance, visited, applied)?;
        }
    }

    let one_of = branches(schema, keywords.get("oneOf"), "oneOf")?;
    if !one_of.is_empty() {
        let valid = valid_branches(&one_of, instance)?;
        let chosen = if valid.len() == 1 { valid } else { one_of };
        for branch in chosen {
            collect(&branch, instance, visited, applied)?;
        }
    }

    if schema.draft().has_conditionals() && keywords.contains_key("if") {
        let condition = schema.subschema(&Ptr::new(["if"]))?;
        let consequence = if condition.instance_valid(instance)? { "then" } else { "else" };
        if keywords.contains_key(consequence) {
            collect(&schema.subschema(&Ptr::new([consequence]))?, instance, visited, applied)?;
        }
    }

    if let (Some(Value::Object(dependencies)), Value::Object(members)) = (keywords.get("dependencies"), instance) {
        for (name, dependency) in dependencies.iter() {
            if members.contains_key(name) && is_schema_shaped(dependency) {
                let dependent = schema.subschema(&Ptr::new(["dependencies", name.as_str()]))?;
                collect(&dependent, instance, visited, applied)?;
            }
        }
    }
    Ok(())
}

fn branches(schema: &Schema, value: Option<&Value>, keyword: &str) -> Result<Vec<Schema>> {
    let Some(Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    (0..items.len())
        .map(|i| schema.subschema(&Ptr::new([Token::from(keyword), Token::Index(i)])))
        .collect()
}

fn valid_branches(branches: &[Schema], instance: &Value) -> Result<Vec<Schema>> {
    let mut valid = Vec::new();
    for branch in branches {
        if branch.instance_valid(instance)? {
            valid.push(branch.clone());
        }
    }
    Ok(valid)
}
