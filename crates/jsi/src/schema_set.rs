//! An ordered, duplicate-free set of schemas.
//!
//! A [`Jsi`] is described by a set of schemas rather than one: several
//! subschemas can apply to the same child (`properties` next to matching
//! `patternProperties`, `items` next to `contains`), and in-place
//! application adds more.

use std::fmt;

use indexmap::IndexSet;
use jsi_ptr::{Token, Value};

use crate::base::{Instance, Jsi, JsiOptions};
use crate::error::Result;
use crate::schema::{Schema, ValidationResult};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct SchemaSet {
    schemas: IndexSet<Schema>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schema> + '_ {
        self.schemas.iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn contains(&self, schema: &Schema) -> bool {
        self.schemas.contains(schema)
    }

    pub fn first(&self) -> Option<&Schema> {
        self.schemas.first()
    }

    /// Adds `schema` unless present. Returns whether it was added.
    pub fn insert(&mut self, schema: Schema) -> bool {
        self.schemas.insert(schema)
    }

    /// The union, in order, of each member's in-place applicators.
    pub fn inplace_applicator_schemas(&self, instance: &Value) -> Result<SchemaSet> {
        let mut applied = SchemaSet::new();
        for schema in self.iter() {
            for found in schema.inplace_applicator_schemas(instance)? {
                applied.insert(found);
            }
        }
        Ok(applied)
    }

    /// The union, in order, of each member's child applicators for `token`.
    pub fn child_applicator_schemas(&self, token: &Token, instance: &Value) -> Result<SchemaSet> {
        let mut applied = SchemaSet::new();
        for schema in self.iter() {
            for found in schema.child_applicator_schemas(token, instance)? {
                applied.insert(found);
            }
        }
        Ok(applied)
    }

    /// Wraps `instance` as described by these schemas.
    pub fn new_jsi(&self, instance: impl Into<Instance>, options: JsiOptions) -> Result<Jsi> {
        Jsi::new(instance, self.clone(), options)
    }

    /// Errors of `instance` against every member.
    pub fn validate(&self, instance: &Value) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();
        for schema in self.iter() {
            result.merge(schema.validate(instance)?);
        }
        Ok(result)
    }

    pub fn instance_valid(&self, instance: &Value) -> Result<bool> {
        for schema in self.iter() {
            if !schema.instance_valid(instance)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether any member describes schemas.
    pub fn describes_schema(&self) -> bool {
        self.iter().any(Schema::describes_schema)
    }
}

impl FromIterator<Schema> for SchemaSet {
    fn from_iter<I: IntoIterator<Item = Schema>>(iter: I) -> Self {
        Self {
            schemas: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SchemaSet {
    type Item = &'a Schema;
    type IntoIter = indexmap::set::Iter<'a, Schema>;

    fn into_iter(self) -> Self::IntoIter {
        self.schemas.iter()
    }
}

impl fmt::Debug for SchemaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.schemas.iter()).finish()
    }
}
