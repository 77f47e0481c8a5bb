//! Per-draft keyword rules.
//!
//! Drafts 04, 06 and 07 differ in how a schema names itself (`id` vs `$id`),
//! in which keywords exist, and in how a few shared keywords are read
//! (draft-04's boolean `exclusiveMaximum`). Everything that varies by draft
//! is looked up here.

use std::fmt;

/// How the value of a keyword holds subschemas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SubschemaKind {
    /// The value is one schema.
    Single,
    /// The value is an array of schemas.
    Array,
    /// The value is an object whose member values are schemas.
    Map,
    /// A schema or an array of schemas (`items`).
    SingleOrArray,
    /// An object whose member values are schemas or property-name arrays
    /// (`dependencies`).
    MapOfSchemaOrArray,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Draft {
    Draft04,
    Draft06,
    #[default]
    Draft07,
}

const COMMON_SUBSCHEMA_KEYWORDS: &[(&str, SubschemaKind)] = &[
    ("additionalItems", SubschemaKind::Single),
    ("additionalProperties", SubschemaKind::Single),
    ("not", SubschemaKind::Single),
    ("items", SubschemaKind::SingleOrArray),
    ("allOf", SubschemaKind::Array),
    ("anyOf", SubschemaKind::Array),
    ("oneOf", SubschemaKind::Array),
    ("definitions", SubschemaKind::Map),
    ("properties", SubschemaKind::Map),
    ("patternProperties", SubschemaKind::Map),
    ("dependencies", SubschemaKind::MapOfSchemaOrArray),
];

const DRAFT06_SUBSCHEMA_KEYWORDS: &[(&str, SubschemaKind)] = &[
    ("contains", SubschemaKind::Single),
    ("propertyNames", SubschemaKind::Single),
];

const DRAFT07_SUBSCHEMA_KEYWORDS: &[(&str, SubschemaKind)] = &[
    ("if", SubschemaKind::Single),
    ("then", SubschemaKind::Single),
    ("else", SubschemaKind::Single),
];

impl Draft {
    pub const ALL: [Draft; 3] = [Draft::Draft04, Draft::Draft06, Draft::Draft07];

    /// The keyword a schema uses to declare its URI.
    pub fn id_keyword(self) -> &'static str {
        match self {
            Draft::Draft04 => "id",
            Draft::Draft06 | Draft::Draft07 => "$id",
        }
    }

    /// Canonical URI of this draft's metaschema, without the empty fragment.
    pub fn metaschema_uri(self) -> &'static str {
        match self {
            Draft::Draft04 => "http://json-schema.org/draft-04/schema",
            Draft::Draft06 => "http://json-schema.org/draft-06/schema",
            Draft::Draft07 => "http://json-schema.org/draft-07/schema",
        }
    }

    /// The draft whose metaschema is at `uri`, tolerating a trailing empty
    /// fragment and the `https` scheme.
    pub fn from_metaschema_uri(uri: &str) -> Option<Draft> {
        let uri = uri.strip_suffix('#').unwrap_or(uri);
        let uri = uri.strip_prefix("https://").map_or_else(
            || uri.to_string(),
            |rest| format!("http://{rest}"),
        );
        Draft::ALL.into_iter().find(|d| d.metaschema_uri() == uri)
    }

    /// Draft-04 writes `exclusiveMaximum`/`exclusiveMinimum` as booleans
    /// modifying `maximum`/`minimum`; later drafts write the bound itself.
    pub fn boolean_exclusive_bounds(self) -> bool {
        self == Draft::Draft04
    }

    /// Whether a float with no fractional part counts as an `integer`.
    pub fn integral_floats_are_integers(self) -> bool {
        self != Draft::Draft04
    }

    pub fn has_keyword_contains(self) -> bool {
        self != Draft::Draft04
    }

    pub fn has_keyword_const(self) -> bool {
        self != Draft::Draft04
    }

    pub fn has_keyword_property_names(self) -> bool {
        self != Draft::Draft04
    }

    pub fn has_conditionals(self) -> bool {
        self == Draft::Draft07
    }

    /// How `keyword` holds subschemas in this draft, if it does.
    pub(crate) fn subschema_kind(self, keyword: &str) -> Option<SubschemaKind> {
        self.subschema_keywords()
            .find(|(k, _)| *k == keyword)
            .map(|(_, kind)| kind)
    }

    /// Every subschema-bearing keyword of this draft.
    pub(crate) fn subschema_keywords(self) -> impl Iterator<Item = (&'static str, SubschemaKind)> {
        let extra: &[(&str, SubschemaKind)] = match self {
            Draft::Draft04 => &[],
            Draft::Draft06 => DRAFT06_SUBSCHEMA_KEYWORDS,
            Draft::Draft07 => DRAFT06_SUBSCHEMA_KEYWORDS,
        };
        let conditionals: &[(&str, SubschemaKind)] = match self {
            Draft::Draft07 => DRAFT07_SUBSCHEMA_KEYWORDS,
            _ => &[],
        };
        COMMON_SUBSCHEMA_KEYWORDS
            .iter()
            .chain(extra)
            .chain(conditionals)
            .copied()
    }
}

impl fmt::Display for Draft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Draft::Draft04 => "draft-04",
            Draft::Draft06 => "draft-06",
            Draft::Draft07 => "draft-07",
        };
        f.write_str(name)
    }
}
