//! Facet keys shared by documents, queries and aggregations

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

/// Value placed in a filter to request "field is absent"
pub const MISSING_SENTINEL: &str = "_missing_";

/// Suffix the UI layer appends to exact-match filter keys
pub const EXACT_SUFFIX: &str = "_exact";

const VOCABULARY_PREFIX: &str = "vocab_";

/// Facets every resource carries
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinFacet {
    Course,
    Run,
    ResourceType,
}

impl BuiltinFacet {
    pub const ALL: [BuiltinFacet; 3] = [
        BuiltinFacet::Course,
        BuiltinFacet::Run,
        BuiltinFacet::ResourceType,
    ];

    /// Schema field holding the raw value
    pub fn field_name(&self) -> &'static str {
        match self {
            BuiltinFacet::Course => "course",
            BuiltinFacet::Run => "run",
            BuiltinFacet::ResourceType => "resource_type",
        }
    }

    /// Human label shown by the UI
    pub fn label(&self) -> &'static str {
        match self {
            BuiltinFacet::Course => "Course",
            BuiltinFacet::Run => "Run",
            BuiltinFacet::ResourceType => "Item Type",
        }
    }
}

/// A facet dimension: either built in, or one vocabulary (`vocab_<id>`).
///
/// Decoded once from its string form; the string form is stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FacetKey {
    Builtin(BuiltinFacet),
    Vocabulary(i64),
}

impl FacetKey {
    pub fn vocabulary(id: i64) -> Self {
        FacetKey::Vocabulary(id)
    }

    /// Engine field name (`run`, `vocab_7`, ...)
    pub fn field_name(&self) -> String {
        match self {
            FacetKey::Builtin(facet) => facet.field_name().to_string(),
            FacetKey::Vocabulary(id) => format!("{}{}", VOCABULARY_PREFIX, id),
        }
    }

    pub fn vocabulary_id(&self) -> Option<i64> {
        match self {
            FacetKey::Vocabulary(id) => Some(*id),
            FacetKey::Builtin(_) => None,
        }
    }

    /// Parse a key, accepting the UI's `_exact` suffix
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.strip_suffix(EXACT_SUFFIX).unwrap_or(raw);
        if let Some(id) = key.strip_prefix(VOCABULARY_PREFIX) {
            // Reject signs and padding so the mapping from id to key stays one-to-one
            let padded = id.len() > 1 && id.starts_with('0');
            if id.is_empty() || padded || !id.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            return id.parse().ok().map(FacetKey::Vocabulary);
        }
        BuiltinFacet::from_str(key).ok().map(FacetKey::Builtin)
    }
}

impl fmt::Display for FacetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_name())
    }
}

impl FromStr for FacetKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FacetKey::parse(s).ok_or_else(|| format!("unknown facet key: {}", s))
    }
}

impl Serialize for FacetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.field_name())
    }
}

impl<'de> Deserialize<'de> for FacetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
