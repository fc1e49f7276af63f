//! # Operation Requests
//!
//! Typed arguments of the mutation operations.
//!
//! Requests arrive as loosely-typed JSON objects whose keys are matched
//! case-insensitively (`"elementList"` and `"ELEMENTLIST"` are the same key).
//! [`parse`] lower-cases every key before deserializing, so the structs below
//! only name lower-case keys. Yes/No flags accept the usual loose spellings
//! and numeric fields accept numbers or numeric strings.

use crate::types::rows::nullable;
use crate::types::{CfgError, Flag};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Recursively lower-case every object key.
#[must_use]
pub fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), lowercase_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Deserialize a request object, mapping failures to [`CfgError::MalformedInput`].
pub fn parse<T: DeserializeOwned>(value: Value) -> Result<T, CfgError> {
    serde_json::from_value(lowercase_keys(value)).map_err(|e| CfgError::MalformedInput(e.to_string()))
}

/// Parse a request from JSON text.
pub fn parse_str<T: DeserializeOwned>(text: &str) -> Result<T, CfgError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CfgError::MalformedInput(e.to_string()))?;
    parse(value)
}

/// Upper-case and trim a code; blank codes are `None`.
#[must_use]
pub fn normalize_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Like [`normalize_code`] but a blank code is [`CfgError::MalformedInput`].
pub fn require_code(field: &str, code: &str) -> Result<String, CfgError> {
    normalize_code(code).ok_or_else(|| CfgError::MalformedInput(format!("{field} is required")))
}

/// Normalize an optional code, treating blank as absent.
#[must_use]
pub fn optional_code(code: Option<&String>) -> Option<String> {
    code.and_then(|c| normalize_code(c))
}

// =============================================================================
// CATALOG REQUESTS
// =============================================================================

/// `addDataSource`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataSourceSpec {
    #[serde(rename = "datasource")]
    pub code: String,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
}

/// `addEntityClass`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityClassSpec {
    #[serde(rename = "entityclass")]
    pub code: String,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
    #[serde(default)]
    pub resolve: Option<Flag>,
}

/// `addEntityType`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityTypeSpec {
    #[serde(rename = "entitytype")]
    pub code: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
}

/// `addElement`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementSpec {
    #[serde(rename = "element")]
    pub code: String,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub tokenize: Option<Flag>,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
}

// =============================================================================
// FEATURE REQUESTS
// =============================================================================

/// `addFeature`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureSpec {
    #[serde(rename = "feature")]
    pub code: String,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
    #[serde(default)]
    pub behavior: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub anonymize: Option<Flag>,
    #[serde(default)]
    pub derived: Option<Flag>,
    #[serde(default)]
    pub candidates: Option<Flag>,
    #[serde(default)]
    pub standardize: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub comparison: Option<String>,
    #[serde(default)]
    pub distinct: Option<String>,
    #[serde(rename = "elementlist", default)]
    pub elements: Vec<ElementEntry>,
}

/// One entry of a feature's element list: a bare code or a detailed entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ElementEntry {
    Code(String),
    Detail(ElementDetail),
}

impl ElementEntry {
    /// Expand a bare code into a detail with default flags.
    #[must_use]
    pub fn into_detail(self) -> ElementDetail {
        match self {
            Self::Code(element) => ElementDetail {
                element,
                ..ElementDetail::default()
            },
            Self::Detail(detail) => detail,
        }
    }
}

/// A detailed element list entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementDetail {
    pub element: String,
    #[serde(default)]
    pub expressed: Flag,
    #[serde(default)]
    pub compared: Flag,
    #[serde(default, deserialize_with = "nullable::int")]
    pub display_level: Option<i64>,
    #[serde(default)]
    pub display_delim: Option<String>,
    #[serde(default)]
    pub derived: Option<Flag>,
    #[serde(default)]
    pub addtonamehash: Flag,
}

/// `setFeature`: the changes to apply to one feature.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureUpdate {
    #[serde(rename = "feature")]
    pub code: String,
    #[serde(default)]
    pub behavior: Option<String>,
    #[serde(default)]
    pub anonymize: Option<Flag>,
    #[serde(default)]
    pub candidates: Option<Flag>,
    #[serde(default)]
    pub standardize: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub comparison: Option<String>,
}

/// `addElementToFeature`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureElementSpec {
    pub feature: String,
    pub element: String,
    #[serde(default)]
    pub expressed: Option<Flag>,
    #[serde(default)]
    pub compared: Option<Flag>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub tokenize: Option<Flag>,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
}

/// A feature/element pair (`addToNamehash`, `deleteElementFromFeature`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureElementRef {
    pub feature: String,
    pub element: String,
}

// =============================================================================
// ATTRIBUTE, FRAGMENT AND RULE REQUESTS
// =============================================================================

/// `addAttribute`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeSpec {
    #[serde(rename = "attribute")]
    pub code: String,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub required: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub advanced: Option<Flag>,
    #[serde(default)]
    pub internal: Option<Flag>,
}

/// `addFragment`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FragmentSpec {
    #[serde(rename = "fragment")]
    pub code: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
}

/// `addRule`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSpec {
    #[serde(default, deserialize_with = "nullable::int")]
    pub id: Option<i64>,
    /// Rule code; defaults to the fragment code.
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub fragment: Option<String>,
    #[serde(default, deserialize_with = "nullable::string")]
    pub disqualifier: Option<String>,
    #[serde(default, deserialize_with = "nullable::int")]
    pub tier: Option<i64>,
    #[serde(default)]
    pub resolve: Option<Flag>,
    #[serde(default)]
    pub relate: Option<Flag>,
    #[serde(default, alias = "refscore", deserialize_with = "nullable::int")]
    pub ref_score: Option<i64>,
    #[serde(default, deserialize_with = "nullable::int")]
    pub rtype_id: Option<i64>,
}

// =============================================================================
// SELECTORS
// =============================================================================

/// Selects rows of a table by code or id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Code(String),
    Id(i64),
}

/// Selects attributes by code, id, or bound feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSelector {
    Code(String),
    Id(i64),
    Feature(String),
}

// =============================================================================
// TESTS
// =============================================================================
