//! # Table Rows
//!
//! One struct per configuration table. Serde attributes carry the document
//! field names; the rest of the engine only sees the typed fields.
//!
//! Every row keeps the fields it does not model in a flattened `extra` map so
//! a load/save cycle never drops data written by newer tools.
//!
//! The function, call and call-element tables exist once per
//! [`FunctionKind`](super::FunctionKind). Their rows share one struct each and
//! use neutral column names (`FUNC_ID`, `CALL_ID`); the `formats` module maps
//! them onto the per-kind names (`CFUNC_ID`, `EFCALL_ID`, ...).

use super::{Bit, Flag, RowId};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use serde_json::Value;

/// Unmodelled fields of a row.
pub type Extra = Map<String, Value>;

// =============================================================================
// ROW KEYS
// =============================================================================

/// A row with a numeric id and, for most tables, a unique code.
pub trait Keyed {
    /// Human-readable table label used in error messages.
    const LABEL: &'static str;

    /// Row id.
    fn id(&self) -> RowId;

    /// Unique code, if the table has one.
    fn code(&self) -> Option<&str>;
}

macro_rules! keyed {
    ($row:ty, $label:literal) => {
        impl Keyed for $row {
            const LABEL: &'static str = $label;

            fn id(&self) -> RowId {
                self.id
            }

            fn code(&self) -> Option<&str> {
                Some(&self.code)
            }
        }
    };
}

// =============================================================================
// NULLABLE FIELDS
// =============================================================================

/// Deserializers for columns that may hold `null`, be absent, or carry the
/// literal string `"null"`.
pub(crate) mod nullable {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    struct IntVisitor;

    /// `v` as an integer when it has no fractional part and fits an `i64`.
    fn integral(v: f64) -> Option<i64> {
        // i64::MAX as f64 rounds up to 2^63, which is out of range.
        let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
        (in_range && v.fract() == 0.0).then_some(v as i64)
    }

    impl Visitor<'_> for IntVisitor {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integral number, null or \"null\"")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            i64::try_from(v)
                .map(Some)
                .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            integral(v)
                .map(Some)
                .ok_or_else(|| E::invalid_value(de::Unexpected::Float(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let trimmed = v.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
                .map(Some)
                .ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    struct StrVisitor;

    impl Visitor<'_> for StrVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string, null or \"null\"")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            if v == "null" {
                Ok(None)
            } else {
                Ok(Some(v.to_string()))
            }
        }
    }

    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        d.deserialize_any(IntVisitor)
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        d.deserialize_any(StrVisitor)
    }
}

/// `ERFRAG_DEPENDS`: comma-joined fragment ids.
mod depends {
    use super::RowId;
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(ids: &[RowId], s: S) -> Result<S::Ok, S::Error> {
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        s.serialize_str(&joined)
    }

    struct DependsVisitor;

    impl Visitor<'_> for DependsVisitor {
        type Value = Vec<RowId>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a comma separated list of fragment ids")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(vec![RowId(v)])
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            i64::try_from(v)
                .map(|v| vec![RowId(v)])
                .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    part.parse::<i64>()
                        .map(RowId)
                        .map_err(|_| E::invalid_value(de::Unexpected::Str(part), &self))
                })
                .collect()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<RowId>, D::Error> {
        d.deserialize_any(DependsVisitor)
    }
}

const fn one() -> i64 {
    1
}

const fn yes() -> Flag {
    Flag::Yes
}

// =============================================================================
// CATALOG TABLES
// =============================================================================

/// `CFG_DSRC`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "DSRC_ID")]
    pub id: RowId,
    #[serde(rename = "DSRC_CODE")]
    pub code: String,
    #[serde(rename = "DSRC_DESC", default)]
    pub desc: String,
    #[serde(rename = "DSRC_RELY", default = "one")]
    pub reliability: i64,
    #[serde(rename = "RETENTION_LEVEL", default)]
    pub retention: String,
    #[serde(rename = "CONVERSATIONAL", default)]
    pub conversational: Flag,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(DataSource, "data source");

/// `CFG_ECLASS`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityClass {
    #[serde(rename = "ECLASS_ID")]
    pub id: RowId,
    #[serde(rename = "ECLASS_CODE")]
    pub code: String,
    #[serde(rename = "ECLASS_DESC", default)]
    pub desc: String,
    #[serde(rename = "RESOLVE", default = "yes")]
    pub resolve: Flag,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(EntityClass, "entity class");

/// `CFG_ETYPE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    #[serde(rename = "ETYPE_ID")]
    pub id: RowId,
    #[serde(rename = "ETYPE_CODE")]
    pub code: String,
    #[serde(rename = "ETYPE_DESC", default)]
    pub desc: String,
    #[serde(rename = "ECLASS_ID")]
    pub class_id: RowId,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(EntityType, "entity type");

/// `CFG_FCLASS`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureClass {
    #[serde(rename = "FCLASS_ID")]
    pub id: RowId,
    #[serde(rename = "FCLASS_CODE")]
    pub code: String,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(FeatureClass, "feature class");

/// `CFG_RTYPE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipType {
    #[serde(rename = "RTYPE_ID")]
    pub id: RowId,
    #[serde(rename = "RTYPE_CODE")]
    pub code: String,
    #[serde(rename = "RCLASS_ID")]
    pub class_id: i64,
    #[serde(rename = "REL_STRENGTH", default)]
    pub strength: i64,
    #[serde(rename = "BREAK_RES", default)]
    pub break_res: Bit,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(RelationshipType, "relationship type");

// =============================================================================
// FEATURES AND ELEMENTS
// =============================================================================

/// `CFG_FTYPE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "FTYPE_ID")]
    pub id: RowId,
    #[serde(rename = "FTYPE_CODE")]
    pub code: String,
    #[serde(rename = "FTYPE_DESC", default)]
    pub desc: String,
    #[serde(rename = "FCLASS_ID")]
    pub class_id: RowId,
    /// Kept verbatim; seeded rows may carry tokens the codec does not produce.
    #[serde(rename = "FTYPE_FREQ")]
    pub frequency: String,
    #[serde(rename = "FTYPE_EXCL", default)]
    pub exclusive: Flag,
    #[serde(rename = "FTYPE_STAB", default)]
    pub stable: Flag,
    #[serde(rename = "ANONYMIZE", default)]
    pub anonymize: Flag,
    #[serde(rename = "DERIVED", default)]
    pub derived: Flag,
    #[serde(rename = "USED_FOR_CAND", default)]
    pub candidates: Flag,
    #[serde(rename = "PERSIST_HISTORY", default = "yes")]
    pub persist_history: Flag,
    #[serde(rename = "VERSION", default = "one")]
    pub version: i64,
    #[serde(rename = "RTYPE_ID", default, deserialize_with = "nullable::int")]
    pub rtype_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(Feature, "feature");

impl Feature {
    /// Behavior code as displayed: frequency, then `E`, then `S`.
    #[must_use]
    pub fn behavior_code(&self) -> String {
        let mut code = self.frequency.clone();
        if self.exclusive.is_yes() {
            code.push('E');
        }
        if self.stable.is_yes() {
            code.push('S');
        }
        code
    }
}

/// `CFG_FELEM`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "FELEM_ID")]
    pub id: RowId,
    #[serde(rename = "FELEM_CODE")]
    pub code: String,
    /// Kept verbatim; validated against [`DataType`](super::DataType) on input only.
    #[serde(rename = "DATA_TYPE", default)]
    pub data_type: String,
    #[serde(rename = "TOKENIZE", default)]
    pub tokenize: Flag,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(Element, "element");

/// `CFG_FBOM`: one element of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureElement {
    #[serde(rename = "FTYPE_ID")]
    pub feature_id: RowId,
    #[serde(rename = "FELEM_ID")]
    pub element_id: RowId,
    #[serde(rename = "EXEC_ORDER")]
    pub exec_order: i64,
    #[serde(rename = "DISPLAY_LEVEL", default = "one")]
    pub display_level: i64,
    #[serde(rename = "DISPLAY_DELIM", default, deserialize_with = "nullable::string")]
    pub display_delim: Option<String>,
    #[serde(rename = "DERIVED", default)]
    pub derived: Flag,
    #[serde(flatten)]
    pub extra: Extra,
}

/// `CFG_EBOM`: features an entity type carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFeature {
    #[serde(rename = "ETYPE_ID")]
    pub entity_type_id: RowId,
    #[serde(rename = "FTYPE_ID")]
    pub feature_id: RowId,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// FUNCTIONS AND CALLS (kind-neutral column names)
// =============================================================================

/// `CFG_SFUNC` / `CFG_EFUNC` / `CFG_CFUNC` / `CFG_DFUNC`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    #[serde(rename = "FUNC_ID")]
    pub id: RowId,
    #[serde(rename = "FUNC_CODE")]
    pub code: String,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(Function, "function");

/// `CFG_SFCALL` / `CFG_EFCALL` / `CFG_CFCALL` / `CFG_DFCALL`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    #[serde(rename = "CALL_ID")]
    pub id: RowId,
    #[serde(rename = "FUNC_ID")]
    pub function_id: RowId,
    #[serde(rename = "EXEC_ORDER", default = "one")]
    pub exec_order: i64,
    #[serde(rename = "FTYPE_ID")]
    pub feature_id: RowId,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Keyed for Call {
    const LABEL: &'static str = "call";

    fn id(&self) -> RowId {
        self.id
    }

    fn code(&self) -> Option<&str> {
        None
    }
}

/// `CFG_EFBOM` / `CFG_CFBOM` / `CFG_DFBOM`: an element fed to a call.
///
/// `feature_id` names the feature the element is read from, which for the
/// name hasher differs from the feature owning the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallElement {
    #[serde(rename = "CALL_ID")]
    pub call_id: RowId,
    #[serde(rename = "EXEC_ORDER")]
    pub exec_order: i64,
    #[serde(rename = "FTYPE_ID")]
    pub feature_id: RowId,
    #[serde(rename = "FELEM_ID")]
    pub element_id: RowId,
    /// Only the expression table carries this column.
    #[serde(rename = "FELEM_REQ", default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Flag>,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// `CFG_ATTR`. Linked to its feature by code, not id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "ATTR_ID")]
    pub id: RowId,
    #[serde(rename = "ATTR_CODE")]
    pub code: String,
    #[serde(rename = "ATTR_CLASS", default)]
    pub class: String,
    #[serde(rename = "FTYPE_CODE", default, deserialize_with = "nullable::string")]
    pub feature: Option<String>,
    #[serde(rename = "FELEM_CODE", default, deserialize_with = "nullable::string")]
    pub element: Option<String>,
    #[serde(rename = "FELEM_REQ", default)]
    pub required: String,
    #[serde(rename = "DEFAULT_VALUE", default, deserialize_with = "nullable::string")]
    pub default_value: Option<String>,
    #[serde(rename = "ADVANCED", default)]
    pub advanced: Flag,
    #[serde(rename = "INTERNAL", default)]
    pub internal: Flag,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(Attribute, "attribute");

impl Attribute {
    /// Bound feature code; blank counts as unbound.
    #[must_use]
    pub fn feature_code(&self) -> Option<&str> {
        self.feature.as_deref().filter(|code| !code.is_empty())
    }

    /// Bound element code; blank counts as unbound.
    #[must_use]
    pub fn element_code(&self) -> Option<&str> {
        self.element.as_deref().filter(|code| !code.is_empty())
    }
}

// =============================================================================
// FRAGMENTS AND RULES
// =============================================================================

/// `CFG_ERFRAG`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(rename = "ERFRAG_ID")]
    pub id: RowId,
    #[serde(rename = "ERFRAG_CODE")]
    pub code: String,
    #[serde(rename = "ERFRAG_DESC", default)]
    pub desc: String,
    #[serde(rename = "ERFRAG_SOURCE", default)]
    pub source: String,
    #[serde(rename = "ERFRAG_DEPENDS", default, with = "depends")]
    pub depends: Vec<RowId>,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(Fragment, "fragment");

/// `CFG_ERRULE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "ERRULE_ID")]
    pub id: RowId,
    #[serde(rename = "ERRULE_CODE")]
    pub code: String,
    #[serde(rename = "ERRULE_DESC", default)]
    pub desc: String,
    #[serde(rename = "RESOLVE", default)]
    pub resolve: Flag,
    #[serde(rename = "RELATE", default)]
    pub relate: Bit,
    #[serde(rename = "REF_SCORE", default)]
    pub ref_score: i64,
    #[serde(rename = "RTYPE_ID", default, deserialize_with = "nullable::int")]
    pub rtype_id: Option<i64>,
    #[serde(rename = "QUAL_ERFRAG_CODE")]
    pub fragment: String,
    #[serde(rename = "DISQ_ERFRAG_CODE", default, deserialize_with = "nullable::string")]
    pub disqualifier: Option<String>,
    #[serde(rename = "ERRULE_TIER", default, deserialize_with = "nullable::int")]
    pub tier: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

keyed!(Rule, "rule");

// =============================================================================
// TESTS
// =============================================================================
