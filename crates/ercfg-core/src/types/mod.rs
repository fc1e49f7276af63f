//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the configuration engine:
//! - Row identifiers (`RowId`)
//! - Boolean-like flags as they appear in the document (`Flag`, `Bit`)
//! - Fixed enumerations (`FunctionKind`, `AttributeClass`, `RequiredPolicy`, `DataType`)
//! - Error types (`CfgError`)
//!
//! The typed table rows live in [`rows`].
//!
//! ## Document Compatibility
//!
//! Flags serialize as the literal strings `"Yes"`/`"No"` (or `1`/`0` for the
//! numeric flags of the document format). Deserialization is lenient so
//! hand-edited documents and shell arguments both load.

pub mod rows;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use rows::*;

// =============================================================================
// ROW IDENTIFIERS
// =============================================================================

/// Numeric identifier of a row within its table.
///
/// Ids are unique per table only; the same value may appear in two tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RowId(pub i64);

impl RowId {
    /// Create a new row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// The id immediately after this one; `None` at `i64::MAX`.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// FLAGS
// =============================================================================

/// Parse a loose boolean token (`Yes`, `n`, `true`, `1`, ...).
fn parse_bool_token(token: &str) -> Option<bool> {
    match token.trim().to_ascii_uppercase().as_str() {
        "YES" | "Y" | "TRUE" | "1" => Some(true),
        "NO" | "N" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

/// Visitor shared by [`Flag`] and [`Bit`]: accepts strings, booleans and integers.
struct BoolTokenVisitor;

impl Visitor<'_> for BoolTokenVisitor {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Yes/No, Y/N, true/false or 1/0")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
        Ok(v != 0)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
        Ok(v != 0)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
        parse_bool_token(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

/// A boolean-like flag stored as the literal strings `"Yes"` / `"No"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Flag {
    Yes,
    #[default]
    No,
}

impl Flag {
    /// Convert a `bool` into a flag.
    #[must_use]
    pub const fn from_bool(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }

    /// `true` for [`Flag::Yes`].
    #[must_use]
    pub const fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }

    /// The document representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flag {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bool_token(s)
            .map(Self::from_bool)
            .ok_or_else(|| CfgError::invalid_enum("flag", s))
    }
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_any(BoolTokenVisitor)
            .map(Self::from_bool)
    }
}

/// A boolean flag the document stores as the integer `1` / `0`
/// (`RELATE`, `BREAK_RES`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Bit(pub bool);

impl Bit {
    /// `true` when set.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0
    }

    /// Yes/No rendering used by listings.
    #[must_use]
    pub const fn as_flag(self) -> Flag {
        Flag::from_bool(self.0)
    }
}

impl Serialize for Bit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(i64::from(self.0))
    }
}

impl<'de> Deserialize<'de> for Bit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BoolTokenVisitor).map(Bit)
    }
}

// =============================================================================
// FIXED ENUMERATIONS
// =============================================================================

/// The four kinds of feature functions; each has its own function, call and
/// (except standardization) call-element table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FunctionKind {
    Standardize,
    Expression,
    Comparison,
    Distinct,
}

impl FunctionKind {
    /// All kinds in cascade order (standardize first, comparison last).
    pub const ALL: [Self; 4] = [
        Self::Standardize,
        Self::Distinct,
        Self::Expression,
        Self::Comparison,
    ];

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Standardize => "standardization",
            Self::Expression => "expression",
            Self::Comparison => "comparison",
            Self::Distinct => "distinct",
        }
    }

    /// Table label of this kind's calls.
    #[must_use]
    pub const fn call_label(self) -> &'static str {
        match self {
            Self::Standardize => "standardize call",
            Self::Expression => "expression call",
            Self::Comparison => "comparison call",
            Self::Distinct => "distinct call",
        }
    }

    /// Table label of this kind's call-element links.
    #[must_use]
    pub const fn call_element_label(self) -> &'static str {
        match self {
            Self::Standardize => "standardize call element",
            Self::Expression => "expression call element",
            Self::Comparison => "comparison call element",
            Self::Distinct => "distinct call element",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Macro-free helper for the small upper-case enumerations below.
fn parse_upper<T: Copy>(
    field: &'static str,
    value: &str,
    table: &[(&'static str, T)],
) -> Result<T, CfgError> {
    let upper = value.trim().to_ascii_uppercase();
    table
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, v)| *v)
        .ok_or_else(|| CfgError::invalid_enum(field, value))
}

/// Attribute classes accepted by the attribute binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AttributeClass {
    Name,
    Attribute,
    Identifier,
    Address,
    Phone,
    Relationship,
    #[default]
    Other,
}

impl AttributeClass {
    const TABLE: [(&'static str, Self); 7] = [
        ("NAME", Self::Name),
        ("ATTRIBUTE", Self::Attribute),
        ("IDENTIFIER", Self::Identifier),
        ("ADDRESS", Self::Address),
        ("PHONE", Self::Phone),
        ("RELATIONSHIP", Self::Relationship),
        ("OTHER", Self::Other),
    ];

    /// Every class in listing order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::TABLE.iter().map(|(_, c)| *c)
    }

    /// The document representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, c)| *c == self)
            .map_or("OTHER", |(n, _)| *n)
    }
}

impl FromStr for AttributeClass {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_upper("attribute class", s, &Self::TABLE)
    }
}

impl fmt::Display for AttributeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an attribute's element must be present on incoming records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RequiredPolicy {
    Yes,
    #[default]
    No,
    Any,
    Desired,
}

impl RequiredPolicy {
    const TABLE: [(&'static str, Self); 4] = [
        ("YES", Self::Yes),
        ("NO", Self::No),
        ("ANY", Self::Any),
        ("DESIRED", Self::Desired),
    ];

    /// Title-case document representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
            Self::Any => "Any",
            Self::Desired => "Desired",
        }
    }
}

impl FromStr for RequiredPolicy {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_upper("required", s, &Self::TABLE)
    }
}

impl fmt::Display for RequiredPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DataType {
    Date,
    DateTime,
    Json,
    Number,
    #[default]
    String,
}

impl DataType {
    const TABLE: [(&'static str, Self); 5] = [
        ("DATE", Self::Date),
        ("DATETIME", Self::DateTime),
        ("JSON", Self::Json),
        ("NUMBER", Self::Number),
        ("STRING", Self::String),
    ];

    /// Upper-case document representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Json => "JSON",
            Self::Number => "NUMBER",
            Self::String => "STRING",
        }
    }
}

impl FromStr for DataType {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_upper("datatype", s, &Self::TABLE)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// What a failed reference was supposed to point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    FeatureClass,
    Feature,
    Element,
    Function(FunctionKind),
    Fragment,
    Disqualifier,
    EntityClass,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeatureClass => f.write_str("feature class"),
            Self::Feature => f.write_str("feature"),
            Self::Element => f.write_str("element"),
            Self::Function(kind) => write!(f, "{} function", kind),
            Self::Fragment => f.write_str("fragment"),
            Self::Disqualifier => f.write_str("disqualifier"),
            Self::EntityClass => f.write_str("entity class"),
        }
    }
}

/// Errors raised by the configuration engine.
///
/// Every variant except [`CfgError::Document`], [`CfgError::Invariant`],
/// [`CfgError::Io`] and [`CfgError::Storage`] is an ordinary input error:
/// the operation was refused and the store is unchanged.
#[derive(Debug, Error)]
pub enum CfgError {
    /// Lookup miss on an operation that requires the row to exist.
    #[error("{table} {key} not found")]
    NotFound { table: &'static str, key: String },

    /// An explicit id collides with an existing row.
    #[error("{table} id {id} already exists")]
    DuplicateId { table: &'static str, id: RowId },

    /// A code collides with an existing row.
    #[error("{table} {code} already exists")]
    DuplicateCode { table: &'static str, code: String },

    /// Every id above the table's largest one is taken.
    #[error("no {table} id left after {max}")]
    IdsExhausted { table: &'static str, max: RowId },

    /// A foreign code does not resolve.
    #[error("invalid {kind} reference: {code}")]
    InvalidReference { kind: RefKind, code: String },

    /// An element is not linked to the feature it was paired with.
    #[error("{element} is not an element of feature {feature}")]
    NotAMember { feature: String, element: String },

    /// An expression/comparison routine was configured with nothing to feed it.
    #[error("no elements marked \"{marker}\" for {kind} routine")]
    NoElementsMarked {
        kind: FunctionKind,
        marker: &'static str,
    },

    /// A value outside an allowed fixed set.
    #[error("invalid {field}: {value}")]
    InvalidEnum { field: &'static str, value: String },

    /// A structurally invalid request.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Attempt to delete a reserved row.
    #[error("can't delete {table} {code}")]
    ProtectedEntity { table: &'static str, code: String },

    /// Delete refused because other rows still reference the target.
    #[error("can't delete {code}, it is used by: {}", used_by.join(", "))]
    InUse { code: String, used_by: Vec<String> },

    /// The seed document could not be parsed.
    #[error("configuration document error: {0}")]
    Document(String),

    /// The store violates one of its own invariants.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// The relational mirror failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CfgError {
    /// Build an [`CfgError::InvalidEnum`].
    pub fn invalid_enum(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidEnum {
            field,
            value: value.into(),
        }
    }

    /// Build an [`CfgError::InvalidReference`].
    pub fn invalid_ref(kind: RefKind, code: impl Into<String>) -> Self {
        Self::InvalidReference {
            kind,
            code: code.into(),
        }
    }

    /// Build a [`CfgError::NotFound`].
    pub fn not_found(table: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            table,
            key: key.to_string(),
        }
    }

    /// `true` when the error means the configuration itself is unusable,
    /// as opposed to a refused request.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Document(_) | Self::Invariant(_) | Self::Io(_) | Self::Storage(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_loose_tokens() {
        for (raw, expected) in [
            ("\"Yes\"", Flag::Yes),
            ("\"y\"", Flag::Yes),
            ("\"no\"", Flag::No),
            ("true", Flag::Yes),
            ("0", Flag::No),
            ("1", Flag::Yes),
        ] {
            let flag: Flag = serde_json::from_str(raw).expect("parse flag");
            assert_eq!(flag, expected, "token {raw}");
        }
    }

    #[test]
    fn flag_serializes_as_literal_string() {
        let json = serde_json::to_string(&Flag::Yes).expect("serialize");
        assert_eq!(json, "\"Yes\"");
        let json = serde_json::to_string(&Flag::No).expect("serialize");
        assert_eq!(json, "\"No\"");
    }

    #[test]
    fn flag_rejects_garbage() {
        assert!(serde_json::from_str::<Flag>("\"maybe\"").is_err());
        assert!(matches!(
            "maybe".parse::<Flag>(),
            Err(CfgError::InvalidEnum { field: "flag", .. })
        ));
    }

    #[test]
    fn bit_stays_numeric() {
        let bit: Bit = serde_json::from_str("\"Yes\"").expect("parse");
        assert!(bit.is_set());
        assert_eq!(serde_json::to_string(&bit).expect("serialize"), "1");
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!(
            "identifier".parse::<AttributeClass>().expect("class"),
            AttributeClass::Identifier
        );
        assert_eq!(
            "desired".parse::<RequiredPolicy>().expect("required"),
            RequiredPolicy::Desired
        );
        assert_eq!(RequiredPolicy::Desired.as_str(), "Desired");
        assert_eq!("json".parse::<DataType>().expect("type"), DataType::Json);
        assert!("BOGUS".parse::<AttributeClass>().is_err());
    }

    #[test]
    fn attribute_class_listing_is_complete() {
        let names: Vec<_> = AttributeClass::all().map(AttributeClass::as_str).collect();
        assert_eq!(
            names,
            vec![
                "NAME",
                "ATTRIBUTE",
                "IDENTIFIER",
                "ADDRESS",
                "PHONE",
                "RELATIONSHIP",
                "OTHER"
            ]
        );
    }

    #[test]
    fn fatal_errors_are_distinguished() {
        assert!(CfgError::Invariant("x".into()).is_fatal());
        assert!(CfgError::Document("x".into()).is_fatal());
        assert!(!CfgError::MalformedInput("x".into()).is_fatal());
        assert!(!CfgError::not_found("feature", "X").is_fatal());
    }

    #[test]
    fn row_id_next_stops_at_max() {
        assert_eq!(RowId(1).next(), Some(RowId(2)));
        assert_eq!(RowId(i64::MAX).next(), None);
    }
}
