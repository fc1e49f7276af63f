//! # Configuration Document
//!
//! A configuration is one JSON object under a `G2_CONFIG` root whose fields
//! are table names (`CFG_DSRC`, `CFG_FTYPE`, ...) holding arrays of rows.
//!
//! The four function kinds store their functions, calls and call elements in
//! separate tables with kind-prefixed column names (`CFUNC_ID`,
//! `EFCALL_ID`, ...). Rows are typed with neutral column names, so this
//! module renames those columns on the way in and back on the way out.
//!
//! Tables the engine does not model are carried through verbatim.
//!
//! ## Output
//!
//! [`to_pretty_string`] sorts keys recursively and indents with four spaces,
//! so unchanged configurations serialize byte-for-byte identically.

use crate::primitives::{DOCUMENT_ROOT, MAX_DOCUMENT_SIZE};
use crate::store::{ConfigStore, FunctionTables, ParkedDistinct, Table};
use crate::types::{CfgError, FunctionKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

// =============================================================================
// TABLE NAMES
// =============================================================================

/// Every modelled table, parents before children.
pub const TABLE_ORDER: [&str; 23] = [
    "CFG_DSRC",
    "CFG_ECLASS",
    "CFG_ETYPE",
    "CFG_FCLASS",
    "CFG_FTYPE",
    "CFG_FELEM",
    "CFG_FBOM",
    "CFG_EBOM",
    "CFG_SFUNC",
    "CFG_EFUNC",
    "CFG_CFUNC",
    "CFG_DFUNC",
    "CFG_SFCALL",
    "CFG_EFCALL",
    "CFG_EFBOM",
    "CFG_CFCALL",
    "CFG_CFBOM",
    "CFG_DFCALL",
    "CFG_DFBOM",
    "CFG_ATTR",
    "CFG_RTYPE",
    "CFG_ERFRAG",
    "CFG_ERRULE",
];

/// Parked distinct calls (distinct processing switched off).
const PARKED_CALLS: &str = "XXX_DFCALL";
/// Parked distinct call elements.
const PARKED_ELEMENTS: &str = "XXX_DFBOM";

/// Document column name paired with the neutral name used by the row types.
type Columns = Vec<(String, &'static str)>;

/// Table and column names of one function kind.
struct KindLayout {
    functions: &'static str,
    calls: &'static str,
    elements: Option<&'static str>,
    prefix: &'static str,
}

impl KindLayout {
    const fn of(kind: FunctionKind) -> Self {
        match kind {
            FunctionKind::Standardize => Self {
                functions: "CFG_SFUNC",
                calls: "CFG_SFCALL",
                elements: None,
                prefix: "S",
            },
            FunctionKind::Expression => Self {
                functions: "CFG_EFUNC",
                calls: "CFG_EFCALL",
                elements: Some("CFG_EFBOM"),
                prefix: "E",
            },
            FunctionKind::Comparison => Self {
                functions: "CFG_CFUNC",
                calls: "CFG_CFCALL",
                elements: Some("CFG_CFBOM"),
                prefix: "C",
            },
            FunctionKind::Distinct => Self {
                functions: "CFG_DFUNC",
                calls: "CFG_DFCALL",
                elements: Some("CFG_DFBOM"),
                prefix: "D",
            },
        }
    }

    fn function_columns(&self) -> Columns {
        vec![
            (format!("{}FUNC_ID", self.prefix), "FUNC_ID"),
            (format!("{}FUNC_CODE", self.prefix), "FUNC_CODE"),
        ]
    }

    fn call_columns(&self) -> Columns {
        vec![
            (format!("{}FCALL_ID", self.prefix), "CALL_ID"),
            (format!("{}FUNC_ID", self.prefix), "FUNC_ID"),
        ]
    }

    fn element_columns(&self) -> Columns {
        vec![(format!("{}FCALL_ID", self.prefix), "CALL_ID")]
    }
}

// =============================================================================
// COLUMN MAPPING
// =============================================================================

#[derive(Clone, Copy)]
enum Direction {
    /// Document names to neutral names.
    Load,
    /// Neutral names to document names.
    Save,
}

fn rename_columns(row: Value, columns: &Columns, direction: Direction) -> Value {
    let Value::Object(fields) = row else {
        return row;
    };
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| {
                let renamed = columns.iter().find_map(|(document, neutral)| match direction {
                    Direction::Load => (key == *document).then(|| (*neutral).to_string()),
                    Direction::Save => (key == *neutral).then(|| document.clone()),
                });
                (renamed.unwrap_or(key), value)
            })
            .collect(),
    )
}

fn take_table<T: DeserializeOwned>(
    tables: &mut Map<String, Value>,
    name: &str,
    columns: &Columns,
) -> Result<Table<T>, CfgError> {
    let rows = match tables.remove(name) {
        None | Some(Value::Null) => return Ok(Table::new()),
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(CfgError::Document(format!("{name} is not an array"))),
    };
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(rename_columns(row, columns, Direction::Load))
                .map_err(|e| CfgError::Document(format!("{name}: {e}")))
        })
        .collect::<Result<Vec<T>, CfgError>>()
        .map(Table::from_rows)
}

fn put_table<T: Serialize>(
    tables: &mut Map<String, Value>,
    name: &str,
    table: &Table<T>,
    columns: &Columns,
) -> Result<(), CfgError> {
    let rows = table
        .iter()
        .map(|row| {
            serde_json::to_value(row)
                .map(|value| rename_columns(value, columns, Direction::Save))
                .map_err(|e| CfgError::Document(format!("{name}: {e}")))
        })
        .collect::<Result<Vec<Value>, CfgError>>()?;
    tables.insert(name.to_string(), Value::Array(rows));
    Ok(())
}

// =============================================================================
// LOAD
// =============================================================================

/// Build a store from the tables under the document root.
///
/// Ids and codes must be unique per table; a collision is
/// [`CfgError::Invariant`].
pub fn from_tables(mut tables: Map<String, Value>) -> Result<ConfigStore, CfgError> {
    let plain = Columns::new();
    let mut store = ConfigStore::new();

    store.data_sources = take_table(&mut tables, "CFG_DSRC", &plain)?;
    store.entity_classes = take_table(&mut tables, "CFG_ECLASS", &plain)?;
    store.entity_types = take_table(&mut tables, "CFG_ETYPE", &plain)?;
    store.feature_classes = take_table(&mut tables, "CFG_FCLASS", &plain)?;
    store.features = take_table(&mut tables, "CFG_FTYPE", &plain)?;
    store.elements = take_table(&mut tables, "CFG_FELEM", &plain)?;
    store.feature_elements = take_table(&mut tables, "CFG_FBOM", &plain)?;
    store.entity_features = take_table(&mut tables, "CFG_EBOM", &plain)?;
    store.attributes = take_table(&mut tables, "CFG_ATTR", &plain)?;
    store.relationship_types = take_table(&mut tables, "CFG_RTYPE", &plain)?;
    store.fragments = take_table(&mut tables, "CFG_ERFRAG", &plain)?;
    store.rules = take_table(&mut tables, "CFG_ERRULE", &plain)?;

    for kind in FunctionKind::ALL {
        let layout = KindLayout::of(kind);
        let loaded = FunctionTables {
            functions: take_table(&mut tables, layout.functions, &layout.function_columns())?,
            calls: take_table(&mut tables, layout.calls, &layout.call_columns())?,
            elements: match layout.elements {
                Some(name) => take_table(&mut tables, name, &layout.element_columns())?,
                None => Table::new(),
            },
        };
        *store.functions_mut(kind) = loaded;
    }

    if tables.contains_key(PARKED_CALLS) {
        let layout = KindLayout::of(FunctionKind::Distinct);
        store.parked_distinct = Some(ParkedDistinct {
            calls: take_table(&mut tables, PARKED_CALLS, &layout.call_columns())?,
            elements: take_table(&mut tables, PARKED_ELEMENTS, &layout.element_columns())?,
        });
    }

    store.other_tables = tables;
    store.verify_keys()?;
    Ok(store)
}

/// Build a store from a whole document value.
pub fn from_value(document: Value) -> Result<ConfigStore, CfgError> {
    let Value::Object(mut root) = document else {
        return Err(CfgError::Document("document is not a JSON object".to_string()));
    };
    match root.remove(DOCUMENT_ROOT) {
        Some(Value::Object(tables)) => from_tables(tables),
        Some(_) => Err(CfgError::Document(format!("{DOCUMENT_ROOT} is not an object"))),
        None => Err(CfgError::Document(format!("missing {DOCUMENT_ROOT} root"))),
    }
}

/// Parse a document from JSON text.
///
/// Text larger than [`MAX_DOCUMENT_SIZE`] is rejected before parsing.
pub fn from_str(text: &str) -> Result<ConfigStore, CfgError> {
    if text.len() > MAX_DOCUMENT_SIZE {
        return Err(CfgError::Document(format!(
            "document is {} bytes, limit is {MAX_DOCUMENT_SIZE}",
            text.len()
        )));
    }
    let document: Value =
        serde_json::from_str(text).map_err(|e| CfgError::Document(e.to_string()))?;
    from_value(document)
}

// =============================================================================
// SAVE
// =============================================================================

/// Every table of the store, keyed by document table name.
pub fn to_tables(store: &ConfigStore) -> Result<Map<String, Value>, CfgError> {
    let plain = Columns::new();
    let mut tables = store.other_tables.clone();

    put_table(&mut tables, "CFG_DSRC", &store.data_sources, &plain)?;
    put_table(&mut tables, "CFG_ECLASS", &store.entity_classes, &plain)?;
    put_table(&mut tables, "CFG_ETYPE", &store.entity_types, &plain)?;
    put_table(&mut tables, "CFG_FCLASS", &store.feature_classes, &plain)?;
    put_table(&mut tables, "CFG_FTYPE", &store.features, &plain)?;
    put_table(&mut tables, "CFG_FELEM", &store.elements, &plain)?;
    put_table(&mut tables, "CFG_FBOM", &store.feature_elements, &plain)?;
    put_table(&mut tables, "CFG_EBOM", &store.entity_features, &plain)?;
    put_table(&mut tables, "CFG_ATTR", &store.attributes, &plain)?;
    put_table(&mut tables, "CFG_RTYPE", &store.relationship_types, &plain)?;
    put_table(&mut tables, "CFG_ERFRAG", &store.fragments, &plain)?;
    put_table(&mut tables, "CFG_ERRULE", &store.rules, &plain)?;

    for kind in FunctionKind::ALL {
        let layout = KindLayout::of(kind);
        let kind_tables = store.functions(kind);
        put_table(&mut tables, layout.functions, &kind_tables.functions, &layout.function_columns())?;
        put_table(&mut tables, layout.calls, &kind_tables.calls, &layout.call_columns())?;
        if let Some(name) = layout.elements {
            put_table(&mut tables, name, &kind_tables.elements, &layout.element_columns())?;
        }
    }

    if let Some(parked) = &store.parked_distinct {
        let layout = KindLayout::of(FunctionKind::Distinct);
        put_table(&mut tables, PARKED_CALLS, &parked.calls, &layout.call_columns())?;
        put_table(&mut tables, PARKED_ELEMENTS, &parked.elements, &layout.element_columns())?;
    }

    Ok(tables)
}

/// The whole document, `{"G2_CONFIG": {...}}`.
pub fn to_value(store: &ConfigStore) -> Result<Value, CfgError> {
    let mut root = Map::new();
    root.insert(DOCUMENT_ROOT.to_string(), Value::Object(to_tables(store)?));
    Ok(Value::Object(root))
}

/// Recursively sort object keys.
#[must_use]
pub fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut sorted: Vec<(String, Value)> = fields.into_iter().collect();
            sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// The saved form: sorted keys, four-space indentation.
pub fn to_pretty_string(store: &ConfigStore) -> Result<String, CfgError> {
    let document = sort_keys(to_value(store)?);
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    document
        .serialize(&mut serializer)
        .map_err(|e| CfgError::Document(e.to_string()))?;
    String::from_utf8(out).map_err(|e| CfgError::Document(e.to_string()))
}

/// BLAKE3 digest of the saved form, hex encoded.
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
pub fn document_hash(store: &ConfigStore) -> Result<String, CfgError> {
    let text = to_pretty_string(store)?;
    Ok(blake3::hash(text.as_bytes()).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SEED_DOCUMENT, seed_store};
    use serde_json::json;

    #[test]
    fn seed_round_trips_through_value() {
        let store = seed_store();
        let reloaded = from_value(to_value(&store).expect("to value")).expect("reload");
        assert_eq!(reloaded, store);
        assert!(!reloaded.is_updated());
    }

    #[test]
    fn kind_columns_are_renamed() {
        let store = seed_store();
        let tables = to_tables(&store).expect("tables");
        let call = &tables["CFG_CFCALL"][0];
        assert!(call.get("CFCALL_ID").is_some());
        assert!(call.get("CFUNC_ID").is_some());
        assert!(call.get("CALL_ID").is_none());
        assert!(tables["CFG_EFUNC"][0].get("EFUNC_CODE").is_some());
        assert!(tables.get("CFG_SFBOM").is_none());
    }

    #[test]
    fn unknown_tables_and_fields_survive() {
        let original: Value = serde_json::from_str(SEED_DOCUMENT).expect("seed json");
        let store = from_value(original.clone()).expect("load");
        let saved = to_value(&store).expect("save");
        assert_eq!(saved[DOCUMENT_ROOT]["SYS_OOM"], original[DOCUMENT_ROOT]["SYS_OOM"]);
        assert_eq!(
            saved[DOCUMENT_ROOT]["CFG_FELEM"][0]["FELEM_DESC"],
            original[DOCUMENT_ROOT]["CFG_FELEM"][0]["FELEM_DESC"]
        );
    }

    #[test]
    fn flags_stay_yes_no_strings() {
        let store = seed_store();
        let saved = to_value(&store).expect("save");
        assert_eq!(saved[DOCUMENT_ROOT]["CFG_ECLASS"][0]["RESOLVE"], json!("Yes"));
        assert_eq!(saved[DOCUMENT_ROOT]["CFG_RTYPE"][0]["BREAK_RES"], json!(0));
    }

    #[test]
    fn parked_distinct_is_written_and_reloaded() {
        let mut store = seed_store();
        store.set_distinct(false).expect("off");
        let saved = to_value(&store).expect("save");
        assert!(saved[DOCUMENT_ROOT]["XXX_DFCALL"][0].get("DFCALL_ID").is_some());
        assert_eq!(saved[DOCUMENT_ROOT]["CFG_DFCALL"], json!([]));

        let mut reloaded = from_value(saved).expect("reload");
        assert!(!reloaded.is_distinct_on());
        reloaded.set_distinct(true).expect("restore");
        assert!(reloaded.is_distinct_on());
    }

    #[test]
    fn pretty_output_is_sorted_and_indented() {
        let text = to_pretty_string(&seed_store()).expect("pretty");
        assert!(text.starts_with("{\n    \"G2_CONFIG\": {\n        \"CFG_ATTR\""));
        assert_eq!(from_str(&text).expect("reparse"), seed_store());
    }

    #[test]
    fn malformed_documents_are_fatal() {
        for text in ["[]", "{}", "{\"G2_CONFIG\": []}", "{\"G2_CONFIG\": {\"CFG_FTYPE\": {}}}", "not json"] {
            let err = from_str(text).expect_err(text);
            assert!(matches!(err, CfgError::Document(_)), "{text}");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn duplicate_ids_are_an_invariant_violation() {
        let err = from_value(json!({"G2_CONFIG": {"CFG_FCLASS": [
            {"FCLASS_ID": 1, "FCLASS_CODE": "NAME"},
            {"FCLASS_ID": 1, "FCLASS_CODE": "OTHER"}
        ]}}))
        .expect_err("duplicate");
        assert!(matches!(err, CfgError::Invariant(_)));
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn hash_is_stable() {
        let a = document_hash(&seed_store()).expect("hash");
        let b = document_hash(&seed_store()).expect("hash");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
