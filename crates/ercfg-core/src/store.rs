//! # Configuration Store
//!
//! The aggregate holding every configuration table.
//!
//! Tables are ordered row sequences; order only matters for deterministic
//! listings. Lookups are linear scans: configurations hold thousands of rows
//! at most and every operation touches a handful of tables.
//!
//! The store owns the `updated` flag. Every successful mutation sets it; the
//! persistence layer clears it after writing the document.

use crate::types::{
    Attribute, Call, CallElement, CfgError, DataSource, Element, EntityClass, EntityFeature,
    EntityType, Extra, Feature, FeatureClass, FeatureElement, Fragment, Function, FunctionKind,
    Keyed, RefKind, RelationshipType, RowId, Rule,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// TABLE
// =============================================================================

/// An ordered sequence of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table<T> {
    rows: Vec<T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T> Table<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing rows.
    #[must_use]
    pub fn from_rows(rows: Vec<T>) -> Self {
        Self { rows }
    }

    /// All rows in stored order.
    #[must_use]
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// Iterate rows in stored order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row matching `pred`.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.rows.iter().find(|row| pred(row))
    }

    /// First row matching `pred`, mutably.
    pub fn find_mut(&mut self, pred: impl Fn(&T) -> bool) -> Option<&mut T> {
        self.rows.iter_mut().find(|row| pred(row))
    }

    /// Every row matching `pred`, in table order. Matches are collected
    /// eagerly; the iterator does not borrow `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> std::vec::IntoIter<&T> {
        self.rows
            .iter()
            .filter(|row| pred(row))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// `true` if any row matches `pred`.
    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.rows.iter().any(pred)
    }

    pub(crate) fn push(&mut self, row: T) {
        self.rows.push(row);
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.rows.iter_mut()
    }

    /// Remove every row matching `pred`; returns how many were removed.
    pub(crate) fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !pred(row));
        before - self.rows.len()
    }

    pub(crate) fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Move every row of `other` to the end of this table.
    pub(crate) fn append(&mut self, mut other: Self) {
        self.rows.append(&mut other.rows);
    }
}

impl<T: Keyed> Table<T> {
    /// Row with the given id.
    #[must_use]
    pub fn by_id(&self, id: RowId) -> Option<&T> {
        self.rows.iter().find(|row| row.id() == id)
    }

    /// Row with the given code (codes are stored upper-case).
    #[must_use]
    pub fn by_code(&self, code: &str) -> Option<&T> {
        self.rows.iter().find(|row| row.code() == Some(code))
    }

    /// Look up by code, failing with [`CfgError::NotFound`].
    pub fn require(&self, code: &str) -> Result<&T, CfgError> {
        self.by_code(code)
            .ok_or_else(|| CfgError::not_found(T::LABEL, code))
    }

    /// Look up by code, failing with [`CfgError::InvalidReference`].
    pub fn resolve(&self, kind: RefKind, code: &str) -> Result<&T, CfgError> {
        self.by_code(code)
            .ok_or_else(|| CfgError::invalid_ref(kind, code))
    }

    /// Largest id in the table.
    #[must_use]
    pub fn max_id(&self) -> Option<RowId> {
        self.rows.iter().map(Keyed::id).max()
    }

    /// Rows sorted by id, for listings.
    #[must_use]
    pub fn sorted_by_id(&self) -> Vec<&T> {
        let mut rows: Vec<&T> = self.rows.iter().collect();
        rows.sort_by_key(|row| row.id());
        rows
    }

    /// First duplicated id or code, if any.
    fn duplicate_key(&self) -> Option<String> {
        let mut ids = BTreeSet::new();
        let mut codes = BTreeSet::new();
        for row in &self.rows {
            if !ids.insert(row.id()) {
                return Some(format!("{} id {}", T::LABEL, row.id()));
            }
            if let Some(code) = row.code() {
                if !codes.insert(code) {
                    return Some(format!("{} code {}", T::LABEL, code));
                }
            }
        }
        None
    }
}

impl<'a, T> IntoIterator for &'a Table<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// =============================================================================
// FUNCTION TABLES
// =============================================================================

/// The function, call and call-element tables of one [`FunctionKind`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionTables {
    pub(crate) functions: Table<Function>,
    pub(crate) calls: Table<Call>,
    pub(crate) elements: Table<CallElement>,
}

impl FunctionTables {
    /// Function catalog.
    #[must_use]
    pub fn functions(&self) -> &Table<Function> {
        &self.functions
    }

    /// Calls binding functions to features.
    #[must_use]
    pub fn calls(&self) -> &Table<Call> {
        &self.calls
    }

    /// Elements fed to the calls.
    #[must_use]
    pub fn elements(&self) -> &Table<CallElement> {
        &self.elements
    }

    /// The call owned by a feature, if any.
    #[must_use]
    pub fn call_for_feature(&self, feature_id: RowId) -> Option<&Call> {
        self.calls.find(|call| call.feature_id == feature_id)
    }

    /// Ids of every call owned by a feature.
    #[must_use]
    pub fn call_ids_for_feature(&self, feature_id: RowId) -> BTreeSet<RowId> {
        self.calls
            .filter(|call| call.feature_id == feature_id)
            .map(|call| call.id)
            .collect()
    }

    /// Elements linked to a call, in exec order.
    #[must_use]
    pub fn elements_of_call(&self, call_id: RowId) -> Vec<&CallElement> {
        let mut links: Vec<&CallElement> =
            self.elements.filter(|link| link.call_id == call_id).collect();
        links.sort_by_key(|link| link.exec_order);
        links
    }

    /// Highest exec order used by a call's elements (0 when it has none).
    #[must_use]
    pub fn max_exec_order(&self, call_id: RowId) -> i64 {
        self.elements
            .filter(|link| link.call_id == call_id)
            .map(|link| link.exec_order)
            .max()
            .unwrap_or(0)
    }
}

/// Distinct calls set aside while distinct processing is off.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParkedDistinct {
    pub(crate) calls: Table<Call>,
    pub(crate) elements: Table<CallElement>,
}

impl ParkedDistinct {
    /// Parked calls.
    #[must_use]
    pub fn calls(&self) -> &Table<Call> {
        &self.calls
    }

    /// Parked call elements.
    #[must_use]
    pub fn elements(&self) -> &Table<CallElement> {
        &self.elements
    }
}

// =============================================================================
// CONFIGURATION STORE
// =============================================================================

/// Every table of one configuration plus the `updated` flag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigStore {
    pub(crate) data_sources: Table<DataSource>,
    pub(crate) entity_classes: Table<EntityClass>,
    pub(crate) entity_types: Table<EntityType>,
    pub(crate) feature_classes: Table<FeatureClass>,
    pub(crate) features: Table<Feature>,
    pub(crate) elements: Table<Element>,
    pub(crate) feature_elements: Table<FeatureElement>,
    pub(crate) entity_features: Table<EntityFeature>,
    pub(crate) standardize: FunctionTables,
    pub(crate) expression: FunctionTables,
    pub(crate) comparison: FunctionTables,
    pub(crate) distinct: FunctionTables,
    pub(crate) attributes: Table<Attribute>,
    pub(crate) relationship_types: Table<RelationshipType>,
    pub(crate) fragments: Table<Fragment>,
    pub(crate) rules: Table<Rule>,
    pub(crate) parked_distinct: Option<ParkedDistinct>,
    /// Top-level tables this engine does not model, kept verbatim.
    pub(crate) other_tables: Extra,
    updated: bool,
}

impl ConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Mutation state
    // -------------------------------------------------------------------------

    /// `true` once any mutation succeeded since load or the last save.
    #[must_use]
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Called by the persistence layer after the document was written.
    pub fn clear_updated(&mut self) {
        self.updated = false;
    }

    pub(crate) fn mark_updated(&mut self) {
        self.updated = true;
    }

    // -------------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn data_sources(&self) -> &Table<DataSource> {
        &self.data_sources
    }

    #[must_use]
    pub fn entity_classes(&self) -> &Table<EntityClass> {
        &self.entity_classes
    }

    #[must_use]
    pub fn entity_types(&self) -> &Table<EntityType> {
        &self.entity_types
    }

    #[must_use]
    pub fn feature_classes(&self) -> &Table<FeatureClass> {
        &self.feature_classes
    }

    #[must_use]
    pub fn features(&self) -> &Table<Feature> {
        &self.features
    }

    #[must_use]
    pub fn elements(&self) -> &Table<Element> {
        &self.elements
    }

    #[must_use]
    pub fn feature_elements(&self) -> &Table<FeatureElement> {
        &self.feature_elements
    }

    #[must_use]
    pub fn entity_features(&self) -> &Table<EntityFeature> {
        &self.entity_features
    }

    #[must_use]
    pub fn attributes(&self) -> &Table<Attribute> {
        &self.attributes
    }

    #[must_use]
    pub fn relationship_types(&self) -> &Table<RelationshipType> {
        &self.relationship_types
    }

    #[must_use]
    pub fn fragments(&self) -> &Table<Fragment> {
        &self.fragments
    }

    #[must_use]
    pub fn rules(&self) -> &Table<Rule> {
        &self.rules
    }

    /// Distinct calls parked by `set_distinct(false)`, if any.
    #[must_use]
    pub fn parked_distinct(&self) -> Option<&ParkedDistinct> {
        self.parked_distinct.as_ref()
    }

    /// Tables of one function kind.
    #[must_use]
    pub fn functions(&self, kind: FunctionKind) -> &FunctionTables {
        match kind {
            FunctionKind::Standardize => &self.standardize,
            FunctionKind::Expression => &self.expression,
            FunctionKind::Comparison => &self.comparison,
            FunctionKind::Distinct => &self.distinct,
        }
    }

    pub(crate) fn functions_mut(&mut self, kind: FunctionKind) -> &mut FunctionTables {
        match kind {
            FunctionKind::Standardize => &mut self.standardize,
            FunctionKind::Expression => &mut self.expression,
            FunctionKind::Comparison => &mut self.comparison,
            FunctionKind::Distinct => &mut self.distinct,
        }
    }

    /// The tables new calls of `kind` are written to. Distinct calls go to
    /// the parked set while distinct processing is off, so adding a feature
    /// never switches it back on.
    pub(crate) fn call_rows_mut(
        &mut self,
        kind: FunctionKind,
    ) -> (&mut Table<Call>, &mut Table<CallElement>) {
        let Self {
            standardize,
            expression,
            comparison,
            distinct,
            parked_distinct,
            ..
        } = self;
        let tables = match kind {
            FunctionKind::Standardize => standardize,
            FunctionKind::Expression => expression,
            FunctionKind::Comparison => comparison,
            FunctionKind::Distinct if distinct.calls.is_empty() => {
                let parked = parked_distinct.get_or_insert_with(ParkedDistinct::default);
                return (&mut parked.calls, &mut parked.elements);
            }
            FunctionKind::Distinct => distinct,
        };
        (&mut tables.calls, &mut tables.elements)
    }

    // -------------------------------------------------------------------------
    // Compound lookups
    // -------------------------------------------------------------------------

    /// The feature-element link for a pair, if present.
    #[must_use]
    pub fn feature_element(&self, feature_id: RowId, element_id: RowId) -> Option<&FeatureElement> {
        self.feature_elements
            .find(|link| link.feature_id == feature_id && link.element_id == element_id)
    }

    /// Element links of a feature, in exec order.
    #[must_use]
    pub fn elements_of_feature(&self, feature_id: RowId) -> Vec<&FeatureElement> {
        let mut links: Vec<&FeatureElement> = self
            .feature_elements
            .filter(|link| link.feature_id == feature_id)
            .collect();
        links.sort_by_key(|link| link.exec_order);
        links
    }

    /// Codes of the features that use an element, deduplicated in link order.
    #[must_use]
    pub fn features_using_element(&self, element_id: RowId) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for link in self.feature_elements.filter(|link| link.element_id == element_id) {
            if let Some(feature) = self.features.by_id(link.feature_id) {
                if !codes.contains(&feature.code) {
                    codes.push(feature.code.clone());
                }
            }
        }
        codes
    }

    /// The name hasher's expression call, if configured.
    #[must_use]
    pub fn name_hasher_call(&self) -> Option<&Call> {
        let function = self
            .expression
            .functions
            .by_code(crate::primitives::NAME_HASHER)?;
        self.expression
            .calls
            .find(|call| call.function_id == function.id)
    }

    // -------------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------------

    /// Check that ids and codes are unique in every keyed table.
    ///
    /// Returns [`CfgError::Invariant`] naming the first collision.
    pub fn verify_keys(&self) -> Result<(), CfgError> {
        let collision = self
            .data_sources
            .duplicate_key()
            .or_else(|| self.entity_classes.duplicate_key())
            .or_else(|| self.entity_types.duplicate_key())
            .or_else(|| self.feature_classes.duplicate_key())
            .or_else(|| self.features.duplicate_key())
            .or_else(|| self.elements.duplicate_key())
            .or_else(|| self.attributes.duplicate_key())
            .or_else(|| self.relationship_types.duplicate_key())
            .or_else(|| self.fragments.duplicate_key())
            .or_else(|| self.rules.duplicate_key())
            .or_else(|| {
                FunctionKind::ALL.iter().find_map(|kind| {
                    let tables = self.functions(*kind);
                    tables
                        .functions
                        .duplicate_key()
                        .or_else(|| tables.calls.duplicate_key())
                        .map(|key| format!("{kind} {key}"))
                })
            });

        match collision {
            Some(key) => Err(CfgError::Invariant(format!("duplicate {key}"))),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seed_store;

    #[test]
    fn lookup_by_code_and_id() {
        let store = seed_store();
        let name = store.features().by_code("NAME").expect("NAME feature");
        assert_eq!(store.features().by_id(name.id).map(|f| f.code.as_str()), Some("NAME"));
        assert!(store.features().by_code("name").is_none());
    }

    #[test]
    fn require_reports_not_found() {
        let store = seed_store();
        let err = store.features().require("MISSING").expect_err("missing");
        assert!(matches!(err, CfgError::NotFound { table: "feature", .. }));
    }

    #[test]
    fn remove_where_counts_rows() {
        let mut table = Table::from_rows(vec![1, 2, 3, 4]);
        assert_eq!(table.remove_where(|v| v % 2 == 0), 2);
        assert_eq!(table.rows(), &[1, 3]);
    }

    #[test]
    fn filter_outlives_its_predicate() {
        let table = Table::from_rows(vec![1, 2, 3, 4]);
        let evens = {
            let modulus = 2;
            table.filter(|v| v % modulus == 0)
        };
        assert_eq!(evens.copied().collect::<Vec<_>>(), vec![2, 4]);
    }

    #[test]
    fn name_hasher_call_is_found() {
        let store = seed_store();
        let call = store.name_hasher_call().expect("name hasher call");
        let function = store
            .functions(FunctionKind::Expression)
            .functions()
            .by_id(call.function_id)
            .expect("function");
        assert_eq!(function.code, "NAME_HASHER");
    }

    #[test]
    fn seed_store_has_unique_keys() {
        seed_store().verify_keys().expect("seed is consistent");
    }

    #[test]
    fn duplicate_codes_are_an_invariant_violation() {
        let mut store = seed_store();
        let copy = store.features.rows()[0].clone();
        store.features.push(copy);
        let err = store.verify_keys().expect_err("duplicate");
        assert!(err.is_fatal());
    }

    #[test]
    fn features_using_element_lists_each_feature_once() {
        let store = seed_store();
        let element = store.elements().by_code("FULL_NAME").expect("element");
        assert_eq!(store.features_using_element(element.id), vec!["NAME".to_string()]);
    }
}
