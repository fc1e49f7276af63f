//! # Cascading Delete Engine
//!
//! Removes a row and every row that depends on it. Each delete is an ordered
//! list of steps, children first, run through [`Cascade`]; the returned
//! [`Deletion`] records how many rows each step removed.
//!
//! All checks (protection, existence, references that block the delete) run
//! before the first step.

use crate::primitives::PROTECTED_FEATURES;
use crate::request::{FeatureElementRef, require_code};
use crate::store::ConfigStore;
use crate::types::{CfgError, FunctionKind, RowId};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeSet;
use tracing::{debug, info};

// =============================================================================
// DELETION REPORT
// =============================================================================

/// Rows removed by one delete, per table, in removal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deletion {
    removed: Vec<(&'static str, usize)>,
}

impl Deletion {
    /// `(table, rows)` pairs for every step that removed something.
    #[must_use]
    pub fn tables(&self) -> &[(&'static str, usize)] {
        &self.removed
    }

    /// Rows removed from one table.
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        self.removed
            .iter()
            .filter(|(label, _)| *label == table)
            .map(|(_, rows)| rows)
            .sum()
    }

    /// Rows removed in total.
    #[must_use]
    pub fn total(&self) -> usize {
        self.removed.iter().map(|(_, rows)| rows).sum()
    }
}

/// Serializes as `{"<table>": rows, ...}` in removal order.
impl Serialize for Deletion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.removed.len()))?;
        for (table, rows) in &self.removed {
            map.serialize_entry(table, rows)?;
        }
        map.end()
    }
}

/// Runs the steps of one delete against the store.
pub(crate) struct Cascade<'s> {
    store: &'s mut ConfigStore,
    deletion: Deletion,
}

impl<'s> Cascade<'s> {
    pub(crate) fn new(store: &'s mut ConfigStore) -> Self {
        Self {
            store,
            deletion: Deletion::default(),
        }
    }

    /// Run one removal step.
    pub(crate) fn step(
        mut self,
        table: &'static str,
        remove: impl FnOnce(&mut ConfigStore) -> usize,
    ) -> Self {
        let rows = remove(self.store);
        if rows > 0 {
            debug!(table, rows, "rows removed");
            self.deletion.removed.push((table, rows));
        }
        self
    }

    /// Mark the store updated when anything was removed.
    pub(crate) fn finish(self) -> Deletion {
        if self.deletion.total() > 0 {
            self.store.mark_updated();
        }
        self.deletion
    }
}

impl ConfigStore {
    // =========================================================================
    // FEATURES
    // =========================================================================

    /// Delete a feature with its calls, call-element links, element links,
    /// entity-type links and attributes.
    pub fn delete_feature(&mut self, code: &str) -> Result<Deletion, CfgError> {
        let code = require_code("feature", code)?;
        if PROTECTED_FEATURES.contains(&code.as_str()) {
            return Err(CfgError::ProtectedEntity {
                table: "feature",
                code,
            });
        }
        let feature_id = self.features.require(&code)?.id;

        let calls = |kind: FunctionKind, store: &ConfigStore| -> BTreeSet<RowId> {
            store.functions(kind).call_ids_for_feature(feature_id)
        };
        let distinct = calls(FunctionKind::Distinct, self);
        let expression = calls(FunctionKind::Expression, self);
        let comparison = calls(FunctionKind::Comparison, self);
        let parked: BTreeSet<RowId> = self
            .parked_distinct
            .as_ref()
            .map(|parked| {
                parked
                    .calls
                    .filter(|call| call.feature_id == feature_id)
                    .map(|call| call.id)
                    .collect()
            })
            .unwrap_or_default();

        let deletion = Cascade::new(self)
            .step("standardize call", |s| {
                s.standardize.calls.remove_where(|call| call.feature_id == feature_id)
            })
            .step("distinct call element", |s| {
                s.distinct
                    .elements
                    .remove_where(|link| distinct.contains(&link.call_id))
            })
            .step("distinct call", |s| {
                s.distinct.calls.remove_where(|call| distinct.contains(&call.id))
            })
            .step("parked distinct call", |s| match s.parked_distinct.as_mut() {
                Some(p) => {
                    p.elements.remove_where(|link| parked.contains(&link.call_id))
                        + p.calls.remove_where(|call| parked.contains(&call.id))
                }
                None => 0,
            })
            // Also drops links that read this feature's elements into other
            // features' calls, such as the name hasher.
            .step("expression call element", |s| {
                s.expression.elements.remove_where(|link| {
                    expression.contains(&link.call_id) || link.feature_id == feature_id
                })
            })
            .step("expression call", |s| {
                s.expression.calls.remove_where(|call| expression.contains(&call.id))
            })
            .step("comparison call element", |s| {
                s.comparison
                    .elements
                    .remove_where(|link| comparison.contains(&link.call_id))
            })
            .step("comparison call", |s| {
                s.comparison.calls.remove_where(|call| comparison.contains(&call.id))
            })
            .step("feature element", |s| {
                s.feature_elements.remove_where(|link| link.feature_id == feature_id)
            })
            .step("entity feature", |s| {
                s.entity_features.remove_where(|link| link.feature_id == feature_id)
            })
            .step("attribute", |s| {
                s.attributes
                    .remove_where(|attr| attr.feature_code() == Some(code.as_str()))
            })
            .step("feature", |s| s.features.remove_where(|f| f.id == feature_id))
            .finish();

        info!(table = "feature", code = %code, rows = deletion.total(), "feature deleted");
        Ok(deletion)
    }

    // =========================================================================
    // ELEMENTS
    // =========================================================================

    /// Delete an element no feature uses.
    pub fn delete_element(&mut self, code: &str) -> Result<Deletion, CfgError> {
        let code = require_code("element", code)?;
        let element_id = self.elements.require(&code)?.id;
        let used_by = self.features_using_element(element_id);
        if !used_by.is_empty() {
            return Err(CfgError::InUse { code, used_by });
        }

        let deletion = Cascade::new(self)
            .step("element", |s| s.elements.remove_where(|e| e.id == element_id))
            .finish();
        info!(table = "element", code = %code, "element deleted");
        Ok(deletion)
    }

    /// Unlink an element from a feature, including every call-element link
    /// reading that pair.
    pub fn delete_element_from_feature(
        &mut self,
        pair: &FeatureElementRef,
    ) -> Result<Deletion, CfgError> {
        let feature_code = require_code("feature", &pair.feature)?;
        let element_code = require_code("element", &pair.element)?;
        let feature_id = self.features.require(&feature_code)?.id;
        let element_id = self.elements.require(&element_code)?.id;

        if self.feature_element(feature_id, element_id).is_none() {
            return Err(CfgError::NotAMember {
                feature: feature_code,
                element: element_code,
            });
        }
        let bound: Vec<String> = self
            .attributes
            .filter(|attr| {
                attr.feature_code() == Some(feature_code.as_str())
                    && attr.element_code() == Some(element_code.as_str())
            })
            .map(|attr| attr.code.clone())
            .collect();
        if !bound.is_empty() {
            return Err(CfgError::InUse {
                code: format!("{feature_code}/{element_code}"),
                used_by: bound,
            });
        }

        let reads_pair = move |f: RowId, e: RowId| f == feature_id && e == element_id;
        let mut cascade = Cascade::new(self).step("feature element", |s| {
            s.feature_elements
                .remove_where(|link| reads_pair(link.feature_id, link.element_id))
        });
        for kind in FunctionKind::ALL {
            cascade = cascade.step(kind.call_element_label(), |s| {
                s.functions_mut(kind)
                    .elements
                    .remove_where(|link| reads_pair(link.feature_id, link.element_id))
            });
        }
        let deletion = cascade
            .step("parked distinct call element", |s| match s.parked_distinct.as_mut() {
                Some(p) => p
                    .elements
                    .remove_where(|link| reads_pair(link.feature_id, link.element_id)),
                None => 0,
            })
            .finish();

        info!(feature = %feature_code, element = %element_code, rows = deletion.total(), "element removed from feature");
        Ok(deletion)
    }
}

// =============================================================================
// TESTS
// =============================================================================
