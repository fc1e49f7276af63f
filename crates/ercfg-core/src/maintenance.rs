//! # Feature Maintenance
//!
//! Reading a feature back as one view, scalar updates to an existing
//! feature, distinct processing on/off, and the expression call report.

use crate::behavior::Behavior;
use crate::request::{FeatureUpdate, optional_code, require_code};
use crate::store::{ConfigStore, ParkedDistinct};
use crate::types::{CfgError, Feature, Flag, FunctionKind, RefKind, RowId};
use serde::Serialize;
use tracing::info;

// =============================================================================
// VIEWS
// =============================================================================

/// A feature with its class, functions and elements resolved to codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureView {
    pub id: RowId,
    pub feature: String,
    pub class: String,
    pub behavior: String,
    pub anonymize: Flag,
    pub candidates: Flag,
    pub standardize: String,
    pub expression: String,
    pub comparison: String,
    #[serde(rename = "elementList")]
    pub elements: Vec<FeatureElementView>,
}

/// One element of a [`FeatureView`]. Features without expression or
/// comparison calls list bare codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FeatureElementView {
    Code(String),
    Detail {
        element: String,
        expressed: Flag,
        compared: Flag,
    },
}

/// One expression call-element link, resolved to codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionCallReport {
    pub id: RowId,
    pub feature: String,
    pub function: String,
    pub order: i64,
    pub from_feature: String,
    pub from_element: String,
}

impl ConfigStore {
    // =========================================================================
    // READ
    // =========================================================================

    pub fn get_feature(&self, code: &str) -> Result<FeatureView, CfgError> {
        let code = require_code("feature", code)?;
        let feature = self.features.require(&code)?;
        self.feature_view(feature)
    }

    /// Every feature, sorted by id.
    pub fn list_features(&self) -> Result<Vec<FeatureView>, CfgError> {
        self.features
            .sorted_by_id()
            .into_iter()
            .map(|feature| self.feature_view(feature))
            .collect()
    }

    fn feature_view(&self, feature: &Feature) -> Result<FeatureView, CfgError> {
        let function_code = |kind: FunctionKind| -> (Option<RowId>, String) {
            let tables = self.functions(kind);
            match tables.call_for_feature(feature.id) {
                Some(call) => (
                    Some(call.id),
                    tables
                        .functions
                        .by_id(call.function_id)
                        .map(|f| f.code.clone())
                        .unwrap_or_default(),
                ),
                None => (None, String::new()),
            }
        };
        let (_, standardize) = function_code(FunctionKind::Standardize);
        let (expression_call, expression) = function_code(FunctionKind::Expression);
        let (comparison_call, comparison) = function_code(FunctionKind::Comparison);

        let linked = |kind: FunctionKind, call: Option<RowId>, element_id: RowId| -> Flag {
            Flag::from_bool(call.is_some_and(|call_id| {
                self.functions(kind).elements.any(|link| {
                    link.call_id == call_id
                        && link.feature_id == feature.id
                        && link.element_id == element_id
                })
            }))
        };

        let mut elements = Vec::new();
        for link in self.elements_of_feature(feature.id) {
            let element = self.elements.by_id(link.element_id).ok_or_else(|| {
                CfgError::Invariant(format!(
                    "feature {} links missing element id {}",
                    feature.code, link.element_id
                ))
            })?;
            elements.push(if expression_call.is_some() || comparison_call.is_some() {
                FeatureElementView::Detail {
                    element: element.code.clone(),
                    expressed: linked(FunctionKind::Expression, expression_call, element.id),
                    compared: linked(FunctionKind::Comparison, comparison_call, element.id),
                }
            } else {
                FeatureElementView::Code(element.code.clone())
            });
        }

        Ok(FeatureView {
            id: feature.id,
            feature: feature.code.clone(),
            class: self
                .feature_classes
                .by_id(feature.class_id)
                .map_or_else(|| "OTHER".to_string(), |c| c.code.clone()),
            behavior: feature.behavior_code(),
            anonymize: feature.anonymize,
            candidates: feature.candidates,
            standardize,
            expression,
            comparison,
            elements,
        })
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    /// Apply scalar changes to a feature.
    ///
    /// Functions can only be re-pointed on calls the feature already has.
    pub fn set_feature(&mut self, update: &FeatureUpdate) -> Result<(), CfgError> {
        let code = require_code("feature", &update.code)?;
        let feature_id = self.features.require(&code)?.id;

        let behavior = optional_code(update.behavior.as_ref())
            .map(|b| Behavior::decode(&b))
            .transpose()?;

        let mut repoint: Vec<(FunctionKind, RowId, RowId)> = Vec::new();
        for (kind, requested) in [
            (FunctionKind::Standardize, update.standardize.as_ref()),
            (FunctionKind::Expression, update.expression.as_ref()),
            (FunctionKind::Comparison, update.comparison.as_ref()),
        ] {
            let Some(function_code) = optional_code(requested) else {
                continue;
            };
            let tables = self.functions(kind);
            let function_id = tables
                .functions
                .resolve(RefKind::Function(kind), &function_code)?
                .id;
            let call_id = tables
                .call_for_feature(feature_id)
                .map(|call| call.id)
                .ok_or_else(|| CfgError::not_found(kind.call_label(), &code))?;
            repoint.push((kind, call_id, function_id));
        }

        if behavior.is_none()
            && update.anonymize.is_none()
            && update.candidates.is_none()
            && repoint.is_empty()
        {
            return Err(CfgError::MalformedInput(format!(
                "nothing to set on feature {code}"
            )));
        }

        if let Some(feature) = self.features.find_mut(|f| f.id == feature_id) {
            if let Some(behavior) = behavior {
                feature.frequency = behavior.frequency.as_str().to_string();
                feature.exclusive = behavior.exclusive_flag();
                feature.stable = behavior.stable_flag();
            }
            if let Some(anonymize) = update.anonymize {
                feature.anonymize = anonymize;
            }
            if let Some(candidates) = update.candidates {
                feature.candidates = candidates;
            }
        }
        for (kind, call_id, function_id) in repoint {
            if let Some(call) = self.functions_mut(kind).calls.find_mut(|c| c.id == call_id) {
                call.function_id = function_id;
            }
        }

        self.mark_updated();
        info!(table = "feature", code = %code, "feature updated");
        Ok(())
    }

    // =========================================================================
    // DISTINCT PROCESSING
    // =========================================================================

    /// Distinct processing is on while any distinct call exists.
    #[must_use]
    pub fn is_distinct_on(&self) -> bool {
        !self.distinct.calls.is_empty()
    }

    /// Park (off) or restore (on) every distinct call and its links.
    ///
    /// Distinct calls created while processing is off are already parked;
    /// parking again merges the live calls into that set.
    pub fn set_distinct(&mut self, on: bool) -> Result<(), CfgError> {
        if on == self.is_distinct_on() {
            return Err(CfgError::MalformedInput(format!(
                "distinct is already {}",
                if on { "on" } else { "off" }
            )));
        }

        if on {
            if self.parked_distinct.as_ref().is_none_or(|p| p.calls.is_empty()) {
                return Err(CfgError::not_found("parked distinct calls", "backup"));
            }
            if let Some(parked) = self.parked_distinct.take() {
                self.distinct.calls = parked.calls;
                self.distinct.elements = parked.elements;
            }
        } else {
            if let Some(parked) = &self.parked_distinct {
                let clash = self
                    .distinct
                    .calls
                    .iter()
                    .find(|call| parked.calls.by_id(call.id).is_some());
                if let Some(call) = clash {
                    return Err(CfgError::MalformedInput(format!(
                        "distinct call {} is both live and parked",
                        call.id
                    )));
                }
            }
            let calls = self.distinct.calls.take();
            let elements = self.distinct.elements.take();
            let parked = self.parked_distinct.get_or_insert_with(ParkedDistinct::default);
            parked.calls.append(calls);
            parked.elements.append(elements);
        }

        self.mark_updated();
        info!(on, "distinct processing switched");
        Ok(())
    }

    // =========================================================================
    // EXPRESSION CALL REPORT
    // =========================================================================

    /// Every expression call-element link resolved to codes, sorted by
    /// (call id, exec order).
    pub fn verify_expression_calls(&self) -> Result<Vec<ExpressionCallReport>, CfgError> {
        let dangling = |what: &str, id: RowId| {
            CfgError::Invariant(format!("expression call element references missing {what} {id}"))
        };
        let tables = self.functions(FunctionKind::Expression);

        let mut report = Vec::with_capacity(tables.elements.len());
        for link in &tables.elements {
            let call = tables
                .calls
                .by_id(link.call_id)
                .ok_or_else(|| dangling("call", link.call_id))?;
            let function = tables
                .functions
                .by_id(call.function_id)
                .ok_or_else(|| dangling("function", call.function_id))?;
            let owner = self
                .features
                .by_id(call.feature_id)
                .ok_or_else(|| dangling("feature", call.feature_id))?;
            let source = self
                .features
                .by_id(link.feature_id)
                .ok_or_else(|| dangling("feature", link.feature_id))?;
            let element = self
                .elements
                .by_id(link.element_id)
                .ok_or_else(|| dangling("element", link.element_id))?;

            report.push(ExpressionCallReport {
                id: call.id,
                feature: owner.code.clone(),
                function: function.code.clone(),
                order: link.exec_order,
                from_feature: source.code.clone(),
                from_element: element.code.clone(),
            });
        }
        report.sort_by_key(|r| (r.id, r.order));
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
