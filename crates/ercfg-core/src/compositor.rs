//! # Feature Composition Engine
//!
//! Builds a feature together with everything it needs: its function calls,
//! its elements (created on demand), the call-element links feeding each
//! call, and the feature-element links describing the feature's layout.
//!
//! Every operation here validates the whole request before the first row is
//! inserted. A failed call leaves the store untouched.

use crate::allocator::IdAllocator;
use crate::behavior::Behavior;
use crate::primitives::{
    ADDRESS_FEATURE, DEFAULT_FEATURE_CLASS, RESERVED_ID_THRESHOLD, TEMPLATE_COMPARISON,
    TEMPLATE_ELEMENT,
};
use crate::request::{
    AttributeSpec, ElementDetail, ElementEntry, FeatureElementRef, FeatureElementSpec,
    FeatureSpec, optional_code, require_code,
};
use crate::store::ConfigStore;
use crate::types::{
    Call, CallElement, CfgError, DataType, Element, Feature, FeatureElement, Flag, FunctionKind,
    RefKind, RowId,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// An element list entry after validation.
#[derive(Debug)]
struct PlannedElement {
    code: String,
    id: RowId,
    create: bool,
    expressed: bool,
    compared: bool,
    display_level: i64,
    display_delim: String,
    derived: Flag,
    name_hash: bool,
}

/// The identifier templates of `template_add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// `F1`
    BasicIdentifier,
    /// `F1E` (also accepted as plain `IDENTIFIER`)
    ExclusiveIdentifier,
    /// `F1ES`
    StableIdentifier,
}

impl Template {
    /// Parse a template name (case-insensitive).
    pub fn parse(name: &str) -> Result<Self, CfgError> {
        match name.trim().to_uppercase().as_str() {
            "BASIC_IDENTIFIER" => Ok(Self::BasicIdentifier),
            "EXCLUSIVE_IDENTIFIER" | "IDENTIFIER" => Ok(Self::ExclusiveIdentifier),
            "STABLE_IDENTIFIER" => Ok(Self::StableIdentifier),
            _ => Err(CfgError::invalid_enum("template", name)),
        }
    }

    /// Behavior code of the generated feature.
    #[must_use]
    pub const fn behavior(self) -> &'static str {
        match self {
            Self::BasicIdentifier => "F1",
            Self::ExclusiveIdentifier => "F1E",
            Self::StableIdentifier => "F1ES",
        }
    }
}

impl ConfigStore {
    // =========================================================================
    // ADD FEATURE
    // =========================================================================

    /// Create a feature with its calls, elements and links as one unit.
    ///
    /// Returns the new feature id.
    pub fn add_feature(&mut self, spec: &FeatureSpec) -> Result<RowId, CfgError> {
        let code = require_code("feature", &spec.code)?;
        if spec.elements.is_empty() {
            return Err(CfgError::MalformedInput(
                "element list is required".to_string(),
            ));
        }

        let feature_id = IdAllocator::claim(
            &self.features,
            Some(&code),
            spec.id.map(RowId),
            RESERVED_ID_THRESHOLD,
        )?;

        let behavior_code =
            optional_code(spec.behavior.as_ref()).unwrap_or_else(|| "FM".to_string());
        let behavior = Behavior::decode(&behavior_code)?;

        let class_code = optional_code(spec.class.as_ref())
            .unwrap_or_else(|| DEFAULT_FEATURE_CLASS.to_string());
        let class_id = self
            .feature_classes
            .resolve(RefKind::FeatureClass, &class_code)?
            .id;

        let functions = self.resolve_functions(&[
            (FunctionKind::Standardize, spec.standardize.as_ref()),
            (FunctionKind::Distinct, spec.distinct.as_ref()),
            (FunctionKind::Expression, spec.expression.as_ref()),
            (FunctionKind::Comparison, spec.comparison.as_ref()),
        ])?;

        let planned = self.plan_elements(&spec.elements)?;
        if functions.contains_key(&FunctionKind::Expression) && !planned.iter().any(|e| e.expressed)
        {
            return Err(CfgError::NoElementsMarked {
                kind: FunctionKind::Expression,
                marker: "expressed",
            });
        }
        if functions.contains_key(&FunctionKind::Comparison) && !planned.iter().any(|e| e.compared)
        {
            return Err(CfgError::NoElementsMarked {
                kind: FunctionKind::Comparison,
                marker: "compared",
            });
        }

        let mut calls: BTreeMap<FunctionKind, RowId> = BTreeMap::new();
        for kind in functions.keys() {
            calls.insert(*kind, self.next_call_id(*kind)?);
        }

        // Validation done; nothing below can fail.
        let name_hasher = self.name_hasher_call().map(|call| call.id);
        let candidates = spec
            .candidates
            .unwrap_or(Flag::from_bool(behavior.encode() != "FM"));

        self.features.push(Feature {
            id: feature_id,
            code: code.clone(),
            desc: code.clone(),
            class_id,
            frequency: behavior.frequency.as_str().to_string(),
            exclusive: behavior.exclusive_flag(),
            stable: behavior.stable_flag(),
            anonymize: spec.anonymize.unwrap_or_default(),
            derived: spec.derived.unwrap_or_default(),
            candidates,
            persist_history: Flag::Yes,
            version: 1,
            rtype_id: Some(0),
            extra: Default::default(),
        });

        for (kind, function_id) in &functions {
            if let Some(call_id) = calls.get(kind) {
                self.insert_call(*kind, *call_id, *function_id, feature_id);
            }
        }

        for (position, element) in planned.into_iter().enumerate() {
            let order = position as i64 + 1;
            let element_id = element.id;
            if element.create {
                self.insert_element(&element.code, element_id, DataType::String, Flag::No);
            }

            if let Some(call_id) = calls.get(&FunctionKind::Distinct) {
                self.link_call_element(FunctionKind::Distinct, *call_id, order, feature_id, element_id);
            }
            if element.expressed {
                if let Some(call_id) = calls.get(&FunctionKind::Expression) {
                    self.link_call_element(FunctionKind::Expression, *call_id, order, feature_id, element_id);
                }
            }
            if element.compared {
                if let Some(call_id) = calls.get(&FunctionKind::Comparison) {
                    self.link_call_element(FunctionKind::Comparison, *call_id, order, feature_id, element_id);
                }
            }
            if element.name_hash {
                match name_hasher {
                    Some(hasher_id) => self.link_name_hasher(hasher_id, feature_id, element_id),
                    None => warn!(
                        feature = %code,
                        element = %element.code,
                        "name hasher call not configured, element not added to name hash"
                    ),
                }
            }

            self.feature_elements.push(FeatureElement {
                feature_id,
                element_id,
                exec_order: order,
                display_level: element.display_level,
                display_delim: Some(element.display_delim),
                derived: element.derived,
                extra: Default::default(),
            });
        }

        self.mark_updated();
        info!(table = "feature", code = %code, id = %feature_id, calls = calls.len(), "feature added");
        Ok(feature_id)
    }

    /// Resolve the function code supplied for each kind; blank codes are skipped.
    fn resolve_functions(
        &self,
        requested: &[(FunctionKind, Option<&String>)],
    ) -> Result<BTreeMap<FunctionKind, RowId>, CfgError> {
        let mut resolved = BTreeMap::new();
        for (kind, code) in requested {
            if let Some(code) = optional_code(*code) {
                let function = self
                    .functions(*kind)
                    .functions
                    .resolve(RefKind::Function(*kind), &code)?;
                resolved.insert(*kind, function.id);
            }
        }
        Ok(resolved)
    }

    /// Ids of new calls of `kind`. Distinct ids also stay clear of the
    /// parked set so a later restore cannot collide.
    fn next_call_id(&self, kind: FunctionKind) -> Result<RowId, CfgError> {
        let live = IdAllocator::next_id(&self.functions(kind).calls, RESERVED_ID_THRESHOLD)?;
        match (kind, &self.parked_distinct) {
            (FunctionKind::Distinct, Some(parked)) => {
                let parked = IdAllocator::next_id(&parked.calls, RESERVED_ID_THRESHOLD)?;
                Ok(live.max(parked))
            }
            _ => Ok(live),
        }
    }

    /// Validate the element list and give every element its id; elements
    /// to be created get consecutive fresh ids.
    fn plan_elements(&self, entries: &[ElementEntry]) -> Result<Vec<PlannedElement>, CfgError> {
        let mut planned: Vec<PlannedElement> = Vec::with_capacity(entries.len());
        let mut last_fresh: Option<RowId> = None;
        for entry in entries {
            let detail: ElementDetail = entry.clone().into_detail();
            let code = require_code("element", &detail.element)?;
            if planned.iter().any(|p| p.code == code) {
                return Err(CfgError::MalformedInput(format!(
                    "element {code} listed more than once"
                )));
            }
            let (id, create) = match self.elements.by_code(&code) {
                Some(element) => (element.id, false),
                None => {
                    let fresh = match last_fresh {
                        Some(prev) => IdAllocator::successor::<Element>(prev)?,
                        None => IdAllocator::next_id(&self.elements, RESERVED_ID_THRESHOLD)?,
                    };
                    last_fresh = Some(fresh);
                    (fresh, true)
                }
            };
            planned.push(PlannedElement {
                id,
                create,
                code,
                expressed: detail.expressed.is_yes(),
                compared: detail.compared.is_yes(),
                display_level: detail.display_level.unwrap_or(1),
                display_delim: detail.display_delim.unwrap_or_default(),
                derived: detail.derived.unwrap_or_default(),
                name_hash: detail.addtonamehash.is_yes(),
            });
        }
        Ok(planned)
    }

    // =========================================================================
    // ROW INSERTION HELPERS
    // =========================================================================

    /// Insert a call with an id allocated during validation; exec order is
    /// always 1.
    pub(crate) fn insert_call(
        &mut self,
        kind: FunctionKind,
        id: RowId,
        function_id: RowId,
        feature_id: RowId,
    ) {
        let parked = kind == FunctionKind::Distinct && !self.is_distinct_on();
        let (calls, _) = self.call_rows_mut(kind);
        calls.push(Call {
            id,
            function_id,
            exec_order: 1,
            feature_id,
            extra: Default::default(),
        });
        debug!(kind = %kind, id = %id, feature = %feature_id, parked, "call inserted");
    }

    /// Insert an element; the caller has checked the code and id are free.
    pub(crate) fn insert_element(
        &mut self,
        code: &str,
        id: RowId,
        data_type: DataType,
        tokenize: Flag,
    ) {
        self.elements.push(Element {
            id,
            code: code.to_string(),
            data_type: data_type.as_str().to_string(),
            tokenize,
            extra: Default::default(),
        });
        debug!(code = %code, id = %id, "element inserted");
    }

    fn link_call_element(
        &mut self,
        kind: FunctionKind,
        call_id: RowId,
        exec_order: i64,
        feature_id: RowId,
        element_id: RowId,
    ) {
        let required = (kind == FunctionKind::Expression).then_some(Flag::Yes);
        let (_, elements) = self.call_rows_mut(kind);
        elements.push(CallElement {
            call_id,
            exec_order,
            feature_id,
            element_id,
            required,
            extra: Default::default(),
        });
    }

    fn link_name_hasher(&mut self, hasher_id: RowId, feature_id: RowId, element_id: RowId) {
        let tables = self.functions_mut(FunctionKind::Expression);
        let exec_order = tables.max_exec_order(hasher_id) + 1;
        tables.elements.push(CallElement {
            call_id: hasher_id,
            exec_order,
            feature_id,
            element_id,
            required: Some(Flag::No),
            extra: Default::default(),
        });
        debug!(feature = %feature_id, element = %element_id, exec_order, "linked to name hasher");
    }

    // =========================================================================
    // FEATURE ELEMENTS
    // =========================================================================

    /// Append an element to an existing feature, creating the element if needed.
    ///
    /// Returns the element id.
    pub fn add_element_to_feature(&mut self, spec: &FeatureElementSpec) -> Result<RowId, CfgError> {
        let feature_code = require_code("feature", &spec.feature)?;
        let element_code = require_code("element", &spec.element)?;
        let feature = self.features.require(&feature_code)?;
        let feature_id = feature.id;

        let data_type = optional_code(spec.datatype.as_ref())
            .map(|dt| dt.parse::<DataType>())
            .transpose()?;

        let element_id = match self.elements.by_code(&element_code) {
            Some(element) => {
                let type_conflict = data_type
                    .is_some_and(|dt| !element.data_type.eq_ignore_ascii_case(dt.as_str()));
                let tokenize_conflict = spec.tokenize.is_some_and(|t| t != element.tokenize);
                if type_conflict || tokenize_conflict {
                    return Err(CfgError::MalformedInput(format!(
                        "element {element_code} already exists with conflicting parameters"
                    )));
                }
                if self.feature_element(feature_id, element.id).is_some() {
                    return Err(CfgError::DuplicateCode {
                        table: "feature element",
                        code: format!("{feature_code}/{element_code}"),
                    });
                }
                element.id
            }
            None => {
                let id = IdAllocator::claim(
                    &self.elements,
                    None,
                    spec.id.map(RowId),
                    RESERVED_ID_THRESHOLD,
                )?;
                self.insert_element(
                    &element_code,
                    id,
                    data_type.unwrap_or_default(),
                    spec.tokenize.unwrap_or_default(),
                );
                id
            }
        };

        let exec_order = self
            .feature_elements
            .filter(|link| link.feature_id == feature_id)
            .map(|link| link.exec_order)
            .max()
            .unwrap_or(0)
            + 1;
        self.feature_elements.push(FeatureElement {
            feature_id,
            element_id,
            exec_order,
            display_level: if feature_code == ADDRESS_FEATURE { 2 } else { 1 },
            display_delim: Some(String::new()),
            derived: Flag::No,
            extra: Default::default(),
        });

        for (kind, flagged) in [
            (FunctionKind::Expression, spec.expressed),
            (FunctionKind::Comparison, spec.compared),
        ] {
            if !flagged.is_some_and(Flag::is_yes) {
                continue;
            }
            let Some(call_id) = self.functions(kind).call_for_feature(feature_id).map(|c| c.id)
            else {
                debug!(feature = %feature_code, kind = %kind, "feature has no call of this kind");
                continue;
            };
            let order = self.functions(kind).max_exec_order(call_id) + 1;
            self.link_call_element(kind, call_id, order, feature_id, element_id);
        }

        self.mark_updated();
        info!(feature = %feature_code, element = %element_code, exec_order, "element added to feature");
        Ok(element_id)
    }

    /// Link a member element of a feature into the name hasher call.
    pub fn add_to_name_hash(&mut self, pair: &FeatureElementRef) -> Result<(), CfgError> {
        let hasher_id = self
            .name_hasher_call()
            .map(|call| call.id)
            .ok_or_else(|| CfgError::not_found("name hasher call", crate::primitives::NAME_HASHER))?;

        let feature_code = require_code("feature", &pair.feature)?;
        let element_code = require_code("element", &pair.element)?;
        let feature_id = self.features.resolve(RefKind::Feature, &feature_code)?.id;
        let element_id = self.elements.resolve(RefKind::Element, &element_code)?.id;
        if self.feature_element(feature_id, element_id).is_none() {
            return Err(CfgError::NotAMember {
                feature: feature_code,
                element: element_code,
            });
        }

        let already = self.expression.elements.any(|link| {
            link.call_id == hasher_id && link.feature_id == feature_id && link.element_id == element_id
        });
        if already {
            return Err(CfgError::DuplicateCode {
                table: "name hash",
                code: format!("{feature_code}/{element_code}"),
            });
        }

        self.link_name_hasher(hasher_id, feature_id, element_id);
        self.mark_updated();
        info!(feature = %feature_code, element = %element_code, "added to name hash");
        Ok(())
    }

    // =========================================================================
    // TEMPLATES
    // =========================================================================

    /// Create an identifier feature and its attribute from a template.
    ///
    /// The feature compares one element, `ID_NUM`, with `EXACT_COMP`; the
    /// attribute has the same code, class `IDENTIFIER` and is required.
    pub fn template_add(&mut self, template: Template, code: &str) -> Result<RowId, CfgError> {
        let code = require_code("attribute", code)?;

        let feature = FeatureSpec {
            code: code.clone(),
            behavior: Some(template.behavior().to_string()),
            comparison: Some(TEMPLATE_COMPARISON.to_string()),
            elements: vec![ElementEntry::Detail(ElementDetail {
                element: TEMPLATE_ELEMENT.to_string(),
                compared: Flag::Yes,
                ..ElementDetail::default()
            })],
            ..FeatureSpec::default()
        };
        let attribute = AttributeSpec {
            code: code.clone(),
            class: Some("IDENTIFIER".to_string()),
            feature: Some(code.clone()),
            element: Some(TEMPLATE_ELEMENT.to_string()),
            required: Some("Yes".to_string()),
            ..AttributeSpec::default()
        };

        let mut staged = self.clone();
        let feature_id = staged.add_feature(&feature)?;
        staged.add_attribute(&attribute)?;
        *self = staged;

        info!(template = ?template, code = %code, "template applied");
        Ok(feature_id)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse;
    use crate::test_support::seed_store;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> FeatureSpec {
        parse(value).expect("feature spec")
    }

    #[test]
    fn add_feature_stops_when_element_ids_run_out() {
        let mut store = seed_store();
        store
            .add_element(&parse(json!({"element": "HIGH", "id": i64::MAX - 1})).expect("spec"))
            .expect("explicit id");
        let before = store.clone();

        // The first new element takes i64::MAX; the second has nothing left.
        let err = store
            .add_feature(&spec(json!({"feature": "WIDE", "elementList": ["FIRST", "SECOND"]})))
            .expect_err("ids exhausted");
        assert!(matches!(
            err,
            CfgError::IdsExhausted { table: "element", max: RowId(i64::MAX) }
        ));
        assert_eq!(store, before);

        let id = store
            .add_feature(&spec(json!({"feature": "NARROW", "elementList": ["FIRST"]})))
            .expect("one id left");
        let first = store.elements().by_code("FIRST").expect("element");
        assert_eq!(first.id, RowId(i64::MAX));
        assert!(store.feature_element(id, first.id).is_some());
    }

    #[test]
    fn add_feature_builds_calls_and_links() {
        let mut store = seed_store();
        let id = store
            .add_feature(&spec(json!({
                "feature": "test",
                "behavior": "FME",
                "comparison": "EXACT_COMP",
                "elementList": [{"element": "VAL", "compared": "Yes"}]
            })))
            .expect("add feature");

        assert_eq!(id, RowId(1000));
        let feature = store.features().by_code("TEST").expect("feature");
        assert_eq!(feature.frequency, "FM");
        assert_eq!(feature.exclusive, Flag::Yes);
        assert_eq!(feature.stable, Flag::No);
        assert_eq!(feature.candidates, Flag::Yes);

        let comparison = store.functions(FunctionKind::Comparison);
        let call = comparison.call_for_feature(id).expect("comparison call");
        assert_eq!(call.exec_order, 1);
        assert_eq!(comparison.elements_of_call(call.id).len(), 1);

        let element = store.elements().by_code("VAL").expect("element created");
        assert_eq!(element.data_type, "STRING");
        assert_eq!(element.tokenize, Flag::No);
        assert!(store.feature_element(id, element.id).is_some());
        assert!(store.is_updated());
    }

    #[test]
    fn plain_fm_defaults_candidates_off() {
        let mut store = seed_store();
        let id = store
            .add_feature(&spec(json!({"feature": "NOTE", "elementList": ["NOTE_TEXT"]})))
            .expect("add");
        let feature = store.features().by_id(id).expect("feature");
        assert_eq!(feature.candidates, Flag::No);
        assert_eq!(feature.frequency, "FM");
    }

    #[test]
    fn unmarked_comparison_is_rejected_without_changes() {
        let mut store = seed_store();
        let before = store.clone();
        let err = store
            .add_feature(&spec(json!({
                "feature": "TEST",
                "comparison": "EXACT_COMP",
                "elementList": [{"element": "VAL"}]
            })))
            .expect_err("no compared elements");
        assert!(matches!(
            err,
            CfgError::NoElementsMarked {
                kind: FunctionKind::Comparison,
                ..
            }
        ));
        assert_eq!(store, before);
    }

    #[test]
    fn unknown_function_is_an_invalid_reference() {
        let mut store = seed_store();
        let err = store
            .add_feature(&spec(json!({
                "feature": "TEST",
                "expression": "NOPE",
                "elementList": [{"element": "VAL", "expressed": "Yes"}]
            })))
            .expect_err("bad function");
        assert!(matches!(
            err,
            CfgError::InvalidReference {
                kind: RefKind::Function(FunctionKind::Expression),
                ..
            }
        ));
        assert!(!store.is_updated());
    }

    #[test]
    fn empty_element_list_is_malformed() {
        let mut store = seed_store();
        let err = store
            .add_feature(&spec(json!({"feature": "TEST", "elementList": []})))
            .expect_err("empty list");
        assert!(matches!(err, CfgError::MalformedInput(_)));
    }

    #[test]
    fn duplicate_feature_code_is_rejected() {
        let mut store = seed_store();
        let err = store
            .add_feature(&spec(json!({"feature": "name", "elementList": ["X"]})))
            .expect_err("duplicate");
        assert!(matches!(err, CfgError::DuplicateCode { .. }));
    }

    #[test]
    fn name_hash_flag_links_into_hasher_call() {
        let mut store = seed_store();
        let hasher = store.name_hasher_call().expect("hasher").id;
        let before = store.functions(FunctionKind::Expression).max_exec_order(hasher);

        let id = store
            .add_feature(&spec(json!({
                "feature": "NICK",
                "elementList": [{"element": "NICK_NAME", "addToNameHash": "Yes"}]
            })))
            .expect("add");

        let expression = store.functions(FunctionKind::Expression);
        let link = expression
            .elements_of_call(hasher)
            .into_iter()
            .find(|link| link.feature_id == id)
            .expect("hasher link");
        assert_eq!(link.exec_order, before + 1);
        assert_eq!(link.required, Some(Flag::No));
    }

    #[test]
    fn add_element_to_feature_appends_in_order() {
        let mut store = seed_store();
        let element_id = store
            .add_element_to_feature(&parse(json!({"feature": "ADDRESS", "element": "ADDR_CITY"})).expect("spec"))
            .expect("add element");
        let address = store.features().by_code("ADDRESS").expect("feature").id;
        let links = store.elements_of_feature(address);
        let last = links.last().expect("links");
        assert_eq!(last.element_id, element_id);
        assert_eq!(last.display_level, 2);
        assert_eq!(last.exec_order, links.len() as i64);
    }

    #[test]
    fn add_element_to_feature_rejects_conflicting_element() {
        let mut store = seed_store();
        let err = store
            .add_element_to_feature(
                &parse(json!({"feature": "ADDRESS", "element": "FULL_NAME", "datatype": "number"}))
                    .expect("spec"),
            )
            .expect_err("conflict");
        assert!(matches!(err, CfgError::MalformedInput(_)));
    }

    #[test]
    fn add_to_name_hash_requires_membership() {
        let mut store = seed_store();
        let err = store
            .add_to_name_hash(&FeatureElementRef {
                feature: "ADDRESS".into(),
                element: "FULL_NAME".into(),
            })
            .expect_err("not a member");
        assert!(matches!(err, CfgError::NotAMember { .. }));
    }

    #[test]
    fn add_to_name_hash_rejects_existing_link() {
        let mut store = seed_store();
        let err = store
            .add_to_name_hash(&FeatureElementRef {
                feature: "NAME".into(),
                element: "FULL_NAME".into(),
            })
            .expect_err("already hashed");
        assert!(matches!(err, CfgError::DuplicateCode { .. }));
    }

    #[test]
    fn template_creates_feature_and_attribute() {
        let mut store = seed_store();
        let id = store
            .template_add(Template::parse("stable_identifier").expect("template"), "passport")
            .expect("template");
        let feature = store.features().by_id(id).expect("feature");
        assert_eq!(feature.behavior_code(), "F1ES");
        let attribute = store.attributes().by_code("PASSPORT").expect("attribute");
        assert_eq!(attribute.class, "IDENTIFIER");
        assert_eq!(attribute.element_code(), Some("ID_NUM"));
        assert_eq!(attribute.required, "Yes");
    }

    #[test]
    fn template_is_atomic() {
        let mut store = seed_store();
        // An attribute already owns the code, so the second half fails.
        let before_features = store.features().len();
        let err = store
            .template_add(Template::BasicIdentifier, "SSN_NUMBER")
            .expect_err("attribute exists");
        assert!(matches!(err, CfgError::DuplicateCode { .. }));
        assert_eq!(store.features().len(), before_features);
    }
}
