//! # Attribute Binder
//!
//! Attributes map an input field name onto a feature element. An attribute is
//! either bound to a feature *and* one of its elements, or to neither.

use crate::allocator::IdAllocator;
use crate::cascade::{Cascade, Deletion};
use crate::primitives::ATTRIBUTE_ID_THRESHOLD;
use crate::request::{AttributeSelector, AttributeSpec, normalize_code, optional_code, require_code};
use crate::store::ConfigStore;
use crate::types::{Attribute, AttributeClass, CfgError, RefKind, RequiredPolicy, RowId};
use tracing::info;

impl ConfigStore {
    /// Validate and insert an attribute; returns its id.
    pub fn add_attribute(&mut self, spec: &AttributeSpec) -> Result<RowId, CfgError> {
        let code = require_code("attribute", &spec.code)?;
        let id = IdAllocator::claim(
            &self.attributes,
            Some(&code),
            spec.id.map(RowId),
            ATTRIBUTE_ID_THRESHOLD,
        )?;

        let class = optional_code(spec.class.as_ref())
            .map(|c| c.parse::<AttributeClass>())
            .transpose()?
            .unwrap_or_default();

        let feature = optional_code(spec.feature.as_ref());
        let element = optional_code(spec.element.as_ref());
        let feature_id = feature
            .as_deref()
            .map(|code| self.features.resolve(RefKind::Feature, code).map(|f| f.id))
            .transpose()?;
        let element_id = element
            .as_deref()
            .map(|code| self.elements.resolve(RefKind::Element, code).map(|e| e.id))
            .transpose()?;
        match (feature_id, element_id) {
            (Some(feature_id), Some(element_id)) => {
                if self.feature_element(feature_id, element_id).is_none() {
                    return Err(CfgError::NotAMember {
                        feature: feature.unwrap_or_default(),
                        element: element.unwrap_or_default(),
                    });
                }
            }
            (None, None) => {}
            _ => {
                return Err(CfgError::MalformedInput(
                    "must have both a feature and an element if either is supplied".to_string(),
                ));
            }
        }

        let required = spec
            .required
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::parse::<RequiredPolicy>)
            .transpose()?
            .unwrap_or_default();

        self.attributes.push(Attribute {
            id,
            code: code.clone(),
            class: class.as_str().to_string(),
            feature,
            element,
            required: required.as_str().to_string(),
            default_value: Some(spec.default.clone().unwrap_or_default()),
            advanced: spec.advanced.unwrap_or_default(),
            internal: spec.internal.unwrap_or_default(),
            extra: Default::default(),
        });
        self.mark_updated();
        info!(table = "attribute", code = %code, id = %id, class = %class, "row added");
        Ok(id)
    }

    /// Attributes matching a selector, sorted by id.
    pub fn get_attributes(&self, selector: &AttributeSelector) -> Result<Vec<&Attribute>, CfgError> {
        let matcher = AttributeMatcher::new(selector)?;
        let mut found: Vec<&Attribute> = self.attributes.filter(|a| matcher.matches(a)).collect();
        if found.is_empty() {
            return Err(CfgError::not_found("attribute", matcher));
        }
        found.sort_by_key(|a| a.id);
        Ok(found)
    }

    /// Delete every attribute matching a selector.
    pub fn delete_attributes(&mut self, selector: &AttributeSelector) -> Result<Deletion, CfgError> {
        let matcher = AttributeMatcher::new(selector)?;
        if !self.attributes.any(|a| matcher.matches(a)) {
            return Err(CfgError::not_found("attribute", matcher));
        }

        let deletion = Cascade::new(self)
            .step("attribute", |s| s.attributes.remove_where(|a| matcher.matches(a)))
            .finish();
        info!(table = "attribute", selector = %matcher, rows = deletion.total(), "rows deleted");
        Ok(deletion)
    }
}

/// A normalized [`AttributeSelector`].
#[derive(Debug)]
enum AttributeMatcher {
    Code(String),
    Id(RowId),
    Feature(String),
}

impl AttributeMatcher {
    fn new(selector: &AttributeSelector) -> Result<Self, CfgError> {
        let blank = || CfgError::MalformedInput("attribute selector is blank".to_string());
        Ok(match selector {
            AttributeSelector::Code(code) => Self::Code(normalize_code(code).ok_or_else(blank)?),
            AttributeSelector::Id(id) => Self::Id(RowId(*id)),
            AttributeSelector::Feature(code) => {
                Self::Feature(normalize_code(code).ok_or_else(blank)?)
            }
        })
    }

    fn matches(&self, attribute: &Attribute) -> bool {
        match self {
            Self::Code(code) => attribute.code == *code,
            Self::Id(id) => attribute.id == *id,
            Self::Feature(code) => attribute.feature_code() == Some(code.as_str()),
        }
    }
}

impl std::fmt::Display for AttributeMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => f.write_str(code),
            Self::Id(id) => write!(f, "id {id}"),
            Self::Feature(code) => write!(f, "for feature {code}"),
        }
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

    fn spec(value: serde_json::Value) -> AttributeSpec {
        parse(value).expect("attribute spec")
    }

    #[test]
    fn unbound_attribute_gets_defaults() {
        let mut store = seed_store();
        let id = store
            .add_attribute(&spec(json!({"attribute": "source_note"})))
            .expect("add");
        assert_eq!(id, RowId(2000));
        let attr = store.attributes().by_id(id).expect("row");
        assert_eq!(attr.class, "OTHER");
        assert_eq!(attr.required, "No");
        assert_eq!(attr.default_value.as_deref(), Some(""));
        assert_eq!(attr.feature_code(), None);
    }

    #[test]
    fn bound_attribute_requires_membership() {
        let mut store = seed_store();
        let err = store
            .add_attribute(&spec(json!({
                "attribute": "X", "feature": "ADDRESS", "element": "FULL_NAME"
            })))
            .expect_err("not a member");
        assert!(matches!(err, CfgError::NotAMember { .. }));

        store
            .add_attribute(&spec(json!({
                "attribute": "NAME_FIRST", "class": "name",
                "feature": "name", "element": "given_name", "required": "desired"
            })))
            .expect("member");
        let attr = store.attributes().by_code("NAME_FIRST").expect("row");
        assert_eq!(attr.required, "Desired");
        assert_eq!(attr.element_code(), Some("GIVEN_NAME"));
    }

    #[test]
    fn feature_without_element_is_rejected() {
        let mut store = seed_store();
        let err = store
            .add_attribute(&spec(json!({"attribute": "X", "feature": "NAME"})))
            .expect_err("half bound");
        assert!(matches!(err, CfgError::MalformedInput(_)));

        let err = store
            .add_attribute(&spec(json!({"attribute": "X", "element": "FULL_NAME"})))
            .expect_err("half bound");
        assert!(matches!(err, CfgError::MalformedInput(_)));
    }

    #[test]
    fn enumerations_are_validated() {
        let mut store = seed_store();
        let err = store
            .add_attribute(&spec(json!({"attribute": "X", "class": "COLOR"})))
            .expect_err("class");
        assert!(matches!(err, CfgError::InvalidEnum { field: "attribute class", .. }));

        let err = store
            .add_attribute(&spec(json!({"attribute": "X", "required": "maybe"})))
            .expect_err("required");
        assert!(matches!(err, CfgError::InvalidEnum { field: "required", .. }));
        assert!(!store.is_updated());
    }

    #[test]
    fn get_and_delete_by_feature() {
        let mut store = seed_store();
        let codes: Vec<&str> = store
            .get_attributes(&AttributeSelector::Feature("name".into()))
            .expect("found")
            .into_iter()
            .map(|a| a.code.as_str())
            .collect();
        assert_eq!(codes, vec!["NAME_FULL", "NAME_LAST"]);

        let deletion = store
            .delete_attributes(&AttributeSelector::Feature("NAME".into()))
            .expect("delete");
        assert_eq!(deletion.total(), 2);

        let err = store
            .get_attributes(&AttributeSelector::Feature("NAME".into()))
            .expect_err("gone");
        assert!(matches!(err, CfgError::NotFound { .. }));
    }
}
