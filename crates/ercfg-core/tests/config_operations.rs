//! # Configuration Operation Tests
//!
//! End-to-end scenarios against the public API, grouped by concern:
//! - Feature lifecycle (compose, inspect, delete)
//! - Referential integrity (refused deletes, failed validation)
//! - Rules and fragments
//! - Document round trips

use ercfg_core::request::{FeatureElementRef, parse};
use ercfg_core::{
    AttributeSelector, CfgError, ConfigStore, Flag, FunctionKind, RefKind, RowId, Selector,
    Template,
};
use serde_json::json;

fn seed() -> ConfigStore {
    ercfg_core::from_str(include_str!("fixtures/seed_config.json")).expect("seed loads")
}

/// Every call-element link points at an existing call, feature and element.
fn assert_links_resolve(store: &ConfigStore) {
    for kind in FunctionKind::ALL {
        let tables = store.functions(kind);
        for link in tables.elements() {
            assert!(tables.calls().by_id(link.call_id).is_some(), "{kind} call");
            assert!(store.features().by_id(link.feature_id).is_some(), "{kind} feature");
            assert!(store.elements().by_id(link.element_id).is_some(), "{kind} element");
        }
        for call in tables.calls() {
            assert!(store.features().by_id(call.feature_id).is_some(), "{kind} call owner");
        }
    }
    for link in store.feature_elements() {
        assert!(store.features().by_id(link.feature_id).is_some());
        assert!(store.elements().by_id(link.element_id).is_some());
    }
}

// =============================================================================
// FEATURE LIFECYCLE
// =============================================================================

mod feature_lifecycle {
    use super::*;

    #[test]
    fn compose_inspect_and_delete() {
        let mut store = seed();
        let id = store
            .add_feature(
                &parse(json!({
                    "feature": "drlic",
                    "class": "ID",
                    "behavior": "F1E",
                    "standardize": "PARSE_ID",
                    "comparison": "ID_COMP",
                    "elementList": [
                        {"element": "ID_NUM", "compared": "Yes"},
                        {"element": "STATE", "compared": "Yes"}
                    ]
                }))
                .expect("spec"),
            )
            .expect("add feature");
        assert_eq!(id, RowId(1000));
        assert_links_resolve(&store);

        let view = store.get_feature("DRLIC").expect("view");
        assert_eq!(view.class, "ID");
        assert_eq!(view.behavior, "F1E");
        assert_eq!(view.standardize, "PARSE_ID");
        assert_eq!(view.comparison, "ID_COMP");
        assert_eq!(view.elements.len(), 2);

        let deletion = store.delete_feature("drlic").expect("delete");
        assert_eq!(deletion.count("feature"), 1);
        assert_eq!(deletion.count("feature element"), 2);
        assert_eq!(deletion.count("comparison call element"), 2);
        assert!(store.features().by_code("DRLIC").is_none());
        assert!(store.elements().by_code("STATE").is_some());
        assert_links_resolve(&store);
    }

    #[test]
    fn listing_is_sorted_by_id() {
        let store = seed();
        let ids: Vec<RowId> = store.list_features().expect("list").iter().map(|f| f.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), store.features().len());
    }

    #[test]
    fn template_then_delete_leaves_attribute_table_clean() {
        let mut store = seed();
        store
            .template_add(Template::ExclusiveIdentifier, "TAX_ID")
            .expect("template");
        assert_eq!(
            store
                .get_attributes(&AttributeSelector::Feature("TAX_ID".into()))
                .expect("attribute")
                .len(),
            1
        );

        store.delete_feature("TAX_ID").expect("delete");
        assert!(store.attributes().by_code("TAX_ID").is_none());
        assert_links_resolve(&store);
    }

    #[test]
    fn element_membership_round_trip() {
        let mut store = seed();
        let reference = FeatureElementRef {
            feature: "ADDRESS".into(),
            element: "ADDR_POSTAL_CODE".into(),
        };
        store
            .add_element_to_feature(
                &parse(json!({"feature": "ADDRESS", "element": "ADDR_POSTAL_CODE", "compared": "Yes"}))
                    .expect("spec"),
            )
            .expect("add");
        store.add_to_name_hash(&reference).expect("hash");
        assert_links_resolve(&store);

        let deletion = store.delete_element_from_feature(&reference).expect("remove");
        assert_eq!(deletion.count("feature element"), 1);
        assert_eq!(deletion.count("comparison call element"), 1);
        assert_eq!(deletion.count("expression call element"), 1);
        store.delete_element("ADDR_POSTAL_CODE").expect("now unused");
        assert_links_resolve(&store);
    }

    #[test]
    fn distinct_toggle_survives_save() {
        let mut store = seed();
        store.set_distinct(false).expect("off");
        let text = ercfg_core::to_pretty_string(&store).expect("save");
        let mut reloaded = ercfg_core::from_str(&text).expect("reload");
        assert!(!reloaded.is_distinct_on());
        reloaded.set_distinct(true).expect("on");
        assert_eq!(
            reloaded.functions(FunctionKind::Distinct),
            seed().functions(FunctionKind::Distinct)
        );
    }
}

// =============================================================================
// REFERENTIAL INTEGRITY
// =============================================================================

mod referential_integrity {
    use super::*;

    #[test]
    fn failed_operations_leave_store_untouched() {
        let mut store = seed();
        let before = store.clone();

        let attempts: Vec<Result<(), CfgError>> = vec![
            store
                .add_feature(
                    &parse(json!({"feature": "X", "comparison": "NOPE", "elementList": ["A"]}))
                        .expect("spec"),
                )
                .map(drop),
            store
                .add_attribute(
                    &parse(json!({"attribute": "X", "feature": "NAME", "element": "ID_NUM"}))
                        .expect("spec"),
                )
                .map(drop),
            store.delete_feature("NAME").map(drop),
            store.delete_element("ID_NUM").map(drop),
            store.delete_data_source("SEARCH").map(drop),
            store
                .add_rule(&parse(json!({"fragment": "NOPE"})).expect("spec"))
                .map(drop),
            store.set_system_parameter("unknown", "Yes").map(drop),
        ];

        assert!(attempts.iter().all(Result::is_err));
        assert_eq!(store, before);
        assert!(!store.is_updated());
    }

    #[test]
    fn invalid_reference_names_its_kind() {
        let mut store = seed();
        let err = store
            .add_feature(
                &parse(json!({"feature": "X", "class": "NOPE", "elementList": ["A"]})).expect("spec"),
            )
            .expect_err("class");
        assert!(matches!(err, CfgError::InvalidReference { kind: RefKind::FeatureClass, .. }));
    }

    #[test]
    fn deleting_entity_type_drops_its_feature_links() {
        let mut store = seed();
        let deletion = store.delete_entity_type("GENERIC").expect("delete");
        assert_eq!(deletion.count("entity feature"), 2);
        assert!(store.entity_features().is_empty());
    }
}

// =============================================================================
// RULES AND FRAGMENTS
// =============================================================================

mod rules_and_fragments {
    use super::*;

    #[test]
    fn fragment_then_rule_then_teardown() {
        let mut store = seed();
        let fragment = store
            .add_fragment(
                &parse(json!({
                    "fragment": "CNAME_STAB",
                    "source": "./FRAGMENT[./SF1_CNAME>0 and ./SAME_STAB>0]"
                }))
                .expect("spec"),
            )
            .expect("fragment");
        assert_eq!(
            store.get_fragment(&Selector::Id(fragment.value())).expect("row").depends,
            vec![RowId(20), RowId(12)]
        );

        store
            .add_rule(
                &parse(json!({"fragment": "CNAME_STAB", "disqualifier": "DIFF_EXCL", "resolve": "Yes"}))
                    .expect("spec"),
            )
            .expect("rule");

        assert!(matches!(
            store.delete_fragment(&Selector::Code("CNAME_STAB".into())),
            Err(CfgError::InUse { .. })
        ));
        store
            .delete_rule(&Selector::Code("CNAME_STAB".into()))
            .expect("rule gone");
        store
            .delete_fragment(&Selector::Code("CNAME_STAB".into()))
            .expect("fragment gone");
    }

    #[test]
    fn relationships_break_matches_toggles_disclosed_types() {
        let mut store = seed();
        assert_eq!(store.system_parameters().relationships_break_matches, Flag::No);
        store.set_relationships_break_matches(true);
        assert!(store.relationships_break_matches());
        assert!(store.is_updated());
    }
}

// =============================================================================
// DOCUMENT ROUND TRIPS
// =============================================================================

mod document_round_trips {
    use super::*;

    #[test]
    fn saved_text_is_stable() {
        let store = seed();
        let first = ercfg_core::to_pretty_string(&store).expect("save");
        let second =
            ercfg_core::to_pretty_string(&ercfg_core::from_str(&first).expect("reload"))
                .expect("save again");
        assert_eq!(first, second);
    }

    #[test]
    fn mutations_survive_save_and_reload() {
        let mut store = seed();
        store
            .add_data_source(&parse(json!({"dataSource": "CRM"})).expect("spec"))
            .expect("add");
        let text = ercfg_core::to_pretty_string(&store).expect("save");
        let reloaded = ercfg_core::from_str(&text).expect("reload");
        assert_eq!(
            reloaded.data_sources().by_code("CRM").map(|d| d.id),
            Some(RowId(1000))
        );
        assert!(!reloaded.is_updated());
    }
}
