//! # Fragments and Rules
//!
//! Fragments are reusable boolean expressions; rules qualify a match with one
//! fragment and optionally disqualify it with another. Both refer to
//! fragments by code, and a fragment's dependency list holds the ids of the
//! fragments its source references.

use crate::allocator::IdAllocator;
use crate::cascade::{Cascade, Deletion};
use crate::fragment::fragment_references;
use crate::primitives::RESERVED_ID_THRESHOLD;
use crate::request::{FragmentSpec, RuleSpec, Selector, normalize_code, optional_code, require_code};
use crate::store::{ConfigStore, Table};
use crate::types::{Bit, CfgError, Flag, Fragment, Keyed, RefKind, RowId, Rule};
use tracing::info;

/// Find the row a selector names, failing with [`CfgError::NotFound`].
fn select<'t, T: Keyed>(table: &'t Table<T>, selector: &Selector) -> Result<&'t T, CfgError> {
    match selector {
        Selector::Code(code) => {
            let code = normalize_code(code)
                .ok_or_else(|| CfgError::MalformedInput(format!("{} code is blank", T::LABEL)))?;
            table.require(&code)
        }
        Selector::Id(id) => table
            .by_id(RowId(*id))
            .ok_or_else(|| CfgError::not_found(T::LABEL, format!("id {id}"))),
    }
}

impl ConfigStore {
    // =========================================================================
    // FRAGMENTS
    // =========================================================================

    /// Insert a fragment, resolving the fragments its source references.
    pub fn add_fragment(&mut self, spec: &FragmentSpec) -> Result<RowId, CfgError> {
        let code = require_code("fragment", &spec.code)?;
        let id = IdAllocator::claim(
            &self.fragments,
            Some(&code),
            spec.id.map(RowId),
            RESERVED_ID_THRESHOLD,
        )?;
        let source = spec
            .source
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CfgError::MalformedInput("a fragment source is required".to_string()))?;

        let depends = fragment_references(source)?
            .iter()
            .map(|reference| {
                self.fragments
                    .resolve(RefKind::Fragment, reference)
                    .map(|f| f.id)
            })
            .collect::<Result<Vec<RowId>, CfgError>>()?;

        self.fragments.push(Fragment {
            id,
            code: code.clone(),
            desc: code.clone(),
            source: source.to_string(),
            depends,
            extra: Default::default(),
        });
        self.mark_updated();
        info!(table = "fragment", code = %code, id = %id, "row added");
        Ok(id)
    }

    pub fn get_fragment(&self, selector: &Selector) -> Result<&Fragment, CfgError> {
        select(&self.fragments, selector)
    }

    /// Refused while a rule or another fragment depends on it.
    pub fn delete_fragment(&mut self, selector: &Selector) -> Result<Deletion, CfgError> {
        let fragment = select(&self.fragments, selector)?;
        let (id, code) = (fragment.id, fragment.code.clone());

        let mut used_by: Vec<String> = self
            .rules
            .filter(|r| r.fragment == code || r.disqualifier.as_deref() == Some(code.as_str()))
            .map(|r| r.code.clone())
            .collect();
        used_by.extend(
            self.fragments
                .filter(|f| f.depends.contains(&id))
                .map(|f| f.code.clone()),
        );
        if !used_by.is_empty() {
            return Err(CfgError::InUse { code, used_by });
        }

        let deletion = Cascade::new(self)
            .step("fragment", |s| s.fragments.remove_where(|f| f.id == id))
            .finish();
        info!(table = "fragment", code = %code, "row deleted");
        Ok(deletion)
    }

    // =========================================================================
    // RULES
    // =========================================================================

    /// Insert a rule; the rule code defaults to its fragment code.
    pub fn add_rule(&mut self, spec: &RuleSpec) -> Result<RowId, CfgError> {
        let fragment = optional_code(spec.fragment.as_ref())
            .ok_or_else(|| CfgError::MalformedInput("a rule fragment is required".to_string()))?;
        self.fragments.resolve(RefKind::Fragment, &fragment)?;

        let code = optional_code(spec.rule.as_ref()).unwrap_or_else(|| fragment.clone());
        let id = IdAllocator::claim(
            &self.rules,
            Some(&code),
            spec.id.map(RowId),
            RESERVED_ID_THRESHOLD,
        )?;

        let disqualifier = optional_code(spec.disqualifier.as_ref());
        if let Some(disqualifier) = &disqualifier {
            self.fragments.resolve(RefKind::Disqualifier, disqualifier)?;
        }

        self.rules.push(Rule {
            id,
            code: code.clone(),
            desc: code.clone(),
            resolve: spec.resolve.unwrap_or(Flag::No),
            relate: Bit(spec.relate.is_some_and(Flag::is_yes)),
            ref_score: spec.ref_score.unwrap_or(0),
            rtype_id: spec.rtype_id,
            fragment,
            disqualifier,
            tier: spec.tier,
            extra: Default::default(),
        });
        self.mark_updated();
        info!(table = "rule", code = %code, id = %id, "row added");
        Ok(id)
    }

    pub fn get_rule(&self, selector: &Selector) -> Result<&Rule, CfgError> {
        select(&self.rules, selector)
    }

    pub fn delete_rule(&mut self, selector: &Selector) -> Result<Deletion, CfgError> {
        let rule = select(&self.rules, selector)?;
        let (id, code) = (rule.id, rule.code.clone());

        let deletion = Cascade::new(self)
            .step("rule", |s| s.rules.remove_where(|r| r.id == id))
            .finish();
        info!(table = "rule", code = %code, "row deleted");
        Ok(deletion)
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

    #[test]
    fn fragment_dependencies_resolve_in_order() {
        let mut store = seed_store();
        let id = store
            .add_fragment(
                &parse(json!({
                    "fragment": "close_name",
                    "source": "./FRAGMENT[./SAME_NAME>0 and ./SAME_STAB>0] or ./FRAGMENT[./SAME_NAME1>0]"
                }))
                .expect("spec"),
            )
            .expect("add");
        let fragment = store.fragments().by_id(id).expect("row");
        assert_eq!(fragment.depends, vec![RowId(11), RowId(12), RowId(13)]);
        assert_eq!(fragment.desc, "CLOSE_NAME");
    }

    #[test]
    fn unknown_fragment_reference_inserts_nothing() {
        let mut store = seed_store();
        let before = store.fragments().len();
        let err = store
            .add_fragment(
                &parse(json!({"fragment": "X", "source": "./FRAGMENT[./NOPE>0]"})).expect("spec"),
            )
            .expect_err("unresolved");
        assert!(matches!(err, CfgError::InvalidReference { kind: RefKind::Fragment, .. }));
        assert_eq!(store.fragments().len(), before);
    }

    #[test]
    fn fragment_source_is_required() {
        let mut store = seed_store();
        let err = store
            .add_fragment(&parse(json!({"fragment": "X"})).expect("spec"))
            .expect_err("no source");
        assert!(matches!(err, CfgError::MalformedInput(_)));
    }

    #[test]
    fn fragment_in_use_is_refused() {
        let mut store = seed_store();
        let err = store
            .delete_fragment(&Selector::Code("same_name".into()))
            .expect_err("depended on");
        assert!(matches!(err, CfgError::InUse { ref used_by, .. } if used_by == &["SF1_CNAME"]));

        let err = store
            .delete_fragment(&Selector::Code("DIFF_EXCL".into()))
            .expect_err("disqualifier of a rule");
        assert!(matches!(err, CfgError::InUse { .. }));

        store.delete_rule(&Selector::Id(100)).expect("delete rule");
        store
            .delete_fragment(&Selector::Code("DIFF_EXCL".into()))
            .expect("now free");
    }

    #[test]
    fn rule_code_defaults_to_fragment() {
        let mut store = seed_store();
        let id = store
            .add_rule(
                &parse(json!({
                    "fragment": "SAME_NAME", "tier": 30, "resolve": "Yes",
                    "relate": "No", "ref_score": "8", "rtype_id": 1
                }))
                .expect("spec"),
            )
            .expect("add");
        let rule = store.get_rule(&Selector::Id(id.value())).expect("row");
        assert_eq!(rule.code, "SAME_NAME");
        assert_eq!(rule.tier, Some(30));
        assert_eq!(rule.ref_score, 8);
        assert_eq!(rule.disqualifier, None);
        assert!(!rule.relate.is_set());
    }

    #[test]
    fn rule_references_must_resolve() {
        let mut store = seed_store();
        let err = store
            .add_rule(&parse(json!({"rule": "R", "fragment": "MISSING"})).expect("spec"))
            .expect_err("fragment");
        assert!(matches!(err, CfgError::InvalidReference { kind: RefKind::Fragment, .. }));

        let err = store
            .add_rule(
                &parse(json!({"rule": "R", "fragment": "SAME_NAME", "disqualifier": "MISSING"}))
                    .expect("spec"),
            )
            .expect_err("disqualifier");
        assert!(matches!(err, CfgError::InvalidReference { kind: RefKind::Disqualifier, .. }));
        assert!(store.rules().by_code("R").is_none());
    }

    #[test]
    fn duplicate_rule_code_is_rejected() {
        let mut store = seed_store();
        let err = store
            .add_rule(&parse(json!({"fragment": "SF1_CNAME"})).expect("spec"))
            .expect_err("exists");
        assert!(matches!(err, CfgError::DuplicateCode { .. }));
    }
}
