//! System parameters.
//!
//! `relationshipsBreakMatches` controls whether a disclosed relationship
//! between two records prevents them from resolving. It is stored as the
//! `BREAK_RES` bit of every relationship type of the disclosed class; all of
//! them are expected to agree, so the first one is authoritative.

use crate::primitives::DISCLOSED_RELATIONSHIP_CLASS;
use crate::store::ConfigStore;
use crate::types::{Bit, CfgError, Flag};
use serde::Serialize;
use tracing::info;

/// Name of the only system parameter.
pub const RELATIONSHIPS_BREAK_MATCHES: &str = "relationshipsBreakMatches";

/// Current values of every system parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemParameters {
    #[serde(rename = "relationshipsBreakMatches")]
    pub relationships_break_matches: Flag,
}

impl ConfigStore {
    /// `true` if disclosed relationships break matches.
    #[must_use]
    pub fn relationships_break_matches(&self) -> bool {
        self.relationship_types
            .find(|rtype| rtype.class_id == DISCLOSED_RELATIONSHIP_CLASS)
            .is_some_and(|rtype| rtype.break_res.is_set())
    }

    /// Set the break flag on every disclosed relationship type.
    ///
    /// Returns the number of relationship types touched.
    pub fn set_relationships_break_matches(&mut self, on: bool) -> usize {
        let mut touched = 0;
        for rtype in self.relationship_types.iter_mut() {
            if rtype.class_id == DISCLOSED_RELATIONSHIP_CLASS {
                rtype.break_res = Bit(on);
                touched += 1;
            }
        }
        if touched > 0 {
            self.mark_updated();
        }
        info!(parameter = RELATIONSHIPS_BREAK_MATCHES, on, touched, "system parameter set");
        touched
    }

    #[must_use]
    pub fn system_parameters(&self) -> SystemParameters {
        SystemParameters {
            relationships_break_matches: Flag::from_bool(self.relationships_break_matches()),
        }
    }

    /// Set a parameter by name (case-sensitive) from a Yes/No value.
    pub fn set_system_parameter(&mut self, name: &str, value: &str) -> Result<usize, CfgError> {
        if name != RELATIONSHIPS_BREAK_MATCHES {
            return Err(CfgError::invalid_enum("system parameter", name));
        }
        let on: Flag = value.parse()?;
        Ok(self.set_relationships_break_matches(on.is_yes()))
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
    fn first_disclosed_type_is_authoritative() {
        let store = seed_store();
        assert!(!store.relationships_break_matches());
        assert_eq!(store.system_parameters().relationships_break_matches, Flag::No);
    }

    #[test]
    fn set_touches_every_disclosed_type() {
        let mut store = seed_store();
        assert_eq!(store.set_system_parameter(RELATIONSHIPS_BREAK_MATCHES, "yes").expect("set"), 2);
        assert!(store.relationships_break_matches());
        assert!(
            store
                .relationship_types()
                .filter(|r| r.class_id == DISCLOSED_RELATIONSHIP_CLASS)
                .all(|r| r.break_res.is_set())
        );
        // Resolved relationships are left alone.
        assert!(store.relationship_types().filter(|r| r.class_id != 2).all(|r| !r.break_res.is_set()));
        assert!(store.is_updated());
    }

    #[test]
    fn unknown_parameter_and_value_are_rejected() {
        let mut store = seed_store();
        assert!(matches!(
            store.set_system_parameter("colour", "Yes"),
            Err(CfgError::InvalidEnum { .. })
        ));
        assert!(store.set_system_parameter(RELATIONSHIPS_BREAK_MATCHES, "maybe").is_err());
        assert!(!store.is_updated());
    }
}
