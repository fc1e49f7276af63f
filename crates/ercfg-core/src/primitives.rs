//! # Fixed Conventions
//!
//! Constants compiled into the engine. Seeded system rows live below the
//! reserved id thresholds; everything a user adds is allocated above them.

/// First id handed out to user rows in most tables.
///
/// Ids below this value belong to pre-seeded system rows. Explicit ids below
/// the threshold are still accepted, so administrators can edit system rows.
pub const RESERVED_ID_THRESHOLD: i64 = 1000;

/// First id handed out to user attributes.
pub const ATTRIBUTE_ID_THRESHOLD: i64 = 2000;

/// Features that can never be deleted.
pub const PROTECTED_FEATURES: &[&str] = &["NAME"];

/// Data sources that can never be deleted.
pub const PROTECTED_DATA_SOURCES: &[&str] = &["SEARCH"];

/// Code of the expression function whose call builds the composite name key.
pub const NAME_HASHER: &str = "NAME_HASHER";

/// Feature class used when none is given.
pub const DEFAULT_FEATURE_CLASS: &str = "OTHER";

/// Entity class used when none is given.
pub const DEFAULT_ENTITY_CLASS: &str = "ACTOR";

/// Feature whose elements are displayed one level down.
pub const ADDRESS_FEATURE: &str = "ADDRESS";

/// Comparison function bound by the identifier templates.
pub const TEMPLATE_COMPARISON: &str = "EXACT_COMP";

/// Element created by the identifier templates.
pub const TEMPLATE_ELEMENT: &str = "ID_NUM";

/// Relationship class whose types the `relationshipsBreakMatches` parameter drives.
pub const DISCLOSED_RELATIONSHIP_CLASS: i64 = 2;

// =============================================================================
// DOCUMENT LIMITS
// =============================================================================

/// Name of the single top-level object of a configuration document.
pub const DOCUMENT_ROOT: &str = "G2_CONFIG";

/// Largest document accepted before parsing (256 MiB).
pub const MAX_DOCUMENT_SIZE: usize = 256 * 1024 * 1024;

/// Version of the redb mirror layout.
pub const MIRROR_FORMAT_VERSION: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_threshold_is_above_default() {
        assert!(ATTRIBUTE_ID_THRESHOLD > RESERVED_ID_THRESHOLD);
    }

    #[test]
    fn name_is_protected() {
        assert!(PROTECTED_FEATURES.contains(&"NAME"));
        assert!(PROTECTED_DATA_SOURCES.contains(&"SEARCH"));
    }
}
