//! # ercfg-core
//!
//! The configuration graph engine for entity-resolution configurations.
//!
//! A configuration is a set of relational tables (features, elements,
//! function calls, attributes, rules, ...) whose rows reference each other by
//! id or code. This crate holds those tables in a [`ConfigStore`] and offers
//! the operations that add, inspect and delete rows while keeping every
//! reference valid.
//!
//! ## Architectural Constraints
//!
//! - Pure and synchronous: no async, no network dependencies
//! - One owner mutates the store at a time; there is no interior locking
//! - Every operation validates fully before it mutates, so a failed call
//!   leaves the store exactly as it was
//! - File I/O belongs to the app layer; [`formats`] converts between stores
//!   and JSON, and [`storage`] mirrors a store into redb

// =============================================================================
// MODULES
// =============================================================================

pub mod allocator;
pub mod attribute;
pub mod behavior;
pub mod cascade;
pub mod catalog;
pub mod compositor;
pub mod formats;
pub mod fragment;
pub mod maintenance;
pub mod primitives;
pub mod request;
pub mod rules;
pub mod storage;
pub mod store;
pub mod system;
pub mod types;

#[cfg(test)]
mod test_support;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Attribute, AttributeClass, Bit, Call, CallElement, CfgError, DataSource, DataType, Element,
    EntityClass, EntityFeature, EntityType, Feature, FeatureClass, FeatureElement, Flag, Fragment,
    Function, FunctionKind, Keyed, RefKind, RelationshipType, RequiredPolicy, RowId, Rule,
};

// =============================================================================
// RE-EXPORTS: Store and Operations
// =============================================================================

pub use allocator::IdAllocator;
pub use behavior::{Behavior, Frequency};
pub use cascade::Deletion;
pub use catalog::EntityTypeView;
pub use compositor::Template;
pub use fragment::fragment_references;
pub use maintenance::{ExpressionCallReport, FeatureElementView, FeatureView};
pub use request::{AttributeSelector, Selector};
pub use store::{ConfigStore, FunctionTables, ParkedDistinct, Table};

// =============================================================================
// RE-EXPORTS: Formats and Storage
// =============================================================================

pub use formats::{TABLE_ORDER, from_str, from_value, to_pretty_string, to_value};
pub use storage::{Manifest, MirrorReport, RedbMirror};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{RELATIONSHIPS_BREAK_MATCHES, SystemParameters};
