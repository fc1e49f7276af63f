//! # ercfg CLI Module
//!
//! One subcommand per configuration operation. Commands that create or
//! change rows take a JSON object with the same keys the interactive editor
//! accepted (keys are case-insensitive); most also accept a bare code.
//!
//! ```bash
//! ercfg add-data-source CUSTOMERS
//! ercfg add-feature '{"feature": "PASSPORT", "behavior": "F1ES",
//!                     "comparison": "EXACT_COMP", "elementList": ["ID_NUM"]}'
//! ercfg delete-feature PASSPORT
//! ercfg --json-mode get-feature NAME
//! ```
//!
//! Every command loads the document named by the settings, runs, and saves
//! (backup-then-write) only if the store changed.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use ercfg_core::FunctionKind;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// ercfg - entity-resolution configuration editor
#[derive(Parser, Debug)]
#[command(name = "ercfg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings file (default: $ERCFG_SETTINGS, then ./ercfg.toml)
    #[arg(short = 'S', long, global = true)]
    pub settings: Option<PathBuf>,

    /// Configuration document, overriding the settings file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// redb mirror database, overriding the settings file
    #[arg(short = 'm', long, global = true)]
    pub mirror: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// `on` / `off` argument.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Function kind argument of `list-functions`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Standardize,
    Expression,
    Comparison,
    Distinct,
}

impl From<KindArg> for FunctionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Standardize => Self::Standardize,
            KindArg::Expression => Self::Expression,
            KindArg::Comparison => Self::Comparison,
            KindArg::Distinct => Self::Distinct,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    // ---- Data sources, entity classes and types ----
    /// List data sources
    ListDataSources,
    /// Add a data source: CODE or {"dataSource": CODE, "id": N}
    AddDataSource { args: String },
    /// Delete a data source (SEARCH is protected)
    DeleteDataSource { code: String },

    /// List entity classes
    ListEntityClasses,
    /// Add an entity class: CODE or {"entityClass": CODE, "resolve": "Yes"}
    AddEntityClass { args: String },
    /// Delete an entity class no entity type uses
    DeleteEntityClass { code: String },

    /// List entity types with their classes
    ListEntityTypes,
    /// Add an entity type: CODE or {"entityType": CODE, "class": "ACTOR"}
    AddEntityType { args: String },
    /// Delete an entity type and its feature links
    DeleteEntityType { code: String },

    // ---- Elements and features ----
    /// List feature elements
    ListElements,
    /// Add an element: CODE or {"element": CODE, "datatype": "string"}
    AddElement { args: String },
    /// Delete an element no feature uses
    DeleteElement { code: String },

    /// List feature classes
    ListFeatureClasses,
    /// List features
    ListFeatures,
    /// Show one feature with its functions and elements
    GetFeature { code: String },
    /// Add a feature from a JSON definition
    AddFeature { args: String },
    /// Change behavior, flags or functions of a feature
    SetFeature { args: String },
    /// Delete a feature and everything that depends on it
    DeleteFeature { code: String },
    /// Add an element to a feature: {"feature": F, "element": E, ...}
    AddElementToFeature { args: String },
    /// Remove an element from a feature: {"feature": F, "element": E}
    DeleteElementFromFeature { args: String },
    /// Feed a feature element to the name hasher: {"feature": F, "element": E}
    AddToNameHash { args: String },
    /// Switch distinct processing on or off
    SetDistinct { state: Toggle },
    /// Report every expression call element with resolved codes
    VerifyExpressionCalls,
    /// Create an identifier feature and attribute from a template
    TemplateAdd {
        /// BASIC_IDENTIFIER, EXCLUSIVE_IDENTIFIER (or IDENTIFIER), STABLE_IDENTIFIER
        template: String,
        code: String,
    },
    /// List functions of one kind
    ListFunctions { kind: KindArg },

    // ---- Attributes ----
    /// List attributes
    ListAttributes,
    /// Show attributes: CODE, ID, or {"feature": F}
    GetAttribute { selector: String },
    /// Add an attribute from a JSON definition
    AddAttribute { args: String },
    /// Delete attributes: CODE, ID, or {"feature": F}
    DeleteAttribute { selector: String },

    // ---- Fragments and rules ----
    /// List rule fragments
    ListFragments,
    /// Show a fragment: CODE or ID
    GetFragment { selector: String },
    /// Add a fragment: {"fragment": CODE, "source": "..."}
    AddFragment { args: String },
    /// Delete a fragment nothing depends on: CODE or ID
    DeleteFragment { selector: String },

    /// List rules
    ListRules,
    /// Show a rule: CODE or ID
    GetRule { selector: String },
    /// Add a rule: {"fragment": CODE, "disqualifier": CODE, "tier": N, ...}
    AddRule { args: String },
    /// Delete a rule: CODE or ID
    DeleteRule { selector: String },

    // ---- System ----
    /// List system parameters
    ListSystemParameters,
    /// Set a system parameter, e.g. relationshipsBreakMatches Yes
    SetSystemParameter { name: String, value: String },
    /// Check keys and references of the whole configuration
    Check,
    /// Compute the BLAKE3 hash of the saved document
    Hash,

    // ---- Mirror ----
    /// Copy every table into the redb mirror
    MirrorSync,
    /// Replace the document with the contents of the redb mirror
    MirrorLoad,
}
