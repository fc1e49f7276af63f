//! Shared seed configuration for unit tests.

use crate::formats;
use crate::store::ConfigStore;

/// A small but complete configuration covering every table.
pub const SEED_DOCUMENT: &str = include_str!("../tests/fixtures/seed_config.json");

/// The seed document loaded into a fresh store.
pub fn seed_store() -> ConfigStore {
    formats::from_str(SEED_DOCUMENT).expect("seed document loads")
}
