//! # redb Mirror
//!
//! Mirrors every table of a [`ConfigStore`] into a redb database.
//!
//! Each configuration table becomes a redb table of the same name mapping the
//! row index (`u64`) to the row's JSON bytes, using the document column names.
//! A sync replaces each table in its own write transaction, parents before
//! children, so one failing table does not block the rest.
//!
//! A postcard-encoded [`Manifest`] is written last. It lists the tables the
//! last sync wrote and is what [`RedbMirror::load`] reads back.

use crate::formats::{TABLE_ORDER, from_tables};
use crate::primitives::MIRROR_FORMAT_VERSION;
use crate::store::ConfigStore;
use crate::types::CfgError;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

/// Table holding the manifest under [`MANIFEST_KEY`].
const MANIFEST: TableDefinition<&str, &[u8]> = TableDefinition::new("ercfg_manifest");

const MANIFEST_KEY: &str = "manifest";

fn storage_err(e: impl std::fmt::Display) -> CfgError {
    CfgError::Storage(e.to_string())
}

fn rows_table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

// =============================================================================
// MANIFEST
// =============================================================================

/// One mirrored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredTable {
    pub name: String,
    pub rows: u64,
    /// `false` for an unmodelled top-level value that is not an array; it is
    /// stored as a single row and restored as-is.
    pub array: bool,
}

/// What the last sync wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u8,
    pub tables: Vec<MirroredTable>,
}

/// Outcome of [`RedbMirror::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Tables written, with their row counts, in sync order.
    pub synced: Vec<(String, u64)>,
    /// Tables that failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl MirrorReport {
    /// `true` when every table was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Rows written across all tables.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.synced.iter().map(|(_, rows)| rows).sum()
    }
}

// =============================================================================
// MIRROR
// =============================================================================

/// A redb database holding a copy of one configuration.
pub struct RedbMirror {
    db: Database,
}

impl std::fmt::Debug for RedbMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbMirror").finish_non_exhaustive()
    }
}

impl RedbMirror {
    /// Open or create a mirror database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CfgError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        let write_txn = db.begin_write().map_err(storage_err)?;
        let _ = write_txn.open_table(MANIFEST).map_err(storage_err)?;
        write_txn.commit().map_err(storage_err)?;

        Ok(Self { db })
    }

    /// Replace the mirrored copy with the current store.
    ///
    /// Table failures are collected in the report. Only a failure to write
    /// the manifest is returned as an error.
    pub fn sync(&self, store: &ConfigStore) -> Result<MirrorReport, CfgError> {
        let mut tables = crate::formats::to_tables(store)?;
        let mut ordered: Vec<(String, Value)> = Vec::with_capacity(tables.len());
        for name in TABLE_ORDER {
            if let Some(value) = tables.remove(name) {
                ordered.push((name.to_string(), value));
            }
        }
        let mut rest: Vec<(String, Value)> = tables.into_iter().collect();
        rest.sort_by(|(a, _), (b, _)| a.cmp(b));
        ordered.extend(rest);

        let mut report = MirrorReport::default();
        let mut manifest = Manifest {
            format_version: MIRROR_FORMAT_VERSION,
            tables: Vec::new(),
        };

        for (name, value) in ordered {
            match self.replace_table(&name, value) {
                Ok(entry) => {
                    report.synced.push((name, entry.rows));
                    manifest.tables.push(entry);
                }
                Err(e) => {
                    warn!(table = %name, error = %e, "mirror table sync failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        self.write_manifest(&manifest)?;
        info!(
            tables = report.synced.len(),
            failed = report.failed.len(),
            rows = report.total_rows(),
            "mirror synced"
        );
        Ok(report)
    }

    /// Delete-all-then-insert one table in its own transaction.
    fn replace_table(&self, name: &str, value: Value) -> Result<MirroredTable, CfgError> {
        let (rows, array) = match value {
            Value::Array(rows) => (rows, true),
            other => (vec![other], false),
        };
        let encoded = rows
            .iter()
            .map(|row| serde_json::to_vec(row).map_err(|e| CfgError::Document(e.to_string())))
            .collect::<Result<Vec<Vec<u8>>, CfgError>>()?;

        let definition = rows_table(name);
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        write_txn.delete_table(definition).map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(definition).map_err(storage_err)?;
            for (index, bytes) in (0u64..).zip(&encoded) {
                table.insert(index, bytes.as_slice()).map_err(storage_err)?;
            }
        }
        write_txn.commit().map_err(storage_err)?;

        Ok(MirroredTable {
            name: name.to_string(),
            rows: encoded.len() as u64,
            array,
        })
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), CfgError> {
        let bytes = postcard::to_allocvec(manifest).map_err(storage_err)?;
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(MANIFEST).map_err(storage_err)?;
            table
                .insert(MANIFEST_KEY, bytes.as_slice())
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)
    }

    /// The manifest of the last sync, if the mirror was ever synced.
    pub fn manifest(&self) -> Result<Option<Manifest>, CfgError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(MANIFEST).map_err(storage_err)?;
        let Some(entry) = table.get(MANIFEST_KEY).map_err(storage_err)? else {
            return Ok(None);
        };
        let manifest: Manifest = postcard::from_bytes(entry.value()).map_err(storage_err)?;
        if manifest.format_version != MIRROR_FORMAT_VERSION {
            return Err(CfgError::Storage(format!(
                "unsupported mirror format version {} (expected {MIRROR_FORMAT_VERSION})",
                manifest.format_version
            )));
        }
        Ok(Some(manifest))
    }

    /// Rebuild a store from the tables named in the manifest.
    pub fn load(&self) -> Result<ConfigStore, CfgError> {
        let manifest = self
            .manifest()?
            .ok_or_else(|| CfgError::Storage("mirror has never been synced".to_string()))?;

        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let mut tables = Map::new();
        for entry in &manifest.tables {
            let table = read_txn
                .open_table(rows_table(&entry.name))
                .map_err(storage_err)?;
            if table.len().map_err(storage_err)? != entry.rows {
                return Err(CfgError::Storage(format!(
                    "{} holds a different row count than its manifest",
                    entry.name
                )));
            }

            let mut rows = Vec::new();
            for item in table.iter().map_err(storage_err)? {
                let (_, bytes) = item.map_err(storage_err)?;
                let row: Value = serde_json::from_slice(bytes.value())
                    .map_err(|e| CfgError::Document(format!("{}: {e}", entry.name)))?;
                rows.push(row);
            }

            let value = if entry.array {
                Value::Array(rows)
            } else {
                rows.into_iter().next().unwrap_or(Value::Null)
            };
            tables.insert(entry.name.clone(), value);
        }

        let store = from_tables(tables)?;
        info!(tables = manifest.tables.len(), "store loaded from mirror");
        Ok(store)
    }
}

// =============================================================================
// TESTS
// =============================================================================
