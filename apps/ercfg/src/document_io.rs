//! # Document I/O
//!
//! Reading and writing configuration documents on disk.
//!
//! Saving is backup-then-write: the previous document is copied to
//! `<file>.bk` first, so a failed write never loses the last good version.

use ercfg_core::primitives::MAX_DOCUMENT_SIZE;
use ercfg_core::{CfgError, ConfigStore};
use std::path::{Path, PathBuf};
use tracing::info;

/// `<file>.bk` next to the document.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bk");
    PathBuf::from(name)
}

/// Load a document, rejecting oversized files before reading them.
pub fn load_store(path: &Path) -> Result<ConfigStore, CfgError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CfgError::Io(format!("cannot read {}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(CfgError::Io(format!("{} is not a regular file", path.display())));
    }
    if metadata.len() > MAX_DOCUMENT_SIZE as u64 {
        return Err(CfgError::Document(format!(
            "{} is {} bytes, limit is {MAX_DOCUMENT_SIZE}",
            path.display(),
            metadata.len()
        )));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| CfgError::Io(format!("cannot read {}: {e}", path.display())))?;
    let store = ercfg_core::from_str(&text)?;
    info!(path = %path.display(), features = store.features().len(), "configuration loaded");
    Ok(store)
}

/// Write the store, backing up the previous document when `backup` is set,
/// then clear the store's `updated` flag.
///
/// Returns the backup path if one was written.
pub fn save_store(
    store: &mut ConfigStore,
    path: &Path,
    backup: bool,
) -> Result<Option<PathBuf>, CfgError> {
    let text = ercfg_core::to_pretty_string(store)?;

    let backup_written = if backup && path.is_file() {
        let target = backup_path(path);
        std::fs::copy(path, &target)
            .map_err(|e| CfgError::Io(format!("cannot back up to {}: {e}", target.display())))?;
        Some(target)
    } else {
        None
    };

    std::fs::write(path, text)
        .map_err(|e| CfgError::Io(format!("cannot write {}: {e}", path.display())))?;
    store.clear_updated();
    info!(path = %path.display(), backup = backup_written.is_some(), "configuration saved");
    Ok(backup_written)
}

// =============================================================================
// TESTS
// =============================================================================
