//! # Identifier Allocator
//!
//! Computes the next free id of a table. User rows are allocated at or above
//! a reserved threshold so they never collide with seeded system rows.

use crate::store::Table;
use crate::types::{CfgError, Keyed, RowId};

/// Id allocation policy shared by every insert.
pub struct IdAllocator;

impl IdAllocator {
    /// `max(existing) + 1` if that is at least `threshold`, else `threshold`.
    ///
    /// Fails with [`CfgError::IdsExhausted`] when the largest id is `i64::MAX`.
    pub fn next_id<T: Keyed>(table: &Table<T>, threshold: i64) -> Result<RowId, CfgError> {
        match table.max_id() {
            Some(max) => {
                let next = Self::successor::<T>(max)?;
                Ok(if next.value() >= threshold { next } else { RowId(threshold) })
            }
            None => Ok(RowId(threshold)),
        }
    }

    /// The id after `id`, for handing out several fresh ids in one operation.
    pub fn successor<T: Keyed>(id: RowId) -> Result<RowId, CfgError> {
        id.next()
            .ok_or(CfgError::IdsExhausted { table: T::LABEL, max: id })
    }

    /// Validate a code and an optional explicit id, then pick the row id.
    ///
    /// Explicit ids below the threshold are accepted.
    pub fn claim<T: Keyed>(
        table: &Table<T>,
        code: Option<&str>,
        explicit: Option<RowId>,
        threshold: i64,
    ) -> Result<RowId, CfgError> {
        if let Some(code) = code {
            if table.by_code(code).is_some() {
                return Err(CfgError::DuplicateCode {
                    table: T::LABEL,
                    code: code.to_string(),
                });
            }
        }
        match explicit {
            Some(id) if table.by_id(id).is_some() => Err(CfgError::DuplicateId {
                table: T::LABEL,
                id,
            }),
            Some(id) => Ok(id),
            None => Self::next_id(table, threshold),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
