//! # Storage Module
//!
//! Optional relational mirror of a configuration in a redb database.
//!
//! The JSON document stays the source of truth; the mirror is a copy other
//! tools can query, and a store can be rebuilt from it.

mod redb_mirror;

pub use redb_mirror::*;
