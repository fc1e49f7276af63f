//! # System Module
//!
//! Engine-wide parameters stored on other tables' rows.
//!
//! A system parameter has no table of its own: reading it inspects the rows
//! that carry it, and setting it rewrites all of them.

mod parameters;

pub use parameters::*;
