//! # Formats Module
//!
//! The JSON document form of a configuration store.
//!
//! Conversions here are pure: bytes and values in, stores out (and back).
//! Reading and writing files is the app layer's job.

mod document;

pub use document::*;
