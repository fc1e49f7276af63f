//! # ercfg
//!
//! The command-line front end of the configuration engine. The binary in
//! `main.rs` only initialises logging and dispatches to [`cli::execute`];
//! everything else lives here so it can be tested without a process.

pub mod cli;
pub mod document_io;
pub mod settings;
