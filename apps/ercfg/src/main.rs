//! # ercfg
//!
//! Command-line editor for entity-resolution configuration documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 apps/ercfg (THE BINARY)              │
//! │                                                      │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────┐  │
//! │  │    CLI      │   │ Document I/O │   │ Settings │  │
//! │  │   (clap)    │   │ (backup+save)│   │  (toml)  │  │
//! │  └──────┬──────┘   └──────┬───────┘   └────┬─────┘  │
//! │         └─────────────────┼────────────────┘        │
//! │                           ▼                         │
//! │                   ┌──────────────┐                  │
//! │                   │  ercfg-core  │                  │
//! │                   │ (THE LOGIC)  │                  │
//! │                   └──────────────┘                  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! ercfg --config g2config.json list-features
//! ercfg add-data-source CUSTOMERS
//! ercfg set-distinct off
//! ercfg mirror-sync
//! ```

use clap::Parser;
use ercfg::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `ERCFG_LOG_FORMAT=json` switches logs to machine-parseable output.
const LOG_FORMAT_ENV: &str = "ERCFG_LOG_FORMAT";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ercfg=info,ercfg_core=info".into());

    // Logs go to stderr; stdout carries command output only.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}
