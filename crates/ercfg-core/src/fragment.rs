//! # Fragment Dependency Parser
//!
//! Rule fragments are boolean expressions over match scores. A fragment may
//! reuse other fragments through `FRAGMENT[...]` spans:
//!
//! ```text
//! ./FRAGMENT[./SAME_NAME>0 and ./SAME_STAB>0] or ./FRAGMENT[./SAME_NAME1>0]
//! ```
//!
//! Inside a span, every `/` starts a fragment code that runs until the next
//! separator. This module only extracts the codes; resolving them to ids is
//! the store's job.

use crate::types::CfgError;

/// Opening marker of a fragment reference span.
pub const FRAGMENT_MARKER: &str = "FRAGMENT[";

/// Characters that end a fragment code.
const SEPARATORS: [char; 6] = [' ', '=', '>', '<', ')', ']'];

/// Tokenizer state while scanning one span.
#[derive(Debug)]
enum Scan {
    /// Between codes.
    Idle,
    /// Reading the code that started at the last `/`.
    Code(String),
}

/// Extract the fragment codes referenced by `source`, deduplicated in order
/// of first appearance.
///
/// Spans are consumed from the working copy as they are scanned, so
/// sequential spans are all visited. An unterminated span is
/// [`CfgError::MalformedInput`].
pub fn fragment_references(source: &str) -> Result<Vec<String>, CfgError> {
    let mut working = source.to_string();
    let mut codes: Vec<String> = Vec::new();

    while let Some(start) = working.find(FRAGMENT_MARKER) {
        let close = working[start..]
            .find(']')
            .map(|offset| start + offset)
            .ok_or_else(|| {
                CfgError::MalformedInput(format!(
                    "unterminated {FRAGMENT_MARKER} in fragment source: {source}"
                ))
            })?;

        for code in scan_span(&working[start..=close]) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        working.replace_range(start..=close, "");
    }

    Ok(codes)
}

/// Tokenize one `FRAGMENT[...]` span.
fn scan_span(span: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut state = Scan::Idle;

    for c in span.chars() {
        state = match (state, c) {
            (Scan::Idle | Scan::Code(_), '/') => Scan::Code(String::new()),
            (Scan::Code(code), c) if SEPARATORS.contains(&c) => {
                if !code.is_empty() {
                    found.push(code);
                }
                Scan::Idle
            }
            (Scan::Code(mut code), c) => {
                code.push(c);
                Scan::Code(code)
            }
            (Scan::Idle, _) => Scan::Idle,
        };
    }

    found
}

// =============================================================================
// TESTS
// =============================================================================
