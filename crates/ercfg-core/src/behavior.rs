//! # Behavior Codec
//!
//! A feature's matching behavior is stored as three columns (frequency,
//! exclusivity, stability) but entered and displayed as one compact code:
//!
//! ```text
//! <frequency>[E][S]      frequency = F1 | FF | FM | FVM | NONE
//! ```
//!
//! Decoding accepts the suffixes in either order; encoding always writes
//! `E` before `S`, so `encode(decode(s))` is the canonical form of `s`.

use crate::types::{CfgError, Flag};
use std::fmt;
use std::str::FromStr;

/// How often a feature value is expected to repeat across entities.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Frequency {
    /// One per entity.
    F1,
    /// Few.
    FF,
    /// Many.
    #[default]
    FM,
    /// Very many.
    FVM,
    /// Not used for matching.
    None,
}

impl Frequency {
    /// Longest tokens first so `FVM` is not read as `F` + garbage.
    const TOKENS: [(&'static str, Self); 5] = [
        ("NONE", Self::None),
        ("FVM", Self::FVM),
        ("F1", Self::F1),
        ("FF", Self::FF),
        ("FM", Self::FM),
    ];

    /// Document representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::F1 => "F1",
            Self::FF => "FF",
            Self::FM => "FM",
            Self::FVM => "FVM",
            Self::None => "NONE",
        }
    }

    /// All frequencies.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::TOKENS.iter().map(|(_, f)| *f)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::TOKENS
            .iter()
            .find(|(token, _)| *token == upper)
            .map(|(_, f)| *f)
            .ok_or_else(|| CfgError::invalid_enum("frequency", s))
    }
}

/// The three behavior flags of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Behavior {
    pub frequency: Frequency,
    pub exclusive: bool,
    pub stable: bool,
}

impl Behavior {
    /// Create a behavior.
    #[must_use]
    pub const fn new(frequency: Frequency, exclusive: bool, stable: bool) -> Self {
        Self {
            frequency,
            exclusive,
            stable,
        }
    }

    /// Decode a behavior code (case-insensitive).
    ///
    /// Fails with [`CfgError::InvalidEnum`] unless the code is a frequency
    /// token followed by at most one `E` and at most one `S`.
    pub fn decode(code: &str) -> Result<Self, CfgError> {
        let upper = code.trim().to_ascii_uppercase();
        let invalid = || CfgError::invalid_enum("behavior", code);

        let (frequency, rest) = Frequency::TOKENS
            .iter()
            .find_map(|(token, f)| upper.strip_prefix(token).map(|rest| (*f, rest)))
            .ok_or_else(invalid)?;

        let mut exclusive = false;
        let mut stable = false;
        for c in rest.chars() {
            match c {
                'E' if !exclusive => exclusive = true,
                'S' if !stable => stable = true,
                _ => return Err(invalid()),
            }
        }

        Ok(Self::new(frequency, exclusive, stable))
    }

    /// Canonical code: frequency, then `E`, then `S`.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut code = String::from(self.frequency.as_str());
        if self.exclusive {
            code.push('E');
        }
        if self.stable {
            code.push('S');
        }
        code
    }

    /// Exclusivity as a document flag.
    #[must_use]
    pub const fn exclusive_flag(&self) -> Flag {
        Flag::from_bool(self.exclusive)
    }

    /// Stability as a document flag.
    #[must_use]
    pub const fn stable_flag(&self) -> Flag {
        Flag::from_bool(self.stable)
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Behavior {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

// =============================================================================
// TESTS
// =============================================================================
