//! # Settings
//!
//! `ercfg.toml` tells the tool which configuration document to edit:
//!
//! ```toml
//! config_file = "g2config.json"
//! mirror = "g2config.redb"   # optional
//! backup = true              # copy the document to <file>.bk before saving
//! ```
//!
//! The settings file is found through `--settings`, then the
//! `ERCFG_SETTINGS` environment variable, then `./ercfg.toml`. With none of
//! them present the defaults apply and `--config` must name the document.

use ercfg_core::CfgError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "ERCFG_SETTINGS";

/// Settings file looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "ercfg.toml";

/// Upper bound for a settings file; anything larger is not a settings file.
const MAX_SETTINGS_SIZE: u64 = 1024 * 1024;

const fn default_backup() -> bool {
    true
}

/// Resolved tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// The JSON configuration document.
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// redb mirror database, if mirroring is used.
    #[serde(default)]
    pub mirror: Option<PathBuf>,
    /// Keep a `.bk` copy of the previous document on save.
    #[serde(default = "default_backup")]
    pub backup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_file: None,
            mirror: None,
            backup: default_backup(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, CfgError> {
        toml::from_str(text).map_err(|e| CfgError::MalformedInput(format!("settings: {e}")))
    }

    /// Read and parse a settings file. Relative paths inside it are taken
    /// relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self, CfgError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            CfgError::Io(format!("cannot read settings {}: {e}", path.display()))
        })?;
        if metadata.len() > MAX_SETTINGS_SIZE {
            return Err(CfgError::MalformedInput(format!(
                "settings file {} is {} bytes, limit is {MAX_SETTINGS_SIZE}",
                path.display(),
                metadata.len()
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| CfgError::Io(format!("cannot read settings {}: {e}", path.display())))?;

        let mut settings = Self::from_toml(&text)?;
        if let Some(base) = path.parent() {
            settings.config_file = settings.config_file.map(|p| base.join(p));
            settings.mirror = settings.mirror.map(|p| base.join(p));
        }
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Find and load settings: explicit path, then `env_path`, then
    /// `./ercfg.toml` if it exists, else defaults.
    ///
    /// An explicit or environment path that does not exist is an error.
    pub fn resolve_with(explicit: Option<&Path>, env_path: Option<PathBuf>) -> Result<Self, CfgError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
            return Self::load(&path);
        }
        let local = Path::new(DEFAULT_SETTINGS_FILE);
        if local.is_file() {
            return Self::load(local);
        }
        Ok(Self::default())
    }

    /// [`Settings::resolve_with`] reading `ERCFG_SETTINGS` from the environment.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, CfgError> {
        Self::resolve_with(explicit, std::env::var_os(SETTINGS_ENV).map(PathBuf::from))
    }

    /// Apply `--config` / `--mirror` flags on top of the file values.
    #[must_use]
    pub fn with_overrides(mut self, config_file: Option<PathBuf>, mirror: Option<PathBuf>) -> Self {
        if config_file.is_some() {
            self.config_file = config_file;
        }
        if mirror.is_some() {
            self.mirror = mirror;
        }
        self
    }

    /// The configuration document path; missing is a startup error.
    pub fn config_path(&self) -> Result<&Path, CfgError> {
        self.config_file.as_deref().ok_or_else(|| {
            CfgError::MalformedInput(
                "no configuration document: set config_file in ercfg.toml or pass --config"
                    .to_string(),
            )
        })
    }

    /// The mirror database path, required by the mirror commands.
    pub fn mirror_path(&self) -> Result<&Path, CfgError> {
        self.mirror.as_deref().ok_or_else(|| {
            CfgError::MalformedInput(
                "no mirror database: set mirror in ercfg.toml or pass --mirror".to_string(),
            )
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
