//! Application configuration management.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory, or an explicit file
//! 3. Environment variables prefixed with `FILECAT_` (e.g. `FILECAT_HASH_WORKERS=8`)
//!
//! Out-of-range values are clamped after extraction rather than rejected.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scanner::{HashAlgorithm, DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FILECAT_";

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Algorithm used when content comparison is requested without one
    pub default_hash_algorithm: HashAlgorithm,
    /// Threads in the hashing pool
    pub hash_workers: usize,
    /// Read block size for hashing, in bytes
    pub block_size: usize,
    /// Follow symbolic links while scanning
    pub follow_symlinks: bool,
    /// Levels below the root whose entries the freshness fingerprint counts
    pub fingerprint_depth: usize,
    /// Reuse fresh index files instead of rescanning
    pub reuse_indices: bool,
    /// Directory for index files; unset keeps them next to each root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,
    /// Where to look for existing index files
    pub index_search_locations: Vec<PathBuf>,
    /// Load discovered index files at startup
    pub auto_load_indices: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_hash_algorithm: HashAlgorithm::Md5,
            hash_workers: 4,
            block_size: DEFAULT_BLOCK_SIZE,
            follow_symlinks: true,
            fingerprint_depth: 1,
            reuse_indices: true,
            index_dir: None,
            index_search_locations: default_search_locations(),
            auto_load_indices: true,
        }
    }
}

impl Settings {
    /// Load settings from the default config file and the environment.
    ///
    /// Falls back to defaults if the layers cannot be merged.
    #[must_use]
    pub fn load() -> Self {
        let figment = match Self::config_path() {
            Some(path) => Self::figment(Some(&path)),
            None => Self::figment(None),
        };
        match figment.extract::<Self>() {
            Ok(settings) => settings.clamped(),
            Err(e) => {
                log::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit TOML file layered over defaults,
    /// with environment overrides on top.
    ///
    /// A missing file contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns the figment error if the file is malformed or a value has the
    /// wrong type.
    pub fn load_from(path: &Path) -> Result<Self, figment::Error> {
        let settings: Self = Self::figment(Some(path)).extract()?;
        Ok(settings.clamped())
    }

    /// The layered provider stack.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Clamp out-of-range values into their valid ranges.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.hash_workers = self.hash_workers.max(1);
        self.block_size = self.block_size.max(MIN_BLOCK_SIZE);
        self.fingerprint_depth = self.fingerprint_depth.max(1);
        self
    }

    /// Save the settings as TOML to the default platform-specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined or the
    /// file cannot be written.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save the settings as TOML to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("serializing settings")?;
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Default platform-specific configuration path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "filecat", "filecat")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn default_search_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        locations.push(cwd);
    }
    if let Some(home) = UserDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        if !locations.contains(&home) {
            locations.push(home);
        }
    }
    locations
}
