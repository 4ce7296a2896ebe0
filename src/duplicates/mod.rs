//! Cross-catalog duplicate correlation.
//!
//! A source catalog is compared against any number of destination catalogs.
//! Every source file with at least one equivalent destination file becomes a
//! [`DuplicateGroup`]. Equivalence is decided by the [`CompareMode`]:
//!
//! - [`CompareMode::NameSize`]: same file name and same size. Cheap, needs
//!   no I/O, and accepts false positives.
//! - [`CompareMode::Hash`]: same size and same content digest. Only files
//!   whose size collides with a file on the other side are hashed.
//!
//! See [`finder`] for the engine and [`groups`] for the result types.

pub mod finder;
pub mod groups;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::scanner::HashAlgorithm;

pub use finder::{
    correlate, filter_overlapping_roots, Correlation, CorrelationConfig, CorrelationStats,
    DuplicateEngine,
};
pub use groups::{total_reclaimable, DuplicateGroup, DuplicateMatch, SizeBuckets};

/// How two files are judged equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// Same name and size
    NameSize,
    /// Same size and content digest
    Hash(HashAlgorithm),
}

impl CompareMode {
    /// Content comparison uses the configured default algorithm.
    #[must_use]
    pub fn from_settings(settings: &Settings, by_content: bool) -> Self {
        if by_content {
            Self::Hash(settings.default_hash_algorithm)
        } else {
            Self::NameSize
        }
    }

    /// Human-readable description used in reports and script headers.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::NameSize => "file name + size".to_string(),
            Self::Hash(algorithm) => format!("{algorithm} hash + size"),
        }
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
