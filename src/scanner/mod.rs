//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Sorted, depth-first directory walking using walkdir
//! - Streaming content hashing with MD5, SHA-1 or SHA-256
//! - Symlink cycle detection
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and catalog tree construction
//! - [`hasher`]: Streaming file hashing
//!
//! # Example
//!
//! ```no_run
//! use filecat::scanner::{DirectoryScanner, ScannerConfig};
//! use std::path::Path;
//!
//! let outcome = DirectoryScanner::new(Path::new("."), ScannerConfig::default()).scan()?;
//! println!(
//!     "{} files, {} skipped entries",
//!     outcome.catalog.file_count(),
//!     outcome.issues.len()
//! );
//! # Ok::<(), filecat::CatalogError>(())
//! ```

pub mod hasher;
pub mod walker;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::EntryIssue;

// Re-export main types
pub use hasher::{Digester, HashAlgorithm, Hasher, DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use walker::DirectoryScanner;

/// Configuration for directory scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Resolve symbolic links. Cycles are detected and skipped.
    pub follow_symlinks: bool,

    /// Hash every file while walking. [`HashAlgorithm::None`] leaves
    /// hashing to the duplicate engine, which only hashes colliding files.
    pub hash_algorithm: HashAlgorithm,

    /// Read block size for eager hashing.
    pub block_size: usize,

    /// Levels counted by the freshness fingerprint (1 = top level). Sizes
    /// and mtimes always cover the whole tree.
    pub fingerprint_depth: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            hash_algorithm: HashAlgorithm::None,
            block_size: DEFAULT_BLOCK_SIZE,
            fingerprint_depth: 1,
        }
    }
}

impl ScannerConfig {
    /// Derive scanner settings from the application settings.
    ///
    /// Eager hashing stays off; settings only choose the algorithm used when
    /// hashing is requested.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            follow_symlinks: settings.follow_symlinks,
            hash_algorithm: HashAlgorithm::None,
            block_size: settings.block_size,
            fingerprint_depth: settings.fingerprint_depth,
        }
    }

    /// Set symlink following.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Enable eager hashing with `algorithm`.
    #[must_use]
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Set the read block size, clamped to at least [`MIN_BLOCK_SIZE`].
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(MIN_BLOCK_SIZE);
        self
    }

    /// Set the fingerprint probe depth (minimum 1).
    #[must_use]
    pub fn with_fingerprint_depth(mut self, depth: usize) -> Self {
        self.fingerprint_depth = depth.max(1);
        self
    }
}

/// Counters collected during one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Files recorded
    pub files: u64,
    /// Directories recorded, including the root
    pub directories: u64,
    /// Total bytes of recorded files
    pub bytes: u64,
    /// Files hashed eagerly
    pub files_hashed: u64,
    /// Bytes read for eager hashing
    pub bytes_hashed: u64,
    /// Entries skipped because they are neither files nor directories
    pub special_skipped: u64,
}

/// Result of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The catalog built from the tree
    pub catalog: Catalog,
    /// Entries that were skipped because of per-entry failures
    pub issues: Vec<EntryIssue>,
    /// Scan counters
    pub stats: ScanStats,
}
