//! Duplicate groups and size bucketing.
//!
//! # Overview
//!
//! [`SizeBuckets`] is the cheap pre-filter of hash-mode correlation: files are
//! bucketed by exact size on both sides, and only buckets that hold at least
//! one source and one destination file ever reach the hasher.
//!
//! [`DuplicateGroup`] is the result unit: one source file and every
//! destination location holding an equivalent copy.
//!
//! # Example
//!
//! ```
//! use filecat::duplicates::SizeBuckets;
//!
//! let mut buckets = SizeBuckets::new();
//! buckets.add_source(1024, 0);
//! buckets.add_source(2048, 1);
//! buckets.add_destination(1024, 0);
//!
//! let colliding: Vec<_> = buckets.colliding().map(|(size, _, _)| size).collect();
//! assert_eq!(colliding, vec![1024]);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One destination location equivalent to a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Root of the destination catalog holding the copy
    pub catalog_root: PathBuf,
    /// Full path of the copy
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// A source file and all of its equivalent destination copies.
///
/// A group always has at least one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Full path of the source file
    pub source_path: PathBuf,
    /// Size of the source file in bytes
    pub source_size: u64,
    /// Matches ordered by destination catalog root, then path
    pub matches: Vec<DuplicateMatch>,
}

impl DuplicateGroup {
    /// Create a group, ordering the matches.
    #[must_use]
    pub fn new(source_path: PathBuf, source_size: u64, mut matches: Vec<DuplicateMatch>) -> Self {
        matches.sort_by(|a, b| {
            a.catalog_root
                .cmp(&b.catalog_root)
                .then_with(|| a.path.cmp(&b.path))
        });
        Self {
            source_path,
            source_size,
            matches,
        }
    }

    /// Number of destination copies.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Distinct destination roots holding a copy, in match order.
    #[must_use]
    pub fn catalog_roots(&self) -> Vec<&Path> {
        let mut roots: Vec<&Path> = Vec::new();
        for m in &self.matches {
            if roots.last() != Some(&m.catalog_root.as_path()) {
                roots.push(&m.catalog_root);
            }
        }
        roots
    }
}

/// Bytes freed by deleting every source file in `groups`.
#[must_use]
pub fn total_reclaimable(groups: &[DuplicateGroup]) -> u64 {
    groups.iter().map(|g| g.source_size).sum()
}

/// Candidate indices bucketed by file size, per side.
#[derive(Debug, Default)]
pub struct SizeBuckets {
    buckets: HashMap<u64, (Vec<usize>, Vec<usize>)>,
}

impl SizeBuckets {
    /// Create empty buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record source candidate `index` of `size` bytes.
    pub fn add_source(&mut self, size: u64, index: usize) {
        self.buckets.entry(size).or_default().0.push(index);
    }

    /// Record destination candidate `index` of `size` bytes.
    pub fn add_destination(&mut self, size: u64, index: usize) {
        self.buckets.entry(size).or_default().1.push(index);
    }

    /// Buckets holding candidates on both sides, as `(size, sources, destinations)`.
    pub fn colliding(&self) -> impl Iterator<Item = (u64, &[usize], &[usize])> + '_ {
        self.buckets
            .iter()
            .filter(|(_, (src, dst))| !src.is_empty() && !dst.is_empty())
            .map(|(size, (src, dst))| (*size, src.as_slice(), dst.as_slice()))
    }

    /// Number of distinct sizes seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no candidate was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
