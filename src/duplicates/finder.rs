//! Duplicate correlation engine.
//!
//! # Overview
//!
//! [`DuplicateEngine::correlate`] compares one source catalog against any
//! number of destination catalogs:
//! 1. **Exclusion**: source files that lie inside a destination root are
//!    dropped, so a destination nested in the source never matches itself
//! 2. **Keying**: destination files are indexed by (name, size) in
//!    [`CompareMode::NameSize`], or bucketed by size in [`CompareMode::Hash`]
//! 3. **Lazy hashing** (hash mode only): members of size buckets that hold
//!    both a source and a destination file are hashed on a bounded rayon
//!    pool; stored digests of the same algorithm are reused
//! 4. **Grouping**: every source file with at least one equivalent
//!    destination file becomes a [`DuplicateGroup`]
//!
//! # Example
//!
//! ```no_run
//! use filecat::duplicates::{CompareMode, CorrelationConfig, DuplicateEngine};
//! use filecat::scanner::{DirectoryScanner, HashAlgorithm, ScannerConfig};
//! use std::path::Path;
//!
//! let source = DirectoryScanner::new(Path::new("/data/src"), ScannerConfig::default()).scan()?;
//! let backup = DirectoryScanner::new(Path::new("/data/backup"), ScannerConfig::default()).scan()?;
//!
//! let engine = DuplicateEngine::new(
//!     CorrelationConfig::new(CompareMode::Hash(HashAlgorithm::Md5)).with_hash_workers(2),
//! );
//! let result = engine.correlate(&source.catalog, &[&backup.catalog])?;
//! println!("{} files already backed up", result.groups.len());
//! # Ok::<(), filecat::CatalogError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytesize::ByteSize;
use rayon::prelude::*;
use serde::Serialize;

use super::groups::{DuplicateGroup, DuplicateMatch, SizeBuckets};
use super::CompareMode;
use crate::catalog::{Catalog, FileEntry, StoredHash};
use crate::config::Settings;
use crate::error::{CatalogError, EntryIssue, IssueKind};
use crate::progress::{Phase, ProgressCallback};
use crate::scanner::hasher::{HashAlgorithm, Hasher, DEFAULT_BLOCK_SIZE};
use crate::task::CancelToken;

/// Default number of hashing threads.
/// Kept low so parallel reads do not thrash a spinning disk.
pub const DEFAULT_HASH_WORKERS: usize = 4;

/// Configuration for a correlation run.
#[derive(Clone)]
pub struct CorrelationConfig {
    /// Equivalence rule
    pub mode: CompareMode,
    /// Number of hashing threads
    pub hash_workers: usize,
    /// Read block size for hashing
    pub block_size: usize,
    /// Optional cancellation token
    pub cancel: Option<CancelToken>,
    /// Optional progress callback
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for CorrelationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationConfig")
            .field("mode", &self.mode)
            .field("hash_workers", &self.hash_workers)
            .field("block_size", &self.block_size)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self::new(CompareMode::NameSize)
    }
}

impl CorrelationConfig {
    /// Create a configuration for `mode` with default tuning.
    #[must_use]
    pub fn new(mode: CompareMode) -> Self {
        Self {
            mode,
            hash_workers: DEFAULT_HASH_WORKERS,
            block_size: DEFAULT_BLOCK_SIZE,
            cancel: None,
            progress: None,
        }
    }

    /// Take worker count and block size from the application settings.
    #[must_use]
    pub fn from_settings(settings: &Settings, mode: CompareMode) -> Self {
        Self::new(mode)
            .with_hash_workers(settings.hash_workers)
            .with_block_size(settings.block_size)
    }

    /// Set the comparison mode.
    #[must_use]
    pub fn with_mode(mut self, mode: CompareMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of hashing threads (minimum 1).
    #[must_use]
    pub fn with_hash_workers(mut self, workers: usize) -> Self {
        self.hash_workers = workers.max(1);
        self
    }

    /// Set the read block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Counters from one correlation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationStats {
    /// Files in the source catalog
    pub source_files: u64,
    /// Files across all destination catalogs
    pub destination_files: u64,
    /// Source files skipped because they lie inside a destination root
    pub excluded_sources: u64,
    /// Files in size buckets that needed a digest (hash mode)
    pub candidate_files: u64,
    /// Files read and hashed
    pub files_hashed: u64,
    /// Bytes read for hashing
    pub bytes_hashed: u64,
    /// Stored digests reused instead of reading the file
    pub digests_reused: u64,
    /// Duplicate groups found
    pub groups: u64,
    /// Matches across all groups
    pub matches: u64,
}

/// Result of a correlation run.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    /// Groups ordered by source path
    pub groups: Vec<DuplicateGroup>,
    /// Run counters
    pub stats: CorrelationStats,
    /// Files that could not be hashed and were left out
    pub issues: Vec<EntryIssue>,
}

/// A file taking part in a correlation.
struct Candidate<'a> {
    path: PathBuf,
    entry: &'a FileEntry,
    catalog_root: &'a Path,
}

#[derive(Clone, Copy)]
enum Side {
    Source(usize),
    Destination(usize),
}

struct HashJob<'a> {
    side: Side,
    path: &'a Path,
    size: u64,
    stored: Option<&'a StoredHash>,
}

enum JobResult {
    Computed(Vec<u8>),
    Reused(Vec<u8>),
    Failed(EntryIssue),
    Cancelled,
}

/// Correlates a source catalog against destination catalogs.
#[derive(Debug)]
pub struct DuplicateEngine {
    config: CorrelationConfig,
    hasher: Hasher,
}

impl DuplicateEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: CorrelationConfig) -> Self {
        let mut hasher = Hasher::new().with_block_size(config.block_size);
        if let Some(token) = &config.cancel {
            hasher = hasher.with_cancel_token(token.clone());
        }
        Self { config, hasher }
    }

    /// The engine's hasher, whose counters span every run of this engine.
    #[must_use]
    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Find every source file with an equivalent copy in a destination.
    ///
    /// # Errors
    ///
    /// * [`CatalogError::Cancelled`] if the token was set during the run
    /// * [`CatalogError::UnsupportedHashAlgorithm`] if hash mode names an
    ///   algorithm that cannot be computed
    ///
    /// Files that cannot be hashed are reported in [`Correlation::issues`].
    pub fn correlate(
        &self,
        source: &Catalog,
        destinations: &[&Catalog],
    ) -> Result<Correlation, CatalogError> {
        if let CompareMode::Hash(algorithm) = self.config.mode {
            algorithm.ensure_computable()?;
        }
        self.checkpoint()?;

        let mut stats = CorrelationStats::default();
        let dest_roots: Vec<&Path> = destinations.iter().map(|d| d.root_path.as_path()).collect();
        let kept = distinct_roots(&dest_roots);
        if kept.len() < destinations.len() {
            log::debug!(
                "Ignoring {} destination(s) nested in another destination",
                destinations.len() - kept.len()
            );
        }
        let destinations: Vec<&Catalog> = kept.iter().map(|&i| destinations[i]).collect();

        log::debug!(
            "Correlating {} against {} destination(s) by {}",
            source.root_path.display(),
            destinations.len(),
            self.config.mode
        );

        let mut sources: Vec<Candidate<'_>> = Vec::new();
        for file in source.files() {
            stats.source_files += 1;
            if destinations.iter().any(|d| d.contains_path(&file.path)) {
                log::trace!("Excluding {} (inside a destination)", file.path.display());
                stats.excluded_sources += 1;
                continue;
            }
            sources.push(Candidate {
                path: file.path,
                entry: file.entry,
                catalog_root: &source.root_path,
            });
        }

        let mut dests: Vec<Candidate<'_>> = Vec::new();
        for destination in &destinations {
            for file in destination.files() {
                dests.push(Candidate {
                    path: file.path,
                    entry: file.entry,
                    catalog_root: &destination.root_path,
                });
            }
        }
        stats.destination_files = dests.len() as u64;

        let mut issues = Vec::new();
        let groups = match self.config.mode {
            CompareMode::NameSize => self.match_by_name_size(&sources, &dests)?,
            CompareMode::Hash(algorithm) => {
                self.match_by_hash(algorithm, &sources, &dests, &mut stats, &mut issues)?
            }
        };

        stats.groups = groups.len() as u64;
        stats.matches = groups.iter().map(|g| g.matches.len() as u64).sum();
        log::info!(
            "Correlation complete: {} groups, {} matches ({} excluded, {} hashed, {})",
            stats.groups,
            stats.matches,
            stats.excluded_sources,
            stats.files_hashed,
            ByteSize::b(stats.bytes_hashed)
        );

        Ok(Correlation {
            groups,
            stats,
            issues,
        })
    }

    fn checkpoint(&self) -> Result<(), CatalogError> {
        match &self.config.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    fn match_by_name_size(
        &self,
        sources: &[Candidate<'_>],
        dests: &[Candidate<'_>],
    ) -> Result<Vec<DuplicateGroup>, CatalogError> {
        let mut index: HashMap<(&str, u64), Vec<usize>> = HashMap::new();
        for (i, d) in dests.iter().enumerate() {
            index
                .entry((d.entry.name.as_str(), d.entry.size))
                .or_default()
                .push(i);
        }

        if let Some(p) = &self.config.progress {
            p.on_phase_start(Phase::Correlating, sources.len() as u64);
        }
        let mut groups = Vec::new();
        for s in sources {
            self.checkpoint()?;
            if let Some(hits) = index.get(&(s.entry.name.as_str(), s.entry.size)) {
                groups.push(build_group(s, hits, dests));
            }
        }
        if let Some(p) = &self.config.progress {
            p.on_phase_end(Phase::Correlating);
        }
        Ok(groups)
    }

    fn match_by_hash(
        &self,
        algorithm: HashAlgorithm,
        sources: &[Candidate<'_>],
        dests: &[Candidate<'_>],
        stats: &mut CorrelationStats,
        issues: &mut Vec<EntryIssue>,
    ) -> Result<Vec<DuplicateGroup>, CatalogError> {
        let mut buckets = SizeBuckets::new();
        for (i, s) in sources.iter().enumerate() {
            buckets.add_source(s.entry.size, i);
        }
        for (i, d) in dests.iter().enumerate() {
            buckets.add_destination(d.entry.size, i);
        }

        let mut jobs: Vec<HashJob<'_>> = Vec::new();
        for (size, src, dst) in buckets.colliding() {
            let sides = src
                .iter()
                .map(|&i| (Side::Source(i), &sources[i]))
                .chain(dst.iter().map(|&i| (Side::Destination(i), &dests[i])));
            for (side, candidate) in sides {
                jobs.push(HashJob {
                    side,
                    path: &candidate.path,
                    size,
                    stored: candidate.entry.hash.as_ref(),
                });
            }
        }
        stats.candidate_files = jobs.len() as u64;
        log::debug!(
            "Hash phase: {} of {} files share a size with the other side",
            jobs.len(),
            sources.len() + dests.len()
        );

        let files_before = self.hasher.files_hashed();
        let bytes_before = self.hasher.bytes_hashed();
        let results = self.run_hash_jobs(algorithm, &jobs);
        stats.files_hashed = self.hasher.files_hashed() - files_before;
        stats.bytes_hashed = self.hasher.bytes_hashed() - bytes_before;

        let mut source_digests: Vec<Option<Vec<u8>>> = vec![None; sources.len()];
        let mut dest_digests: Vec<Option<Vec<u8>>> = vec![None; dests.len()];
        let mut cancelled = false;
        for (job, result) in jobs.iter().zip(results) {
            let digest = match result {
                JobResult::Computed(d) => d,
                JobResult::Reused(d) => {
                    stats.digests_reused += 1;
                    d
                }
                JobResult::Failed(issue) => {
                    log::warn!("Could not hash {}: {}", issue.path.display(), issue.detail);
                    issues.push(issue);
                    continue;
                }
                JobResult::Cancelled => {
                    cancelled = true;
                    continue;
                }
            };
            match job.side {
                Side::Source(i) => source_digests[i] = Some(digest),
                Side::Destination(i) => dest_digests[i] = Some(digest),
            }
        }
        if cancelled || self.config.is_cancelled() {
            log::debug!("Hash phase cancelled");
            return Err(CatalogError::Cancelled);
        }

        if let Some(p) = &self.config.progress {
            p.on_phase_start(Phase::Correlating, sources.len() as u64);
        }
        let mut index: HashMap<(u64, &[u8]), Vec<usize>> = HashMap::new();
        for (i, digest) in dest_digests.iter().enumerate() {
            if let Some(digest) = digest {
                index
                    .entry((dests[i].entry.size, digest.as_slice()))
                    .or_default()
                    .push(i);
            }
        }

        let mut groups = Vec::new();
        for (i, s) in sources.iter().enumerate() {
            let Some(digest) = &source_digests[i] else {
                continue;
            };
            if let Some(hits) = index.get(&(s.entry.size, digest.as_slice())) {
                groups.push(build_group(s, hits, dests));
            }
        }
        if let Some(p) = &self.config.progress {
            p.on_phase_end(Phase::Correlating);
        }
        Ok(groups)
    }

    /// Compute or reuse digests for every job on a bounded pool.
    fn run_hash_jobs(&self, algorithm: HashAlgorithm, jobs: &[HashJob<'_>]) -> Vec<JobResult> {
        if jobs.is_empty() {
            return Vec::new();
        }
        if let Some(p) = &self.config.progress {
            p.on_phase_start(Phase::Hashing, jobs.len() as u64);
        }

        let work = || {
            jobs.par_iter()
                .map(|job| self.hash_job(algorithm, job))
                .collect::<Vec<_>>()
        };
        let results = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.hash_workers)
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                log::warn!(
                    "Failed to create hash pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                work()
            }
        };

        if let Some(p) = &self.config.progress {
            p.on_phase_end(Phase::Hashing);
        }
        results
    }

    fn hash_job(&self, algorithm: HashAlgorithm, job: &HashJob<'_>) -> JobResult {
        if self.config.is_cancelled() {
            return JobResult::Cancelled;
        }
        if let Some(stored) = job.stored {
            if stored.algorithm == algorithm {
                log::trace!("Reusing stored digest for {}", job.path.display());
                return JobResult::Reused(stored.digest.clone());
            }
        }
        match self.hasher.hash_file(job.path, algorithm) {
            Ok(hash) => {
                if let Some(p) = &self.config.progress {
                    p.on_hashed(job.size);
                }
                JobResult::Computed(hash.digest)
            }
            Err(e) if e.is_cancelled() => JobResult::Cancelled,
            Err(e) => JobResult::Failed(EntryIssue::new(job.path, IssueKind::HashFailed, e.to_string())),
        }
    }
}

fn build_group(source: &Candidate<'_>, hits: &[usize], dests: &[Candidate<'_>]) -> DuplicateGroup {
    let matches = hits
        .iter()
        .map(|&j| DuplicateMatch {
            catalog_root: dests[j].catalog_root.to_path_buf(),
            path: dests[j].path.clone(),
            size: dests[j].entry.size,
        })
        .collect();
    DuplicateGroup::new(source.path.clone(), source.entry.size, matches)
}

/// Correlate with default tuning and no cancellation.
///
/// # Errors
///
/// See [`DuplicateEngine::correlate`].
pub fn correlate(
    source: &Catalog,
    destinations: &[&Catalog],
    mode: CompareMode,
) -> Result<Vec<DuplicateGroup>, CatalogError> {
    DuplicateEngine::new(CorrelationConfig::new(mode))
        .correlate(source, destinations)
        .map(|c| c.groups)
}

/// Drop roots nested inside another root of the list.
///
/// Exact repeats keep their first occurrence. Order is otherwise preserved.
#[must_use]
pub fn filter_overlapping_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let borrowed: Vec<&Path> = roots.iter().map(PathBuf::as_path).collect();
    distinct_roots(&borrowed)
        .into_iter()
        .map(|i| roots[i].clone())
        .collect()
}

/// Indices of the roots not nested in (or repeating) another root.
fn distinct_roots(roots: &[&Path]) -> Vec<usize> {
    (0..roots.len())
        .filter(|&i| {
            !roots.iter().enumerate().any(|(j, other)| {
                j != i && roots[i].starts_with(other) && (roots[i] != *other || j < i)
            })
        })
        .collect()
}
