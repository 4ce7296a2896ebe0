//! Catalog store: reuse-vs-rebuild, active scoping and atomic swaps.
//!
//! # Overview
//!
//! [`CatalogStore`] owns every known catalog, keyed by the canonical path of
//! the tree it describes. Each record holds an `Arc<Catalog>` behind its own
//! lock plus an active flag that scopes search and correlation.
//!
//! [`CatalogStore::load_or_rebuild`] decides whether a persisted index can be
//! trusted:
//! - `force_recreate` always rescans
//! - with `reuse`, a persisted index whose stored [`Fingerprint`] equals a
//!   live probe of the tree is accepted; a stale, unreadable or mismatched
//!   index is rebuilt
//! - without `reuse`, the tree is scanned and nothing is persisted
//!
//! A rebuild scans outside of every lock and then swaps the record's pointer.
//! Readers that already hold the previous `Arc<Catalog>` keep a consistent
//! view; a cancelled or failed rebuild leaves the record untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use walkdir::WalkDir;

use crate::catalog::codec::{self, CatalogSummary};
use crate::catalog::{Catalog, Fingerprint};
use crate::config::Settings;
use crate::error::{CatalogError, EntryIssue, IssueKind};
use crate::progress::ProgressCallback;
use crate::scanner::{DirectoryScanner, HashAlgorithm, ScannerConfig};
use crate::task::CancelToken;

/// File extension of persisted catalogs.
pub const INDEX_EXTENSION: &str = "caf";

/// Store-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Scanner settings used for rebuilds
    pub scanner: ScannerConfig,
    /// Directory holding index files; `None` places them next to each root
    pub index_dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Derive store settings from the application settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scanner: ScannerConfig::from_settings(settings),
            index_dir: settings.index_dir.clone(),
        }
    }

    /// Set the scanner configuration.
    #[must_use]
    pub fn with_scanner(mut self, scanner: ScannerConfig) -> Self {
        self.scanner = scanner;
        self
    }

    /// Set the index directory.
    #[must_use]
    pub fn with_index_dir(mut self, dir: PathBuf) -> Self {
        self.index_dir = Some(dir);
        self
    }
}

/// Flags for [`CatalogStore::load_or_rebuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Load a persisted index when fresh, and persist rebuilt ones
    pub reuse: bool,
    /// Rescan even if a fresh index exists
    pub force_recreate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            reuse: true,
            force_recreate: false,
        }
    }
}

impl LoadOptions {
    /// Create load options.
    #[must_use]
    pub fn new(reuse: bool, force_recreate: bool) -> Self {
        Self {
            reuse,
            force_recreate,
        }
    }

    /// Reuse as configured, without forcing a rescan.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.reuse_indices, false)
    }
}

/// Why a catalog was rebuilt rather than reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// `force_recreate` was set
    Forced,
    /// `reuse` was off
    ReuseDisabled,
    /// No persisted index exists
    NoIndex,
    /// The tree changed since the index was built
    Stale,
    /// The index describes another root or was hashed differently
    Incompatible(String),
    /// The index could not be read or decoded
    Unreadable(String),
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => f.write_str("rebuild forced"),
            Self::ReuseDisabled => f.write_str("index reuse disabled"),
            Self::NoIndex => f.write_str("no index found"),
            Self::Stale => f.write_str("tree changed since the index was built"),
            Self::Incompatible(why) => write!(f, "index incompatible: {why}"),
            Self::Unreadable(why) => write!(f, "index unreadable: {why}"),
        }
    }
}

/// What [`CatalogStore::load_or_rebuild`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadAction {
    /// The persisted index was fresh and was used as is
    Reused,
    /// The tree was scanned
    Rebuilt(RebuildReason),
}

/// Result of [`CatalogStore::load_or_rebuild`].
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// The catalog now held by the store
    pub catalog: Arc<Catalog>,
    /// Whether the index was reused or rebuilt, and why
    pub action: LoadAction,
    /// Index file location for this root
    pub index_path: PathBuf,
    /// Whether a rebuilt catalog was written to `index_path`
    pub persisted: bool,
    /// Entries skipped during a rebuild, plus a persist failure if any
    pub issues: Vec<EntryIssue>,
}

/// Point-in-time view of a store record.
#[derive(Debug, Clone)]
pub struct CatalogRecord {
    /// Canonical root path (the record key)
    pub root: PathBuf,
    /// Where the catalog is persisted
    pub index_path: PathBuf,
    /// The catalog
    pub catalog: Arc<Catalog>,
    /// Whether the catalog takes part in search and correlation
    pub active: bool,
    /// Freshness fingerprint of the catalog
    pub fingerprint: Fingerprint,
}

struct SlotState {
    catalog: Arc<Catalog>,
    index_path: PathBuf,
}

struct RecordSlot {
    state: RwLock<SlotState>,
    active: AtomicBool,
}

impl RecordSlot {
    fn snapshot(&self, root: &Path) -> CatalogRecord {
        let state = read_lock(&self.state);
        CatalogRecord {
            root: root.to_path_buf(),
            index_path: state.index_path.clone(),
            catalog: Arc::clone(&state.catalog),
            active: self.active.load(Ordering::SeqCst),
            fingerprint: state.catalog.fingerprint,
        }
    }

    fn replace(&self, catalog: Arc<Catalog>, index_path: &Path) {
        let mut state = write_lock(&self.state);
        state.catalog = catalog;
        state.index_path = index_path.to_path_buf();
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Canonical form of `path`, or `path` itself if it no longer resolves.
fn record_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Owns the set of known catalogs.
pub struct CatalogStore {
    config: StoreConfig,
    records: RwLock<BTreeMap<PathBuf, Arc<RecordSlot>>>,
}

impl fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogStore")
            .field("config", &self.config)
            .field("records", &read_lock(&self.records).keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl CatalogStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a store from the application settings.
    ///
    /// With `auto_load_indices` set, every index discovered in
    /// `index_search_locations` is opened; unreadable ones are skipped with a
    /// warning.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let store = Self::new(StoreConfig::from_settings(settings));
        if settings.auto_load_indices {
            let results = store.load_discovered(&settings.index_search_locations);
            let loaded = results.iter().filter(|(_, r)| r.is_ok()).count();
            log::info!(
                "Auto-loaded {} of {} discovered index file(s)",
                loaded,
                results.len()
            );
        }
        store
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Where the index for `root` hashed with `algorithm` lives.
    ///
    /// `<dir>/<name>_index.caf`, or `<dir>/<name>_index_<algo>.caf` for eagerly
    /// hashed catalogs, where `<dir>` is the configured index directory or the
    /// parent of `root`.
    #[must_use]
    pub fn index_path_for(&self, root: &Path, algorithm: HashAlgorithm) -> PathBuf {
        index_path_for(root, algorithm, self.config.index_dir.as_deref())
    }

    /// Load the catalog of `root`, reusing a fresh persisted index if allowed.
    ///
    /// # Errors
    ///
    /// Fails if `root` cannot be accessed or scanned. A persisted index that
    /// cannot be decoded is not an error when reuse is on: the tree is
    /// rebuilt and [`LoadAction::Rebuilt`] carries the reason.
    pub fn load_or_rebuild(
        &self,
        root: &Path,
        options: LoadOptions,
    ) -> Result<LoadOutcome, CatalogError> {
        self.load_or_rebuild_with(root, options, None, None)
    }

    /// [`load_or_rebuild`](Self::load_or_rebuild) with cancellation and progress.
    ///
    /// # Errors
    ///
    /// As [`load_or_rebuild`](Self::load_or_rebuild), plus
    /// [`CatalogError::Cancelled`] if `cancel` is set before the new catalog
    /// is complete. The existing record is left untouched in that case.
    pub fn load_or_rebuild_with(
        &self,
        root: &Path,
        options: LoadOptions,
        cancel: Option<&CancelToken>,
        progress: Option<Arc<dyn ProgressCallback>>,
    ) -> Result<LoadOutcome, CatalogError> {
        let root = fs::canonicalize(root).map_err(|e| CatalogError::from_io(root, e))?;
        let index_path = self.index_path_for(&root, self.config.scanner.hash_algorithm);

        let reason = if options.force_recreate {
            RebuildReason::Forced
        } else if !options.reuse {
            RebuildReason::ReuseDisabled
        } else if !index_path.is_file() {
            RebuildReason::NoIndex
        } else {
            match self.try_reuse(&root, &index_path) {
                Ok(catalog) => {
                    log::info!(
                        "Reusing index {} for {}",
                        index_path.display(),
                        root.display()
                    );
                    let catalog = self.install(&root, catalog, &index_path);
                    return Ok(LoadOutcome {
                        catalog,
                        action: LoadAction::Reused,
                        index_path,
                        persisted: false,
                        issues: Vec::new(),
                    });
                }
                Err(reason) => reason,
            }
        };

        if let Some(token) = cancel {
            token.check()?;
        }
        log::info!("Building index for {} ({})", root.display(), reason);

        let mut scanner = DirectoryScanner::new(&root, self.config.scanner.clone());
        if let Some(token) = cancel {
            scanner = scanner.with_cancel_token(token.clone());
        }
        if let Some(progress) = progress {
            scanner = scanner.with_progress(progress);
        }
        let outcome = scanner.scan()?;
        let mut issues = outcome.issues;

        let mut persisted = false;
        if options.reuse {
            match codec::write_catalog(&index_path, &outcome.catalog) {
                Ok(()) => persisted = true,
                Err(e) => {
                    log::warn!("Could not save index {}: {}", index_path.display(), e);
                    issues.push(EntryIssue::new(&index_path, IssueKind::Io, e.to_string()));
                }
            }
        }

        let catalog = self.install(&root, outcome.catalog, &index_path);
        Ok(LoadOutcome {
            catalog,
            action: LoadAction::Rebuilt(reason),
            index_path,
            persisted,
            issues,
        })
    }

    /// Load a persisted index if it is still valid for `root`.
    fn try_reuse(&self, root: &Path, index_path: &Path) -> Result<Catalog, RebuildReason> {
        let catalog = codec::read_catalog(index_path).map_err(|e| {
            log::warn!("Ignoring unreadable index {}: {}", index_path.display(), e);
            RebuildReason::Unreadable(e.to_string())
        })?;

        if catalog.root_path != root {
            return Err(RebuildReason::Incompatible(format!(
                "describes {}",
                catalog.root_path.display()
            )));
        }
        let algorithm = self.config.scanner.hash_algorithm;
        if !algorithm.is_none() && catalog.hash_algorithm != algorithm {
            return Err(RebuildReason::Incompatible(format!(
                "hashed with {}, {} requested",
                catalog.hash_algorithm, algorithm
            )));
        }

        let live = Fingerprint::probe(
            root,
            self.config.scanner.fingerprint_depth,
            self.config.scanner.follow_symlinks,
        )
        .map_err(|e| RebuildReason::Unreadable(e.to_string()))?;
        if live != catalog.fingerprint {
            log::debug!(
                "Index {} is stale: stored {:?}, live {:?}",
                index_path.display(),
                catalog.fingerprint,
                live
            );
            return Err(RebuildReason::Stale);
        }
        Ok(catalog)
    }

    /// Publish `catalog` under `root`, swapping any previous one.
    fn install(&self, root: &Path, catalog: Catalog, index_path: &Path) -> Arc<Catalog> {
        let catalog = Arc::new(catalog);
        let existing = read_lock(&self.records).get(root).cloned();
        match existing {
            Some(slot) => slot.replace(Arc::clone(&catalog), index_path),
            None => {
                write_lock(&self.records)
                    .entry(root.to_path_buf())
                    .and_modify(|slot| slot.replace(Arc::clone(&catalog), index_path))
                    .or_insert_with(|| {
                        Arc::new(RecordSlot {
                            state: RwLock::new(SlotState {
                                catalog: Arc::clone(&catalog),
                                index_path: index_path.to_path_buf(),
                            }),
                            active: AtomicBool::new(true),
                        })
                    });
            }
        }
        catalog
    }

    /// Register an already-built catalog, keyed by its root path.
    ///
    /// The catalog is not persisted; `index_path` defaults to the location
    /// [`index_path_for`](Self::index_path_for) would choose.
    pub fn insert(&self, catalog: Catalog, index_path: Option<PathBuf>) -> Arc<Catalog> {
        let root = catalog.root_path.clone();
        let index_path =
            index_path.unwrap_or_else(|| self.index_path_for(&root, catalog.hash_algorithm));
        self.install(&root, catalog, &index_path)
    }

    /// Strictly load a persisted index and register it.
    ///
    /// # Errors
    ///
    /// Returns any read or decode error; nothing is registered in that case.
    pub fn open_index(&self, index_file: &Path) -> Result<Arc<Catalog>, CatalogError> {
        let catalog = codec::read_catalog(index_file)?;
        let root = catalog.root_path.clone();
        log::debug!(
            "Opened index {} for {}",
            index_file.display(),
            root.display()
        );
        Ok(self.install(&root, catalog, index_file))
    }

    /// Open every index found by [`discover`] in `locations`.
    ///
    /// Each file's outcome is reported; failures do not stop the others.
    pub fn load_discovered(
        &self,
        locations: &[PathBuf],
    ) -> Vec<(PathBuf, Result<Arc<Catalog>, CatalogError>)> {
        discover(locations)
            .into_iter()
            .map(|file| {
                let result = self.open_index(&file);
                if let Err(e) = &result {
                    log::warn!("Skipping index {}: {}", file.display(), e);
                }
                (file, result)
            })
            .collect()
    }

    fn slot(&self, root: &Path) -> Option<(PathBuf, Arc<RecordSlot>)> {
        let records = read_lock(&self.records);
        if let Some(slot) = records.get(root) {
            return Some((root.to_path_buf(), Arc::clone(slot)));
        }
        let key = record_key(root);
        records.get(&key).map(|slot| (key, Arc::clone(slot)))
    }

    /// Current catalog for `root`.
    #[must_use]
    pub fn get(&self, root: &Path) -> Option<Arc<Catalog>> {
        self.slot(root)
            .map(|(_, slot)| Arc::clone(&read_lock(&slot.state).catalog))
    }

    /// Snapshot of the record for `root`.
    #[must_use]
    pub fn record(&self, root: &Path) -> Option<CatalogRecord> {
        self.slot(root).map(|(key, slot)| slot.snapshot(&key))
    }

    /// Snapshots of every record, ordered by root path.
    #[must_use]
    pub fn records(&self) -> Vec<CatalogRecord> {
        read_lock(&self.records)
            .iter()
            .map(|(root, slot)| slot.snapshot(root))
            .collect()
    }

    /// Header summaries of every record, ordered by root path.
    #[must_use]
    pub fn summaries(&self) -> Vec<CatalogSummary> {
        self.records()
            .into_iter()
            .map(|r| CatalogSummary::from_catalog(&r.catalog, Some(r.index_path)))
            .collect()
    }

    /// Include or exclude `root` from search and correlation scope.
    ///
    /// Persisted state is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::PathNotFound`] if no record exists for `root`.
    pub fn set_active(&self, root: &Path, active: bool) -> Result<(), CatalogError> {
        let (_, slot) = self
            .slot(root)
            .ok_or_else(|| CatalogError::PathNotFound(root.to_path_buf()))?;
        slot.active.store(active, Ordering::SeqCst);
        log::debug!("{} is now {}", root.display(), if active { "active" } else { "inactive" });
        Ok(())
    }

    /// Active flag of `root`, if known.
    #[must_use]
    pub fn is_active(&self, root: &Path) -> Option<bool> {
        self.slot(root)
            .map(|(_, slot)| slot.active.load(Ordering::SeqCst))
    }

    /// Catalogs of all active records, ordered by root path.
    #[must_use]
    pub fn active_catalogs(&self) -> Vec<Arc<Catalog>> {
        self.records()
            .into_iter()
            .filter(|r| r.active)
            .map(|r| r.catalog)
            .collect()
    }

    /// Roots of all active records, ordered.
    #[must_use]
    pub fn active_paths(&self) -> Vec<PathBuf> {
        self.records()
            .into_iter()
            .filter(|r| r.active)
            .map(|r| r.root)
            .collect()
    }

    /// Forget the record for `root`. The index file is left on disk.
    pub fn remove(&self, root: &Path) -> Option<CatalogRecord> {
        let (key, _) = self.slot(root)?;
        let slot = write_lock(&self.records).remove(&key)?;
        Some(slot.snapshot(&key))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock(&self.records).len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index file location for `root`.
///
/// See [`CatalogStore::index_path_for`].
#[must_use]
pub fn index_path_for(root: &Path, algorithm: HashAlgorithm, index_dir: Option<&Path>) -> PathBuf {
    let name = root
        .file_name()
        .and_then(OsStr::to_str)
        .filter(|n| !n.is_empty())
        .unwrap_or("root");
    let file_name = if algorithm.is_none() {
        format!("{name}_index.{INDEX_EXTENSION}")
    } else {
        format!("{name}_index_{}.{INDEX_EXTENSION}", algorithm.name())
    };
    let dir = index_dir
        .map(Path::to_path_buf)
        .or_else(|| root.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| root.to_path_buf());
    dir.join(file_name)
}

/// Find index files in each location and one directory level below it.
///
/// Missing locations are skipped. The result is sorted and free of repeats.
#[must_use]
pub fn discover(locations: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for location in locations {
        if !location.is_dir() {
            log::trace!("Index location {} does not exist", location.display());
            continue;
        }
        for entry in WalkDir::new(location)
            .min_depth(1)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
        {
            let is_index = entry.file_type().is_file()
                && entry.path().extension() == Some(OsStr::new(INDEX_EXTENSION));
            if is_index {
                found.insert(entry.into_path());
            }
        }
    }
    log::debug!("Discovered {} index file(s)", found.len());
    found.into_iter().collect()
}
