//! Directory walker that builds a catalog tree.
//!
//! # Overview
//!
//! [`DirectoryScanner`] walks a root with walkdir, sorted by file name, and
//! assembles the [`Catalog`] tree from the depth-tagged pre-order stream using
//! a stack of open directories. Per-entry failures become [`EntryIssue`]s; only
//! failures on the root itself abort the scan.
//!
//! # Features
//!
//! - Symlinks followed by default, with cycles detected against the current
//!   ancestor chain and recorded as skipped entries
//! - Non-UTF-8 names skipped and recorded
//! - Optional eager hashing of every file
//! - Cooperative cancellation at each directory (and each file when hashing)
//! - Progress reported through a [`ProgressCallback`]

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytesize::ByteSize;
use walkdir::WalkDir;

use super::hasher::Hasher;
use super::{ScanOutcome, ScanStats, ScannerConfig};
use crate::catalog::{unix_seconds, Catalog, DirEntry, Entry, FileEntry, Fingerprint};
use crate::error::{CatalogError, EntryIssue, IssueKind};
use crate::progress::{Phase, ProgressCallback};
use crate::task::CancelToken;

/// Builds a [`Catalog`] from a directory tree.
pub struct DirectoryScanner {
    /// Root path to walk
    root: PathBuf,
    /// Scanner configuration
    config: ScannerConfig,
    /// Optional cancellation token
    cancel: Option<CancelToken>,
    /// Optional progress callback
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for DirectoryScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryScanner")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "ProgressCallback"))
            .finish()
    }
}

/// A directory whose children are still being collected.
struct OpenDir {
    name: String,
    children: Vec<Entry>,
}

impl OpenDir {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    fn finish(self) -> DirEntry {
        DirEntry::new(self.name, self.children)
    }
}

/// Pop the innermost open directory and attach it to its parent.
fn close_top(stack: &mut Vec<OpenDir>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(Entry::Directory(done.finish()));
        }
    }
}

impl DirectoryScanner {
    /// Create a scanner for `root`.
    #[must_use]
    pub fn new(root: &Path, config: ScannerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            cancel: None,
            progress: None,
        }
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

    fn checkpoint(&self) -> Result<(), CatalogError> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    /// Walk the tree and build its catalog.
    ///
    /// # Errors
    ///
    /// * [`CatalogError::PathNotFound`] / [`CatalogError::PermissionDenied`] if
    ///   the root cannot be accessed
    /// * [`CatalogError::IoFailure`] if the root is not a directory or its
    ///   canonical path is not valid UTF-8
    /// * [`CatalogError::UnsupportedHashAlgorithm`] if eager hashing was
    ///   requested with an algorithm that cannot be computed
    /// * [`CatalogError::Cancelled`] if the token was set mid-walk
    pub fn scan(&self) -> Result<ScanOutcome, CatalogError> {
        let root = self.resolve_root()?;
        let algorithm = self.config.hash_algorithm;
        let hasher = if algorithm.is_none() {
            None
        } else {
            algorithm.ensure_computable()?;
            let mut hasher = Hasher::new().with_block_size(self.config.block_size);
            if let Some(token) = &self.cancel {
                hasher = hasher.with_cancel_token(token.clone());
            }
            Some(hasher)
        };

        self.checkpoint()?;
        // Probed before walking so changes made during the walk invalidate the result.
        let fingerprint = Fingerprint::probe(
            &root,
            self.config.fingerprint_depth,
            self.config.follow_symlinks,
        )?;

        log::debug!(
            "Scanning {} (follow_symlinks={}, eager hash={})",
            root.display(),
            self.config.follow_symlinks,
            algorithm
        );
        if let Some(p) = &self.progress {
            p.on_phase_start(Phase::Walking, 0);
        }

        let mut stack: Vec<OpenDir> = Vec::new();
        let mut issues: Vec<EntryIssue> = Vec::new();
        let mut stats = ScanStats::default();

        let mut walker = WalkDir::new(&root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        while let Some(item) = walker.next() {
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 && err.loop_ancestor().is_none() {
                        let io_err = err
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::other("walk failed at root"));
                        return Err(CatalogError::from_io(&root, io_err));
                    }
                    let issue = classify_walk_error(&err);
                    log::warn!("Skipping {}: {}", issue.path.display(), issue.detail);
                    issues.push(issue);
                    continue;
                }
            };

            let depth = entry.depth();
            if depth == 0 {
                self.checkpoint()?;
                stats.directories += 1;
                if let Some(p) = &self.progress {
                    p.on_directory();
                }
                stack.push(OpenDir::new(String::new()));
                continue;
            }

            while stack.len() > depth {
                close_top(&mut stack);
            }
            if stack.len() < depth {
                log::trace!("Orphaned entry {}", entry.path().display());
                continue;
            }

            let file_type = entry.file_type();
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                log::warn!("Skipping non-UTF-8 name: {}", entry.path().display());
                issues.push(EntryIssue::new(
                    entry.path(),
                    IssueKind::NonUtf8Name,
                    "entry name is not valid UTF-8",
                ));
                if file_type.is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            };

            if file_type.is_dir() {
                self.checkpoint()?;
                stats.directories += 1;
                if let Some(p) = &self.progress {
                    p.on_directory();
                }
                stack.push(OpenDir::new(name));
            } else if file_type.is_file() {
                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        let issue = classify_walk_error(&err);
                        log::warn!("Skipping {}: {}", issue.path.display(), issue.detail);
                        issues.push(issue);
                        continue;
                    }
                };
                let size = metadata.len();
                let modified = metadata.modified().map(unix_seconds).unwrap_or(0);
                let mut file = FileEntry::new(name, size, modified);

                if let Some(hasher) = &hasher {
                    let read_before = hasher.bytes_hashed();
                    match hasher.hash_file(entry.path(), algorithm) {
                        Ok(hash) => {
                            let read = hasher.bytes_hashed() - read_before;
                            file.hash = Some(hash);
                            stats.files_hashed += 1;
                            stats.bytes_hashed += read;
                            if let Some(p) = &self.progress {
                                p.on_hashed(read);
                            }
                        }
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => {
                            log::warn!("Could not hash {}: {}", entry.path().display(), e);
                            issues.push(EntryIssue::new(
                                entry.path(),
                                IssueKind::HashFailed,
                                e.to_string(),
                            ));
                        }
                    }
                }

                log::trace!("Recorded {} ({} bytes)", entry.path().display(), size);
                stats.files += 1;
                stats.bytes += size;
                if let Some(p) = &self.progress {
                    p.on_file(size);
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Entry::File(file));
                }
            } else {
                log::trace!("Skipping special entry {}", entry.path().display());
                stats.special_skipped += 1;
            }
        }

        while stack.len() > 1 {
            close_top(&mut stack);
        }
        let root_dir = stack.pop().map(OpenDir::finish).unwrap_or_default();

        if let Some(p) = &self.progress {
            p.on_phase_end(Phase::Walking);
        }
        log::info!(
            "Scan complete: {} files, {} directories, {} ({} skipped)",
            stats.files,
            stats.directories,
            ByteSize::b(stats.bytes),
            issues.len()
        );

        let catalog = Catalog::new(root, algorithm, fingerprint, root_dir);
        Ok(ScanOutcome {
            catalog,
            issues,
            stats,
        })
    }

    /// Canonicalize the root and check it is a UTF-8 directory path.
    fn resolve_root(&self) -> Result<PathBuf, CatalogError> {
        let metadata =
            fs::metadata(&self.root).map_err(|e| CatalogError::from_io(&self.root, e))?;
        if !metadata.is_dir() {
            return Err(CatalogError::IoFailure {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            });
        }
        let root =
            fs::canonicalize(&self.root).map_err(|e| CatalogError::from_io(&self.root, e))?;
        if root.to_str().is_none() {
            return Err(CatalogError::IoFailure {
                path: root,
                source: io::Error::new(io::ErrorKind::InvalidData, "root path is not valid UTF-8"),
            });
        }
        Ok(root)
    }
}

/// Turn a walkdir error below the root into a recorded issue.
fn classify_walk_error(err: &walkdir::Error) -> EntryIssue {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    if let Some(ancestor) = err.loop_ancestor() {
        return EntryIssue::new(
            path,
            IssueKind::SymlinkCycle,
            format!("symlink loops back to {}", ancestor.display()),
        );
    }
    match err.io_error() {
        Some(io_err) if io_err.kind() == io::ErrorKind::NotFound && is_symlink(&path) => {
            EntryIssue::new(path, IssueKind::BrokenSymlink, io_err.to_string())
        }
        Some(io_err) => EntryIssue::from_io(&path, io_err),
        None => EntryIssue::new(path, IssueKind::Io, err.to_string()),
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}
