//! Freshness fingerprint for persisted catalogs.

use std::path::Path;

use walkdir::WalkDir;

use super::unix_seconds;
use crate::error::CatalogError;

/// Cheap metadata summary of a directory tree.
///
/// Compared against a live probe to decide whether a persisted catalog can be
/// reused. Entry count covers the levels down to the probed depth; total file
/// bytes and newest modification time cover the whole tree, so rewriting a
/// file at any level forces a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub struct Fingerprint {
    /// Entries (files, directories, other) within the probed depth
    pub entry_count: u64,
    /// Sum of all file sizes in the tree
    pub total_size: u64,
    /// Newest modification time in the tree, including the root itself
    pub latest_mtime: i64,
}

impl Fingerprint {
    /// Probe `root`, counting entries down to `depth` levels (1 = direct
    /// children only). Sizes and mtimes are read at every level.
    ///
    /// Entries that cannot be read are skipped; they will be missing from both
    /// the stored and the live fingerprint as long as they stay unreadable.
    ///
    /// # Errors
    ///
    /// Returns an error only if the root itself cannot be read.
    pub fn probe(root: &Path, depth: usize, follow_symlinks: bool) -> Result<Self, CatalogError> {
        let root_meta = if follow_symlinks {
            std::fs::metadata(root)
        } else {
            std::fs::symlink_metadata(root)
        }
        .map_err(|e| CatalogError::from_io(root, e))?;

        let mut fingerprint = Self {
            entry_count: 0,
            total_size: 0,
            latest_mtime: root_meta.modified().map(unix_seconds).unwrap_or(i64::MIN),
        };

        let counted_depth = depth.max(1);
        let walker = WalkDir::new(root).min_depth(1).follow_links(follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::trace!("Fingerprint probe skipped entry: {e}");
                    continue;
                }
            };
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if entry.depth() <= counted_depth {
                fingerprint.entry_count += 1;
            }
            if meta.is_file() {
                fingerprint.total_size += meta.len();
            }
            if let Ok(modified) = meta.modified() {
                fingerprint.latest_mtime = fingerprint.latest_mtime.max(unix_seconds(modified));
            }
        }

        log::trace!("Fingerprint of {}: {:?}", root.display(), fingerprint);
        Ok(fingerprint)
    }
}
