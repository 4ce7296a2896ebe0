//! In-memory catalog model.
//!
//! A [`Catalog`] is the persisted index of one scanned directory tree: a root
//! [`DirEntry`] plus metadata describing where and when it was built. Entries
//! form a strict tree owned top-down; directory children are kept sorted by
//! name, which makes a pre-order walk emit paths in ascending order.
//!
//! # Architecture
//!
//! * [`codec`]: binary encoding and decoding of catalogs, plus file helpers.
//! * [`fingerprint`]: cheap freshness probe used to decide reuse vs rebuild.

pub mod codec;
pub mod fingerprint;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::scanner::hasher::HashAlgorithm;

pub use codec::{decode, encode, read_catalog, read_summary, write_catalog, CatalogSummary};
pub use fingerprint::Fingerprint;

/// Current catalog format version written by this build.
pub const FORMAT_VERSION: u8 = 1;

/// A content digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredHash {
    /// Algorithm tag; unknown ids are preserved verbatim
    pub algorithm: HashAlgorithm,
    /// Raw digest bytes
    pub digest: Vec<u8>,
}

impl StoredHash {
    /// Create a new stored hash.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> Self {
        Self { algorithm, digest }
    }

    /// Lowercase hexadecimal rendering of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A file in the catalog tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name (single path component)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time in seconds since the Unix epoch
    pub modified: i64,
    /// Content hash, present only when hashing was requested and succeeded
    pub hash: Option<StoredHash>,
}

impl FileEntry {
    /// Create a file entry without a hash.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64, modified: i64) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
            hash: None,
        }
    }

    /// Attach a stored hash.
    #[must_use]
    pub fn with_hash(mut self, hash: StoredHash) -> Self {
        self.hash = Some(hash);
        self
    }
}

/// A directory in the catalog tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirEntry {
    /// Directory name (empty for the catalog root)
    pub name: String,
    /// Children, sorted by name with no duplicates
    pub children: Vec<Entry>,
}

impl DirEntry {
    /// Create a directory, sorting the children by name.
    ///
    /// If two children share a name, the later one wins.
    #[must_use]
    pub fn new(name: impl Into<String>, mut children: Vec<Entry>) -> Self {
        children.sort_by(|a, b| a.name().cmp(b.name()));
        children.reverse();
        children.dedup_by(|a, b| a.name() == b.name());
        children.reverse();
        Self {
            name: name.into(),
            children,
        }
    }

    /// Look up a direct child by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Entry> {
        self.children
            .binary_search_by(|c| c.name().cmp(name))
            .ok()
            .map(|i| &self.children[i])
    }

    /// Insert or replace a child, keeping the children sorted.
    pub fn insert(&mut self, entry: Entry) {
        match self
            .children
            .binary_search_by(|c| c.name().cmp(entry.name()))
        {
            Ok(i) => self.children[i] = entry,
            Err(i) => self.children.insert(i, entry),
        }
    }

    /// Number of files in this subtree.
    #[must_use]
    pub fn file_count(&self) -> u64 {
        self.children
            .iter()
            .map(|c| match c {
                Entry::File(_) => 1,
                Entry::Directory(d) => d.file_count(),
            })
            .sum()
    }

    /// Total bytes of all files in this subtree.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.children
            .iter()
            .map(|c| match c {
                Entry::File(f) => f.size,
                Entry::Directory(d) => d.total_size(),
            })
            .sum()
    }
}

/// A node of the catalog tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A regular file
    File(FileEntry),
    /// A directory and its children
    Directory(DirEntry),
}

impl Entry {
    /// Name of this entry.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => &f.name,
            Self::Directory(d) => &d.name,
        }
    }

    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}

/// A scanned directory tree plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Canonical path of the scanned root
    pub root_path: PathBuf,
    /// Creation time in seconds since the Unix epoch
    pub created: i64,
    /// Algorithm used for eager hashing, or [`HashAlgorithm::None`]
    pub hash_algorithm: HashAlgorithm,
    /// Format version this catalog was read from or will be written as
    pub version: u8,
    /// Freshness fingerprint probed when the catalog was built
    pub fingerprint: Fingerprint,
    /// Root directory entry
    pub root: DirEntry,
}

impl Catalog {
    /// Create a catalog stamped with the current time and format version.
    #[must_use]
    pub fn new(
        root_path: PathBuf,
        hash_algorithm: HashAlgorithm,
        fingerprint: Fingerprint,
        root: DirEntry,
    ) -> Self {
        Self {
            root_path,
            created: unix_seconds(SystemTime::now()),
            hash_algorithm,
            version: FORMAT_VERSION,
            fingerprint,
            root,
        }
    }

    /// Iterate over all files in pre-order, yielding absolute paths.
    ///
    /// Paths come out in ascending [`Path`] order.
    #[must_use]
    pub fn files(&self) -> Files<'_> {
        Files {
            stack: vec![(self.root_path.clone(), self.root.children.iter())],
        }
    }

    /// Number of files in the catalog.
    #[must_use]
    pub fn file_count(&self) -> u64 {
        self.root.file_count()
    }

    /// Total bytes of all files in the catalog.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.root.total_size()
    }

    /// Look up an entry by path relative to the root.
    #[must_use]
    pub fn find(&self, relative: &Path) -> Option<&Entry> {
        let mut components = relative.components().peekable();
        let mut dir = &self.root;
        while let Some(component) = components.next() {
            let name = component.as_os_str().to_str()?;
            let entry = dir.child(name)?;
            if components.peek().is_none() {
                return Some(entry);
            }
            match entry {
                Entry::Directory(d) => dir = d,
                Entry::File(_) => return None,
            }
        }
        None
    }

    /// Whether `path` lies inside this catalog's root.
    #[must_use]
    pub fn contains_path(&self, path: &Path) -> bool {
        path.starts_with(&self.root_path)
    }
}

/// A file yielded by [`Catalog::files`].
#[derive(Debug, Clone, Copy)]
pub struct CatalogFile<'a, P = &'a Path> {
    /// Absolute path of the file
    pub path: P,
    /// The catalog entry
    pub entry: &'a FileEntry,
}

/// Pre-order iterator over the files of a catalog.
#[derive(Debug)]
pub struct Files<'a> {
    stack: Vec<(PathBuf, std::slice::Iter<'a, Entry>)>,
}

impl<'a> Iterator for Files<'a> {
    type Item = CatalogFile<'a, PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (dir, children) = self.stack.last_mut()?;
            match children.next() {
                None => {
                    self.stack.pop();
                }
                Some(Entry::File(file)) => {
                    return Some(CatalogFile {
                        path: dir.join(&file.name),
                        entry: file,
                    });
                }
                Some(Entry::Directory(sub)) => {
                    let path = dir.join(&sub.name);
                    self.stack.push((path, sub.children.iter()));
                }
            }
        }
    }
}

/// Convert a [`SystemTime`] to signed seconds since the Unix epoch.
#[must_use]
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_secs()).map_or(i64::MIN, |s| -s),
    }
}
