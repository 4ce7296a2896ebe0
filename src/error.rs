//! Error types and machine-readable error codes.
//!
//! Every fallible operation in the crate returns [`CatalogError`]. Failures that
//! only affect a single entry during a scan or a hashing pass are not errors:
//! they are recorded as [`EntryIssue`] values and the operation continues.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Errors surfaced by catalog operations.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// The requested path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Access to the path was denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A catalog stream is malformed.
    #[error("Corrupt catalog format: {0}")]
    CorruptFormat(String),

    /// A catalog stream was written by a newer format version.
    #[error("Unsupported catalog version {found} (highest supported is {supported})")]
    UnsupportedVersion {
        /// Version byte found in the stream
        found: u8,
        /// Highest version this build understands
        supported: u8,
    },

    /// A digest was needed for an algorithm id this build cannot compute.
    #[error("Unsupported hash algorithm id {0}")]
    UnsupportedHashAlgorithm(u8),

    /// A search pattern failed to compile.
    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The operation was cancelled cooperatively.
    #[error("Operation cancelled")]
    Cancelled,

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    IoFailure {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl CatalogError {
    /// Classify an I/O error that occurred while accessing `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::PathNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::IoFailure {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Shorthand for a [`CatalogError::CorruptFormat`] error.
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptFormat(message.into())
    }

    /// The kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathNotFound(_) => ErrorKind::PathNotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::CorruptFormat(_) => ErrorKind::CorruptFormat,
            Self::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Self::UnsupportedHashAlgorithm(_) => ErrorKind::UnsupportedHashAlgorithm,
            Self::InvalidPattern(_) => ErrorKind::InvalidPattern,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::IoFailure { .. } => ErrorKind::IoFailure,
        }
    }

    /// Whether this error is a cooperative cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Flat classification of [`CatalogError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// See [`CatalogError::PathNotFound`].
    PathNotFound,
    /// See [`CatalogError::PermissionDenied`].
    PermissionDenied,
    /// See [`CatalogError::CorruptFormat`].
    CorruptFormat,
    /// See [`CatalogError::UnsupportedVersion`].
    UnsupportedVersion,
    /// See [`CatalogError::UnsupportedHashAlgorithm`].
    UnsupportedHashAlgorithm,
    /// See [`CatalogError::InvalidPattern`].
    InvalidPattern,
    /// See [`CatalogError::Cancelled`].
    Cancelled,
    /// See [`CatalogError::IoFailure`].
    IoFailure,
}

impl ErrorKind {
    /// Get the machine-readable code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::PathNotFound => "FC001",
            Self::PermissionDenied => "FC002",
            Self::CorruptFormat => "FC003",
            Self::UnsupportedVersion => "FC004",
            Self::UnsupportedHashAlgorithm => "FC005",
            Self::InvalidPattern => "FC006",
            Self::Cancelled => "FC130",
            Self::IoFailure => "FC010",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "FC003")
    pub code: &'static str,
    /// The error kind
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was cancelled rather than failed
    pub cancelled: bool,
}

impl StructuredError {
    /// Create structured error information from a [`CatalogError`].
    #[must_use]
    pub fn new(err: &CatalogError) -> Self {
        let kind = err.kind();
        Self {
            code: kind.code(),
            kind,
            message: err.to_string(),
            cancelled: err.is_cancelled(),
        }
    }
}

/// Why a single entry was skipped during a scan or hashing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueKind {
    /// Access was denied.
    PermissionDenied,
    /// The entry disappeared between listing and access.
    Vanished,
    /// A symlink pointed back into the directory chain being walked.
    SymlinkCycle,
    /// A symlink target could not be resolved.
    BrokenSymlink,
    /// The entry name is not valid UTF-8 and cannot be stored.
    NonUtf8Name,
    /// Content could not be hashed.
    HashFailed,
    /// Any other I/O error.
    Io,
}

/// A per-entry failure that was recorded and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryIssue {
    /// Path of the affected entry
    pub path: PathBuf,
    /// Classification of the failure
    pub kind: IssueKind,
    /// Human-readable detail
    pub detail: String,
}

impl EntryIssue {
    /// Create a new issue record.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// Build an issue from an I/O error.
    #[must_use]
    pub fn from_io(path: &Path, error: &io::Error) -> Self {
        let kind = match error.kind() {
            io::ErrorKind::PermissionDenied => IssueKind::PermissionDenied,
            io::ErrorKind::NotFound => IssueKind::Vanished,
            _ => IssueKind::Io,
        };
        Self::new(path, kind, error.to_string())
    }
}
