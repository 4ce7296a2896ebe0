//! Streaming content hasher with a pluggable digest algorithm.
//!
//! # Overview
//!
//! [`Hasher`] reads files in bounded blocks and feeds them to a [`Digester`],
//! so memory use is constant regardless of file size. It keeps running
//! counters of files hashed and bytes read, which is how callers observe that
//! lazy hashing really touched only the files it had to.
//!
//! # Example
//!
//! ```no_run
//! use filecat::scanner::{HashAlgorithm, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let hash = hasher.hash_file(Path::new("some_file.txt"), HashAlgorithm::Md5)?;
//! println!("{}", hash.to_hex());
//! # Ok::<(), filecat::CatalogError>(())
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::catalog::StoredHash;
use crate::error::CatalogError;
use crate::task::CancelToken;

/// Default read block size (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Smallest block size accepted by [`Hasher::with_block_size`].
pub const MIN_BLOCK_SIZE: usize = 4 * 1024;

/// Content hash algorithm tag.
///
/// The wire id is stable; ids this build does not know are carried as
/// [`HashAlgorithm::Unknown`] so catalogs written by newer builds still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// No hashing
    #[default]
    None,
    /// MD5 (16-byte digest)
    Md5,
    /// SHA-1 (20-byte digest)
    Sha1,
    /// SHA-256 (32-byte digest)
    Sha256,
    /// An id this build cannot compute
    #[serde(skip)]
    Unknown(u8),
}

impl HashAlgorithm {
    /// Map a wire id to an algorithm.
    #[must_use]
    pub fn from_id(id: u8) -> Self {
        match id {
            0 => Self::None,
            1 => Self::Md5,
            2 => Self::Sha1,
            3 => Self::Sha256,
            other => Self::Unknown(other),
        }
    }

    /// Wire id of this algorithm.
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Md5 => 1,
            Self::Sha1 => 2,
            Self::Sha256 => 3,
            Self::Unknown(id) => id,
        }
    }

    /// Short lowercase name, as used in index file names.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Md5 => "md5".to_string(),
            Self::Sha1 => "sha1".to_string(),
            Self::Sha256 => "sha256".to_string(),
            Self::Unknown(id) => format!("algo{id}"),
        }
    }

    /// Whether this is [`HashAlgorithm::None`].
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Digest length in bytes, if the algorithm is computable.
    #[must_use]
    pub fn digest_len(self) -> Option<usize> {
        match self {
            Self::Md5 => Some(16),
            Self::Sha1 => Some(20),
            Self::Sha256 => Some(32),
            Self::None | Self::Unknown(_) => None,
        }
    }

    /// Fail unless a digest can actually be computed with this algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnsupportedHashAlgorithm`] for `None` and unknown ids.
    pub fn ensure_computable(self) -> Result<(), CatalogError> {
        match self {
            Self::Md5 | Self::Sha1 | Self::Sha256 => Ok(()),
            other => Err(CatalogError::UnsupportedHashAlgorithm(other.id())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => f.write_str("MD5"),
            Self::Sha1 => f.write_str("SHA1"),
            Self::Sha256 => f.write_str("SHA256"),
            Self::None => f.write_str("none"),
            Self::Unknown(id) => write!(f, "unknown({id})"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("unknown hash algorithm '{other}'")),
        }
    }
}

/// Incremental digest state for one of the computable algorithms.
#[derive(Clone)]
pub enum Digester {
    /// MD5 state
    Md5(Md5),
    /// SHA-1 state
    Sha1(Sha1),
    /// SHA-256 state
    Sha256(Sha256),
}

impl Digester {
    /// Start a digest for `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnsupportedHashAlgorithm`] for `None` and unknown ids.
    pub fn new(algorithm: HashAlgorithm) -> Result<Self, CatalogError> {
        match algorithm {
            HashAlgorithm::Md5 => Ok(Self::Md5(Md5::new())),
            HashAlgorithm::Sha1 => Ok(Self::Sha1(Sha1::new())),
            HashAlgorithm::Sha256 => Ok(Self::Sha256(Sha256::new())),
            other => Err(CatalogError::UnsupportedHashAlgorithm(other.id())),
        }
    }

    /// Feed bytes into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Md5(d) => d.update(bytes),
            Self::Sha1(d) => d.update(bytes),
            Self::Sha256(d) => d.update(bytes),
        }
    }

    /// Consume the state and return the digest bytes.
    #[must_use]
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Md5(d) => d.finalize().to_vec(),
            Self::Sha1(d) => d.finalize().to_vec(),
            Self::Sha256(d) => d.finalize().to_vec(),
        }
    }

    /// The algorithm this digester computes.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5(_) => HashAlgorithm::Md5,
            Self::Sha1(_) => HashAlgorithm::Sha1,
            Self::Sha256(_) => HashAlgorithm::Sha256,
        }
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Digester").field(&self.algorithm()).finish()
    }
}

/// Streaming file hasher.
///
/// Safe to share between worker threads; the counters are atomic.
#[derive(Debug)]
pub struct Hasher {
    block_size: usize,
    cancel: Option<CancelToken>,
    files_hashed: AtomicU64,
    bytes_hashed: AtomicU64,
}

impl Hasher {
    /// Create a hasher with the default block size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cancel: None,
            files_hashed: AtomicU64::new(0),
            bytes_hashed: AtomicU64::new(0),
        }
    }

    /// Set the read block size, clamped to at least [`MIN_BLOCK_SIZE`].
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(MIN_BLOCK_SIZE);
        self
    }

    /// Set the cancellation token checked before each file.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Configured block size.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of files hashed in full so far.
    #[must_use]
    pub fn files_hashed(&self) -> u64 {
        self.files_hashed.load(Ordering::Relaxed)
    }

    /// Number of bytes read for hashing so far.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed.load(Ordering::Relaxed)
    }

    /// Hash a file's full content.
    ///
    /// The file handle is dropped before returning, including on cancellation.
    ///
    /// # Errors
    ///
    /// * [`CatalogError::Cancelled`] if the token was set before the file was opened
    /// * [`CatalogError::UnsupportedHashAlgorithm`] if `algorithm` is not computable
    /// * [`CatalogError::PathNotFound`] / [`CatalogError::PermissionDenied`] / [`CatalogError::IoFailure`]
    ///   if the file cannot be read in full
    pub fn hash_file(
        &self,
        path: &Path,
        algorithm: HashAlgorithm,
    ) -> Result<StoredHash, CatalogError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(CatalogError::Cancelled);
        }
        let digester = Digester::new(algorithm)?;
        let file = File::open(path).map_err(|e| CatalogError::from_io(path, e))?;
        log::trace!("Hashing {} ({})", path.display(), algorithm);
        let digest = self
            .digest_reader(file, digester)
            .map_err(|e| CatalogError::from_io(path, e))?;
        self.files_hashed.fetch_add(1, Ordering::Relaxed);
        Ok(StoredHash::new(algorithm, digest))
    }

    /// Hash everything a reader yields.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnsupportedHashAlgorithm`] or an I/O failure.
    pub fn hash_reader<R: Read>(
        &self,
        reader: R,
        algorithm: HashAlgorithm,
    ) -> Result<StoredHash, CatalogError> {
        let digester = Digester::new(algorithm)?;
        let digest = self
            .digest_reader(reader, digester)
            .map_err(|e| CatalogError::from_io(Path::new(""), e))?;
        self.files_hashed.fetch_add(1, Ordering::Relaxed);
        Ok(StoredHash::new(algorithm, digest))
    }

    fn digest_reader<R: Read>(&self, mut reader: R, mut digester: Digester) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.block_size];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            digester.update(&buffer[..n]);
            self.bytes_hashed.fetch_add(n as u64, Ordering::Relaxed);
        }
        Ok(digester.finalize())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}
