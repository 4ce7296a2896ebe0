//! Binary catalog format.
//!
//! All integers are little-endian. Layout:
//!
//! ```text
//! magic      4 bytes  "FCAT"
//! version    u8
//! algorithm  u8       0 none, 1 md5, 2 sha1, 3 sha256
//! root path  u32 len + UTF-8
//! created    i64
//! fingerprint u64 entry count, u64 total bytes, i64 latest mtime
//! summary    u64 file count, u64 total file bytes
//! entries    pre-order, starting with the root directory
//!
//! entry      u8 tag (0 file, 1 dir), u32 len + UTF-8 name
//!   file     u64 size, i64 mtime, u32 hash len, [u8 algorithm][digest]
//!   dir      u32 child count, children...
//! ```
//!
//! Decoding is strict: anything that does not describe exactly one well-formed
//! tree is reported as [`CatalogError::CorruptFormat`].

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{Catalog, DirEntry, Entry, FileEntry, Fingerprint, StoredHash, FORMAT_VERSION};
use crate::error::CatalogError;
use crate::scanner::hasher::HashAlgorithm;

/// Magic token at the start of every catalog stream.
pub const MAGIC: &[u8; 4] = b"FCAT";

/// Deepest directory nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 2048;

const TAG_FILE: u8 = 0;
const TAG_DIR: u8 = 1;

/// Bytes before the root path: magic, version, algorithm, path length.
const PREFIX_LEN: usize = 4 + 1 + 1 + 4;
/// Bytes after the root path: created, fingerprint, summary.
const HEADER_TAIL_LEN: usize = 8 + 8 + 8 + 8 + 8 + 8;
/// Smallest possible encoded entry: tag + empty name length.
const MIN_ENTRY_LEN: usize = 1 + 4;

/// Header-only view of a persisted catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    /// Where the catalog is stored, if it came from a file
    pub index_path: Option<PathBuf>,
    /// Root of the scanned tree
    pub root_path: PathBuf,
    /// Creation time in seconds since the Unix epoch
    pub created: i64,
    /// Eager hashing algorithm
    pub hash_algorithm: HashAlgorithm,
    /// Format version
    pub version: u8,
    /// Number of files in the tree
    pub file_count: u64,
    /// Total bytes of all files
    pub total_size: u64,
    /// Stored freshness fingerprint
    pub fingerprint: Fingerprint,
}

impl CatalogSummary {
    /// Summarize an in-memory catalog.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog, index_path: Option<PathBuf>) -> Self {
        Self {
            index_path,
            root_path: catalog.root_path.clone(),
            created: catalog.created,
            hash_algorithm: catalog.hash_algorithm,
            version: catalog.version,
            file_count: catalog.file_count(),
            total_size: catalog.total_size(),
            fingerprint: catalog.fingerprint,
        }
    }

    /// Creation time in local time, for display.
    #[must_use]
    pub fn created_local(&self) -> Option<chrono::DateTime<chrono::Local>> {
        chrono::DateTime::from_timestamp(self.created, 0).map(|dt| dt.with_timezone(&chrono::Local))
    }
}

/// Encode a catalog into its binary form.
///
/// The root path is written as UTF-8; the scanner only produces catalogs for
/// roots whose path is valid UTF-8.
#[must_use]
pub fn encode(catalog: &Catalog) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + catalog.file_count() as usize * 48);
    out.extend_from_slice(MAGIC);
    out.push(catalog.version);
    out.push(catalog.hash_algorithm.id());
    put_str(&mut out, &catalog.root_path.to_string_lossy());
    put_i64(&mut out, catalog.created);
    put_u64(&mut out, catalog.fingerprint.entry_count);
    put_u64(&mut out, catalog.fingerprint.total_size);
    put_i64(&mut out, catalog.fingerprint.latest_mtime);
    put_u64(&mut out, catalog.file_count());
    put_u64(&mut out, catalog.total_size());
    encode_dir(&mut out, &catalog.root);
    out
}

fn encode_dir(out: &mut Vec<u8>, dir: &DirEntry) {
    out.push(TAG_DIR);
    put_str(out, &dir.name);
    put_u32(out, dir.children.len() as u32);
    for child in &dir.children {
        match child {
            Entry::File(file) => encode_file(out, file),
            Entry::Directory(sub) => encode_dir(out, sub),
        }
    }
}

fn encode_file(out: &mut Vec<u8>, file: &FileEntry) {
    out.push(TAG_FILE);
    put_str(out, &file.name);
    put_u64(out, file.size);
    put_i64(out, file.modified);
    match &file.hash {
        Some(hash) => {
            put_u32(out, (hash.digest.len() + 1) as u32);
            out.push(hash.algorithm.id());
            out.extend_from_slice(&hash.digest);
        }
        None => put_u32(out, 0),
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

/// Decode a catalog from its binary form.
///
/// # Errors
///
/// * [`CatalogError::CorruptFormat`] on bad magic, truncation, trailing bytes,
///   inconsistent counts, unordered children or excessive nesting
/// * [`CatalogError::UnsupportedVersion`] if the stream is from a newer format
pub fn decode(bytes: &[u8]) -> Result<Catalog, CatalogError> {
    let mut reader = Reader::new(bytes);
    let header = read_header(&mut reader)?;

    let tag = reader.u8("root tag")?;
    if tag != TAG_DIR {
        return Err(CatalogError::corrupt(format!(
            "root entry must be a directory, found tag {tag}"
        )));
    }
    let root = decode_dir(&mut reader, 0)?;

    if !reader.is_empty() {
        return Err(CatalogError::corrupt(format!(
            "{} trailing bytes after entry stream",
            reader.remaining()
        )));
    }
    if root.file_count() != header.file_count || root.total_size() != header.total_size {
        return Err(CatalogError::corrupt(
            "header summary does not match the entry tree",
        ));
    }

    Ok(Catalog {
        root_path: header.root_path,
        created: header.created,
        hash_algorithm: header.algorithm,
        version: header.version,
        fingerprint: header.fingerprint,
        root,
    })
}

struct Header {
    version: u8,
    algorithm: HashAlgorithm,
    root_path: PathBuf,
    created: i64,
    fingerprint: Fingerprint,
    file_count: u64,
    total_size: u64,
}

fn read_header(reader: &mut Reader<'_>) -> Result<Header, CatalogError> {
    let magic = reader.take(MAGIC.len(), "magic")?;
    if magic != MAGIC {
        return Err(CatalogError::corrupt("magic token mismatch"));
    }
    let version = reader.u8("version")?;
    if version == 0 {
        return Err(CatalogError::corrupt("version 0 is not a valid format version"));
    }
    if version > FORMAT_VERSION {
        return Err(CatalogError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    let algorithm = HashAlgorithm::from_id(reader.u8("hash algorithm")?);
    let root_path = PathBuf::from(reader.string("root path")?);
    let created = reader.i64("created")?;
    let fingerprint = Fingerprint {
        entry_count: reader.u64("fingerprint entry count")?,
        total_size: reader.u64("fingerprint total size")?,
        latest_mtime: reader.i64("fingerprint mtime")?,
    };
    let file_count = reader.u64("file count")?;
    let total_size = reader.u64("total size")?;
    Ok(Header {
        version,
        algorithm,
        root_path,
        created,
        fingerprint,
        file_count,
        total_size,
    })
}

/// Decode a directory whose tag has already been consumed.
fn decode_dir(reader: &mut Reader<'_>, depth: usize) -> Result<DirEntry, CatalogError> {
    if depth > MAX_DEPTH {
        return Err(CatalogError::corrupt(format!(
            "directory nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    let name = reader.string("directory name")?;
    if depth > 0 {
        check_name(&name)?;
    }
    let count = reader.u32("child count")? as usize;
    if count.saturating_mul(MIN_ENTRY_LEN) > reader.remaining() {
        return Err(CatalogError::corrupt(format!(
            "child count {count} of '{name}' exceeds remaining stream length"
        )));
    }

    let mut children: Vec<Entry> = Vec::with_capacity(count);
    for _ in 0..count {
        let child = match reader.u8("entry tag")? {
            TAG_FILE => Entry::File(decode_file(reader)?),
            TAG_DIR => Entry::Directory(decode_dir(reader, depth + 1)?),
            other => {
                return Err(CatalogError::corrupt(format!("unknown entry tag {other}")));
            }
        };
        if let Some(prev) = children.last() {
            if prev.name() >= child.name() {
                return Err(CatalogError::corrupt(format!(
                    "children of '{name}' are not in ascending order at '{}'",
                    child.name()
                )));
            }
        }
        children.push(child);
    }
    Ok(DirEntry { name, children })
}

/// Decode a file whose tag has already been consumed.
fn decode_file(reader: &mut Reader<'_>) -> Result<FileEntry, CatalogError> {
    let name = reader.string("file name")?;
    check_name(&name)?;
    let size = reader.u64("file size")?;
    let modified = reader.i64("file mtime")?;
    let hash_len = reader.u32("hash length")? as usize;
    let hash = if hash_len == 0 {
        None
    } else {
        let field = reader.take(hash_len, "hash field")?;
        let algorithm = HashAlgorithm::from_id(field[0]);
        let digest = field[1..].to_vec();
        if let Some(expected) = algorithm.digest_len() {
            if digest.len() != expected {
                return Err(CatalogError::corrupt(format!(
                    "{algorithm} digest of '{name}' has {} bytes, expected {expected}",
                    digest.len()
                )));
            }
        }
        Some(StoredHash::new(algorithm, digest))
    };
    Ok(FileEntry {
        name,
        size,
        modified,
        hash,
    })
}

fn check_name(name: &str) -> Result<(), CatalogError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(CatalogError::corrupt(format!("invalid entry name {name:?}")));
    }
    Ok(())
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], CatalogError> {
        if n > self.remaining() {
            return Err(CatalogError::corrupt(format!(
                "truncated {what}: need {n} bytes, {} left",
                self.remaining()
            )));
        }
        let bytes = self.bytes;
        let slice = &bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], CatalogError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u8(&mut self, what: &str) -> Result<u8, CatalogError> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &str) -> Result<u32, CatalogError> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn u64(&mut self, what: &str) -> Result<u64, CatalogError> {
        self.array(what).map(u64::from_le_bytes)
    }

    fn i64(&mut self, what: &str) -> Result<i64, CatalogError> {
        self.array(what).map(i64::from_le_bytes)
    }

    fn string(&mut self, what: &str) -> Result<String, CatalogError> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CatalogError::corrupt(format!("{what} is not valid UTF-8")))
    }
}

/// Write a catalog to `path`.
///
/// The bytes are staged in a uniquely named sibling file and renamed into
/// place, so an interrupted write never leaves a truncated catalog at `path`.
/// Concurrent writers of the same path each stage their own file; the last
/// rename wins.
///
/// # Errors
///
/// Returns an I/O-derived [`CatalogError`] if the file cannot be written.
pub fn write_catalog(path: &Path, catalog: &Catalog) -> Result<(), CatalogError> {
    let bytes = encode(catalog);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // The staging file is removed on drop if anything before persist fails.
    let result = (|| -> io::Result<()> {
        let mut staging = tempfile::Builder::new()
            .prefix(".filecat-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        staging.write_all(&bytes)?;
        staging.as_file().sync_all()?;
        staging.persist(path).map_err(|e| e.error)?;
        Ok(())
    })();

    if let Err(e) = result {
        return Err(CatalogError::from_io(path, e));
    }
    log::debug!(
        "Wrote catalog for {} to {} ({} bytes)",
        catalog.root_path.display(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

/// Read and decode a catalog file.
///
/// # Errors
///
/// Returns an I/O-derived error if the file cannot be read, or any
/// [`decode`] error.
pub fn read_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let bytes = fs::read(path).map_err(|e| CatalogError::from_io(path, e))?;
    decode(&bytes)
}

/// Read only the header of a catalog file.
///
/// # Errors
///
/// Same as [`read_catalog`], limited to the header fields.
pub fn read_summary(path: &Path) -> Result<CatalogSummary, CatalogError> {
    let io_err = |e: io::Error| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CatalogError::corrupt("truncated header")
        } else {
            CatalogError::from_io(path, e)
        }
    };
    let file = File::open(path).map_err(|e| CatalogError::from_io(path, e))?;
    let file_len = file.metadata().map_err(|e| CatalogError::from_io(path, e))?.len();
    let mut reader = BufReader::new(file);

    let mut head = vec![0u8; PREFIX_LEN];
    reader.read_exact(&mut head).map_err(io_err)?;
    if &head[..MAGIC.len()] != MAGIC {
        return Err(CatalogError::corrupt("magic token mismatch"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&head[PREFIX_LEN - 4..]);
    let path_len = u32::from_le_bytes(len_bytes) as usize;
    if (path_len + HEADER_TAIL_LEN) as u64 > file_len {
        return Err(CatalogError::corrupt("truncated header"));
    }
    head.resize(PREFIX_LEN + path_len + HEADER_TAIL_LEN, 0);
    reader.read_exact(&mut head[PREFIX_LEN..]).map_err(io_err)?;

    let header = read_header(&mut Reader::new(&head))?;
    Ok(CatalogSummary {
        index_path: Some(path.to_path_buf()),
        root_path: header.root_path,
        created: header.created,
        hash_algorithm: header.algorithm,
        version: header.version,
        file_count: header.file_count,
        total_size: header.total_size,
        fingerprint: header.fingerprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Catalog {
        let sub = DirEntry::new(
            "sub",
            vec![Entry::File(
                FileEntry::new("b.bin", 3, -20)
                    .with_hash(StoredHash::new(HashAlgorithm::Md5, vec![1; 16])),
            )],
        );
        let root = DirEntry::new(
            "",
            vec![
                Entry::File(FileEntry::new("a.txt", 10, 1_700_000_000)),
                Entry::Directory(sub),
                Entry::File(
                    FileEntry::new("z", 0, 0)
                        .with_hash(StoredHash::new(HashAlgorithm::Unknown(77), vec![9, 9])),
                ),
            ],
        );
        Catalog {
            root_path: PathBuf::from("/srv/data"),
            created: 1_700_000_123,
            hash_algorithm: HashAlgorithm::Md5,
            version: FORMAT_VERSION,
            fingerprint: Fingerprint {
                entry_count: 3,
                total_size: 10,
                latest_mtime: 1_700_000_000,
            },
            root,
        }
    }

    #[test]
    fn test_round_trip() {
        let catalog = sample();
        let decoded = decode(&encode(&catalog)).unwrap();
        assert_eq!(decoded, catalog);
    }

    #[test]
    fn test_unknown_algorithm_preserved() {
        let decoded = decode(&encode(&sample())).unwrap();
        match decoded.find(Path::new("z")) {
            Some(Entry::File(f)) => {
                let hash = f.hash.as_ref().unwrap();
                assert_eq!(hash.algorithm, HashAlgorithm::Unknown(77));
                assert_eq!(hash.digest, vec![9, 9]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample());
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(CatalogError::CorruptFormat(_))));
    }

    #[test]
    fn test_future_version() {
        let mut bytes = encode(&sample());
        bytes[4] = FORMAT_VERSION + 1;
        assert!(matches!(
            decode(&bytes),
            Err(CatalogError::UnsupportedVersion { found, supported })
                if found == FORMAT_VERSION + 1 && supported == FORMAT_VERSION
        ));
    }

    #[test]
    fn test_every_truncation_is_corrupt() {
        let bytes = encode(&sample());
        for len in 0..bytes.len() {
            assert!(
                matches!(decode(&bytes[..len]), Err(CatalogError::CorruptFormat(_))),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = encode(&sample());
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(CatalogError::CorruptFormat(_))));
    }

    #[test]
    fn test_summary_mismatch() {
        let mut catalog = sample();
        let bytes_ok = encode(&catalog);
        if let Entry::File(f) = &mut catalog.root.children[0] {
            f.size = 11;
        }
        let mut tampered = encode(&catalog);
        // Restore the original summary so it disagrees with the tree.
        let summary_at = PREFIX_LEN + "/srv/data".len() + 8 + 24;
        tampered[summary_at..summary_at + 16]
            .copy_from_slice(&bytes_ok[summary_at..summary_at + 16]);
        assert!(matches!(
            decode(&tampered),
            Err(CatalogError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_unordered_children_rejected() {
        let mut catalog = sample();
        catalog.root.children.swap(0, 2);
        let bytes = encode(&catalog);
        assert!(matches!(decode(&bytes), Err(CatalogError::CorruptFormat(_))));
    }

    #[test]
    fn test_huge_child_count_rejected() {
        let catalog = Catalog {
            root: DirEntry::default(),
            ..sample()
        };
        let mut bytes = encode(&catalog);
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(CatalogError::CorruptFormat(_))));
    }

    #[test]
    fn test_file_helpers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data_index.caf");
        let catalog = sample();

        write_catalog(&path, &catalog).unwrap();
        assert_eq!(read_catalog(&path).unwrap(), catalog);

        let summary = read_summary(&path).unwrap();
        assert_eq!(summary.root_path, PathBuf::from("/srv/data"));
        assert_eq!(summary.file_count, 3);
        assert_eq!(summary.total_size, 13);
        assert_eq!(summary.hash_algorithm, HashAlgorithm::Md5);
        assert_eq!(summary.index_path.as_deref(), Some(path.as_path()));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_summary_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.caf");
        fs::write(&path, b"FCAT\x01").unwrap();
        assert!(matches!(
            read_summary(&path),
            Err(CatalogError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_catalog(&dir.path().join("missing.caf")),
            Err(CatalogError::PathNotFound(_))
        ));
    }
}
