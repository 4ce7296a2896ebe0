//! JSON output for duplicate reports and search results.
//!
//! # Duplicate Report Schema
//!
//! ```json
//! {
//!   "mode": "file name + size",
//!   "duplicates": [
//!     {
//!       "source_path": "/photos/a.jpg",
//!       "source_size": 1024,
//!       "duplicates": [{ "path": "/backup/a.jpg", "size": 1024 }]
//!     }
//!   ],
//!   "summary": {
//!     "source_files": 100,
//!     "destination_files": 250,
//!     "groups": 1,
//!     "matches": 1,
//!     "reclaimable_space": 1024,
//!     ...
//!   }
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use filecat::duplicates::{CompareMode, CorrelationStats};
//! use filecat::output::json::JsonOutput;
//!
//! let output = JsonOutput::new(&[], CompareMode::NameSize, &CorrelationStats::default());
//! let json = output.to_json().unwrap();
//! assert!(json.starts_with('{'));
//! ```

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::duplicates::{total_reclaimable, CompareMode, CorrelationStats, DuplicateGroup};
use crate::search::SearchHit;

/// One destination copy in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonDuplicate {
    /// Full path of the copy
    pub path: String,
    /// Size in bytes
    pub size: u64,
}

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonDuplicateGroup {
    /// Full path of the source file
    pub source_path: String,
    /// Source file size in bytes
    pub source_size: u64,
    /// Every destination copy
    pub duplicates: Vec<JsonDuplicate>,
}

impl JsonDuplicateGroup {
    /// Create a JSON duplicate group from a [`DuplicateGroup`].
    #[must_use]
    pub fn from_duplicate_group(group: &DuplicateGroup) -> Self {
        Self {
            source_path: path_string(&group.source_path),
            source_size: group.source_size,
            duplicates: group
                .matches
                .iter()
                .map(|m| JsonDuplicate {
                    path: path_string(&m.path),
                    size: m.size,
                })
                .collect(),
        }
    }
}

/// Correlation statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Files in the source catalog
    pub source_files: u64,
    /// Files across all destination catalogs
    pub destination_files: u64,
    /// Source files skipped for lying inside a destination
    pub excluded_sources: u64,
    /// Source files with at least one copy
    pub groups: u64,
    /// Total destination copies
    pub matches: u64,
    /// Bytes freed by deleting every grouped source file
    pub reclaimable_space: u64,
    /// Files read for hashing
    pub files_hashed: u64,
    /// Bytes read for hashing
    pub bytes_hashed: u64,
    /// Stored digests used without reading the file
    pub digests_reused: u64,
}

impl JsonSummary {
    /// Build a summary from run counters and the resulting groups.
    #[must_use]
    pub fn from_stats(stats: &CorrelationStats, groups: &[DuplicateGroup]) -> Self {
        Self {
            source_files: stats.source_files,
            destination_files: stats.destination_files,
            excluded_sources: stats.excluded_sources,
            groups: groups.len() as u64,
            matches: groups.iter().map(|g| g.match_count() as u64).sum(),
            reclaimable_space: total_reclaimable(groups),
            files_hashed: stats.files_hashed,
            bytes_hashed: stats.bytes_hashed,
            digests_reused: stats.digests_reused,
        }
    }
}

/// Complete duplicate report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Comparison mode label
    pub mode: String,
    /// Groups ordered by source path
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Run statistics
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Create a report from correlation results.
    #[must_use]
    pub fn new(groups: &[DuplicateGroup], mode: CompareMode, stats: &CorrelationStats) -> Self {
        Self {
            mode: mode.label(),
            duplicates: groups
                .iter()
                .map(JsonDuplicateGroup::from_duplicate_group)
                .collect(),
            summary: JsonSummary::from_stats(stats, groups),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

/// Ordered search results.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSearchOutput {
    /// Number of results
    pub count: usize,
    /// Hits in ascending path order
    pub results: Vec<SearchHit>,
}

impl JsonSearchOutput {
    /// Collect search hits into a report.
    #[must_use]
    pub fn new(hits: impl IntoIterator<Item = SearchHit>) -> Self {
        let results: Vec<_> = hits.into_iter().collect();
        Self {
            count: results.len(),
            results,
        }
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

fn write_json<T: Serialize, W: Write>(
    value: &T,
    writer: &mut W,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
