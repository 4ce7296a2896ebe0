//! File search across catalogs.
//!
//! A [`SearchQuery`] combines a name pattern with optional inclusive size
//! and modification-time bounds. [`search`] evaluates it lazily over any
//! number of catalogs and yields matching files in ascending path order,
//! merging the per-catalog pre-order walks. Search is a pure read of the
//! in-memory trees and does no I/O.
//!
//! # Example
//!
//! ```
//! use filecat::search::{search, SearchQuery};
//! # use filecat::catalog::{Catalog, DirEntry, Entry, FileEntry, Fingerprint};
//! # use filecat::scanner::HashAlgorithm;
//! # let catalog = Catalog::new("/data".into(), HashAlgorithm::None, Fingerprint::default(),
//! #     DirEntry::new("", vec![Entry::File(FileEntry::new("Report.PDF", 2048, 0))]));
//!
//! let query = SearchQuery::new(r"\.pdf$")?.with_size_range(Some(1024), None);
//! let hits: Vec<_> = search([&catalog], &query).collect();
//! assert_eq!(hits.len(), 1);
//! # Ok::<(), filecat::CatalogError>(())
//! ```

use std::iter::Peekable;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::catalog::{Catalog, FileEntry};
use crate::error::CatalogError;

/// A compiled search filter.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pattern: Option<Regex>,
    min_size: Option<u64>,
    max_size: Option<u64>,
    modified_after: Option<i64>,
    modified_before: Option<i64>,
}

impl SearchQuery {
    /// Compile a case-insensitive, unanchored name pattern.
    ///
    /// An empty pattern matches every name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidPattern`] if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, CatalogError> {
        if pattern.is_empty() {
            return Ok(Self::default());
        }
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self::from_regex(regex))
    }

    /// Use an already compiled pattern as is.
    #[must_use]
    pub fn from_regex(regex: Regex) -> Self {
        Self {
            pattern: Some(regex),
            ..Self::default()
        }
    }

    /// Query matching every file.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict sizes to `[min, max]`; either bound may be open.
    #[must_use]
    pub fn with_size_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    /// Restrict modification times to `[after, before]` in Unix seconds.
    #[must_use]
    pub fn with_modified_range(mut self, after: Option<i64>, before: Option<i64>) -> Self {
        self.modified_after = after;
        self.modified_before = before;
        self
    }

    /// Restrict modification times to a resolved date range.
    #[must_use]
    pub fn with_date_range<Tz: TimeZone>(
        self,
        after: Option<DateTime<Tz>>,
        before: Option<DateTime<Tz>>,
    ) -> Self {
        self.with_modified_range(
            after.map(|d| d.timestamp()),
            before.map(|d| d.timestamp()),
        )
    }

    /// Whether a file entry satisfies every filter.
    #[must_use]
    pub fn matches(&self, file: &FileEntry) -> bool {
        if self.min_size.is_some_and(|min| file.size < min)
            || self.max_size.is_some_and(|max| file.size > max)
            || self.modified_after.is_some_and(|t| file.modified < t)
            || self.modified_before.is_some_and(|t| file.modified > t)
        {
            return false;
        }
        self.pattern
            .as_ref()
            .is_none_or(|re| re.is_match(&file.name))
    }
}

/// A file matching a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Full path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time in Unix seconds
    pub modified: i64,
}

impl SearchHit {
    /// Modification time in local time, for display.
    #[must_use]
    pub fn modified_local(&self) -> Option<DateTime<chrono::Local>> {
        DateTime::from_timestamp(self.modified, 0).map(|dt| dt.with_timezone(&chrono::Local))
    }
}

type HitStream<'a> = Peekable<Box<dyn Iterator<Item = SearchHit> + 'a>>;

/// Lazy, path-ordered stream of [`SearchHit`]s. Created by [`search`].
pub struct Search<'a> {
    streams: Vec<HitStream<'a>>,
}

impl Iterator for Search<'_> {
    type Item = SearchHit;

    fn next(&mut self) -> Option<SearchHit> {
        let mut best: Option<(usize, &SearchHit)> = None;
        for (i, stream) in self.streams.iter_mut().enumerate() {
            if let Some(hit) = stream.peek() {
                if best.is_none_or(|(_, current)| hit.path < current.path) {
                    best = Some((i, hit));
                }
            }
        }
        let index = best?.0;
        self.streams[index].next()
    }
}

/// Evaluate `query` over `catalogs`, yielding files in ascending path order.
///
/// Files present in several catalogs (overlapping roots) are yielded once per
/// catalog, in catalog order.
pub fn search<'a, I>(catalogs: I, query: &'a SearchQuery) -> Search<'a>
where
    I: IntoIterator<Item = &'a Catalog>,
{
    let streams = catalogs
        .into_iter()
        .map(|catalog| {
            let hits = catalog.files().filter_map(move |file| {
                query.matches(file.entry).then(|| SearchHit {
                    path: file.path,
                    size: file.entry.size,
                    modified: file.entry.modified,
                })
            });
            let boxed: Box<dyn Iterator<Item = SearchHit> + 'a> = Box::new(hits);
            boxed.peekable()
        })
        .collect();
    Search { streams }
}
