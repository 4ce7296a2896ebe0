//! filecat - File Tree Catalog Engine
//!
//! Scans directory trees into compact binary catalogs, keeps them fresh with a
//! cheap fingerprint check, searches across catalogs, and finds source files
//! that already have copies in other trees (by name + size or by content
//! hash), emitting review-first deletion scripts for them.
//!
//! # Example
//!
//! ```no_run
//! use filecat::duplicates::{CompareMode, CorrelationConfig, DuplicateEngine};
//! use filecat::store::{CatalogStore, LoadOptions, StoreConfig};
//! use filecat::scanner::HashAlgorithm;
//! use std::path::Path;
//!
//! let store = CatalogStore::new(StoreConfig::default());
//! let source = store.load_or_rebuild(Path::new("/photos"), LoadOptions::default())?.catalog;
//! let backup = store.load_or_rebuild(Path::new("/backup"), LoadOptions::default())?.catalog;
//!
//! let engine = DuplicateEngine::new(CorrelationConfig::new(CompareMode::Hash(HashAlgorithm::Md5)));
//! let result = engine.correlate(&source, &[&*backup])?;
//! println!("{} source files already backed up", result.groups.len());
//! # Ok::<(), filecat::CatalogError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod search;
pub mod store;
pub mod task;

pub use catalog::{Catalog, CatalogSummary, DirEntry, Entry, FileEntry, Fingerprint, StoredHash};
pub use config::Settings;
pub use error::{CatalogError, EntryIssue, ErrorKind, IssueKind, StructuredError};
pub use scanner::HashAlgorithm;
pub use task::{CancelToken, TaskHandle, TaskStatus};
