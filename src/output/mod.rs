//! Output formatters for correlation and search results.
//!
//! - JSON for automation and scripting
//! - A plain text report for review
//! - Deletion scripts for POSIX sh, PowerShell and Windows batch
//!
//! # Example
//!
//! ```
//! use filecat::duplicates::{CompareMode, CorrelationStats};
//! use filecat::output::{JsonOutput, ScriptOutput, ScriptPlatform};
//!
//! let output = JsonOutput::new(&[], CompareMode::NameSize, &CorrelationStats::default());
//! println!("{}", output.to_json_pretty().unwrap());
//!
//! let script = ScriptOutput::new(&[], CompareMode::NameSize, ScriptPlatform::detect());
//! assert!(!script.render().is_empty());
//! ```

pub mod json;
pub mod report;
pub mod script;

// Re-export main types
pub use json::{JsonOutput, JsonOutputError, JsonSearchOutput};
pub use report::TextReport;
pub use script::{ScriptOutput, ScriptPlatform};
