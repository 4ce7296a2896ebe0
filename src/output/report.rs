//! Plain text duplicate report.
//!
//! Human-readable companion to the deletion script: a header with totals,
//! then one numbered entry per source file listing every copy.
//!
//! ```text
//! DUPLICATE FILES REPORT
//! ==================================================
//!
//! Comparison mode: file name + size
//! Total source files with duplicates: 1
//! Total destination locations: 2
//!
//! 1. SOURCE: /src/a.txt
//!    Size: 10 bytes
//!    Found in 2 location(s):
//!    1. /d1/a.txt
//!    2. /d2/a.txt
//! ```

use std::io::{self, Write};

use crate::duplicates::{total_reclaimable, CompareMode, DuplicateGroup};

/// Formatter for the text report.
#[derive(Debug, Clone, Copy)]
pub struct TextReport<'a> {
    groups: &'a [DuplicateGroup],
    mode: CompareMode,
}

impl<'a> TextReport<'a> {
    /// Create a report over `groups`.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup], mode: CompareMode) -> Self {
        Self { groups, mode }
    }

    /// Write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "DUPLICATE FILES REPORT")?;
        writeln!(writer, "{}", "=".repeat(50))?;
        writeln!(writer)?;
        writeln!(
            writer,
            "Generated on: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "Comparison mode: {}", self.mode.label())?;
        writeln!(
            writer,
            "Total source files with duplicates: {}",
            self.groups.len()
        )?;
        writeln!(
            writer,
            "Total destination locations: {}",
            self.groups.iter().map(DuplicateGroup::match_count).sum::<usize>()
        )?;
        writeln!(
            writer,
            "Reclaimable space: {}",
            bytesize::ByteSize::b(total_reclaimable(self.groups))
        )?;
        writeln!(writer)?;

        for (i, group) in self.groups.iter().enumerate() {
            writeln!(writer, "{}. SOURCE: {}", i + 1, group.source_path.display())?;
            writeln!(writer, "   Size: {} bytes", group.source_size)?;
            writeln!(writer, "   Found in {} location(s):", group.match_count())?;
            for (j, m) in group.matches.iter().enumerate() {
                writeln!(writer, "   {}. {}", j + 1, m.path.display())?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Render the report into a string.
    #[must_use]
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::DuplicateMatch;
    use std::path::PathBuf;

    #[test]
    fn test_report_lists_every_location() {
        let groups = vec![DuplicateGroup::new(
            PathBuf::from("/src/a.txt"),
            10,
            vec![
                DuplicateMatch {
                    catalog_root: PathBuf::from("/d2"),
                    path: PathBuf::from("/d2/a.txt"),
                    size: 10,
                },
                DuplicateMatch {
                    catalog_root: PathBuf::from("/d1"),
                    path: PathBuf::from("/d1/a.txt"),
                    size: 10,
                },
            ],
        )];
        let text = TextReport::new(&groups, CompareMode::NameSize).render();

        assert!(text.starts_with("DUPLICATE FILES REPORT\n"));
        assert!(text.contains("Total source files with duplicates: 1"));
        assert!(text.contains("Total destination locations: 2"));
        assert!(text.contains("1. SOURCE: /src/a.txt"));
        assert!(text.contains("   Found in 2 location(s):"));
        let first = text.find("1. /d1/a.txt").unwrap();
        let second = text.find("2. /d2/a.txt").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_empty_report() {
        let text = TextReport::new(&[], CompareMode::NameSize).render();
        assert!(text.contains("Total source files with duplicates: 0"));
        assert!(!text.contains("SOURCE:"));
    }
}
