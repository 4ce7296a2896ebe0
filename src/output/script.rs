//! Deletion script generation for duplicate source files.
//!
//! Each duplicate group becomes one block: a comment listing every copy found
//! in the destination catalogs, followed by the platform's delete command for
//! the source file. Scripts are plain text; nothing here runs them.
//!
//! # Features
//!
//! * **Multi-platform**: POSIX sh, PowerShell and Windows batch.
//! * **Safety-first**: Scripts default to dry-run mode and require a `--confirm` argument.
//! * **Robust Escaping**: Paths are fully quoted, and comment lines escape
//!   control characters so a path can never break out of a comment.
//!
//! # Usage
//!
//! ```
//! use filecat::duplicates::{CompareMode, DuplicateGroup, DuplicateMatch};
//! use filecat::output::script::{ScriptOutput, ScriptPlatform};
//! use std::path::PathBuf;
//!
//! let groups = vec![DuplicateGroup::new(
//!     PathBuf::from("/src/a.txt"),
//!     3,
//!     vec![DuplicateMatch {
//!         catalog_root: PathBuf::from("/backup"),
//!         path: PathBuf::from("/backup/a.txt"),
//!         size: 3,
//!     }],
//! )];
//! let script = ScriptOutput::new(&groups, CompareMode::NameSize, ScriptPlatform::Posix).render();
//! assert!(script.contains("rm -f -- '/src/a.txt'"));
//! ```

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::duplicates::{total_reclaimable, CompareMode, DuplicateGroup};

/// Target shell of a generated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptPlatform {
    /// POSIX-compliant shell script (sh/bash/zsh)
    Posix,
    /// Windows PowerShell script
    PowerShell,
    /// Windows batch file (cmd.exe)
    Batch,
}

impl ScriptPlatform {
    /// Detect the appropriate script platform for the current system.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Posix => "sh",
            Self::PowerShell => "ps1",
            Self::Batch => "bat",
        }
    }

    fn comment(self) -> &'static str {
        match self {
            Self::Posix | Self::PowerShell => "#",
            Self::Batch => "REM",
        }
    }
}

impl fmt::Display for ScriptPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Posix => "sh",
            Self::PowerShell => "powershell",
            Self::Batch => "batch",
        })
    }
}

impl FromStr for ScriptPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sh" | "posix" | "bash" => Ok(Self::Posix),
            "ps1" | "powershell" | "pwsh" => Ok(Self::PowerShell),
            "bat" | "batch" | "cmd" => Ok(Self::Batch),
            other => Err(format!("unknown script platform '{other}'")),
        }
    }
}

/// Formatter for deletion scripts.
pub struct ScriptOutput<'a> {
    /// Duplicate groups to include in the script
    pub groups: &'a [DuplicateGroup],
    /// Comparison mode the groups were produced with
    pub mode: CompareMode,
    /// The shell to generate for
    pub platform: ScriptPlatform,
}

impl<'a> ScriptOutput<'a> {
    /// Create a new script formatter.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup], mode: CompareMode, platform: ScriptPlatform) -> Self {
        Self {
            groups,
            mode,
            platform,
        }
    }

    /// Render the script into a string.
    #[must_use]
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Write the script to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self.platform {
            ScriptPlatform::Posix => self.write_posix(writer),
            ScriptPlatform::PowerShell => self.write_powershell(writer),
            ScriptPlatform::Batch => self.write_batch(writer),
        }
    }

    fn write_header<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let c = self.platform.comment();
        writeln!(writer, "{c} filecat duplicate deletion script")?;
        writeln!(
            writer,
            "{c} Generated on: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "{c} Comparison mode: {}", self.mode.label())?;
        if matches!(self.mode, CompareMode::NameSize) {
            writeln!(
                writer,
                "{c} NOTE: name + size matching does not compare contents."
            )?;
        }
        writeln!(writer, "{c}")?;
        writeln!(
            writer,
            "{c} WARNING: This script will PERMANENTLY DELETE the source files below."
        )?;
        writeln!(
            writer,
            "{c} Each one has copies in the listed destinations. Review before executing."
        )?;
        writeln!(writer, "{c}")?;
        writeln!(writer, "{c} Source files with copies: {}", self.groups.len())?;
        writeln!(
            writer,
            "{c} Reclaimable space: {}",
            bytesize::ByteSize::b(total_reclaimable(self.groups))
        )?;
        Ok(())
    }

    fn write_group_comment<W: Write>(
        &self,
        writer: &mut W,
        group: &DuplicateGroup,
    ) -> std::io::Result<()> {
        let c = self.platform.comment();
        let escape = |path: &Path| match self.platform {
            ScriptPlatform::Batch => escape_comment(path).replace('%', "%%"),
            _ => escape_comment(path),
        };
        writeln!(
            writer,
            "{c} SOURCE: {} ({} bytes)",
            escape(&group.source_path),
            group.source_size
        )?;
        for m in &group.matches {
            writeln!(writer, "{c}   -> {} ({} bytes)", escape(&m.path), m.size)?;
        }
        Ok(())
    }

    fn write_posix<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "#!/bin/sh")?;
        self.write_header(writer)?;
        writeln!(writer)?;

        writeln!(writer, "# Default to dry-run mode for safety")?;
        writeln!(writer, "DRY_RUN=1")?;
        writeln!(writer, "if [ \"$1\" = \"--confirm\" ]; then")?;
        writeln!(writer, "    DRY_RUN=0")?;
        writeln!(writer, "fi")?;
        writeln!(writer)?;
        writeln!(writer, "if [ \"$DRY_RUN\" -eq 1 ]; then")?;
        writeln!(writer, "    echo \"DRY RUN MODE. No files will be deleted.\"")?;
        writeln!(
            writer,
            "    echo \"Run with --confirm to actually delete files.\""
        )?;
        writeln!(writer, "    echo \"\"")?;
        writeln!(writer, "fi")?;
        writeln!(writer)?;
        writeln!(writer, "DELETED_COUNT=0")?;
        writeln!(writer, "RECLAIMED_BYTES=0")?;
        writeln!(writer)?;

        for group in self.groups {
            self.write_group_comment(writer, group)?;
            let path = escape_posix(&group.source_path);
            writeln!(writer, "if [ \"$DRY_RUN\" -eq 0 ]; then")?;
            writeln!(writer, "    if [ -e {path} ] && rm -f -- {path}; then")?;
            writeln!(writer, "        DELETED_COUNT=$((DELETED_COUNT + 1))")?;
            writeln!(
                writer,
                "        RECLAIMED_BYTES=$((RECLAIMED_BYTES + {}))",
                group.source_size
            )?;
            writeln!(writer, "    fi")?;
            writeln!(writer, "else")?;
            writeln!(writer, "    printf 'would delete: %s\\n' {path}")?;
            writeln!(writer, "fi")?;
            writeln!(writer)?;
        }

        writeln!(writer, "if [ \"$DRY_RUN\" -eq 0 ]; then")?;
        writeln!(
            writer,
            "    echo \"Deletion complete. Deleted $DELETED_COUNT files.\""
        )?;
        writeln!(writer, "    echo \"Reclaimed $RECLAIMED_BYTES bytes.\"")?;
        writeln!(writer, "else")?;
        writeln!(writer, "    echo \"Dry run complete. No files were deleted.\"")?;
        writeln!(writer, "fi")?;
        Ok(())
    }

    fn write_powershell<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.write_header(writer)?;
        writeln!(writer)?;

        writeln!(writer, "# Default to dry-run mode for safety")?;
        writeln!(writer, "$DryRun = $true")?;
        writeln!(writer, "if ($args[0] -eq \"--confirm\") {{")?;
        writeln!(writer, "    $DryRun = $false")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;
        writeln!(writer, "if ($DryRun) {{")?;
        writeln!(
            writer,
            "    Write-Host \"DRY RUN MODE. No files will be deleted.\""
        )?;
        writeln!(
            writer,
            "    Write-Host \"Run with --confirm to actually delete files.\""
        )?;
        writeln!(writer, "    Write-Host \"\"")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;
        writeln!(writer, "$DeletedCount = 0")?;
        writeln!(writer, "$ReclaimedBytes = 0")?;
        writeln!(writer)?;

        for group in self.groups {
            self.write_group_comment(writer, group)?;
            let path = escape_powershell(&group.source_path);
            writeln!(writer, "if (-not $DryRun) {{")?;
            writeln!(
                writer,
                "    Remove-Item -LiteralPath {path} -Force -ErrorAction SilentlyContinue"
            )?;
            writeln!(writer, "    if ($?) {{")?;
            writeln!(writer, "        $DeletedCount++")?;
            writeln!(writer, "        $ReclaimedBytes += {}", group.source_size)?;
            writeln!(writer, "    }}")?;
            writeln!(writer, "}} else {{")?;
            writeln!(writer, "    Write-Host ('would delete: ' + {path})")?;
            writeln!(writer, "}}")?;
            writeln!(writer)?;
        }

        writeln!(writer, "if (-not $DryRun) {{")?;
        writeln!(
            writer,
            "    Write-Host \"Deletion complete. Deleted $DeletedCount files.\""
        )?;
        writeln!(writer, "    Write-Host \"Reclaimed $ReclaimedBytes bytes.\"")?;
        writeln!(writer, "}} else {{")?;
        writeln!(
            writer,
            "    Write-Host \"Dry run complete. No files were deleted.\""
        )?;
        writeln!(writer, "}}")?;
        Ok(())
    }

    fn write_batch<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "@echo off")?;
        writeln!(writer, "chcp 65001 >nul")?;
        writeln!(writer, "setlocal DisableDelayedExpansion")?;
        self.write_header(writer)?;
        writeln!(writer)?;

        writeln!(writer, "REM Default to dry-run mode for safety")?;
        writeln!(writer, "set \"DRY_RUN=1\"")?;
        writeln!(writer, "if /i \"%~1\"==\"--confirm\" set \"DRY_RUN=0\"")?;
        writeln!(writer, "if \"%DRY_RUN%\"==\"1\" (")?;
        writeln!(writer, "    echo DRY RUN MODE. No files will be deleted.")?;
        writeln!(writer, "    echo Run with --confirm to actually delete files.")?;
        writeln!(writer, ")")?;
        writeln!(writer)?;

        for group in self.groups {
            self.write_group_comment(writer, group)?;
            match escape_batch(&group.source_path) {
                Some(path) => {
                    writeln!(writer, "if \"%DRY_RUN%\"==\"0\" (")?;
                    writeln!(writer, "    del /f /q {path}")?;
                    writeln!(writer, ") else (")?;
                    writeln!(writer, "    echo would delete: {path}")?;
                    writeln!(writer, ")")?;
                }
                None => {
                    writeln!(
                        writer,
                        "REM skipped: path cannot be quoted for cmd.exe"
                    )?;
                }
            }
            writeln!(writer)?;
        }

        writeln!(writer, "if \"%DRY_RUN%\"==\"0\" (")?;
        writeln!(writer, "    echo Deletion complete.")?;
        writeln!(writer, ") else (")?;
        writeln!(writer, "    echo Dry run complete. No files were deleted.")?;
        writeln!(writer, ")")?;
        writeln!(writer, "endlocal")?;
        writeln!(writer, "pause")?;
        Ok(())
    }
}

/// Render `groups` as a deletion script for `platform`.
#[must_use]
pub fn render(groups: &[DuplicateGroup], mode: CompareMode, platform: ScriptPlatform) -> String {
    ScriptOutput::new(groups, mode, platform).render()
}

fn escape_posix(path: &Path) -> String {
    let s = path.to_string_lossy();
    // Wrap in single quotes, escape single quotes as '\''
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn escape_powershell(path: &Path) -> String {
    let s = path.to_string_lossy();
    // PowerShell also treats the typographic single quotes as quote characters.
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if matches!(ch, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            out.push(ch);
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Double-quoted batch argument, or `None` if the path holds a character
/// cmd.exe cannot quote.
fn escape_batch(path: &Path) -> Option<String> {
    let s = path.to_string_lossy();
    if s.contains('"') || s.chars().any(char::is_control) {
        return None;
    }
    Some(format!("\"{}\"", s.replace('%', "%%")))
}

/// Single-line rendering of a path for use inside a comment.
fn escape_comment(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&c.escape_unicode().to_string());
            }
            c => out.push(c),
        }
    }
    out
}
