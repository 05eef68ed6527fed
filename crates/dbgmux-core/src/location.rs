//! Location value object - a position a breakpoint or stop can refer to
//!
//! Backends report locations in three mutually exclusive identity modes:
//! a file + line pair, a raw memory address, or a function-name search
//! target. File identity is normalized through [`FileId`] so that the same
//! file reached through different relative spellings compares equal once
//! resolved.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Identity of a source file, used for ordering and equality.
///
/// An unresolved name (as reported by the backend) compares by the reported
/// string; a resolved file compares by its absolute path. A breakpoint may
/// sit in the authoritative list with an unresolved identity until the
/// file-resolution collaborator answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileId {
    /// Backend-reported name, not yet resolved to an absolute path.
    Unresolved(String),
    /// Absolute path on disk.
    Resolved(PathBuf),
}

impl FileId {
    pub fn is_resolved(&self) -> bool {
        matches!(self, FileId::Resolved(_))
    }

    /// The display name: the resolved path or the raw reported name.
    pub fn display_name(&self) -> String {
        match self {
            FileId::Unresolved(name) => name.clone(),
            FileId::Resolved(path) => path.display().to_string(),
        }
    }

    /// Comparison key. Resolved and unresolved identities live in the same
    /// sorted collection, so both compare through their textual form.
    fn key(&self) -> String {
        self.display_name()
    }
}

impl Ord for FileId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for FileId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for FileId {
    fn from(name: &str) -> Self {
        let p = Path::new(name);
        if p.is_absolute() {
            FileId::Resolved(p.to_path_buf())
        } else {
            FileId::Unresolved(name.to_string())
        }
    }
}

/// A source location: file + line, raw address, or function-name target.
///
/// The three modes are mutually exclusive identity modes; a location with a
/// file + line never falls back to address identity for search purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Line { file: FileId, line: u32 },
    Address(String),
    Function(String),
}

impl Location {
    /// Build a file:line location from a backend-reported name.
    pub fn line(file: impl Into<String>, line: u32) -> Self {
        let file = file.into();
        Location::Line {
            file: FileId::from(file.as_str()),
            line,
        }
    }

    pub fn address(addr: impl Into<String>) -> Self {
        Location::Address(addr.into())
    }

    pub fn function(name: impl Into<String>) -> Self {
        Location::Function(name.into())
    }

    /// Parse `file:line` as typed on the command line.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidLocation("empty".to_string()));
        }

        let parts: Vec<&str> = s.rsplitn(2, ':').collect();
        if parts.len() != 2 || parts[1].is_empty() {
            return Err(Error::InvalidLocation(s.to_string()));
        }

        let line = parts[0]
            .parse::<u32>()
            .map_err(|_| Error::InvalidLocation(s.to_string()))?;
        Ok(Location::line(parts[1], line))
    }

    pub fn file_id(&self) -> Option<&FileId> {
        match self {
            Location::Line { file, .. } => Some(file),
            _ => None,
        }
    }

    pub fn line_number(&self) -> Option<u32> {
        match self {
            Location::Line { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// True when this location can anchor a source view: it has a file whose
    /// identity is known.
    pub fn is_valid_source(&self) -> bool {
        matches!(self, Location::Line { .. })
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Line { file, line } => write!(f, "{}:{}", file.display_name(), line),
            Location::Address(addr) => write!(f, "*{}", addr),
            Location::Function(name) => write!(f, "{}()", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_line() {
        let loc = Location::parse("main.c:10").unwrap();
        assert_eq!(loc.line_number(), Some(10));
        assert_eq!(loc.file_id().unwrap().display_name(), "main.c");
    }

    #[test]
    fn test_parse_path_with_colons() {
        // rsplitn keeps everything before the last colon as the file name
        let loc = Location::parse("src/io:stream.c:42").unwrap();
        assert_eq!(loc.line_number(), Some(42));
        assert_eq!(loc.file_id().unwrap().display_name(), "src/io:stream.c");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Location::parse("").is_err());
        assert!(Location::parse("main.c").is_err());
        assert!(Location::parse("main.c:ten").is_err());
        assert!(Location::parse(":10").is_err());
    }

    #[test]
    fn test_absolute_path_resolves() {
        let loc = Location::line("/src/main.c", 3);
        assert!(loc.file_id().unwrap().is_resolved());

        let loc = Location::line("main.c", 3);
        assert!(!loc.file_id().unwrap().is_resolved());
    }

    #[test]
    fn test_file_id_ordering() {
        let a = FileId::from("a.c");
        let b = FileId::from("b.c");
        assert!(a < b);
    }

    #[test]
    fn test_display() {
        assert_eq!(Location::line("main.c", 10).to_string(), "main.c:10");
        assert_eq!(Location::address("0x4010").to_string(), "*0x4010");
        assert_eq!(Location::function("main").to_string(), "main()");
    }
}
