//! Breakpoint setup persistence
//!
//! The user's breakpoint list survives sessions through a small TOML file:
//! file, line, enabled, action, ignore count, condition. Backend indices are
//! deliberately not saved; they are reassigned when the list is replayed
//! against a fresh backend.

use dbgmux_core::{Breakpoint, BreakpointAction, Error, Location, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedBreakpoint {
    pub file: String,
    pub line: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub action: BreakpointAction,
    #[serde(default)]
    pub ignore_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

fn default_true() -> bool {
    true
}

impl From<&Breakpoint> for SavedBreakpoint {
    fn from(bp: &Breakpoint) -> Self {
        Self {
            file: bp
                .file_id()
                .map(|f| f.display_name())
                .unwrap_or_default(),
            line: bp.line_number().unwrap_or(0),
            enabled: bp.enabled,
            action: bp.action,
            ignore_count: bp.ignore_count,
            condition: bp.condition.clone(),
        }
    }
}

impl SavedBreakpoint {
    /// Rebuild a pending (unconfirmed) breakpoint carrying the saved user
    /// state.
    pub fn to_pending(&self) -> Breakpoint {
        let mut bp = Breakpoint::pending(Location::line(self.file.as_str(), self.line));
        bp.enabled = self.enabled;
        bp.action = self.action;
        bp.ignore_count = self.ignore_count;
        bp.condition = self.condition.clone();
        bp
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SetupFile {
    #[serde(default, rename = "breakpoint")]
    breakpoints: Vec<SavedBreakpoint>,
}

/// Save line breakpoints to `path`. Address and function breakpoints are
/// skipped: their identity is not meaningful across sessions.
pub fn save_breakpoint_setup(breakpoints: &[Breakpoint], path: &Path) -> Result<()> {
    let setup = SetupFile {
        breakpoints: breakpoints
            .iter()
            .filter(|bp| bp.line_number().is_some())
            .map(SavedBreakpoint::from)
            .collect(),
    };

    let text = toml::to_string_pretty(&setup)
        .map_err(|e| Error::InvalidConfig(format!("cannot serialize breakpoints: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InvalidConfig(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, text)
        .map_err(|e| Error::InvalidConfig(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(())
}

/// Load saved breakpoints. A missing file is an empty list.
pub fn load_breakpoint_setup(path: &Path) -> Result<Vec<SavedBreakpoint>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e)))?;
    let setup: SetupFile = toml::from_str(&text)
        .map_err(|e| Error::InvalidConfig(format!("cannot parse {}: {}", path.display(), e)))?;
    Ok(setup.breakpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breakpoints.toml");

        let mut bp = Breakpoint::pending(Location::line("main.c", 10));
        bp.enabled = false;
        bp.condition = Some("x > 3".to_string());
        bp.ignore_count = 2;
        bp.action = BreakpointAction::DisableAfterHit;

        save_breakpoint_setup(&[bp.clone()], &path).unwrap();
        let saved = load_breakpoint_setup(&path).unwrap();
        assert_eq!(saved.len(), 1);

        let restored = saved[0].to_pending();
        assert_eq!(restored.line_number(), Some(10));
        assert!(!restored.enabled);
        assert_eq!(restored.condition.as_deref(), Some("x > 3"));
        assert_eq!(restored.ignore_count, 2);
        assert_eq!(restored.action, BreakpointAction::DisableAfterHit);
        assert!(!restored.is_confirmed());
    }

    #[test]
    fn test_address_breakpoints_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breakpoints.toml");

        let addr = Breakpoint::pending(Location::address("0x4000"));
        let line = Breakpoint::pending(Location::line("main.c", 1));
        save_breakpoint_setup(&[addr, line], &path).unwrap();

        let saved = load_breakpoint_setup(&path).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].file, "main.c");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let saved = load_breakpoint_setup(&dir.path().join("none.toml")).unwrap();
        assert!(saved.is_empty());
    }
}
