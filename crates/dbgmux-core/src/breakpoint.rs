//! Breakpoint model
//!
//! A breakpoint is created locally (pending, no backend index) when the user
//! requests one, or authoritatively by parsing a backend breakpoint-list
//! response. The manager in `dbgmux-link` keeps the authoritative collection
//! sorted by (file identity, line number); [`Breakpoint::location_cmp`] is
//! that ordering.

use crate::location::{FileId, Location};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What the backend should do when the breakpoint is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointAction {
    /// Keep the breakpoint armed.
    #[default]
    Keep,
    /// One-shot: the backend removes the breakpoint after the first hit.
    RemoveAfterHit,
    /// The backend disables (but keeps) the breakpoint after the first hit.
    DisableAfterHit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Backend-assigned index; 0 until the backend confirms the breakpoint.
    pub debugger_index: u32,
    pub location: Location,
    /// Function containing the breakpoint, when the backend reports it.
    pub function_name: Option<String>,
    pub enabled: bool,
    pub action: BreakpointAction,
    pub condition: Option<String>,
    pub ignore_count: u32,
}

impl Breakpoint {
    /// A user-requested breakpoint not yet confirmed by the backend.
    pub fn pending(location: Location) -> Self {
        Self {
            debugger_index: 0,
            location,
            function_name: None,
            enabled: true,
            action: BreakpointAction::Keep,
            condition: None,
            ignore_count: 0,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.debugger_index != 0
    }

    pub fn file_id(&self) -> Option<&FileId> {
        self.location.file_id()
    }

    pub fn line_number(&self) -> Option<u32> {
        self.location.line_number()
    }

    /// Ordering by (file identity, line number). Breakpoints without a line
    /// location (address or function targets) sort after all line
    /// breakpoints, by their display text, so the collection stays totally
    /// ordered.
    pub fn location_cmp(&self, other: &Self) -> Ordering {
        match (
            (self.file_id(), self.line_number()),
            (other.file_id(), other.line_number()),
        ) {
            ((Some(fa), Some(la)), (Some(fb), Some(lb))) => fa.cmp(fb).then(la.cmp(&lb)),
            ((Some(_), _), (None, _)) => Ordering::Less,
            ((None, _), (Some(_), _)) => Ordering::Greater,
            _ => self.location.to_string().cmp(&other.location.to_string()),
        }
    }

    /// True when this breakpoint sits at exactly (file, line).
    pub fn is_at(&self, file: &FileId, line: u32) -> bool {
        self.file_id() == Some(file) && self.line_number() == Some(line)
    }

    /// Search identity by function name: exact match or `name(` prefix, so
    /// overloads of the same function all match.
    pub fn matches_function(&self, name: &str) -> bool {
        match &self.function_name {
            Some(f) => f == name || f.starts_with(&format!("{}(", name)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(file: &str, line: u32) -> Breakpoint {
        Breakpoint::pending(Location::line(file, line))
    }

    #[test]
    fn test_pending_has_no_index() {
        let b = bp("main.c", 10);
        assert!(!b.is_confirmed());
        assert!(b.enabled);
        assert_eq!(b.action, BreakpointAction::Keep);
    }

    #[test]
    fn test_location_ordering() {
        assert_eq!(bp("a.c", 5).location_cmp(&bp("a.c", 9)), Ordering::Less);
        assert_eq!(bp("b.c", 1).location_cmp(&bp("a.c", 9)), Ordering::Greater);
        assert_eq!(bp("a.c", 5).location_cmp(&bp("a.c", 5)), Ordering::Equal);
    }

    #[test]
    fn test_line_sorts_before_address() {
        let line = bp("z.c", 999);
        let addr = Breakpoint::pending(Location::address("0x1000"));
        assert_eq!(line.location_cmp(&addr), Ordering::Less);
        assert_eq!(addr.location_cmp(&line), Ordering::Greater);
    }

    #[test]
    fn test_is_at() {
        let b = bp("main.c", 10);
        let file = FileId::from("main.c");
        assert!(b.is_at(&file, 10));
        assert!(!b.is_at(&file, 11));
        assert!(!b.is_at(&FileId::from("other.c"), 10));
    }

    #[test]
    fn test_function_prefix_match() {
        let mut b = bp("main.c", 10);
        b.function_name = Some("lookup(int, char*)".to_string());
        assert!(b.matches_function("lookup"));
        assert!(!b.matches_function("look"));

        b.function_name = Some("lookup".to_string());
        assert!(b.matches_function("lookup"));
    }
}
