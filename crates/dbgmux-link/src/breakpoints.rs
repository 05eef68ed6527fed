//! Breakpoint reconciliation
//!
//! The manager holds the authoritative, client-visible breakpoint list. It
//! is a state machine driven by broadcast events and backend replies; it
//! never talks to the backend directly. Instead it returns
//! [`BreakpointDirective`]s for the owning link to execute, which keeps the
//! reconciliation logic synchronous and testable.
//!
//! Reconciliation across a backend restart:
//! - on the restart signal, remember that the next successful symbol load
//!   must replay the list;
//! - on symbol load, snapshot the current list (deep copy) into a saved
//!   side list and replay each breakpoint's *set* request by file+line
//!   (backend indices are reassigned, the old ones are useless);
//! - when the next full list fetch returns with the same length as the
//!   saved list, reapply each saved breakpoint's enabled/condition/
//!   ignore-count onto the new index, positionally matched by sorted order,
//!   and drop the saved list;
//! - on a length mismatch, keep the saved list untouched and skip the
//!   merge for this cycle. Best effort, not guaranteed-consistent.

use dbgmux_core::{Breakpoint, BreakpointAction, DebugEvent, FileId, Location};
use tracing::{debug, warn};

/// Backend work the manager wants done.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakpointDirective {
    /// Fetch the full breakpoint list; feed the result to
    /// [`BreakpointManager::update_list`].
    FetchList,
    /// Set a breakpoint by location.
    Set { location: Location, temporary: bool },
    SetEnabled {
        index: u32,
        enabled: bool,
        once: bool,
    },
    SetCondition {
        index: u32,
        condition: String,
    },
    SetIgnoreCount {
        index: u32,
        count: u32,
    },
}

#[derive(Debug, Default)]
pub struct BreakpointManager {
    /// Authoritative list, sorted by (file identity, line).
    list: Vec<Breakpoint>,
    /// Watchpoints and other non-location entries reported by the backend.
    other: Vec<Breakpoint>,
    /// Shadow list awaiting restore across a restart.
    saved: Option<Vec<Breakpoint>>,
    /// A restart was observed; snapshot + replay on the next symbol load.
    restore_on_symbols_loaded: bool,
    /// Refresh the list on every program stop (backends whose breakpoint
    /// hit counts move without a breakpoints-changed broadcast).
    update_when_stopped: bool,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backends without change broadcasts set this so hit counts stay
    /// current.
    pub fn set_update_when_stopped(&mut self, update: bool) {
        self.update_when_stopped = update;
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.list
    }

    pub fn other_entries(&self) -> &[Breakpoint] {
        &self.other
    }

    pub fn has_saved_list(&self) -> bool {
        self.saved.is_some()
    }

    /// React to a link broadcast. Must be called for every event.
    pub fn on_event(&mut self, event: &DebugEvent) -> Vec<BreakpointDirective> {
        match event {
            DebugEvent::DebuggerRestarted => {
                self.restore_on_symbols_loaded = true;
                Vec::new()
            }
            DebugEvent::SymbolsLoaded { success, .. } => {
                let mut directives = Vec::new();
                if *success && self.restore_on_symbols_loaded && !self.list.is_empty() {
                    self.saved = Some(self.list.clone());
                    for bp in &self.list {
                        if let Some(dir) = set_directive(bp) {
                            directives.push(dir);
                        }
                    }
                }
                self.restore_on_symbols_loaded = false;
                directives
            }
            DebugEvent::BreakpointsChanged => vec![BreakpointDirective::FetchList],
            DebugEvent::ProgramStopped { .. } if self.update_when_stopped => {
                vec![BreakpointDirective::FetchList]
            }
            _ => Vec::new(),
        }
    }

    /// Install a freshly fetched list, replacing the previous one
    /// wholesale. Returns the reapplication directives when a saved list
    /// was matched.
    pub fn update_list(
        &mut self,
        mut list: Vec<Breakpoint>,
        other: Vec<Breakpoint>,
    ) -> Vec<BreakpointDirective> {
        list.sort_by(|a, b| a.location_cmp(b));
        self.list = list;
        self.other = other;

        let Some(saved) = self.saved.take() else {
            return Vec::new();
        };

        if saved.len() != self.list.len() {
            debug!(
                saved = saved.len(),
                fetched = self.list.len(),
                "restore skipped: breakpoint count mismatch"
            );
            self.saved = Some(saved);
            return Vec::new();
        }

        // Positional reapplication by sorted order. If two entries sort
        // identically but correspond to different underlying breakpoints
        // (e.g. after a file rename), state can be misassigned; this
        // mirrors the upstream debugger behavior and is covered by a test.
        let mut directives = Vec::new();
        for (saved_bp, new_bp) in saved.iter().zip(self.list.iter()) {
            let index = new_bp.debugger_index;
            if !saved_bp.enabled {
                directives.push(BreakpointDirective::SetEnabled {
                    index,
                    enabled: false,
                    once: false,
                });
            } else if saved_bp.action == BreakpointAction::DisableAfterHit {
                directives.push(BreakpointDirective::SetEnabled {
                    index,
                    enabled: true,
                    once: true,
                });
            }
            if let Some(condition) = &saved_bp.condition {
                directives.push(BreakpointDirective::SetCondition {
                    index,
                    condition: condition.clone(),
                });
            }
            if saved_bp.ignore_count > 0 {
                directives.push(BreakpointDirective::SetIgnoreCount {
                    index,
                    count: saved_bp.ignore_count,
                });
            }
        }
        directives
    }

    /// Seed the saved list from persisted setup and return the directives
    /// that replay it against the backend. The backend's echo of the new
    /// breakpoints then triggers the same positional reapply path as a
    /// restart.
    pub fn load_saved_setup(&mut self, saved: Vec<Breakpoint>) -> Vec<BreakpointDirective> {
        let mut directives = Vec::new();
        for bp in &saved {
            if let Some(dir) = set_directive(bp) {
                directives.push(dir);
            }
        }
        if !saved.is_empty() {
            self.saved = Some(saved);
        }
        directives
    }

    /// Binary search by (file identity, line). Enabled state is
    /// deliberately not part of the answer.
    pub fn has_breakpoint_at(&self, location: &Location) -> bool {
        let (Some(file), Some(line)) = (location.file_id(), location.line_number()) else {
            return false;
        };
        let probe = Breakpoint::pending(location.clone());
        self.list
            .binary_search_by(|bp| bp.location_cmp(&probe))
            .map(|i| self.list[i].is_at(file, line))
            .unwrap_or(false)
    }

    /// All breakpoints at exactly this location, or matching the location's
    /// function-name target. Identity is never address-only when a line
    /// location exists.
    pub fn breakpoints_at(&self, location: &Location) -> Vec<&Breakpoint> {
        match location {
            Location::Line { file, line } => self
                .list
                .iter()
                .filter(|bp| bp.is_at(file, *line))
                .collect(),
            Location::Function(name) => self
                .list
                .iter()
                .filter(|bp| bp.matches_function(name))
                .collect(),
            Location::Address(_) => Vec::new(),
        }
    }

    /// All breakpoints in one file, in line order.
    pub fn breakpoints_in_file(&self, file: &FileId) -> Vec<&Breakpoint> {
        self.list
            .iter()
            .filter(|bp| bp.file_id() == Some(file))
            .collect()
    }

    /// A breakpoint's file name was resolved: re-sort it into place.
    pub fn file_name_resolved(&mut self, index: u32, file: FileId) {
        let Some(pos) = self.list.iter().position(|bp| bp.debugger_index == index) else {
            return;
        };
        let mut bp = self.list.remove(pos);
        if let Location::Line { file: f, .. } = &mut bp.location {
            *f = file;
        }
        let at = self
            .list
            .partition_point(|existing| existing.location_cmp(&bp) == std::cmp::Ordering::Less);
        self.list.insert(at, bp);
    }

    /// Resolution failed for a saved breakpoint: it cannot be replayed, so
    /// drop it from the shadow list (the live list keeps the unresolved
    /// entry until the backend removes it).
    pub fn file_name_invalid(&mut self, file: &FileId) {
        if let Some(saved) = self.saved.as_mut() {
            let before = saved.len();
            saved.retain(|bp| bp.file_id() != Some(file));
            if saved.len() != before {
                warn!(file = %file.display_name(), "dropped unresolvable saved breakpoints");
            }
        }
    }

    pub fn enable_all(&self) -> Vec<BreakpointDirective> {
        self.list
            .iter()
            .filter(|bp| !bp.enabled)
            .map(|bp| BreakpointDirective::SetEnabled {
                index: bp.debugger_index,
                enabled: true,
                once: false,
            })
            .collect()
    }

    pub fn disable_all(&self) -> Vec<BreakpointDirective> {
        self.list
            .iter()
            .filter(|bp| bp.enabled)
            .map(|bp| BreakpointDirective::SetEnabled {
                index: bp.debugger_index,
                enabled: false,
                once: false,
            })
            .collect()
    }
}

fn set_directive(bp: &Breakpoint) -> Option<BreakpointDirective> {
    // replay by file+line, never by stale backend index
    bp.location.is_valid_source().then(|| BreakpointDirective::Set {
        location: bp.location.clone(),
        temporary: bp.action == BreakpointAction::RemoveAfterHit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(index: u32, file: &str, line: u32) -> Breakpoint {
        let mut bp = Breakpoint::pending(Location::line(file, line));
        bp.debugger_index = index;
        bp
    }

    #[test]
    fn test_update_list_sorts() {
        let mut mgr = BreakpointManager::new();
        mgr.update_list(
            vec![
                confirmed(2, "b.c", 1),
                confirmed(1, "a.c", 9),
                confirmed(3, "a.c", 2),
            ],
            Vec::new(),
        );
        let lines: Vec<(String, u32)> = mgr
            .breakpoints()
            .iter()
            .map(|bp| (bp.file_id().unwrap().display_name(), bp.line_number().unwrap()))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("a.c".to_string(), 2),
                ("a.c".to_string(), 9),
                ("b.c".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_has_breakpoint_at_exact_match_only() {
        let mut mgr = BreakpointManager::new();
        mgr.update_list(vec![confirmed(1, "main.c", 10)], Vec::new());

        assert!(mgr.has_breakpoint_at(&Location::line("main.c", 10)));
        assert!(!mgr.has_breakpoint_at(&Location::line("main.c", 11)));
        assert!(!mgr.has_breakpoint_at(&Location::line("other.c", 10)));
        assert!(!mgr.has_breakpoint_at(&Location::address("0x10")));
    }

    #[test]
    fn test_has_breakpoint_at_ignores_enabled_state() {
        let mut mgr = BreakpointManager::new();
        let mut bp = confirmed(1, "main.c", 10);
        bp.enabled = false;
        mgr.update_list(vec![bp], Vec::new());
        assert!(mgr.has_breakpoint_at(&Location::line("main.c", 10)));
    }

    #[test]
    fn test_breakpoints_changed_triggers_fetch() {
        let mut mgr = BreakpointManager::new();
        let directives = mgr.on_event(&DebugEvent::BreakpointsChanged);
        assert_eq!(directives, vec![BreakpointDirective::FetchList]);
    }

    #[test]
    fn test_restart_snapshot_and_replay() {
        let mut mgr = BreakpointManager::new();
        let mut bp = confirmed(3, "main.c", 10);
        bp.condition = Some("x > 1".to_string());
        mgr.update_list(vec![bp], Vec::new());

        assert!(mgr.on_event(&DebugEvent::DebuggerRestarted).is_empty());
        let directives = mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: true,
            program_name: "demo".to_string(),
        });

        // replay is by location, not by the stale index 3
        assert_eq!(
            directives,
            vec![BreakpointDirective::Set {
                location: Location::line("main.c", 10),
                temporary: false
            }]
        );
        assert!(mgr.has_saved_list());
    }

    #[test]
    fn test_restore_reapplies_user_state_positionally() {
        let mut mgr = BreakpointManager::new();
        let mut bp = confirmed(3, "main.c", 10);
        bp.enabled = false;
        bp.condition = Some("x > 1".to_string());
        bp.ignore_count = 5;
        mgr.update_list(vec![bp], Vec::new());

        mgr.on_event(&DebugEvent::DebuggerRestarted);
        mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: true,
            program_name: "demo".to_string(),
        });

        // backend re-set the breakpoint under a new index
        let directives = mgr.update_list(vec![confirmed(7, "main.c", 10)], Vec::new());
        assert!(directives.contains(&BreakpointDirective::SetEnabled {
            index: 7,
            enabled: false,
            once: false
        }));
        assert!(directives.contains(&BreakpointDirective::SetCondition {
            index: 7,
            condition: "x > 1".to_string()
        }));
        assert!(directives.contains(&BreakpointDirective::SetIgnoreCount { index: 7, count: 5 }));
        assert!(!mgr.has_saved_list(), "saved list discarded after merge");
    }

    #[test]
    fn test_restore_disable_after_hit_becomes_enable_once() {
        let mut mgr = BreakpointManager::new();
        let mut bp = confirmed(1, "main.c", 10);
        bp.action = BreakpointAction::DisableAfterHit;
        mgr.update_list(vec![bp], Vec::new());
        mgr.on_event(&DebugEvent::DebuggerRestarted);
        mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: true,
            program_name: String::new(),
        });

        let directives = mgr.update_list(vec![confirmed(2, "main.c", 10)], Vec::new());
        assert_eq!(
            directives,
            vec![BreakpointDirective::SetEnabled {
                index: 2,
                enabled: true,
                once: true
            }]
        );
    }

    #[test]
    fn test_length_mismatch_preserves_saved_list() {
        let mut mgr = BreakpointManager::new();
        mgr.update_list(
            vec![confirmed(1, "a.c", 1), confirmed(2, "b.c", 2)],
            Vec::new(),
        );
        mgr.on_event(&DebugEvent::DebuggerRestarted);
        mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: true,
            program_name: String::new(),
        });

        // only one breakpoint came back: no reapplication this cycle
        let directives = mgr.update_list(vec![confirmed(5, "a.c", 1)], Vec::new());
        assert!(directives.is_empty());
        assert!(mgr.has_saved_list(), "saved list retained for next cycle");

        // next fetch matches: merge happens
        let directives = mgr.update_list(
            vec![confirmed(5, "a.c", 1), confirmed(6, "b.c", 2)],
            Vec::new(),
        );
        assert!(directives.is_empty(), "all saved state was default");
        assert!(!mgr.has_saved_list());
    }

    #[test]
    fn test_positional_merge_is_order_based_not_identity_based() {
        // Known hazard, preserved as observed upstream behavior: after the
        // replay, state is matched by sorted position. If the backend
        // reports the same count but semantically different breakpoints,
        // the saved state lands on whatever sorts into each slot.
        let mut mgr = BreakpointManager::new();
        let mut first = confirmed(1, "a.c", 1);
        first.enabled = false;
        mgr.update_list(vec![first, confirmed(2, "b.c", 2)], Vec::new());
        mgr.on_event(&DebugEvent::DebuggerRestarted);
        mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: true,
            program_name: String::new(),
        });

        // a.c:1 failed to re-set; an unrelated c.c:3 appeared. Count still
        // matches, so the disable lands on b.c:2's slot.
        let directives = mgr.update_list(
            vec![confirmed(9, "b.c", 2), confirmed(10, "c.c", 3)],
            Vec::new(),
        );
        assert_eq!(
            directives,
            vec![BreakpointDirective::SetEnabled {
                index: 9,
                enabled: false,
                once: false
            }]
        );
    }

    #[test]
    fn test_failed_symbol_load_discards_restore_intent() {
        let mut mgr = BreakpointManager::new();
        mgr.update_list(vec![confirmed(1, "a.c", 1)], Vec::new());
        mgr.on_event(&DebugEvent::DebuggerRestarted);
        let directives = mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: false,
            program_name: String::new(),
        });
        assert!(directives.is_empty());
        assert!(!mgr.has_saved_list());

        // a later successful load without a fresh restart does not replay
        let directives = mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: true,
            program_name: String::new(),
        });
        assert!(directives.is_empty());
    }

    #[test]
    fn test_load_saved_setup_replays_and_seeds() {
        let mut mgr = BreakpointManager::new();
        let mut bp = Breakpoint::pending(Location::line("main.c", 10));
        bp.ignore_count = 3;

        let directives = mgr.load_saved_setup(vec![bp]);
        assert_eq!(
            directives,
            vec![BreakpointDirective::Set {
                location: Location::line("main.c", 10),
                temporary: false
            }]
        );
        assert!(mgr.has_saved_list());

        let directives = mgr.update_list(vec![confirmed(1, "main.c", 10)], Vec::new());
        assert_eq!(
            directives,
            vec![BreakpointDirective::SetIgnoreCount { index: 1, count: 3 }]
        );
    }

    #[test]
    fn test_file_name_resolved_resorts() {
        let mut mgr = BreakpointManager::new();
        mgr.update_list(
            vec![confirmed(1, "zzz.c", 1), confirmed(2, "aaa.c", 5)],
            Vec::new(),
        );
        // "zzz.c" resolves to an absolute path sorting before "aaa.c"
        mgr.file_name_resolved(1, FileId::from("/src/0first.c"));
        assert_eq!(
            mgr.breakpoints()[0].file_id().unwrap().display_name(),
            "/src/0first.c"
        );
    }

    #[test]
    fn test_file_name_invalid_prunes_saved() {
        let mut mgr = BreakpointManager::new();
        mgr.update_list(
            vec![confirmed(1, "a.c", 1), confirmed(2, "b.c", 2)],
            Vec::new(),
        );
        mgr.on_event(&DebugEvent::DebuggerRestarted);
        mgr.on_event(&DebugEvent::SymbolsLoaded {
            success: true,
            program_name: String::new(),
        });

        mgr.file_name_invalid(&FileId::from("a.c"));
        // saved list shrank to 1; a fetch of 1 now matches
        let directives = mgr.update_list(vec![confirmed(9, "b.c", 2)], Vec::new());
        assert!(directives.is_empty());
        assert!(!mgr.has_saved_list());
    }

    #[test]
    fn test_enable_disable_all() {
        let mut mgr = BreakpointManager::new();
        let mut off = confirmed(1, "a.c", 1);
        off.enabled = false;
        mgr.update_list(vec![off, confirmed(2, "b.c", 2)], Vec::new());

        assert_eq!(
            mgr.enable_all(),
            vec![BreakpointDirective::SetEnabled {
                index: 1,
                enabled: true,
                once: false
            }]
        );
        assert_eq!(
            mgr.disable_all(),
            vec![BreakpointDirective::SetEnabled {
                index: 2,
                enabled: false,
                once: false
            }]
        );
    }

    #[test]
    fn test_function_identity_lookup() {
        let mut mgr = BreakpointManager::new();
        let mut bp = confirmed(1, "main.c", 10);
        bp.function_name = Some("compute(int)".to_string());
        mgr.update_list(vec![bp], Vec::new());

        assert_eq!(mgr.breakpoints_at(&Location::function("compute")).len(), 1);
        assert_eq!(mgr.breakpoints_at(&Location::function("comp")).len(), 0);
    }
}
