//! Broadcast events
//!
//! Every state change the core reports crosses one typed event enum. Events
//! carry their full payload as data; subscribers never reach back into the
//! link to interpret a loosely-typed message.

use crate::location::Location;
use crate::stack::Stack;

/// Classification of text echoed on the debug-output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Raw output received from the backend.
    Output,
    /// A command transmitted to the backend.
    Command,
    /// Internal log line.
    Log,
}

/// A state-change broadcast from the link layer.
///
/// Asynchronous backend-initiated events (program stopped, breakpoints
/// changed, thread started) are broadcast independently of the
/// request/response cycle and may pre-empt or gate queue advancement.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// Text for the user console. `from_target` distinguishes debuggee
    /// output from debugger output where the backend can tell them apart.
    UserOutput {
        text: String,
        is_error: bool,
        from_target: bool,
    },
    /// Raw protocol traffic, for the debug-output window.
    DebugOutput { text: String, kind: OutputKind },

    // command line state
    DebuggerReadyForInput,
    DebuggerBusy,
    DebuggerDefiningScript,

    // debugger lifecycle
    DebuggerStarted,
    DebuggerRestarted,
    PrepareToLoadSymbols,
    SymbolsLoaded {
        success: bool,
        program_name: String,
    },
    SymbolsReloaded,
    CoreLoaded,
    CoreCleared,
    AttachedToProcess,
    DetachedFromProcess,

    // program state
    ProgramRunning,
    /// The internal first stop after launch, before user breakpoints apply.
    ProgramFirstStop,
    /// `location` is None when the backend could not name a source position
    /// (no debug info for the stop site).
    ProgramStopped {
        location: Option<Location>,
    },
    /// Secondary stop refinement (function name / memory address resolved
    /// after the initial stop broadcast).
    ProgramStopped2 {
        location: Location,
    },
    ProgramFinished,

    // data state
    /// The backend reported that its breakpoint state moved; the manager
    /// reacts by fetching the full list.
    BreakpointsChanged,
    /// The manager installed a freshly fetched list; consumers may re-read
    /// it. Distinct from `BreakpointsChanged` so the fetch cannot retrigger
    /// itself.
    BreakpointListUpdated,
    FrameChanged,
    ThreadChanged,
    ValueChanged,
    ThreadListChanged,

    /// A freshly built stack, frames innermost-first with arguments
    /// attached. `selected` is the frame the UI should highlight (the
    /// assert-skip heuristic may pick a caller instead of frame 0).
    StackLoaded {
        stack: Stack,
        selected: usize,
    },

    /// Backend-specific plugin payload, passed through verbatim.
    PlugInMessage {
        text: String,
    },
}

impl DebugEvent {
    pub fn user_output(text: impl Into<String>, is_error: bool) -> Self {
        DebugEvent::UserOutput {
            text: text.into(),
            is_error,
            from_target: false,
        }
    }

    pub fn debug_output(text: impl Into<String>, kind: OutputKind) -> Self {
        DebugEvent::DebugOutput {
            text: text.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_output_helper() {
        let ev = DebugEvent::user_output("hi", true);
        assert_eq!(
            ev,
            DebugEvent::UserOutput {
                text: "hi".to_string(),
                is_error: true,
                from_target: false
            }
        );
    }
}
