//! Commands - units of work sent to a debugger backend
//!
//! A command owns its payload and its finish hook. The dispatcher owns the
//! command for its in-flight lifetime (one-shot commands are dropped right
//! after their hook runs); a command that wants to live on re-enqueues
//! itself by returning [`Disposition::Resend`] from the hook, which is how
//! periodic polling commands cycle.
//!
//! Hooks never reach back into the link directly. They talk through
//! [`FinishCtx`]: events to broadcast, follow-up commands to enqueue, and
//! typed [`SessionNote`]s the owning link interprets (parsed breakpoint
//! lists, stop locations, VM ID sizes, ...).

use dbgmux_core::{Breakpoint, DebugEvent, Location, Stack, ThreadKind};

/// Lifecycle state of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandState {
    /// Not yet submitted, or recycled after completion.
    #[default]
    Unassigned,
    /// In a queue, waiting to be transmitted.
    Pending,
    /// Transmitted; awaiting its terminal token.
    Executing,
}

/// What a command transmits. Text for the line/XML protocols, a framed
/// command-set/command pair for the binary VM protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary {
        command_set: u8,
        command: u8,
        data: Vec<u8>,
    },
}

impl Payload {
    pub fn text(s: impl Into<String>) -> Self {
        Payload::Text(s.into())
    }
}

/// Output accumulated for one command while it executes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Raw text accumulated from the command's output stream.
    pub text: String,
    /// Result lines some backends emit incrementally, saved in order.
    pub results: Vec<String>,
    /// Reply payload for binary backends.
    pub data: Vec<u8>,
    /// Backend error code on the reply, when the protocol carries one.
    pub error_code: u16,
}

impl CommandOutput {
    pub fn clear(&mut self) {
        self.text.clear();
        self.results.clear();
        self.data.clear();
        self.error_code = 0;
    }
}

/// VM ID sizes negotiated with a binary-protocol backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSizes {
    pub field: usize,
    pub method: usize,
    pub object: usize,
    pub reference_type: usize,
    pub frame: usize,
}

impl Default for IdSizes {
    fn default() -> Self {
        // every ID is 8 bytes until the backend says otherwise
        Self {
            field: 8,
            method: 8,
            object: 8,
            reference_type: 8,
            frame: 8,
        }
    }
}

/// Typed results a finish hook hands back to its link.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNote {
    /// The backend reported the program the symbols came from.
    ProgramName(Option<String>),
    /// The backend reported a loaded (or cleared) core file.
    CoreName(Option<String>),
    /// The stop location parsed from a stop-location query.
    StopLocation(Location),
    /// Refinement of the current stop (function / address resolved late).
    StopLocationRefined(Location),
    /// A freshly fetched breakpoint list: (breakpoints, other, e.g.
    /// watchpoints).
    BreakpointList(Vec<Breakpoint>, Vec<Breakpoint>),
    /// A fully built stack plus the frame to auto-select.
    Stack(Stack, usize),
    /// Threads and groups enumerated by the backend.
    ThreadList(Vec<(u64, ThreadKind, String)>),
    /// A thread's name arrived from a separate query.
    ThreadName(u64, String),
    /// A thread's parent group was discovered: (thread, parent group).
    ThreadParent(u64, u64),
    /// Negotiated VM ID sizes.
    IdSizes(IdSizes),
    /// The backend confirmed one breakpoint request and assigned it an
    /// index (backends without a list-fetch query report per-request).
    BreakpointConfirmed(Breakpoint),
    /// Raw VM stack frames awaiting symbol resolution:
    /// (frame id, class id, method id, code index), innermost first.
    VmFrames(Vec<(u64, u64, u64, u64)>),
}

/// What the dispatcher does with a command after its hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// One-shot: drop the command.
    Dispose,
    /// Re-enqueue with a fresh transaction ID (periodic polling commands).
    Resend,
}

/// Scratch space a finish hook writes into.
#[derive(Default)]
pub struct FinishCtx {
    pub events: Vec<DebugEvent>,
    pub followups: Vec<Box<dyn Command>>,
    pub notes: Vec<SessionNote>,
}

/// A unit of work with a payload and success/failure hooks.
///
/// Failure is a local, per-command recoverable event: the default failure
/// path is a no-op, and specific commands override `on_finish` to clean up.
pub trait Command: Send {
    /// The payload to transmit. Captured by the dispatcher at send time.
    fn payload(&self) -> Payload;

    /// Background commands are low-priority polling; they never run before
    /// the foreground queue drains.
    fn background(&self) -> bool {
        false
    }

    /// Ignore-result commands get the variant begin/end markers on
    /// echo-correlated backends so their output is never shown.
    fn ignore_result(&self) -> bool {
        false
    }

    /// Called after the dispatcher has already reset the command's state,
    /// so re-sending from inside the hook observes an Unassigned command.
    fn on_finish(
        &mut self,
        success: bool,
        output: &CommandOutput,
        ctx: &mut FinishCtx,
    ) -> Disposition;
}

/// A command built from a payload and a finish closure. Covers the common
/// case where no struct state is needed between send and finish.
pub struct FnCommand<F>
where
    F: FnMut(bool, &CommandOutput, &mut FinishCtx) -> Disposition + Send,
{
    payload: Payload,
    background: bool,
    ignore_result: bool,
    on_finish: F,
}

impl<F> FnCommand<F>
where
    F: FnMut(bool, &CommandOutput, &mut FinishCtx) -> Disposition + Send,
{
    pub fn new(payload: Payload, on_finish: F) -> Self {
        Self {
            payload,
            background: false,
            ignore_result: false,
            on_finish,
        }
    }

    /// Mark as a low-priority background command.
    pub fn in_background(mut self) -> Self {
        self.background = true;
        self
    }

    /// Mark as an internal command whose output is never shown.
    pub fn with_ignored_result(mut self) -> Self {
        self.ignore_result = true;
        self
    }
}

impl<F> Command for FnCommand<F>
where
    F: FnMut(bool, &CommandOutput, &mut FinishCtx) -> Disposition + Send,
{
    fn payload(&self) -> Payload {
        self.payload.clone()
    }

    fn background(&self) -> bool {
        self.background
    }

    fn ignore_result(&self) -> bool {
        self.ignore_result
    }

    fn on_finish(
        &mut self,
        success: bool,
        output: &CommandOutput,
        ctx: &mut FinishCtx,
    ) -> Disposition {
        (self.on_finish)(success, output, ctx)
    }
}

/// A fire-and-forget command: transmit, ignore the outcome.
pub fn simple(payload: Payload) -> Box<dyn Command> {
    Box::new(FnCommand::new(payload, |_, _, _| Disposition::Dispose))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_command_flags() {
        let cmd = FnCommand::new(Payload::text("info"), |_, _, _| Disposition::Dispose)
            .in_background()
            .with_ignored_result();
        assert!(cmd.background());
        assert!(cmd.ignore_result());
        assert_eq!(cmd.payload(), Payload::text("info"));
    }

    #[test]
    fn test_output_clear() {
        let mut out = CommandOutput {
            text: "abc".to_string(),
            results: vec!["r".to_string()],
            data: vec![1, 2],
            error_code: 9,
        };
        out.clear();
        assert_eq!(out, CommandOutput::default());
    }

    #[test]
    fn test_hook_receives_output() {
        let mut seen = String::new();
        {
            let mut cmd = FnCommand::new(Payload::text("x"), |success, out, _| {
                assert!(success);
                seen.push_str(&out.text);
                Disposition::Dispose
            });

            let out = CommandOutput {
                text: "result".to_string(),
                ..Default::default()
            };
            let mut ctx = FinishCtx::default();
            cmd.on_finish(true, &out, &mut ctx);
        }
        assert_eq!(seen, "result");
    }
}
