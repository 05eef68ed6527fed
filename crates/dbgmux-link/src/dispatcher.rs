//! Transaction IDs, queues, and the queue-advance algorithm
//!
//! The dispatcher owns two ordered queues (foreground for user-issued work,
//! background for low-priority polling) plus the "currently running" slot:
//! the one command whose result stream is being attributed right now.
//!
//! Backends that cannot interleave commands get strict single-flight
//! discipline; backends that pipeline may have many commands Executing at
//! once, each awaiting a distinct reply ID. Either way a command is never
//! transmitted twice for one send, and `handle_command_running` must run
//! before any result token for that transaction is processed.

use crate::command::{
    Command, CommandOutput, CommandState, Disposition, FinishCtx, Payload, SessionNote,
};
use dbgmux_core::DebugEvent;
use tracing::{debug, warn};

/// A queued command plus its lifecycle bookkeeping.
pub(crate) struct Envelope {
    pub(crate) id: u64,
    pub(crate) state: CommandState,
    pub(crate) background: bool,
    pub(crate) ignore_result: bool,
    pub(crate) output: CommandOutput,
    pub(crate) command: Box<dyn Command>,
}

impl Envelope {
    fn new(command: Box<dyn Command>) -> Self {
        Self {
            id: 0,
            state: CommandState::Unassigned,
            background: command.background(),
            ignore_result: command.ignore_result(),
            output: CommandOutput::default(),
            command,
        }
    }
}

/// A transmit instruction handed to the adapter: serialize `payload` on the
/// wire, correlated by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub id: u64,
    pub payload: Payload,
    pub ignore_result: bool,
}

/// What the backend permits right now. Queried fresh on every queue
/// advance, because the gates move with program state (e.g. "not suspended
/// while a signal is being delivered").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendCaps {
    /// Backend supports multiple concurrent in-flight commands.
    pub pipeline: bool,
    /// Foreground commands may be sent.
    pub foreground_ok: bool,
    /// Background/polling commands may be sent.
    pub background_ok: bool,
}

impl SendCaps {
    pub fn single_flight(foreground_ok: bool, background_ok: bool) -> Self {
        Self {
            pipeline: false,
            foreground_ok,
            background_ok,
        }
    }
}

/// Everything a completed command produced, for the owning link to act on.
#[derive(Debug, Default)]
pub struct FinishResult {
    pub events: Vec<DebugEvent>,
    pub notes: Vec<SessionNote>,
}

#[derive(Default)]
pub struct Dispatcher {
    foreground: Vec<Envelope>,
    background: Vec<Envelope>,
    running: Option<Envelope>,
    last_id: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a command. Assigns the next transaction ID and appends to the
    /// queue selected by the command's background flag. The caller must
    /// follow up with [`Dispatcher::next_transmissions`].
    pub fn send(&mut self, command: Box<dyn Command>) -> u64 {
        let mut env = Envelope::new(command);
        env.id = self.next_transaction_id();
        env.state = CommandState::Pending;
        let id = env.id;

        if env.background {
            self.background.push(env);
        } else {
            self.foreground.push(env);
        }
        id
    }

    /// Monotonically increasing, wraps past the max back to 1, never 0.
    fn next_transaction_id(&mut self) -> u64 {
        self.last_id = self.last_id.wrapping_add(1);
        if self.last_id == 0 {
            self.last_id = 1;
        }
        self.last_id
    }

    /// The queue-advance algorithm. Returns the commands to put on the wire
    /// now, already marked Executing with cleared accumulators.
    ///
    /// 1. Foreground non-empty + pipelining: transmit every foreground
    ///    command not already Executing.
    /// 2. Foreground non-empty, single-flight: transmit only the head, and
    ///    only if the foreground gate allows.
    /// 3. Foreground empty: transmit the background head if the background
    ///    gate allows.
    pub fn next_transmissions(&mut self, caps: SendCaps) -> Vec<Transmission> {
        let mut out = Vec::new();

        if !self.foreground.is_empty() && caps.pipeline {
            for env in &mut self.foreground {
                if env.state != CommandState::Executing {
                    out.push(start_executing(env));
                }
            }
        } else if !self.foreground.is_empty() {
            let env = &mut self.foreground[0];
            if env.state != CommandState::Executing && caps.foreground_ok {
                out.push(start_executing(env));
            }
        } else if !self.background.is_empty() && caps.background_ok {
            let env = &mut self.background[0];
            if env.state != CommandState::Executing {
                out.push(start_executing(env));
            }
        }

        out
    }

    /// A backend token confirmed that transaction `id` is now producing
    /// output. Moves the match out of its queue into the running slot.
    /// Foreground is scanned first (priority), then the background head.
    ///
    /// Returns false when the ID matches nothing: a stale reply from before
    /// a restart or for a cancelled command, which is a normal occurrence.
    pub fn handle_command_running(&mut self, id: u64) -> bool {
        if self.running.is_some() {
            warn!(id, "command marked running while another is still current");
            return false;
        }

        if let Some(pos) = self.foreground.iter().position(|env| env.id == id) {
            self.running = Some(self.foreground.remove(pos));
            return true;
        }

        if let Some(env) = self.background.first() {
            if env.id == id {
                self.running = Some(self.background.remove(0));
                return true;
            }
        }

        debug!(id, "ignoring unknown transaction id");
        false
    }

    /// Transaction ID of the command currently attributed result tokens.
    pub fn running_id(&self) -> Option<u64> {
        self.running.as_ref().map(|env| env.id)
    }

    /// Output accumulated so far for the running command.
    pub fn running_output(&self) -> Option<&CommandOutput> {
        self.running.as_ref().map(|env| &env.output)
    }

    pub fn has_running_command(&self) -> bool {
        self.running.is_some()
    }

    /// Append text to the running command's accumulator.
    pub fn accumulate(&mut self, text: &str) {
        if let Some(env) = self.running.as_mut() {
            env.output.text.push_str(text);
        }
    }

    /// Save one incremental result line for the running command.
    pub fn save_result(&mut self, text: &str) {
        if let Some(env) = self.running.as_mut() {
            env.output.results.push(text.to_string());
        }
    }

    /// Install a binary reply payload for the running command.
    pub fn set_reply_data(&mut self, data: Vec<u8>, error_code: u16) {
        if let Some(env) = self.running.as_mut() {
            env.output.data = data;
            env.output.error_code = error_code;
        }
    }

    /// Complete the running command. The state is reset to Unassigned
    /// *before* the hook runs, so a hook that re-sends observes a clean
    /// command; `Disposition::Resend` then re-enqueues it with a fresh ID,
    /// leaving it Pending.
    pub fn finish_running(&mut self, success: bool) -> FinishResult {
        match self.running.take() {
            Some(env) => self.finish_envelope(env, success),
            None => FinishResult::default(),
        }
    }

    fn finish_envelope(&mut self, mut env: Envelope, success: bool) -> FinishResult {
        env.id = 0;
        env.state = CommandState::Unassigned;

        let mut ctx = FinishCtx::default();
        let disposition = env.command.on_finish(success, &env.output, &mut ctx);

        if disposition == Disposition::Resend {
            env.output.clear();
            env.id = self.next_transaction_id();
            env.state = CommandState::Pending;
            if env.background {
                self.background.push(env);
            } else {
                self.foreground.push(env);
            }
        }

        for cmd in ctx.followups {
            self.send(cmd);
        }

        FinishResult {
            events: ctx.events,
            notes: ctx.notes,
        }
    }

    /// Fire-and-forget cancellation: remove the command from whichever
    /// queue holds it, or clear the running slot. No attempt is made to
    /// unsend anything already on the wire; a reply for the old ID will be
    /// silently discarded later. A no-op for unknown IDs.
    pub fn cancel(&mut self, id: u64) {
        if self.running.as_ref().map(|env| env.id) == Some(id) {
            self.running = None;
        }
        self.foreground.retain(|env| env.id != id);
        self.background.retain(|env| env.id != id);
    }

    /// Cancel everything, used when the backend connection is lost. Every
    /// command is finished with failure; hooks run and may enqueue
    /// follow-ups into the (now empty) queues. Queues are drained in
    /// reverse order.
    pub fn cancel_all_commands(&mut self) -> FinishResult {
        let mut result = FinishResult::default();

        if let Some(env) = self.running.take() {
            merge(&mut result, self.finish_envelope(env, false));
        }
        while let Some(env) = self.foreground.pop() {
            merge(&mut result, self.finish_envelope(env, false));
        }

        merge(&mut result, self.cancel_background_commands());
        result
    }

    /// Cancel only the background queue, used when the program starts
    /// running and polling results would be stale.
    pub fn cancel_background_commands(&mut self) -> FinishResult {
        let mut result = FinishResult::default();
        while let Some(env) = self.background.pop() {
            if self.running.as_ref().map(|r| r.id) == Some(env.id) {
                self.running = None;
            }
            merge(&mut result, self.finish_envelope(env, false));
        }
        result
    }

    pub fn has_foreground_commands(&self) -> bool {
        !self.foreground.is_empty()
    }

    pub fn has_pending_commands(&self) -> bool {
        !self.foreground.is_empty() || !self.background.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn state_of(&self, id: u64) -> Option<CommandState> {
        self.foreground
            .iter()
            .chain(self.background.iter())
            .chain(self.running.iter())
            .find(|env| env.id == id)
            .map(|env| env.state)
    }

    #[cfg(test)]
    pub(crate) fn set_last_id(&mut self, id: u64) {
        self.last_id = id;
    }
}

fn start_executing(env: &mut Envelope) -> Transmission {
    env.state = CommandState::Executing;
    env.output.clear();
    Transmission {
        id: env.id,
        payload: env.command.payload(),
        ignore_result: env.ignore_result,
    }
}

fn merge(into: &mut FinishResult, from: FinishResult) {
    into.events.extend(from.events);
    into.notes.extend(from.notes);
}
