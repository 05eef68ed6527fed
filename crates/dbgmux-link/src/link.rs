//! The link capability trait implemented by every backend adapter
//!
//! The dispatcher, breakpoint manager, and file cache are backend-agnostic;
//! this trait is the seam where the four protocol adapters plug in. The
//! owner (the console front-end, or a test harness) holds a single
//! `Box<dyn DebuggerLink>` and is otherwise unaware of the wire format.

use crate::breakpoints::{BreakpointDirective, BreakpointManager};
use crate::command::Command;
use crate::transport::Transport;
use async_trait::async_trait;
use dbgmux_core::{DebugEvent, Location, Result};
use tokio::sync::broadcast;

/// What a backend family can do. Mirrors the capability table the front-end
/// consults before enabling an operation; absent capability means the
/// operation is a silent no-op at the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSet {
    pub set_program: bool,
    pub set_args: bool,
    pub set_core: bool,
    pub attach: bool,
    pub run_program: bool,
    pub stop_program: bool,
    pub set_execution_point: bool,
    pub execute_backwards: bool,
    pub show_breakpoint_info: bool,
    pub breakpoint_condition: bool,
    pub breakpoint_ignore_count: bool,
    pub watch_expression: bool,
    pub watch_location: bool,
    pub examine_memory: bool,
    pub disassemble_memory: bool,
}

impl FeatureSet {
    pub const fn none() -> Self {
        Self {
            set_program: false,
            set_args: false,
            set_core: false,
            attach: false,
            run_program: false,
            stop_program: false,
            set_execution_point: false,
            execute_backwards: false,
            show_breakpoint_info: false,
            breakpoint_condition: false,
            breakpoint_ignore_count: false,
            watch_expression: false,
            watch_location: false,
            examine_memory: false,
            disassemble_memory: false,
        }
    }
}

/// A debugger backend connection.
///
/// All mutating calls are `&mut self`: the link layer is single-threaded
/// and event-loop driven. The input side is pumped by the owner through
/// [`DebuggerLink::process_available`], whose readiness await is the only
/// suspension point; a partial message is buffered and re-attempted on the
/// next call, never blocked on mid-parse.
#[async_trait]
pub trait DebuggerLink: Send {
    fn features(&self) -> &FeatureSet;

    // session state

    fn debugger_has_started(&self) -> bool;
    fn has_loaded_symbols(&self) -> bool;
    fn is_debugging(&self) -> bool;
    fn program_is_running(&self) -> bool;
    fn program_is_stopped(&self) -> bool;

    /// The backend-specific send gate (distinct for foreground and
    /// background commands).
    fn ok_to_send(&self, background: bool) -> bool;

    /// Backend supports multiple concurrent in-flight commands.
    fn supports_pipelining(&self) -> bool {
        false
    }

    // event bus

    fn subscribe(&self) -> broadcast::Receiver<DebugEvent>;

    // breakpoint reconciliation

    fn breakpoint_manager(&mut self) -> &mut BreakpointManager;

    /// Execute manager directives against the backend.
    async fn apply_breakpoint_directives(
        &mut self,
        directives: Vec<BreakpointDirective>,
    ) -> Result<()>;

    // I/O pump

    /// Wait for backend input, consume what arrived, and run the token
    /// handlers to completion. Returns after one readiness cycle.
    async fn process_available(&mut self) -> Result<()>;

    // command submission

    /// Submit a command through the dispatcher. Returns false when the
    /// submission was rejected.
    async fn send_command(&mut self, command: Box<dyn Command>) -> Result<bool>;

    /// Write raw text to whatever currently accepts input (user typing for
    /// the debuggee goes through here). The single choke point for writes.
    async fn send_raw(&mut self, text: &str) -> Result<()>;

    // program lifecycle

    async fn set_program(&mut self, path: &str) -> Result<()>;
    async fn set_core(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }
    async fn attach_to_process(&mut self, _pid: u32) -> Result<()> {
        Ok(())
    }
    async fn run_program(&mut self, args: &str) -> Result<()>;
    async fn stop_program(&mut self) -> Result<()>;
    async fn kill_program(&mut self) -> Result<()>;
    async fn detach(&mut self) -> Result<()> {
        Ok(())
    }

    // execution control

    async fn step_over(&mut self) -> Result<()>;
    async fn step_into(&mut self) -> Result<()>;
    async fn step_out(&mut self) -> Result<()>;
    async fn continue_program(&mut self) -> Result<()>;
    async fn run_until(&mut self, _location: &Location) -> Result<()> {
        Ok(())
    }
    async fn switch_to_thread(&mut self, _id: u64) -> Result<()> {
        Ok(())
    }
    async fn switch_to_frame(&mut self, _id: u64) -> Result<()> {
        Ok(())
    }

    // breakpoints

    async fn set_breakpoint(&mut self, location: &Location, temporary: bool) -> Result<()>;
    async fn remove_breakpoint(&mut self, index: u32) -> Result<()>;
    async fn remove_all_breakpoints_on_line(&mut self, location: &Location) -> Result<()>;
    async fn remove_all_breakpoints(&mut self) -> Result<()>;
    async fn set_breakpoint_enabled(&mut self, index: u32, enabled: bool, once: bool)
        -> Result<()>;
    async fn set_breakpoint_condition(
        &mut self,
        _index: u32,
        _condition: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
    async fn set_breakpoint_ignore_count(&mut self, _index: u32, _count: u32) -> Result<()> {
        Ok(())
    }
    async fn watch_expression(&mut self, _expr: &str) -> Result<()> {
        Ok(())
    }
    async fn watch_location(&mut self, _expr: &str) -> Result<()> {
        Ok(())
    }

    // data requests

    async fn request_breakpoints(&mut self) -> Result<()>;
    async fn request_stack(&mut self) -> Result<()>;
    async fn request_threads(&mut self) -> Result<()>;
    async fn set_value(&mut self, _name: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    // session lifecycle

    /// Install a freshly established byte stream after the owner respawned
    /// or re-accepted the backend. No-op for transportless backends.
    fn replace_transport(&mut self, _transport: Box<dyn Transport>) {}

    /// Tear down internal session state after the backend connection was
    /// (or is about to be) replaced. Outstanding commands are cancelled
    /// with failure; nothing survives implicitly.
    async fn restart(&mut self) -> Result<()>;
}
