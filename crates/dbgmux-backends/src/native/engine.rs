//! The engine capability trait
//!
//! The actual debugger API is a black box behind this trait; tests drive a
//! scripted fake. Methods are synchronous and non-blocking: long-running
//! work (the debuggee executing) is reported through the event channel, not
//! by blocking a call.

use dbgmux_core::{Breakpoint, Location, Result, StackFrame};

/// Asynchronous state changes pushed by the engine's callback machinery.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The debuggee launched (or was attached) and is executing.
    Running,
    /// The debuggee stopped; `location` is None when no source position is
    /// available.
    Stopped { location: Option<Location> },
    /// The debuggee exited.
    Exited { status: i32 },
    /// Console output from the debuggee or the engine.
    Output { text: String, is_error: bool },
    /// The engine's breakpoint state moved.
    BreakpointsChanged,
}

pub trait NativeEngine: Send {
    /// Load a program's symbols. Returns the display name on success.
    fn load_program(&mut self, path: &str) -> Result<String>;

    fn run(&mut self, args: &str) -> Result<()>;
    fn interrupt(&mut self) -> Result<()>;
    fn kill(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn step_over(&mut self) -> Result<()>;
    fn step_into(&mut self) -> Result<()>;
    fn step_out(&mut self) -> Result<()>;

    fn set_breakpoint(&mut self, location: &Location, temporary: bool) -> Result<u32>;
    fn remove_breakpoint(&mut self, index: u32) -> Result<()>;
    fn set_breakpoint_enabled(&mut self, index: u32, enabled: bool) -> Result<()>;
    fn set_breakpoint_condition(&mut self, index: u32, condition: Option<&str>) -> Result<()>;
    fn set_breakpoint_ignore_count(&mut self, index: u32, count: u32) -> Result<()>;
    fn list_breakpoints(&mut self) -> Result<Vec<Breakpoint>>;

    fn stack(&mut self) -> Result<Vec<StackFrame>>;
    fn threads(&mut self) -> Result<Vec<(u64, String)>>;
    fn select_thread(&mut self, id: u64) -> Result<()>;
    fn select_frame(&mut self, id: u64) -> Result<()>;

    /// Execute a console command and return its output.
    fn execute(&mut self, command: &str) -> Result<String>;
}
