//! MI link - drives an MI-dialect debugger over a byte stream
//!
//! State tracking mirrors the protocol's quirks: the backend prints a
//! prompt whenever it wants input, interleaves debuggee output with its
//! own, and reports some state changes only as console phrases. Commands
//! are bracketed with echo markers for correlation; a prompt that arrives
//! inside an open bracket is ambiguous and resolved with a ping.

use super::parse::{
    parse_breakpoint_table, parse_current_frame, parse_stack_arguments, parse_stack_frames,
    parse_thread_list,
};
use super::scanner::{Scanner, Token};
use super::{begin_marker, echo_of, end_marker, ready_marker};
use crate::transport::Transport;
use async_trait::async_trait;
use dbgmux_core::{
    DebugEvent, Error, Location, OutputKind, Result, Stack, ThreadKind,
};
use dbgmux_link::{
    BreakpointDirective, BreakpointManager, Command, Dispatcher, EventBus, FeatureSet,
    FileNameCache, FinishResult, FnCommand, DebuggerLink, Disposition, Payload, SendCaps,
    SessionNote,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8192;

/// Everything the MI backend family can do.
const MI_FEATURES: FeatureSet = FeatureSet {
    set_program: true,
    set_args: true,
    set_core: true,
    attach: true,
    run_program: true,
    stop_program: true,
    set_execution_point: true,
    execute_backwards: true,
    show_breakpoint_info: true,
    breakpoint_condition: true,
    breakpoint_ignore_count: true,
    watch_expression: true,
    watch_location: true,
    examine_memory: true,
    disassemble_memory: true,
};

pub struct MiLink {
    transport: Box<dyn Transport>,
    dispatcher: Dispatcher,
    bus: EventBus,
    scanner: Scanner,
    breakpoints: BreakpointManager,
    files: FileNameCache,
    assert_patterns: Vec<String>,

    has_started: bool,
    init_finished: bool,
    symbols_loaded: bool,
    debugger_busy: bool,
    is_debugging: bool,
    is_attached: bool,
    program_stopped: bool,
    first_break: bool,
    printing_output: bool,
    defining_script: bool,
    waiting_to_quit: bool,

    /// Outstanding-resume counter: commands issued while the debuggee runs
    /// owe exactly one `continue` once the queue drains.
    continue_count: u32,
    /// Last ping sent for prompt disambiguation.
    ping_id: u64,
    /// Highest ping echo accepted; stale echoes carry an ID at or below it.
    last_confirmed_ping: u64,

    program_name: Option<String>,
    core_name: Option<String>,
    child_pid: Option<u32>,
}

impl MiLink {
    pub fn new(transport: Box<dyn Transport>, assert_patterns: Vec<String>) -> Self {
        let mut link = Self {
            transport,
            dispatcher: Dispatcher::new(),
            bus: EventBus::new(),
            scanner: Scanner::new(),
            breakpoints: BreakpointManager::new(),
            files: FileNameCache::new(),
            assert_patterns,
            has_started: false,
            init_finished: false,
            symbols_loaded: false,
            debugger_busy: true,
            is_debugging: false,
            is_attached: false,
            program_stopped: true,
            first_break: false,
            printing_output: true,
            defining_script: false,
            waiting_to_quit: false,
            continue_count: 0,
            ping_id: 0,
            last_confirmed_ping: 0,
            program_name: None,
            core_name: None,
            child_pid: None,
        };
        link.init_flags();
        link
    }

    pub fn program_name(&self) -> Option<&str> {
        self.program_name.as_deref()
    }

    /// Preset the program before the backend has started; it is loaded by
    /// the init sequence.
    pub fn preset_program(&mut self, path: impl Into<String>) {
        self.program_name = Some(path.into());
    }

    pub fn file_cache(&mut self) -> &mut FileNameCache {
        &mut self.files
    }

    fn init_flags(&mut self) {
        self.has_started = false;
        self.init_finished = false;
        self.symbols_loaded = false;
        self.debugger_busy = true;
        self.is_debugging = false;
        self.is_attached = false;
        self.program_stopped = true;
        self.first_break = false;
        self.printing_output = true; // print the welcome banner
        self.defining_script = false;
        self.waiting_to_quit = false;
        self.continue_count = 0;
        self.ping_id = 0;
        self.last_confirmed_ping = 0;
        self.child_pid = None;
    }

    // ------------------------------------------------------------------
    // writes
    // ------------------------------------------------------------------

    /// The write choke point: every byte to the backend goes through here.
    async fn write_raw(&mut self, text: &str) -> Result<()> {
        self.transport.write_all(text.as_bytes()).await?;
        self.bus
            .emit(DebugEvent::debug_output(text, OutputKind::Command));
        if !self.debugger_busy {
            self.debugger_busy = true;
            self.bus.emit(DebugEvent::DebuggerBusy);
        }
        Ok(())
    }

    /// Send command text, suspending the debuggee first when it is
    /// running (most commands need the backend's attention).
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.program_is_running() {
            self.interrupt_program().await?;
        }
        let line = if text.ends_with('\n') {
            text.to_string()
        } else {
            format!("{}\n", text)
        };
        self.write_raw(&line).await
    }

    async fn interrupt_program(&mut self) -> Result<()> {
        if self.first_break {
            // the launch-time stop is already on its way
            return Ok(());
        }
        info!("suspending debuggee to deliver commands");
        self.write_raw("interrupt\n").await
    }

    async fn detach_or_kill(&mut self) -> Result<()> {
        if self.is_attached {
            self.send_text("detach").await
        } else if self.child_pid.is_some() {
            self.send_text("kill").await
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // queue advancement
    // ------------------------------------------------------------------

    async fn advance_queue(&mut self) -> Result<()> {
        let caps = SendCaps {
            pipeline: true,
            foreground_ok: self.ok_to_send(false),
            background_ok: self.ok_to_send(true),
        };
        let transmissions = self.dispatcher.next_transmissions(caps);
        for tx in transmissions {
            let Payload::Text(text) = tx.payload else {
                warn!("dropping non-text payload on MI link");
                continue;
            };
            // a command issued while the debuggee runs owes one resume,
            // paid once the queue drains at the final prompt
            if !self.first_break && !self.program_stopped {
                self.continue_count = 1;
            }
            self.send_text(&echo_of(&begin_marker(tx.id, tx.ignore_result)))
                .await?;
            self.write_raw(&ensure_newline(&text)).await?;
            self.write_raw(&echo_of(&end_marker(tx.id, tx.ignore_result)))
                .await?;
        }
        Ok(())
    }

    async fn submit(&mut self, command: Box<dyn Command>) -> Result<()> {
        self.dispatcher.send(command);
        self.advance_queue().await
    }

    fn send_ping(&mut self) -> String {
        self.ping_id = self.ping_id.wrapping_add(1);
        if self.ping_id == 0 {
            self.ping_id = 1;
        }
        echo_of(&ready_marker(self.ping_id))
    }

    // ------------------------------------------------------------------
    // event fan-out
    // ------------------------------------------------------------------

    /// Emit an event, and let the breakpoint manager react to it.
    async fn broadcast(&mut self, event: DebugEvent) -> Result<()> {
        let directives = self.breakpoints.on_event(&event);
        self.bus.emit(event);
        self.apply_directives(directives).await
    }

    async fn apply_directives(&mut self, directives: Vec<BreakpointDirective>) -> Result<()> {
        for directive in directives {
            match directive {
                BreakpointDirective::FetchList => self.request_breakpoints().await?,
                BreakpointDirective::Set {
                    location,
                    temporary,
                } => self.set_breakpoint(&location, temporary).await?,
                BreakpointDirective::SetEnabled {
                    index,
                    enabled,
                    once,
                } => self.set_breakpoint_enabled(index, enabled, once).await?,
                BreakpointDirective::SetCondition { index, condition } => {
                    self.set_breakpoint_condition(index, Some(&condition))
                        .await?
                }
                BreakpointDirective::SetIgnoreCount { index, count } => {
                    self.set_breakpoint_ignore_count(index, count).await?
                }
            }
        }
        Ok(())
    }

    async fn process_finish(&mut self, result: FinishResult) -> Result<()> {
        for event in result.events {
            self.broadcast(event).await?;
        }
        for note in result.notes {
            self.handle_note(note).await?;
        }
        Ok(())
    }

    async fn handle_note(&mut self, note: SessionNote) -> Result<()> {
        match note {
            SessionNote::ProgramName(name) => {
                self.program_name = name.clone();
                let program_name = name
                    .as_deref()
                    .and_then(|n| n.rsplit('/').next())
                    .unwrap_or("")
                    .to_string();
                self.broadcast(DebugEvent::SymbolsLoaded {
                    success: name.is_some(),
                    program_name,
                })
                .await?;
            }
            SessionNote::CoreName(name) => {
                self.core_name = name.clone();
                if name.is_some() {
                    self.is_debugging = false;
                    self.broadcast(DebugEvent::CoreLoaded).await?;
                } else {
                    self.broadcast(DebugEvent::CoreCleared).await?;
                }
            }
            SessionNote::StopLocation(location) => {
                self.program_stopped_at(Some(location)).await?;
            }
            SessionNote::StopLocationRefined(location) => {
                self.broadcast(DebugEvent::ProgramStopped2 { location }).await?;
            }
            SessionNote::BreakpointList(breakpoints, other) => {
                let directives = self.breakpoints.update_list(breakpoints, other);
                self.apply_directives(directives).await?;
                self.bus.emit(DebugEvent::BreakpointListUpdated);
            }
            SessionNote::Stack(stack, selected) => {
                self.bus.emit(DebugEvent::StackLoaded { stack, selected });
            }
            SessionNote::ThreadList(_) => {
                self.bus.emit(DebugEvent::ThreadListChanged);
            }
            other => {
                debug!(?other, "note not applicable to MI link");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // token handling
    // ------------------------------------------------------------------

    async fn handle_token(&mut self, token: Token) -> Result<()> {
        // nothing can be sent until the backend has printed something
        if !self.has_started {
            self.init_debugger().await?;
        }

        let was_stopped = self.program_stopped;

        if let Token::ReadyForInput { ping_id } = token {
            // Discard stale ping echoes: anything below the latest ping
            // sent, or at or below the last echo already confirmed.
            if ping_id > 0 {
                if ping_id < self.ping_id || ping_id <= self.last_confirmed_ping {
                    return Ok(());
                }
                self.last_confirmed_ping = ping_id;
            }

            self.program_stopped = true;
            self.defining_script = false;
            self.printing_output = true;
            self.debugger_busy = false;
            self.bus.emit(DebugEvent::DebuggerReadyForInput);
            self.advance_queue().await?;

            // If we stopped the program to send commands, continue once
            // everything settles down.
            if self.continue_count > 0 && !self.dispatcher.has_foreground_commands() {
                self.continue_count -= 1;
                if self.continue_count == 0 {
                    self.send_text("continue").await?;
                }
            } else if self.is_debugging && !was_stopped {
                // no source for the stop site: no stop token will follow
                self.program_stopped_at(None).await?;
            }
            return Ok(());
        }

        if !self.debugger_busy {
            self.debugger_busy = true;
            self.bus.emit(DebugEvent::DebuggerBusy);
        }

        match token {
            Token::ReadyForInput { .. } => unreachable!("handled above"),

            Token::MaybeReadyForInput => {
                let ping = self.send_ping();
                self.write_raw(&ping).await?;
            }

            Token::ProgramOutput(text) => {
                if self.printing_output && !text.is_empty() {
                    // debugger and debuggee output are indistinguishable here
                    self.bus.emit(DebugEvent::UserOutput {
                        text,
                        is_error: false,
                        from_target: false,
                    });
                }
            }
            Token::ErrorOutput(text) => {
                if self.printing_output {
                    self.bus.emit(DebugEvent::UserOutput {
                        text,
                        is_error: true,
                        from_target: false,
                    });
                }
            }

            Token::BeginCommand { id, .. } => {
                self.dispatcher.handle_command_running(id);
                self.printing_output = false;
            }
            Token::CommandOutput(text) => {
                self.dispatcher.accumulate(&text);
            }
            Token::CommandResult(text) => {
                self.dispatcher.save_result(&text);
            }
            Token::EndCommand { .. } => {
                if self.dispatcher.has_running_command() {
                    let failed = command_failed(&self.dispatcher);
                    let result = self.dispatcher.finish_running(!failed);
                    self.process_finish(result).await?;
                    if !self.dispatcher.has_foreground_commands() {
                        self.advance_queue().await?;
                    }
                }
                self.printing_output = true;
            }

            Token::BreakpointsChanged => {
                if !self.first_break {
                    // ignore the launch-time temporary breakpoint
                    self.broadcast(DebugEvent::BreakpointsChanged).await?;
                }
            }
            Token::FrameChanged => self.broadcast(DebugEvent::FrameChanged).await?,
            Token::ThreadChanged => self.broadcast(DebugEvent::ThreadChanged).await?,
            Token::ValueChanged => self.broadcast(DebugEvent::ValueChanged).await?,

            Token::PrepareToLoadSymbols => {
                self.is_debugging = false;
                self.symbols_loaded = false;
                self.program_name = None;
                self.files.clear();
                self.broadcast(DebugEvent::PrepareToLoadSymbols).await?;
            }
            Token::SymbolsLoaded { program } => {
                self.symbols_loaded = true;
                self.handle_note(SessionNote::ProgramName(program)).await?;
            }
            Token::NoSymbols { text } => {
                if !self.is_attached {
                    self.bus.emit(DebugEvent::UserOutput {
                        text,
                        is_error: true,
                        from_target: false,
                    });
                    self.broadcast(DebugEvent::SymbolsLoaded {
                        success: false,
                        program_name: String::new(),
                    })
                    .await?;
                }
            }
            Token::SymbolsReloaded => {
                self.broadcast(DebugEvent::PrepareToLoadSymbols).await?;
                self.broadcast(DebugEvent::SymbolsReloaded).await?;
            }
            Token::CoreChanged => {
                self.handle_note(SessionNote::CoreName(Some(String::new())))
                    .await?;
            }

            Token::AttachedToProcess { pid } => {
                self.is_attached = true;
                self.is_debugging = true;
                self.child_pid = Some(pid);
                self.broadcast(DebugEvent::AttachedToProcess).await?;
            }
            Token::DetachingFromProcess => {
                self.program_finished().await?;
            }

            Token::ProgramStarting => {
                self.is_debugging = true;
                self.program_stopped = false;
                self.first_break = true;
                self.printing_output = false; // swallow launch chatter
            }
            Token::ProgramPid(pid) => {
                if pid != 0 {
                    self.child_pid = Some(pid);
                    info!(pid, "program started");
                }
            }
            Token::ProgramRunning => {
                self.program_stopped = false;
                let result = self.dispatcher.cancel_background_commands();
                self.process_finish(result).await?;
                self.broadcast(DebugEvent::ProgramRunning).await?;
            }
            Token::ProgramStopped { location, text } => {
                self.program_stopped = true;
                if let Some(text) = text {
                    self.bus.emit(DebugEvent::user_output(text, false));
                }
                match location {
                    Some(location) => self.program_stopped_at(Some(location)).await?,
                    None => self.request_stop_location().await?,
                }
            }
            Token::ProgramFinished { text } => {
                self.program_finished().await?;
                if let Some(text) = text {
                    self.bus.emit(DebugEvent::user_output(text, false));
                }
            }
            Token::ProgramKilled => {
                self.program_finished().await?;
            }

            Token::BeginScriptDefinition => {
                self.defining_script = true;
                self.bus.emit(DebugEvent::DebuggerDefiningScript);
            }
            Token::PlugInMessage(text) => {
                self.bus.emit(DebugEvent::PlugInMessage { text });
            }
            Token::DebuggerFinished => {
                self.waiting_to_quit = true;
            }
        }
        Ok(())
    }

    async fn init_debugger(&mut self) -> Result<()> {
        // sent after the first output so the backend is definitely alive
        self.send_text("set width 0\nset height 0\nset confirm off\nset mi-async on")
            .await?;

        self.has_started = true;
        self.broadcast(DebugEvent::DebuggerStarted).await?;

        if let Some(program) = self.program_name.clone() {
            self.set_program(&program).await?;
        }
        if let Some(core) = self.core_name.clone() {
            self.set_core(&core).await?;
        }
        self.init_finished = true;
        Ok(())
    }

    /// The full stop protocol, including launch-time first-break handling.
    async fn program_stopped_at(&mut self, location: Option<Location>) -> Result<()> {
        if self.first_break {
            self.first_break = false;
            self.printing_output = true;
            self.broadcast(DebugEvent::ProgramFirstStop).await?;

            let at_user_breakpoint = location
                .as_ref()
                .map(|loc| self.breakpoints.has_breakpoint_at(loc))
                .unwrap_or(false);
            if at_user_breakpoint {
                if self.continue_count == 0 {
                    self.stopped_for_user(location).await?;
                }
            } else {
                self.send_text("continue").await?;
            }
        } else if self.continue_count == 0 {
            self.stopped_for_user(location).await?;
        }
        Ok(())
    }

    async fn stopped_for_user(&mut self, location: Option<Location>) -> Result<()> {
        let refine = location.is_some();
        self.broadcast(DebugEvent::ProgramStopped { location }).await?;
        if refine {
            self.request_refined_stop_location().await?;
        }
        self.advance_queue().await
    }

    async fn request_stop_location(&mut self) -> Result<()> {
        let cmd = FnCommand::new(Payload::text("-stack-info-frame"), |success, out, ctx| {
            if success {
                if let Some(location) = parse_current_frame(&out.results) {
                    ctx.notes.push(SessionNote::StopLocation(location));
                }
            }
            Disposition::Dispose
        })
        .with_ignored_result();
        self.submit(Box::new(cmd)).await
    }

    async fn request_refined_stop_location(&mut self) -> Result<()> {
        let cmd = FnCommand::new(Payload::text("-stack-info-frame"), |success, out, ctx| {
            if success {
                if let Some(location) = parse_current_frame(&out.results) {
                    ctx.notes.push(SessionNote::StopLocationRefined(location));
                }
            }
            Disposition::Dispose
        })
        .with_ignored_result();
        self.submit(Box::new(cmd)).await
    }

    async fn program_finished(&mut self) -> Result<()> {
        self.child_pid = None;
        if self.is_attached {
            self.is_attached = false;
            self.broadcast(DebugEvent::DetachedFromProcess).await?;
        }
        if self.is_debugging {
            self.is_debugging = false;
            self.broadcast(DebugEvent::ProgramFinished).await?;
        }
        Ok(())
    }

    async fn handle_backend_closed(&mut self) -> Result<()> {
        warn!("backend closed the stream");
        let symbols_were_loaded = self.symbols_loaded;
        let expected = self.waiting_to_quit;

        let result = self.dispatcher.cancel_all_commands();
        for event in result.events {
            // directives are unusable with a dead stream
            let _ = self.breakpoints.on_event(&event);
            self.bus.emit(event);
        }

        self.scanner.reset();
        self.init_flags();
        if !expected {
            self.bus.emit(DebugEvent::user_output(
                "Debugger connection lost; restart required\n",
                true,
            ));
        }
        if symbols_were_loaded {
            let _ = self.breakpoints.on_event(&DebugEvent::DebuggerRestarted);
            self.bus.emit(DebugEvent::DebuggerRestarted);
        }
        Err(Error::Transport("backend closed the stream".to_string()))
    }
}

fn ensure_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    }
}

/// A command whose saved results carry an `error` record failed even though
/// its output stream terminated normally.
fn command_failed(dispatcher: &Dispatcher) -> bool {
    dispatcher
        .running_output()
        .map(|out| out.results.iter().any(|r| r.starts_with("error")))
        .unwrap_or(false)
}

#[async_trait]
impl DebuggerLink for MiLink {
    fn features(&self) -> &FeatureSet {
        &MI_FEATURES
    }

    fn debugger_has_started(&self) -> bool {
        self.has_started
    }

    fn has_loaded_symbols(&self) -> bool {
        self.symbols_loaded
    }

    fn is_debugging(&self) -> bool {
        self.is_debugging
    }

    fn program_is_running(&self) -> bool {
        self.is_debugging && !self.program_stopped
    }

    fn program_is_stopped(&self) -> bool {
        self.is_debugging && self.program_stopped
    }

    fn ok_to_send(&self, _background: bool) -> bool {
        self.continue_count == 0
    }

    fn supports_pipelining(&self) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.bus.subscribe()
    }

    fn breakpoint_manager(&mut self) -> &mut BreakpointManager {
        &mut self.breakpoints
    }

    async fn apply_breakpoint_directives(
        &mut self,
        directives: Vec<BreakpointDirective>,
    ) -> Result<()> {
        self.apply_directives(directives).await
    }

    async fn process_available(&mut self) -> Result<()> {
        let mut buf = vec![0u8; READ_CHUNK];
        let n = self.transport.read(&mut buf).await?;
        if n == 0 {
            return self.handle_backend_closed().await;
        }

        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
        self.bus
            .emit(DebugEvent::debug_output(&text, OutputKind::Output));
        self.scanner.append_input(&text);

        while let Some(token) = self.scanner.next_token() {
            self.handle_token(token).await?;
        }
        Ok(())
    }

    async fn send_command(&mut self, command: Box<dyn Command>) -> Result<bool> {
        self.submit(command).await?;
        Ok(true)
    }

    async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.write_raw(text).await
    }

    async fn set_program(&mut self, path: &str) -> Result<()> {
        if self.has_started {
            if self.init_finished && self.program_name.as_deref() != Some(path) {
                self.send_text("delete").await?;
            }
            self.detach_or_kill().await?;
            self.send_text("core-file").await?;
            self.send_text(&format!("file {}", path)).await?;
        }
        self.program_name = Some(path.to_string());
        Ok(())
    }

    async fn set_core(&mut self, path: &str) -> Result<()> {
        if self.has_started {
            self.detach_or_kill().await?;
            self.send_text(&format!("core-file {}", path)).await?;
        }
        self.core_name = Some(path.to_string());
        Ok(())
    }

    async fn attach_to_process(&mut self, pid: u32) -> Result<()> {
        self.send_text("core-file").await?;
        self.detach_or_kill().await?;
        self.send_text(&format!("attach {}", pid)).await
    }

    async fn run_program(&mut self, args: &str) -> Result<()> {
        self.send_text("core-file").await?;
        self.detach_or_kill().await?;
        self.send_text(&format!("set args {}", args)).await?;
        self.send_text("run").await
    }

    async fn stop_program(&mut self) -> Result<()> {
        self.interrupt_program().await
    }

    async fn kill_program(&mut self) -> Result<()> {
        self.send_text("kill").await
    }

    async fn detach(&mut self) -> Result<()> {
        self.send_text("detach").await
    }

    async fn step_over(&mut self) -> Result<()> {
        self.send_text("next").await
    }

    async fn step_into(&mut self) -> Result<()> {
        self.send_text("step").await
    }

    async fn step_out(&mut self) -> Result<()> {
        self.send_text("finish").await
    }

    async fn continue_program(&mut self) -> Result<()> {
        self.send_text("continue").await
    }

    async fn run_until(&mut self, location: &Location) -> Result<()> {
        if self.program_is_stopped() {
            self.send_text(&format!("until {}", location)).await?;
        }
        Ok(())
    }

    async fn switch_to_thread(&mut self, id: u64) -> Result<()> {
        if self.program_is_stopped() || self.core_name.is_some() {
            self.printing_output = false;
            self.send_text(&format!("thread {}", id)).await?;
        }
        Ok(())
    }

    async fn switch_to_frame(&mut self, id: u64) -> Result<()> {
        if self.program_is_stopped() || self.core_name.is_some() {
            self.printing_output = false;
            self.send_text(&format!("frame {}", id)).await?;
        }
        Ok(())
    }

    async fn set_breakpoint(&mut self, location: &Location, temporary: bool) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        let target = match location {
            Location::Line { file, line } => format!("{}:{}", file.display_name(), line),
            Location::Address(addr) => format!("*{}", addr),
            Location::Function(name) => name.clone(),
        };
        let cmd = format!(
            "echo \\032\\032:dbgmux breakpoints changed:\\n\n{} {}",
            if temporary {
                "-break-insert -t"
            } else {
                "-break-insert"
            },
            target
        );
        self.send_text(&cmd).await
    }

    async fn remove_breakpoint(&mut self, index: u32) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        self.send_text(&format!("delete {}", index)).await
    }

    async fn remove_all_breakpoints_on_line(&mut self, location: &Location) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        self.send_text(&format!("clear {}", location)).await
    }

    async fn remove_all_breakpoints(&mut self) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        self.send_text("delete").await
    }

    async fn set_breakpoint_enabled(
        &mut self,
        index: u32,
        enabled: bool,
        once: bool,
    ) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        let cmd = match (enabled, once) {
            (true, true) => format!("enable once {}", index),
            (true, false) => format!("enable {}", index),
            (false, _) => format!("disable {}", index),
        };
        self.send_text(&cmd).await
    }

    async fn set_breakpoint_condition(
        &mut self,
        index: u32,
        condition: Option<&str>,
    ) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        let cmd = match condition {
            Some(expr) => format!("condition {} {}", index, expr),
            None => format!("condition {}", index),
        };
        self.send_text(&cmd).await
    }

    async fn set_breakpoint_ignore_count(&mut self, index: u32, count: u32) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        self.send_text(&format!("ignore {} {}", index, count)).await
    }

    async fn watch_expression(&mut self, expr: &str) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        self.send_text(&format!("watch {}", expr)).await
    }

    async fn watch_location(&mut self, expr: &str) -> Result<()> {
        if !self.program_stopped {
            self.continue_count = 2;
        }
        self.send_text(&format!("watch -location {}", expr)).await
    }

    async fn request_breakpoints(&mut self) -> Result<()> {
        let cmd = FnCommand::new(Payload::text("-break-list"), |success, out, ctx| {
            if success {
                let (breakpoints, other) = parse_breakpoint_table(&out.results);
                ctx.notes
                    .push(SessionNote::BreakpointList(breakpoints, other));
            }
            Disposition::Dispose
        })
        .with_ignored_result();
        self.submit(Box::new(cmd)).await
    }

    async fn request_stack(&mut self) -> Result<()> {
        let patterns = self.assert_patterns.clone();
        let cmd = FnCommand::new(
            Payload::text("-stack-list-frames"),
            move |success, out, ctx| {
                if success {
                    let mut stack = Stack::new();
                    stack.set_frames(parse_stack_frames(&out.results));
                    let patterns = patterns.clone();
                    let mut slot = Some(stack);
                    ctx.followups.push(Box::new(
                        FnCommand::new(
                            Payload::text("-stack-list-arguments 1"),
                            move |success, out, ctx| {
                                if let Some(mut stack) = slot.take() {
                                    if success {
                                        for (index, args) in parse_stack_arguments(&out.results) {
                                            stack.attach_arguments(index, args);
                                        }
                                    }
                                    let selected = stack.initial_selection(&patterns);
                                    ctx.notes.push(SessionNote::Stack(stack, selected));
                                }
                                Disposition::Dispose
                            },
                        )
                        .with_ignored_result(),
                    ));
                }
                Disposition::Dispose
            },
        )
        .with_ignored_result();
        self.submit(Box::new(cmd)).await
    }

    async fn request_threads(&mut self) -> Result<()> {
        let cmd = FnCommand::new(Payload::text("-thread-info"), |success, out, ctx| {
            if success {
                let threads = parse_thread_list(&out.results)
                    .into_iter()
                    .map(|(id, name)| (id, ThreadKind::Thread, name))
                    .collect();
                ctx.notes.push(SessionNote::ThreadList(threads));
            }
            Disposition::Dispose
        })
        .with_ignored_result();
        self.submit(Box::new(cmd)).await
    }

    async fn set_value(&mut self, name: &str, value: &str) -> Result<()> {
        if self.program_is_stopped() {
            self.send_text(&format!("set variable {} = {}", name, value))
                .await?;
            // "set variable" does not trip the change hook; broadcast by hand
            self.broadcast(DebugEvent::ValueChanged).await?;
        }
        Ok(())
    }

    fn replace_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
    }

    async fn restart(&mut self) -> Result<()> {
        let symbols_were_loaded = self.symbols_loaded;

        let result = self.dispatcher.cancel_all_commands();
        for event in result.events {
            let _ = self.breakpoints.on_event(&event);
            self.bus.emit(event);
        }

        self.scanner.reset();
        self.init_flags();

        if symbols_were_loaded {
            self.broadcast(DebugEvent::DebuggerRestarted).await?;
        }
        Ok(())
    }
}
