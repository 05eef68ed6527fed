//! Native link - the dispatcher wrapped around an in-process engine
//!
//! Single-flight: the engine executes one command at a time and the result
//! is available before the transmit call returns. The queue-advance loop
//! therefore drains synchronously until the queues gate or empty.

use super::engine::{EngineEvent, NativeEngine};
use async_trait::async_trait;
use dbgmux_core::{DebugEvent, Location, Result, Stack};
use dbgmux_link::{
    BreakpointDirective, BreakpointManager, Command, DebuggerLink, Dispatcher, EventBus,
    FeatureSet, FileNameCache, FinishResult, Payload, SendCaps,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

const NATIVE_FEATURES: FeatureSet = FeatureSet {
    set_program: true,
    set_args: true,
    set_core: true,
    attach: true,
    run_program: true,
    stop_program: true,
    set_execution_point: false,
    execute_backwards: false,
    show_breakpoint_info: true,
    breakpoint_condition: true,
    breakpoint_ignore_count: true,
    watch_expression: true,
    watch_location: true,
    examine_memory: true,
    disassemble_memory: true,
};

pub struct NativeLink {
    engine: Box<dyn NativeEngine>,
    events: mpsc::Receiver<EngineEvent>,
    dispatcher: Dispatcher,
    bus: EventBus,
    breakpoints: BreakpointManager,
    files: FileNameCache,
    assert_patterns: Vec<String>,

    symbols_loaded: bool,
    is_debugging: bool,
    program_stopped: bool,
    program_name: Option<String>,
}

impl NativeLink {
    pub fn new(
        engine: Box<dyn NativeEngine>,
        events: mpsc::Receiver<EngineEvent>,
        assert_patterns: Vec<String>,
    ) -> Self {
        Self {
            engine,
            events,
            dispatcher: Dispatcher::new(),
            bus: EventBus::new(),
            breakpoints: BreakpointManager::new(),
            files: FileNameCache::new(),
            assert_patterns,
            symbols_loaded: false,
            is_debugging: false,
            program_stopped: true,
            program_name: None,
        }
    }

    pub fn file_cache(&mut self) -> &mut FileNameCache {
        &mut self.files
    }

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
                BreakpointDirective::SetEnabled { index, enabled, .. } => {
                    self.set_breakpoint_enabled(index, enabled, false).await?
                }
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
            debug!(?note, "note not applicable to native link");
        }
        Ok(())
    }

    /// Drain the queues. Commands complete synchronously, so the loop keeps
    /// going until nothing is eligible.
    async fn advance_queue(&mut self) -> Result<()> {
        loop {
            let caps = SendCaps::single_flight(self.ok_to_send(false), self.ok_to_send(true));
            let transmissions = self.dispatcher.next_transmissions(caps);
            if transmissions.is_empty() {
                return Ok(());
            }
            for tx in transmissions {
                self.execute_transmission(tx.id, tx.payload).await?;
            }
        }
    }

    async fn execute_transmission(&mut self, id: u64, payload: Payload) -> Result<()> {
        let Payload::Text(text) = payload else {
            warn!("dropping binary payload on native link");
            return Ok(());
        };
        self.dispatcher.handle_command_running(id);

        // structured requests call the engine API; anything else is console
        // input for the engine's interpreter
        let success = match text.as_str() {
            "@breakpoints" => match self.engine.list_breakpoints() {
                Ok(list) => {
                    let directives = self.breakpoints.update_list(list, Vec::new());
                    self.apply_directives(directives).await?;
                    self.bus.emit(DebugEvent::BreakpointListUpdated);
                    true
                }
                Err(err) => {
                    debug!(%err, "breakpoint list unavailable");
                    false
                }
            },
            "@stack" => match self.engine.stack() {
                Ok(frames) => {
                    let mut stack = Stack::new();
                    stack.set_frames(frames);
                    let selected = stack.initial_selection(&self.assert_patterns);
                    self.bus.emit(DebugEvent::StackLoaded { stack, selected });
                    true
                }
                Err(err) => {
                    debug!(%err, "stack unavailable");
                    false
                }
            },
            "@threads" => match self.engine.threads() {
                Ok(_) => {
                    self.bus.emit(DebugEvent::ThreadListChanged);
                    true
                }
                Err(err) => {
                    debug!(%err, "threads unavailable");
                    false
                }
            },
            command => match self.engine.execute(command) {
                Ok(output) => {
                    self.dispatcher.accumulate(&output);
                    true
                }
                Err(err) => {
                    self.dispatcher.accumulate(&err.to_string());
                    false
                }
            },
        };

        let result = self.dispatcher.finish_running(success);
        self.process_finish(result).await
    }

    async fn submit(&mut self, command: Box<dyn Command>) -> Result<()> {
        self.dispatcher.send(command);
        self.advance_queue().await
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Running => {
                self.is_debugging = true;
                self.program_stopped = false;
                let result = self.dispatcher.cancel_background_commands();
                self.process_finish(result).await?;
                self.broadcast(DebugEvent::ProgramRunning).await?;
            }
            EngineEvent::Stopped { location } => {
                self.program_stopped = true;
                self.broadcast(DebugEvent::ProgramStopped { location }).await?;
                self.advance_queue().await?;
            }
            EngineEvent::Exited { status } => {
                self.is_debugging = false;
                self.program_stopped = true;
                self.bus.emit(DebugEvent::user_output(
                    format!("Program exited with status {}\n", status),
                    false,
                ));
                self.broadcast(DebugEvent::ProgramFinished).await?;
            }
            EngineEvent::Output { text, is_error } => {
                self.bus.emit(DebugEvent::UserOutput {
                    text,
                    is_error,
                    from_target: true,
                });
            }
            EngineEvent::BreakpointsChanged => {
                self.broadcast(DebugEvent::BreakpointsChanged).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DebuggerLink for NativeLink {
    fn features(&self) -> &FeatureSet {
        &NATIVE_FEATURES
    }

    fn debugger_has_started(&self) -> bool {
        true // the engine is in-process; it exists as soon as we do
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
        true // API calls are legal whatever the debuggee is doing
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
        // the event channel is the only suspension point
        let Some(event) = self.events.recv().await else {
            return Err(dbgmux_core::Error::Transport(
                "engine event channel closed".to_string(),
            ));
        };
        self.handle_engine_event(event).await?;
        // drain whatever else is already queued
        while let Ok(event) = self.events.try_recv() {
            self.handle_engine_event(event).await?;
        }
        Ok(())
    }

    async fn send_command(&mut self, command: Box<dyn Command>) -> Result<bool> {
        self.submit(command).await?;
        Ok(true)
    }

    async fn send_raw(&mut self, text: &str) -> Result<()> {
        let output = self.engine.execute(text)?;
        if !output.is_empty() {
            self.bus.emit(DebugEvent::user_output(output, false));
        }
        Ok(())
    }

    async fn set_program(&mut self, path: &str) -> Result<()> {
        self.broadcast(DebugEvent::PrepareToLoadSymbols).await?;
        self.files.clear();
        match self.engine.load_program(path) {
            Ok(name) => {
                self.symbols_loaded = true;
                self.program_name = Some(path.to_string());
                self.broadcast(DebugEvent::SymbolsLoaded {
                    success: true,
                    program_name: name,
                })
                .await
            }
            Err(err) => {
                self.bus
                    .emit(DebugEvent::user_output(err.to_string(), true));
                self.broadcast(DebugEvent::SymbolsLoaded {
                    success: false,
                    program_name: String::new(),
                })
                .await
            }
        }
    }

    async fn run_program(&mut self, args: &str) -> Result<()> {
        self.engine.run(args)
    }

    async fn stop_program(&mut self) -> Result<()> {
        self.engine.interrupt()
    }

    async fn kill_program(&mut self) -> Result<()> {
        self.engine.kill()
    }

    async fn step_over(&mut self) -> Result<()> {
        self.engine.step_over()
    }

    async fn step_into(&mut self) -> Result<()> {
        self.engine.step_into()
    }

    async fn step_out(&mut self) -> Result<()> {
        self.engine.step_out()
    }

    async fn continue_program(&mut self) -> Result<()> {
        self.engine.resume()
    }

    async fn switch_to_thread(&mut self, id: u64) -> Result<()> {
        self.engine.select_thread(id)?;
        self.broadcast(DebugEvent::ThreadChanged).await
    }

    async fn switch_to_frame(&mut self, id: u64) -> Result<()> {
        self.engine.select_frame(id)?;
        self.broadcast(DebugEvent::FrameChanged).await
    }

    async fn set_breakpoint(&mut self, location: &Location, temporary: bool) -> Result<()> {
        match self.engine.set_breakpoint(location, temporary) {
            Ok(index) => {
                debug!(index, %location, "breakpoint set");
                self.broadcast(DebugEvent::BreakpointsChanged).await
            }
            Err(err) => {
                self.bus
                    .emit(DebugEvent::user_output(err.to_string(), true));
                Ok(())
            }
        }
    }

    async fn remove_breakpoint(&mut self, index: u32) -> Result<()> {
        self.engine.remove_breakpoint(index)?;
        self.broadcast(DebugEvent::BreakpointsChanged).await
    }

    async fn remove_all_breakpoints_on_line(&mut self, location: &Location) -> Result<()> {
        let doomed: Vec<u32> = self
            .breakpoints
            .breakpoints_at(location)
            .iter()
            .map(|bp| bp.debugger_index)
            .collect();
        for index in doomed {
            self.engine.remove_breakpoint(index)?;
        }
        self.broadcast(DebugEvent::BreakpointsChanged).await
    }

    async fn remove_all_breakpoints(&mut self) -> Result<()> {
        let doomed: Vec<u32> = self
            .breakpoints
            .breakpoints()
            .iter()
            .map(|bp| bp.debugger_index)
            .collect();
        for index in doomed {
            self.engine.remove_breakpoint(index)?;
        }
        self.broadcast(DebugEvent::BreakpointsChanged).await
    }

    async fn set_breakpoint_enabled(
        &mut self,
        index: u32,
        enabled: bool,
        _once: bool,
    ) -> Result<()> {
        self.engine.set_breakpoint_enabled(index, enabled)?;
        self.broadcast(DebugEvent::BreakpointsChanged).await
    }

    async fn set_breakpoint_condition(
        &mut self,
        index: u32,
        condition: Option<&str>,
    ) -> Result<()> {
        self.engine.set_breakpoint_condition(index, condition)?;
        self.broadcast(DebugEvent::BreakpointsChanged).await
    }

    async fn set_breakpoint_ignore_count(&mut self, index: u32, count: u32) -> Result<()> {
        self.engine.set_breakpoint_ignore_count(index, count)?;
        self.broadcast(DebugEvent::BreakpointsChanged).await
    }

    async fn request_breakpoints(&mut self) -> Result<()> {
        self.submit(dbgmux_link::command::simple(Payload::text("@breakpoints")))
            .await
    }

    async fn request_stack(&mut self) -> Result<()> {
        self.submit(dbgmux_link::command::simple(Payload::text("@stack")))
            .await
    }

    async fn request_threads(&mut self) -> Result<()> {
        self.submit(dbgmux_link::command::simple(Payload::text("@threads")))
            .await
    }

    async fn set_value(&mut self, name: &str, value: &str) -> Result<()> {
        self.engine.execute(&format!("expr {} = {}", name, value))?;
        self.broadcast(DebugEvent::ValueChanged).await
    }

    async fn restart(&mut self) -> Result<()> {
        let symbols_were_loaded = self.symbols_loaded;

        let result = self.dispatcher.cancel_all_commands();
        for event in result.events {
            let _ = self.breakpoints.on_event(&event);
            self.bus.emit(event);
        }

        self.symbols_loaded = false;
        self.is_debugging = false;
        self.program_stopped = true;
        self.files.clear();

        if symbols_were_loaded {
            self.broadcast(DebugEvent::DebuggerRestarted).await?;
            if let Some(program) = self.program_name.clone() {
                self.set_program(&program).await?;
            }
        }
        Ok(())
    }
}
