//! Script-engine link - one XML document per message
//!
//! The engine connects to us when the script starts, announces itself with
//! an `init` document, and then answers one reply per request, correlated
//! by the `transaction_id` we append to every command. Commands are
//! written as soon as they are queued; the engine works through them in
//! order and the IDs keep the replies unambiguous.

use super::document::{parse_document, XdDocument};
use super::{path_to_uri, uri_to_path};
use crate::transport::Transport;
use async_trait::async_trait;
use dbgmux_core::{
    DebugEvent, Error, Location, OutputKind, Result, Stack, StackFrame,
};
use dbgmux_link::{
    BreakpointDirective, BreakpointManager, Command, DebuggerLink, Dispatcher, Disposition,
    EventBus, FeatureSet, FileNameCache, FinishResult, FnCommand, Payload, SendCaps, SessionNote,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8192;

const XDEBUG_FEATURES: FeatureSet = FeatureSet {
    set_program: true,
    set_args: false,
    set_core: false,
    attach: false,
    run_program: true,
    stop_program: false,
    set_execution_point: false,
    execute_backwards: false,
    show_breakpoint_info: true,
    breakpoint_condition: false,
    breakpoint_ignore_count: false,
    watch_expression: false,
    watch_location: false,
    examine_memory: false,
    disassemble_memory: false,
};

pub struct XdLink {
    transport: Box<dyn Transport>,
    dispatcher: Dispatcher,
    bus: EventBus,
    breakpoints: BreakpointManager,
    files: FileNameCache,

    /// Transport-level accumulation; messages are NUL/SOH-delimited.
    buffer: Vec<u8>,

    init_finished: bool,
    is_debugging: bool,
    program_stopped: bool,
    debugger_busy: bool,

    ide_key: Option<String>,
    script_uri: Option<String>,
    program_name: Option<String>,
    /// Directories the script's sources live under, from the project
    /// configuration; consulted when the engine reports a bare file name.
    source_paths: Vec<std::path::PathBuf>,
}

impl XdLink {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            dispatcher: Dispatcher::new(),
            bus: EventBus::new(),
            breakpoints: BreakpointManager::new(),
            files: FileNameCache::new(),
            buffer: Vec::new(),
            init_finished: false,
            is_debugging: false,
            program_stopped: true,
            debugger_busy: true,
            ide_key: None,
            script_uri: None,
            program_name: None,
            source_paths: Vec::new(),
        }
    }

    pub fn set_source_paths(&mut self, paths: Vec<std::path::PathBuf>) {
        self.source_paths = paths;
    }

    /// Resolve an engine-reported file name to an absolute path, consulting
    /// the session cache first and the configured source paths after.
    /// Negative answers are cached too.
    pub fn resolve_source(&mut self, name: &str) -> Option<std::path::PathBuf> {
        if let Some((exists, full)) = self.files.find_file(name) {
            return if exists { full } else { None };
        }
        for dir in &self.source_paths {
            let candidate = dir.join(name);
            if candidate.is_file() {
                self.files.remember_file(name, Some(candidate.clone()));
                return Some(candidate);
            }
        }
        self.files.remember_file(name, None);
        None
    }

    pub fn ide_key(&self) -> Option<&str> {
        self.ide_key.as_deref()
    }

    pub fn file_cache(&mut self) -> &mut FileNameCache {
        &mut self.files
    }

    async fn advance_queue(&mut self) -> Result<()> {
        let caps = SendCaps {
            pipeline: true,
            foreground_ok: true,
            background_ok: true,
        };
        let transmissions = self.dispatcher.next_transmissions(caps);
        for tx in transmissions {
            let Payload::Text(text) = tx.payload else {
                warn!("dropping binary payload on XML link");
                continue;
            };
            // native correlation: the reply echoes this transaction id
            let wire = format!("{} -i {}\0", text, tx.id);
            self.transport.write_all(wire.as_bytes()).await?;
            self.bus
                .emit(DebugEvent::debug_output(&wire[..wire.len() - 1], OutputKind::Command));
            if !self.debugger_busy {
                self.debugger_busy = true;
                self.bus.emit(DebugEvent::DebuggerBusy);
            }
        }
        Ok(())
    }

    async fn submit(&mut self, command: Box<dyn Command>) -> Result<()> {
        self.dispatcher.send(command);
        self.advance_queue().await
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
                BreakpointDirective::SetEnabled {
                    index,
                    enabled,
                    once,
                } => self.set_breakpoint_enabled(index, enabled, once).await?,
                BreakpointDirective::SetCondition { .. }
                | BreakpointDirective::SetIgnoreCount { .. } => {
                    // not expressible on this wire
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
            SessionNote::BreakpointList(breakpoints, other) => {
                let directives = self.breakpoints.update_list(breakpoints, other);
                self.apply_directives(directives).await?;
                self.bus.emit(DebugEvent::BreakpointListUpdated);
            }
            SessionNote::Stack(stack, selected) => {
                self.bus.emit(DebugEvent::StackLoaded { stack, selected });
            }
            other => {
                debug!(?other, "note not applicable to XML link");
            }
        }
        Ok(())
    }

    /// Split buffered bytes on NUL/SOH delimiters; a trailing unterminated
    /// segment stays buffered for the next read.
    fn take_messages(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(pos) = self
            .buffer
            .iter()
            .position(|b| *b == 0x00 || *b == 0x01)
        {
            let segment: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&segment[..segment.len() - 1])
                .trim()
                .to_string();
            if !text.is_empty() {
                messages.push(text);
            }
        }
        messages
    }

    async fn handle_message(&mut self, message: String) -> Result<()> {
        // length prefixes and stray noise are not documents
        if !message.starts_with('<') {
            return Ok(());
        }
        self.bus
            .emit(DebugEvent::debug_output(&message, OutputKind::Output));

        if self.init_finished {
            if !self.program_stopped {
                self.program_stopped = true;
                self.broadcast(DebugEvent::ProgramStopped { location: None })
                    .await?;
            }
            self.debugger_busy = false;
            self.bus.emit(DebugEvent::DebuggerReadyForInput);
        }

        let doc = match parse_document(&message) {
            Ok(doc) => doc,
            Err(err) => {
                debug!(%err, "skipping malformed message");
                return Ok(());
            }
        };

        match doc.root.as_str() {
            "init" => self.handle_init(doc).await,
            "response" => self.handle_response(doc, &message).await,
            other => {
                debug!(root = other, "ignoring message");
                Ok(())
            }
        }
    }

    async fn handle_init(&mut self, doc: XdDocument) -> Result<()> {
        let ide_key = doc.attr("idekey").unwrap_or("").to_string();
        let uri = doc.attr("fileuri").unwrap_or("").to_string();
        info!(%ide_key, %uri, "engine connected");

        self.ide_key = Some(ide_key.clone());
        self.bus.emit(DebugEvent::user_output(
            format!("Connected: idekey={} uri={}\n", ide_key, uri),
            false,
        ));

        self.submit(simple_text("feature_set -n show_hidden -v 1")).await?;
        self.submit(simple_text("step_into")).await?;

        self.is_debugging = true;
        self.broadcast(DebugEvent::AttachedToProcess).await?;
        let same_script = self.script_uri.as_deref() == Some(uri.as_str());
        let program_name = self
            .program_name
            .clone()
            .unwrap_or_else(|| uri_to_path(&uri));
        self.broadcast(DebugEvent::SymbolsLoaded {
            success: same_script || self.script_uri.is_none(),
            program_name,
        })
        .await?;

        self.init_finished = true;
        self.script_uri = Some(uri);
        Ok(())
    }

    async fn handle_response(&mut self, doc: XdDocument, raw: &str) -> Result<()> {
        let status = doc.attr("status").unwrap_or("").to_string();
        let reason = doc.attr("reason").unwrap_or("").to_string();

        if let Some(error) = &doc.error {
            if status == "break" && reason == "error" {
                self.bus
                    .emit(DebugEvent::user_output(format!("{}\n", error), true));
            }
        }

        if let Some(location) = doc
            .stop_location
            .as_ref()
            .map(|(uri, line)| Location::line(uri_to_path(uri), *line))
        {
            self.program_stopped = true;
            self.broadcast(DebugEvent::ProgramStopped {
                location: Some(location),
            })
            .await?;
        } else if status == "running" {
            self.program_stopped = false;
            self.broadcast(DebugEvent::ProgramRunning).await?;
        }

        if let Some(id) = doc.transaction_id() {
            if self.dispatcher.handle_command_running(id) {
                // the raw document is the command's output; hooks re-parse it
                self.dispatcher.accumulate(raw);
                let result = self.dispatcher.finish_running(doc.error.is_none());
                self.process_finish(result).await?;
                if !self.dispatcher.has_foreground_commands() {
                    self.advance_queue().await?;
                }
            }
        }

        if status == "stopping" || status == "stopped" {
            info!("script finished");
            let result = self.dispatcher.cancel_all_commands();
            self.process_finish(result).await?;
            self.is_debugging = false;
            self.broadcast(DebugEvent::ProgramFinished).await?;
        }
        Ok(())
    }

    async fn handle_backend_closed(&mut self) -> Result<()> {
        warn!("engine closed the connection");
        let was_initialized = self.init_finished;

        let result = self.dispatcher.cancel_all_commands();
        for event in result.events {
            let _ = self.breakpoints.on_event(&event);
            self.bus.emit(event);
        }

        self.buffer.clear();
        self.init_finished = false;
        self.is_debugging = false;
        self.program_stopped = true;
        self.debugger_busy = true;
        self.ide_key = None;
        self.files.clear();

        if was_initialized {
            let _ = self.breakpoints.on_event(&DebugEvent::DebuggerRestarted);
            self.bus.emit(DebugEvent::DebuggerRestarted);
        }
        Err(Error::Transport("engine closed the connection".to_string()))
    }
}

fn simple_text(text: &str) -> Box<dyn Command> {
    Box::new(FnCommand::new(Payload::text(text), |_, _, _| {
        Disposition::Dispose
    }))
}

#[async_trait]
impl DebuggerLink for XdLink {
    fn features(&self) -> &FeatureSet {
        &XDEBUG_FEATURES
    }

    fn debugger_has_started(&self) -> bool {
        self.init_finished
    }

    fn has_loaded_symbols(&self) -> bool {
        self.init_finished
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
        true
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
        self.buffer.extend_from_slice(&buf[..n]);

        for message in self.take_messages() {
            self.handle_message(message).await?;
        }
        Ok(())
    }

    async fn send_command(&mut self, command: Box<dyn Command>) -> Result<bool> {
        self.submit(command).await?;
        Ok(true)
    }

    async fn send_raw(&mut self, text: &str) -> Result<()> {
        let wire = format!("{}\0", text);
        self.transport.write_all(wire.as_bytes()).await?;
        self.bus
            .emit(DebugEvent::debug_output(text, OutputKind::Command));
        Ok(())
    }

    async fn set_program(&mut self, path: &str) -> Result<()> {
        self.program_name = Some(path.to_string());
        self.script_uri = Some(path_to_uri(path));
        Ok(())
    }

    async fn run_program(&mut self, _args: &str) -> Result<()> {
        self.continue_program().await
    }

    async fn stop_program(&mut self) -> Result<()> {
        self.submit(simple_text("break")).await
    }

    async fn kill_program(&mut self) -> Result<()> {
        self.submit(simple_text("stop")).await
    }

    async fn detach(&mut self) -> Result<()> {
        self.submit(simple_text("detach")).await
    }

    async fn step_over(&mut self) -> Result<()> {
        self.submit(simple_text("step_over")).await
    }

    async fn step_into(&mut self) -> Result<()> {
        self.submit(simple_text("step_into")).await
    }

    async fn step_out(&mut self) -> Result<()> {
        self.submit(simple_text("step_out")).await
    }

    async fn continue_program(&mut self) -> Result<()> {
        self.program_stopped = false;
        self.submit(simple_text("run")).await
    }

    async fn set_breakpoint(&mut self, location: &Location, temporary: bool) -> Result<()> {
        let Location::Line { file, line } = location else {
            debug!("only line breakpoints are expressible on this wire");
            return Ok(());
        };
        let mut text = format!(
            "breakpoint_set -t line -f {} -n {}",
            path_to_uri(&file.display_name()),
            line
        );
        if temporary {
            text.push_str(" -r 1");
        }
        // the engine's echo triggers a full list fetch
        let cmd = FnCommand::new(Payload::text(text), |_, _, ctx| {
            ctx.events.push(DebugEvent::BreakpointsChanged);
            Disposition::Dispose
        });
        self.submit(Box::new(cmd)).await
    }

    async fn remove_breakpoint(&mut self, index: u32) -> Result<()> {
        let cmd = FnCommand::new(
            Payload::text(format!("breakpoint_remove -d {}", index)),
            |_, _, ctx| {
                ctx.events.push(DebugEvent::BreakpointsChanged);
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn remove_all_breakpoints_on_line(&mut self, location: &Location) -> Result<()> {
        let doomed: Vec<u32> = self
            .breakpoints
            .breakpoints_at(location)
            .iter()
            .map(|bp| bp.debugger_index)
            .collect();
        for index in doomed {
            self.remove_breakpoint(index).await?;
        }
        Ok(())
    }

    async fn remove_all_breakpoints(&mut self) -> Result<()> {
        let doomed: Vec<u32> = self
            .breakpoints
            .breakpoints()
            .iter()
            .map(|bp| bp.debugger_index)
            .collect();
        for index in doomed {
            self.remove_breakpoint(index).await?;
        }
        Ok(())
    }

    async fn set_breakpoint_enabled(
        &mut self,
        index: u32,
        enabled: bool,
        _once: bool,
    ) -> Result<()> {
        let state = if enabled { "enabled" } else { "disabled" };
        let cmd = FnCommand::new(
            Payload::text(format!("breakpoint_update -d {} -s {}", index, state)),
            |_, _, ctx| {
                ctx.events.push(DebugEvent::BreakpointsChanged);
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn request_breakpoints(&mut self) -> Result<()> {
        let cmd = FnCommand::new(Payload::text("breakpoint_list"), |success, out, ctx| {
            if success {
                if let Ok(doc) = parse_document(&out.text) {
                    let breakpoints = doc
                        .breakpoints
                        .iter()
                        .map(|bp| {
                            let mut b = dbgmux_core::Breakpoint::pending(Location::line(
                                uri_to_path(&bp.filename),
                                bp.lineno,
                            ));
                            b.debugger_index = bp.id;
                            b.enabled = bp.enabled;
                            b
                        })
                        .collect();
                    ctx.notes
                        .push(SessionNote::BreakpointList(breakpoints, Vec::new()));
                }
            }
            Disposition::Dispose
        });
        self.submit(Box::new(cmd)).await
    }

    async fn request_stack(&mut self) -> Result<()> {
        let cmd = FnCommand::new(Payload::text("stack_get"), |success, out, ctx| {
            if success {
                if let Ok(doc) = parse_document(&out.text) {
                    let mut stack = Stack::new();
                    stack.set_frames(
                        doc.frames
                            .iter()
                            .map(|f| {
                                StackFrame::new(
                                    f.level,
                                    f.function.clone(),
                                    Some(Location::line(uri_to_path(&f.filename), f.lineno)),
                                )
                            })
                            .collect(),
                    );
                    let selected = stack.initial_selection(&[]);
                    ctx.notes.push(SessionNote::Stack(stack, selected));
                }
            }
            Disposition::Dispose
        });
        self.submit(Box::new(cmd)).await
    }

    async fn request_threads(&mut self) -> Result<()> {
        // scripts are single-threaded; nothing to enumerate
        self.bus.emit(DebugEvent::ThreadListChanged);
        Ok(())
    }

    fn replace_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
    }

    async fn restart(&mut self) -> Result<()> {
        let was_initialized = self.init_finished;

        let result = self.dispatcher.cancel_all_commands();
        for event in result.events {
            let _ = self.breakpoints.on_event(&event);
            self.bus.emit(event);
        }

        self.buffer.clear();
        self.init_finished = false;
        self.is_debugging = false;
        self.program_stopped = true;
        self.debugger_busy = true;
        self.files.clear();

        if was_initialized {
            self.broadcast(DebugEvent::DebuggerRestarted).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StreamTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    struct Engine {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Engine {
        async fn emit(&mut self, xml: &str) {
            self.writer.write_all(xml.as_bytes()).await.unwrap();
            self.writer.write_all(&[0]).await.unwrap();
        }

        async fn drain(&mut self) -> String {
            let mut out = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match tokio::time::timeout(
                    std::time::Duration::from_millis(20),
                    self.reader.read(&mut buf),
                )
                .await
                {
                    Ok(Ok(n)) if n > 0 => out.extend_from_slice(&buf[..n]),
                    _ => break,
                }
            }
            String::from_utf8_lossy(&out).replace('\0', "\n")
        }
    }

    fn make_link() -> (XdLink, Engine, broadcast::Receiver<DebugEvent>) {
        let (ours, theirs) = tokio::io::duplex(1 << 20);
        let (lr, lw) = tokio::io::split(ours);
        let (er, ew) = tokio::io::split(theirs);
        let link = XdLink::new(Box::new(StreamTransport::new(lr, lw)));
        let rx = link.subscribe();
        (
            link,
            Engine {
                reader: er,
                writer: ew,
            },
            rx,
        )
    }

    fn collected(rx: &mut broadcast::Receiver<DebugEvent>) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    async fn connect(link: &mut XdLink, engine: &mut Engine) {
        engine
            .emit(r#"<init idekey="dbgmux" fileuri="file:///src/index.php"/>"#)
            .await;
        link.process_available().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_document_attaches() {
        let (mut link, mut engine, mut rx) = make_link();
        connect(&mut link, &mut engine).await;

        assert!(link.debugger_has_started());
        assert_eq!(link.ide_key(), Some("dbgmux"));
        let events = collected(&mut rx);
        assert!(events.contains(&DebugEvent::AttachedToProcess));
        assert!(events
            .iter()
            .any(|e| matches!(e, DebugEvent::SymbolsLoaded { .. })));

        let written = engine.drain().await;
        assert!(written.contains("feature_set -n show_hidden -v 1 -i 1"));
        assert!(written.contains("step_into -i 2"));
    }

    #[tokio::test]
    async fn test_length_prefix_segments_are_skipped() {
        let (mut link, mut engine, _rx) = make_link();
        // transport frames arrive as: length NUL document NUL
        engine.writer.write_all(b"52\0").await.unwrap();
        connect(&mut link, &mut engine).await;
        assert!(link.debugger_has_started());
    }

    #[tokio::test]
    async fn test_response_correlates_by_transaction_id() {
        let (mut link, mut engine, mut rx) = make_link();
        connect(&mut link, &mut engine).await;
        let _ = collected(&mut rx);

        // answer the two init-time commands
        engine
            .emit(r#"<response command="feature_set" transaction_id="1" status="starting"/>"#)
            .await;
        engine
            .emit(
                r#"<response command="step_into" transaction_id="2" status="break">
                     <message filename="file:///src/index.php" lineno="3"/>
                   </response>"#,
            )
            .await;
        link.process_available().await.unwrap();

        let events = collected(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            DebugEvent::ProgramStopped { location: Some(loc) }
                if loc.file_id().unwrap().display_name() == "/src/index.php"
                    && loc.line_number() == Some(3)
        )));
        assert!(events.contains(&DebugEvent::DebuggerReadyForInput));
    }

    #[tokio::test]
    async fn test_unknown_transaction_id_is_ignored() {
        let (mut link, mut engine, _rx) = make_link();
        connect(&mut link, &mut engine).await;

        engine
            .emit(r#"<response command="run" transaction_id="999" status="break"/>"#)
            .await;
        link.process_available().await.unwrap();
        assert!(link.debugger_has_started());
    }

    #[tokio::test]
    async fn test_breakpoint_list_updates_manager() {
        let (mut link, mut engine, mut rx) = make_link();
        connect(&mut link, &mut engine).await;
        let _ = collected(&mut rx);

        link.request_breakpoints().await.unwrap();
        let written = engine.drain().await;
        assert!(written.contains("breakpoint_list -i 3"));

        engine
            .emit(
                r#"<response command="breakpoint_list" transaction_id="3">
                     <breakpoint id="31" type="line" filename="file:///src/a.php" lineno="4" state="enabled"/>
                   </response>"#,
            )
            .await;
        link.process_available().await.unwrap();

        let events = collected(&mut rx);
        assert!(events.contains(&DebugEvent::BreakpointListUpdated));
        assert!(link
            .breakpoint_manager()
            .has_breakpoint_at(&Location::line("/src/a.php", 4)));
        assert_eq!(link.breakpoint_manager().breakpoints()[0].debugger_index, 31);
    }

    #[tokio::test]
    async fn test_base64_error_reaches_console() {
        let (mut link, mut engine, mut rx) = make_link();
        connect(&mut link, &mut engine).await;
        let _ = collected(&mut rx);

        engine
            .emit(
                r#"<response command="source" transaction_id="1" status="break" reason="error">
                     <error code="100" encoding="base64">bm8gc3VjaCBmaWxl</error>
                   </response>"#,
            )
            .await;
        link.process_available().await.unwrap();

        let events = collected(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            DebugEvent::UserOutput { text, is_error: true, .. } if text.contains("no such file")
        )));
    }

    #[tokio::test]
    async fn test_stopping_status_tears_down() {
        let (mut link, mut engine, mut rx) = make_link();
        connect(&mut link, &mut engine).await;
        let _ = collected(&mut rx);

        engine
            .emit(r#"<response command="run" transaction_id="2" status="stopping" reason="ok"/>"#)
            .await;
        link.process_available().await.unwrap();

        let events = collected(&mut rx);
        assert!(events.contains(&DebugEvent::ProgramFinished));
        assert!(!link.is_debugging());
    }

    #[tokio::test]
    async fn test_source_path_resolution() {
        let (mut link, _engine, _rx) = make_link();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.php"), "<?php").unwrap();
        link.set_source_paths(vec![dir.path().to_path_buf()]);

        let resolved = link.resolve_source("util.php").unwrap();
        assert_eq!(resolved, dir.path().join("util.php"));

        // negative answers are remembered
        assert!(link.resolve_source("missing.php").is_none());
        link.set_source_paths(Vec::new());
        assert!(link.resolve_source("missing.php").is_none());
        assert!(link.resolve_source("util.php").is_some(), "cache hit");
    }

    #[tokio::test]
    async fn test_connection_close_resets() {
        let (mut link, mut engine, mut rx) = make_link();
        connect(&mut link, &mut engine).await;
        let _ = collected(&mut rx);

        drop(engine);
        let err = link.process_available().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        let events = collected(&mut rx);
        assert!(events.contains(&DebugEvent::DebuggerRestarted));
        assert!(!link.debugger_has_started());
    }
}
