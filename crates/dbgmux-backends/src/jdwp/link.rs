//! VM link - drives a virtual machine over the binary debug wire
//!
//! Replies carry the transaction ID natively, so correlation is direct.
//! VM-initiated composite events arrive on the same stream, discriminated
//! by a flags bit. Timers (the death grace period after a VM-death event,
//! the thread-group parent-discovery sweep) are deadlines the read loop
//! honors, not threads.

use super::registry::ClassRegistry;
use super::wire::{
    self, encode_command, DecodedItem, Decoder, Frame, FrameKind, HANDSHAKE,
};
use crate::transport::Transport;
use async_trait::async_trait;
use dbgmux_core::{
    Breakpoint, DebugEvent, Error, Location, OutputKind, Result, Stack, StackFrame, ThreadKind,
    ThreadTree,
};
use dbgmux_link::{
    BreakpointDirective, BreakpointManager, Command, DebuggerLink, Dispatcher, Disposition,
    EventBus, FeatureSet, FileNameCache, FinishResult, FnCommand, IdSizes, Payload, SendCaps,
    SessionNote,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8192;

const JDWP_FEATURES: FeatureSet = FeatureSet {
    set_program: true,
    set_args: false,
    set_core: false,
    attach: true,
    run_program: false,
    stop_program: true,
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

pub struct JdwpLink {
    transport: Box<dyn Transport>,
    dispatcher: Dispatcher,
    bus: EventBus,
    decoder: Decoder,
    breakpoints: BreakpointManager,
    files: FileNameCache,
    threads: ThreadTree,
    registry: ClassRegistry,
    id_sizes: IdSizes,

    handshake_sent: bool,
    connected: bool,
    is_debugging: bool,
    program_stopped: bool,
    /// Commands issued while the VM runs owe exactly one resume once the
    /// queue drains, no matter how many piled up.
    resume_owed: u32,

    vm_death_deadline: Option<Instant>,
    death_grace: Duration,
    next_cull: Instant,
    cull_interval: Duration,
    cull_cursor: usize,

    /// Local event-request registry; this backend has no list-fetch query,
    /// so these ARE the authoritative breakpoints.
    bp_requests: Vec<Breakpoint>,

    program_name: Option<String>,
}

impl JdwpLink {
    pub fn new(transport: Box<dyn Transport>, death_grace: Duration, cull_interval: Duration) -> Self {
        Self {
            transport,
            dispatcher: Dispatcher::new(),
            bus: EventBus::new(),
            decoder: Decoder::new(),
            breakpoints: BreakpointManager::new(),
            files: FileNameCache::new(),
            threads: ThreadTree::new(),
            registry: ClassRegistry::new(),
            id_sizes: IdSizes::default(),
            handshake_sent: false,
            connected: false,
            is_debugging: false,
            program_stopped: false,
            resume_owed: 0,
            vm_death_deadline: None,
            death_grace,
            next_cull: Instant::now() + cull_interval,
            cull_interval,
            cull_cursor: 0,
            bp_requests: Vec::new(),
            program_name: None,
        }
    }

    pub fn thread_tree(&self) -> &ThreadTree {
        &self.threads
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ClassRegistry {
        &mut self.registry
    }

    pub fn id_sizes(&self) -> IdSizes {
        self.id_sizes
    }

    // ------------------------------------------------------------------
    // plumbing
    // ------------------------------------------------------------------

    async fn advance_queue(&mut self) -> Result<()> {
        let caps = SendCaps {
            pipeline: true,
            foreground_ok: true,
            background_ok: true,
        };
        let transmissions = self.dispatcher.next_transmissions(caps);
        for tx in transmissions {
            let Payload::Binary {
                command_set,
                command,
                data,
            } = tx.payload
            else {
                warn!("dropping text payload on binary link");
                continue;
            };
            debug!(id = tx.id, command_set, command, "send");
            let frame = encode_command(tx.id as u32, command_set, command, &data);
            self.transport.write_all(&frame).await?;
            // the reply is the first (and only) "command running" signal on
            // this wire; correlation happens in handle_reply
            self.bus.emit(DebugEvent::debug_output(
                format!("send id={} set={} cmd={}", tx.id, command_set, command),
                OutputKind::Command,
            ));
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
        // pay the owed resume once nothing is outstanding
        if self.resume_owed > 0 && !self.dispatcher.has_pending_commands() {
            self.resume_owed = 0;
            self.send_resume().await?;
        }
        Ok(())
    }

    async fn handle_note(&mut self, note: SessionNote) -> Result<()> {
        match note {
            SessionNote::IdSizes(sizes) => {
                info!(?sizes, "id sizes negotiated");
                self.id_sizes = sizes;
            }
            SessionNote::ThreadList(entries) => {
                let mut changed = false;
                for (id, kind, name) in entries {
                    let existed = self.threads.find(id).is_some();
                    let node = self.threads.find_or_create(id, kind);
                    if !name.is_empty() {
                        self.threads.set_name(node, name);
                    }
                    if !existed {
                        changed = true;
                        if kind == ThreadKind::Thread {
                            self.request_thread_name(id).await?;
                            self.request_thread_group(id).await?;
                        }
                    }
                }
                if changed {
                    self.bus.emit(DebugEvent::ThreadListChanged);
                }
            }
            SessionNote::ThreadName(id, name) => {
                if let Some(node) = self.threads.find(id) {
                    self.threads.set_name(node, name);
                    self.bus.emit(DebugEvent::ThreadListChanged);
                }
            }
            SessionNote::ThreadParent(id, parent) => {
                if parent != 0 {
                    let node = self.threads.find_or_create(id, ThreadKind::Thread);
                    self.threads.set_parent(node, parent);
                    self.bus.emit(DebugEvent::ThreadListChanged);
                }
            }
            SessionNote::BreakpointConfirmed(bp) => {
                self.bp_requests.push(bp);
                let directives = self
                    .breakpoints
                    .update_list(self.bp_requests.clone(), Vec::new());
                self.apply_directives(directives).await?;
                self.bus.emit(DebugEvent::BreakpointListUpdated);
            }
            SessionNote::VmFrames(raw) => {
                let mut stack = Stack::new();
                let frames = raw
                    .iter()
                    .enumerate()
                    .map(|(i, (_, class_id, method_id, index))| {
                        let function = self.registry.qualified_method(*class_id, *method_id);
                        let location = self
                            .registry
                            .class_source_file(*class_id)
                            .map(|file| Location::line(file, *index as u32));
                        StackFrame::new(i as u32, function, location)
                    })
                    .collect();
                stack.set_frames(frames);
                let selected = stack.initial_selection(&[]);
                self.bus.emit(DebugEvent::StackLoaded { stack, selected });
            }
            other => {
                debug!(?other, "note not applicable to VM link");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // incoming traffic
    // ------------------------------------------------------------------

    async fn handle_item(&mut self, item: DecodedItem) -> Result<()> {
        match item {
            DecodedItem::Handshake => self.init_debugger().await,
            DecodedItem::Frame(frame) => match frame.kind {
                FrameKind::Reply { error_code } => self.handle_reply(frame, error_code).await,
                FrameKind::Command {
                    command_set,
                    command,
                } => {
                    if command_set == wire::SET_EVENT && command == wire::EVENT_COMPOSITE {
                        self.dispatch_events(&frame.data).await
                    } else {
                        debug!(command_set, command, "ignoring unsolicited command");
                        Ok(())
                    }
                }
            },
        }
    }

    async fn init_debugger(&mut self) -> Result<()> {
        info!("VM handshake complete");
        self.connected = true;
        self.is_debugging = true;
        self.broadcast(DebugEvent::DebuggerStarted).await?;
        self.broadcast(DebugEvent::AttachedToProcess).await?;

        self.request_id_sizes().await?;
        self.request_top_level_groups().await?;
        self.request_threads().await?;

        let program_name = self.program_name.clone().unwrap_or_default();
        self.broadcast(DebugEvent::SymbolsLoaded {
            success: true,
            program_name,
        })
        .await
    }

    async fn handle_reply(&mut self, frame: Frame, error_code: u16) -> Result<()> {
        debug!(id = frame.id, error_code, "reply");

        if !self.dispatcher.handle_command_running(frame.id as u64) {
            // stale reply from before a restart, or a cancelled command
            return Ok(());
        }
        self.dispatcher.set_reply_data(frame.data, error_code);
        let result = self.dispatcher.finish_running(error_code == 0);
        self.process_finish(result).await?;

        if !self.dispatcher.has_foreground_commands() {
            self.advance_queue().await?;
        }

        if error_code == wire::ERROR_VM_DEAD {
            self.begin_death_grace();
        }
        Ok(())
    }

    async fn dispatch_events(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < 5 {
            return Err(Error::Protocol("truncated composite event".to_string()));
        }
        let suspend_policy = data[0];
        let count = wire::unpack4(&data[1..5]) as usize;
        let mut rest = &data[5..];

        if suspend_policy == wire::SUSPEND_ALL {
            self.program_stopped = true;
        }

        for _ in 0..count {
            if rest.len() < 5 {
                debug!("short composite event payload");
                break;
            }
            let kind = rest[0];
            let _request_id = wire::unpack4(&rest[1..5]);
            rest = &rest[5..];

            match kind {
                wire::EVENT_VM_START => {
                    let thread = wire::unpack_id(self.id_sizes.object, rest)?;
                    rest = &rest[self.id_sizes.object..];
                    info!(thread, "VM started");
                    self.is_debugging = true;
                }
                wire::EVENT_THREAD_START => {
                    let thread = wire::unpack_id(self.id_sizes.object, rest)?;
                    rest = &rest[self.id_sizes.object..];
                    info!(thread, "thread started");
                    // might already exist from an enumeration reply
                    self.handle_note(SessionNote::ThreadList(vec![(
                        thread,
                        ThreadKind::Thread,
                        String::new(),
                    )]))
                    .await?;
                }
                wire::EVENT_THREAD_DEATH => {
                    let thread = wire::unpack_id(self.id_sizes.object, rest)?;
                    rest = &rest[self.id_sizes.object..];
                    info!(thread, "thread finished");
                    if self.threads.remove(thread) {
                        self.bus.emit(DebugEvent::ThreadListChanged);
                    }
                }
                wire::EVENT_CLASS_UNLOAD => {
                    let (signature, consumed) = wire::unpack_string(rest)?;
                    rest = &rest[consumed..];
                    info!(%signature, "class unloaded");
                    self.registry.remove_class_by_signature(&signature);
                }
                wire::EVENT_BREAKPOINT => {
                    let object = self.id_sizes.object;
                    let reference = self.id_sizes.reference_type;
                    let method = self.id_sizes.method;
                    let need = object + 1 + reference + method + 8;
                    if rest.len() < need {
                        return Err(Error::Protocol("truncated breakpoint event".to_string()));
                    }
                    let thread = wire::unpack_id(object, rest)?;
                    let class_id = wire::unpack_id(reference, &rest[object + 1..])?;
                    let method_id = wire::unpack_id(method, &rest[object + 1 + reference..])?;
                    let index = wire::unpack8(&rest[object + 1 + reference + method..]);
                    rest = &rest[need..];

                    self.threads.set_current_thread(Some(thread));
                    self.program_stopped = true;
                    // the code index stands in for the line until a line
                    // table query refines it
                    let location = self
                        .registry
                        .class_source_file(class_id)
                        .map(|file| Location::line(file, index as u32));
                    self.broadcast(DebugEvent::ProgramStopped { location }).await?;
                    self.bus.emit(DebugEvent::ThreadChanged);
                }
                wire::EVENT_VM_DEATH => {
                    info!("VM death event");
                    self.begin_death_grace();
                }
                other => {
                    // size unknown; the rest of this composite is opaque
                    debug!(kind = other, "unhandled event kind, skipping remainder");
                    break;
                }
            }
        }
        Ok(())
    }

    fn begin_death_grace(&mut self) {
        if self.vm_death_deadline.is_none() {
            self.vm_death_deadline = Some(Instant::now() + self.death_grace);
        }
    }

    async fn run_due_timers(&mut self) -> Result<()> {
        let now = Instant::now();
        if let Some(deadline) = self.vm_death_deadline {
            if now >= deadline {
                self.vm_death_deadline = None;
                self.program_finished().await?;
                return Ok(());
            }
        }
        if now >= self.next_cull {
            self.next_cull = now + self.cull_interval;
            self.cull_next_thread_group().await?;
        }
        Ok(())
    }

    /// Periodic sweep: ask one root-parked group for its parent so the tree
    /// converges even when parents were discovered out of order.
    async fn cull_next_thread_group(&mut self) -> Result<()> {
        let groups = self.threads.unparented_groups();
        if groups.is_empty() {
            return Ok(());
        }
        self.cull_cursor %= groups.len();
        let group = groups[self.cull_cursor];
        self.cull_cursor += 1;
        self.request_group_parent(group).await
    }

    async fn program_finished(&mut self) -> Result<()> {
        if self.is_debugging {
            self.is_debugging = false;
            self.threads.clear();
            self.registry.flush();
            self.bus.emit(DebugEvent::user_output("Program finished\n", false));
            self.broadcast(DebugEvent::ProgramFinished).await?;
        }
        Ok(())
    }

    async fn handle_backend_closed(&mut self) -> Result<()> {
        warn!("VM connection closed");
        let was_connected = self.connected;

        let result = self.dispatcher.cancel_all_commands();
        for event in result.events {
            let _ = self.breakpoints.on_event(&event);
            self.bus.emit(event);
        }

        self.decoder.reset();
        self.handshake_sent = false;
        self.connected = false;
        self.is_debugging = false;
        self.program_stopped = false;
        self.resume_owed = 0;
        self.vm_death_deadline = None;
        self.threads.clear();
        self.registry.flush();
        self.bp_requests.clear();
        self.files.clear();

        if was_connected {
            let _ = self.breakpoints.on_event(&DebugEvent::DebuggerRestarted);
            self.bus.emit(DebugEvent::DebuggerRestarted);
        }
        Err(Error::Transport("VM closed the connection".to_string()))
    }

    // ------------------------------------------------------------------
    // outgoing requests
    // ------------------------------------------------------------------

    async fn send_resume(&mut self) -> Result<()> {
        self.program_stopped = false;
        self.submit(simple_command(wire::SET_VIRTUAL_MACHINE, wire::VM_RESUME, Vec::new()))
            .await?;
        self.broadcast(DebugEvent::ProgramRunning).await
    }

    /// Queries that need a suspended VM suspend it once; the resume is owed
    /// and paid when the queue drains.
    async fn ensure_suspended(&mut self) -> Result<()> {
        if !self.program_stopped {
            self.program_stopped = true;
            self.resume_owed = 1;
            self.submit(simple_command(
                wire::SET_VIRTUAL_MACHINE,
                wire::VM_SUSPEND,
                Vec::new(),
            ))
            .await?;
        }
        Ok(())
    }

    async fn request_id_sizes(&mut self) -> Result<()> {
        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_VIRTUAL_MACHINE,
                command: wire::VM_ID_SIZES,
                data: Vec::new(),
            },
            |success, out, ctx| {
                if success && out.data.len() >= 20 {
                    ctx.notes.push(SessionNote::IdSizes(IdSizes {
                        field: wire::unpack4(&out.data[0..4]) as usize,
                        method: wire::unpack4(&out.data[4..8]) as usize,
                        object: wire::unpack4(&out.data[8..12]) as usize,
                        reference_type: wire::unpack4(&out.data[12..16]) as usize,
                        frame: wire::unpack4(&out.data[16..20]) as usize,
                    }));
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn request_top_level_groups(&mut self) -> Result<()> {
        let object = self.id_sizes.object;
        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_VIRTUAL_MACHINE,
                command: wire::VM_TOP_LEVEL_THREAD_GROUPS,
                data: Vec::new(),
            },
            move |success, out, ctx| {
                if success {
                    if let Ok(ids) = unpack_id_list(object, &out.data) {
                        ctx.notes.push(SessionNote::ThreadList(
                            ids.into_iter()
                                .map(|id| (id, ThreadKind::Group, String::new()))
                                .collect(),
                        ));
                    }
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn request_thread_name(&mut self, thread: u64) -> Result<()> {
        let mut data = Vec::new();
        wire::pack_id(self.id_sizes.object, thread, &mut data);
        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_THREAD_REFERENCE,
                command: wire::THREAD_NAME,
                data,
            },
            move |success, out, ctx| {
                if success {
                    if let Ok((name, _)) = wire::unpack_string(&out.data) {
                        ctx.notes.push(SessionNote::ThreadName(thread, name));
                    }
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn request_thread_group(&mut self, thread: u64) -> Result<()> {
        let object = self.id_sizes.object;
        let mut data = Vec::new();
        wire::pack_id(object, thread, &mut data);
        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_THREAD_REFERENCE,
                command: wire::THREAD_GROUP,
                data,
            },
            move |success, out, ctx| {
                if success {
                    if let Ok(group) = wire::unpack_id(object, &out.data) {
                        ctx.notes.push(SessionNote::ThreadParent(thread, group));
                    }
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn request_group_parent(&mut self, group: u64) -> Result<()> {
        let object = self.id_sizes.object;
        let mut data = Vec::new();
        wire::pack_id(object, group, &mut data);
        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_THREAD_GROUP_REFERENCE,
                command: wire::THREAD_GROUP_PARENT,
                data,
            },
            move |success, out, ctx| {
                if success {
                    if let Ok(parent) = wire::unpack_id(object, &out.data) {
                        ctx.notes.push(SessionNote::ThreadParent(group, parent));
                    }
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }
}

fn simple_command(command_set: u8, command: u8, data: Vec<u8>) -> Box<dyn Command> {
    Box::new(FnCommand::new(
        Payload::Binary {
            command_set,
            command,
            data,
        },
        |_, _, _| Disposition::Dispose,
    ))
}

fn unpack_id_list(id_size: usize, data: &[u8]) -> Result<Vec<u64>> {
    if data.len() < 4 {
        return Err(Error::Protocol("truncated id list".to_string()));
    }
    let count = wire::unpack4(&data[0..4]) as usize;
    let mut out = Vec::with_capacity(count);
    let mut rest = &data[4..];
    for _ in 0..count {
        out.push(wire::unpack_id(id_size, rest)?);
        rest = &rest[id_size..];
    }
    Ok(out)
}

#[async_trait]
impl DebuggerLink for JdwpLink {
    fn features(&self) -> &FeatureSet {
        &JDWP_FEATURES
    }

    fn debugger_has_started(&self) -> bool {
        self.connected
    }

    fn has_loaded_symbols(&self) -> bool {
        self.connected
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
        if !self.handshake_sent {
            self.transport.write_all(HANDSHAKE).await?;
            self.handshake_sent = true;
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let deadline = match self.vm_death_deadline {
            Some(death) if death < self.next_cull => death,
            _ => self.next_cull,
        };
        let read = tokio::time::timeout_at(deadline, self.transport.read(&mut buf)).await;
        let n = match read {
            Ok(n) => n?,
            Err(_) => {
                return self.run_due_timers().await;
            }
        };
        if n == 0 {
            return self.handle_backend_closed().await;
        }

        self.decoder.feed(&buf[..n]);
        loop {
            match self.decoder.next() {
                Ok(Some(item)) => self.handle_item(item).await?,
                Ok(None) => break,
                Err(err) => {
                    // framing desync on a binary stream is unrecoverable
                    warn!(%err, "frame decode failed");
                    return self.handle_backend_closed().await;
                }
            }
        }
        Ok(())
    }

    async fn send_command(&mut self, command: Box<dyn Command>) -> Result<bool> {
        self.submit(command).await?;
        Ok(true)
    }

    async fn send_raw(&mut self, _text: &str) -> Result<()> {
        // the VM wire has no console channel; debuggee input is outside
        // this connection
        debug!("raw input dropped: no console channel on VM wire");
        Ok(())
    }

    async fn set_program(&mut self, path: &str) -> Result<()> {
        self.program_name = Some(path.to_string());
        Ok(())
    }

    async fn run_program(&mut self, _args: &str) -> Result<()> {
        // the VM is launched externally and connects to us
        Ok(())
    }

    async fn stop_program(&mut self) -> Result<()> {
        self.program_stopped = true;
        self.submit(simple_command(
            wire::SET_VIRTUAL_MACHINE,
            wire::VM_SUSPEND,
            Vec::new(),
        ))
        .await?;
        self.broadcast(DebugEvent::ProgramStopped { location: None })
            .await
    }

    async fn kill_program(&mut self) -> Result<()> {
        let mut data = Vec::new();
        data.extend_from_slice(&wire::pack4(1));
        self.submit(simple_command(
            wire::SET_VIRTUAL_MACHINE,
            wire::VM_EXIT,
            data,
        ))
        .await
    }

    async fn step_over(&mut self) -> Result<()> {
        self.step(1).await
    }

    async fn step_into(&mut self) -> Result<()> {
        self.step(0).await
    }

    async fn step_out(&mut self) -> Result<()> {
        self.step(2).await
    }

    async fn continue_program(&mut self) -> Result<()> {
        self.resume_owed = 0;
        self.send_resume().await
    }

    async fn switch_to_thread(&mut self, id: u64) -> Result<()> {
        if self.threads.find(id).is_some() {
            self.threads.set_current_thread(Some(id));
            self.broadcast(DebugEvent::ThreadChanged).await?;
        }
        Ok(())
    }

    async fn set_breakpoint(&mut self, location: &Location, _temporary: bool) -> Result<()> {
        let Location::Line { file, line } = location else {
            debug!("only line breakpoints are expressible on this wire");
            return Ok(());
        };

        let class_id = self
            .registry
            .class_id(&file.display_name())
            .unwrap_or(0);

        let mut data = Vec::new();
        data.push(wire::EVENT_BREAKPOINT);
        data.push(wire::SUSPEND_ALL);
        data.extend_from_slice(&wire::pack4(1)); // one modifier
        data.push(7); // location-only
        data.push(1); // class type tag
        wire::pack_id(self.id_sizes.reference_type, class_id, &mut data);
        wire::pack_id(self.id_sizes.method, 0, &mut data);
        data.extend_from_slice(&wire::pack8(*line as u64));

        let template = Breakpoint::pending(location.clone());
        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_EVENT_REQUEST,
                command: wire::EVENT_REQUEST_SET,
                data,
            },
            move |success, out, ctx| {
                if success && out.data.len() >= 4 {
                    let mut bp = template.clone();
                    bp.debugger_index = wire::unpack4(&out.data[0..4]);
                    ctx.notes.push(SessionNote::BreakpointConfirmed(bp));
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn remove_breakpoint(&mut self, index: u32) -> Result<()> {
        let mut data = Vec::new();
        data.push(wire::EVENT_BREAKPOINT);
        data.extend_from_slice(&wire::pack4(index));
        self.submit(simple_command(
            wire::SET_EVENT_REQUEST,
            wire::EVENT_REQUEST_CLEAR,
            data,
        ))
        .await?;

        self.bp_requests.retain(|bp| bp.debugger_index != index);
        let directives = self
            .breakpoints
            .update_list(self.bp_requests.clone(), Vec::new());
        self.apply_directives(directives).await?;
        self.bus.emit(DebugEvent::BreakpointListUpdated);
        Ok(())
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
        self.submit(simple_command(
            wire::SET_EVENT_REQUEST,
            wire::EVENT_REQUEST_CLEAR_ALL_BREAKPOINTS,
            Vec::new(),
        ))
        .await?;
        self.bp_requests.clear();
        let directives = self.breakpoints.update_list(Vec::new(), Vec::new());
        self.apply_directives(directives).await?;
        self.bus.emit(DebugEvent::BreakpointListUpdated);
        Ok(())
    }

    async fn set_breakpoint_enabled(
        &mut self,
        index: u32,
        enabled: bool,
        _once: bool,
    ) -> Result<()> {
        // the wire has no enable toggle; disabling clears the request but
        // the local entry remembers the user's intent
        if let Some(bp) = self
            .bp_requests
            .iter_mut()
            .find(|bp| bp.debugger_index == index)
        {
            bp.enabled = enabled;
        }
        if !enabled {
            let mut data = Vec::new();
            data.push(wire::EVENT_BREAKPOINT);
            data.extend_from_slice(&wire::pack4(index));
            self.submit(simple_command(
                wire::SET_EVENT_REQUEST,
                wire::EVENT_REQUEST_CLEAR,
                data,
            ))
            .await?;
        }
        Ok(())
    }

    async fn request_breakpoints(&mut self) -> Result<()> {
        // no list-fetch query on this wire: the local request registry is
        // authoritative
        let directives = self
            .breakpoints
            .update_list(self.bp_requests.clone(), Vec::new());
        self.apply_directives(directives).await?;
        self.bus.emit(DebugEvent::BreakpointListUpdated);
        Ok(())
    }

    async fn request_stack(&mut self) -> Result<()> {
        let Some(thread) = self.threads.current_thread() else {
            debug!("no current thread; stack unavailable");
            return Ok(());
        };
        self.ensure_suspended().await?;

        let sizes = self.id_sizes;
        let mut data = Vec::new();
        wire::pack_id(sizes.object, thread, &mut data);
        data.extend_from_slice(&wire::pack4(0)); // start frame
        data.extend_from_slice(&wire::pack4(u32::MAX)); // all frames

        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_THREAD_REFERENCE,
                command: wire::THREAD_FRAMES,
                data,
            },
            move |success, out, ctx| {
                if success {
                    if let Ok(frames) = unpack_frames(sizes, &out.data) {
                        ctx.notes.push(SessionNote::VmFrames(frames));
                    }
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    async fn request_threads(&mut self) -> Result<()> {
        let object = self.id_sizes.object;
        let cmd = FnCommand::new(
            Payload::Binary {
                command_set: wire::SET_VIRTUAL_MACHINE,
                command: wire::VM_ALL_THREADS,
                data: Vec::new(),
            },
            move |success, out, ctx| {
                if success {
                    if let Ok(ids) = unpack_id_list(object, &out.data) {
                        ctx.notes.push(SessionNote::ThreadList(
                            ids.into_iter()
                                .map(|id| (id, ThreadKind::Thread, String::new()))
                                .collect(),
                        ));
                    }
                }
                Disposition::Dispose
            },
        );
        self.submit(Box::new(cmd)).await
    }

    fn replace_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
    }

    async fn restart(&mut self) -> Result<()> {
        let was_connected = self.connected;

        let result = self.dispatcher.cancel_all_commands();
        for event in result.events {
            let _ = self.breakpoints.on_event(&event);
            self.bus.emit(event);
        }

        self.decoder.reset();
        self.handshake_sent = false;
        self.connected = false;
        self.is_debugging = false;
        self.program_stopped = false;
        self.resume_owed = 0;
        self.vm_death_deadline = None;
        self.threads.clear();
        self.registry.flush();
        self.bp_requests.clear();
        self.files.clear();

        if was_connected {
            self.broadcast(DebugEvent::DebuggerRestarted).await?;
        }
        Ok(())
    }
}

impl JdwpLink {
    async fn step(&mut self, depth: u32) -> Result<()> {
        let Some(thread) = self.threads.current_thread() else {
            return Ok(());
        };
        let mut data = Vec::new();
        data.push(1); // single-step event
        data.push(wire::SUSPEND_ALL);
        data.extend_from_slice(&wire::pack4(1)); // one modifier
        data.push(10); // step modifier
        wire::pack_id(self.id_sizes.object, thread, &mut data);
        data.extend_from_slice(&wire::pack4(1)); // size: line
        data.extend_from_slice(&wire::pack4(depth));
        self.submit(simple_command(
            wire::SET_EVENT_REQUEST,
            wire::EVENT_REQUEST_SET,
            data,
        ))
        .await?;
        self.send_resume().await
    }
}


/// Reply layout: u32 count, then per frame a frame ID and a location
/// (type tag, class ID, method ID, 8-byte code index).
fn unpack_frames(sizes: IdSizes, data: &[u8]) -> Result<Vec<(u64, u64, u64, u64)>> {
    if data.len() < 4 {
        return Err(Error::Protocol("truncated frame list".to_string()));
    }
    let count = wire::unpack4(&data[0..4]) as usize;
    let mut rest = &data[4..];
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let need = sizes.frame + 1 + sizes.reference_type + sizes.method + 8;
        if rest.len() < need {
            return Err(Error::Protocol("truncated frame entry".to_string()));
        }
        let frame_id = wire::unpack_id(sizes.frame, rest)?;
        let class_id = wire::unpack_id(sizes.reference_type, &rest[sizes.frame + 1..])?;
        let method_id =
            wire::unpack_id(sizes.method, &rest[sizes.frame + 1 + sizes.reference_type..])?;
        let index =
            wire::unpack8(&rest[sizes.frame + 1 + sizes.reference_type + sizes.method..]);
        out.push((frame_id, class_id, method_id, index));
        rest = &rest[need..];
    }
    Ok(out)
}
