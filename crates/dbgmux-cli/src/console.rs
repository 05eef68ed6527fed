//! Console command parsing and event rendering
//!
//! A thin stand-in for the excluded GUI: user lines become link operations,
//! broadcast events become printed lines.

use dbgmux_core::{DebugEvent, Location, OutputKind};

/// One parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Run(String),
    Continue,
    StepOver,
    StepInto,
    StepOut,
    Until(Location),
    Interrupt,
    Kill,
    Break { location: Location, temporary: bool },
    Delete(Option<u32>),
    Enable(Option<u32>),
    Disable(Option<u32>),
    Condition { index: u32, expression: Option<String> },
    Ignore { index: u32, count: u32 },
    ListBreakpoints,
    Stack,
    Threads,
    Thread(u64),
    Frame(u64),
    Raw(String),
    Quit,
}

/// Parse one input line. Unknown verbs pass through raw so the backend's
/// own console stays reachable.
pub fn parse_line(line: &str) -> Option<UserCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    let cmd = match verb {
        "run" | "r" => UserCommand::Run(rest.to_string()),
        "continue" | "c" => UserCommand::Continue,
        "next" | "n" => UserCommand::StepOver,
        "step" | "s" => UserCommand::StepInto,
        "finish" => UserCommand::StepOut,
        "until" => UserCommand::Until(Location::parse(rest).ok()?),
        "interrupt" => UserCommand::Interrupt,
        "kill" => UserCommand::Kill,
        "break" | "b" => UserCommand::Break {
            location: Location::parse(rest).ok()?,
            temporary: false,
        },
        "tbreak" => UserCommand::Break {
            location: Location::parse(rest).ok()?,
            temporary: true,
        },
        "delete" | "d" => UserCommand::Delete(rest.parse().ok()),
        // with no index these apply to every breakpoint
        "enable" => UserCommand::Enable(rest.parse().ok()),
        "disable" => UserCommand::Disable(rest.parse().ok()),
        "condition" => {
            let mut args = rest.splitn(2, ' ');
            let index = args.next()?.parse().ok()?;
            let expression = args.next().map(str::to_string);
            UserCommand::Condition { index, expression }
        }
        "ignore" => {
            let mut args = rest.splitn(2, ' ');
            UserCommand::Ignore {
                index: args.next()?.parse().ok()?,
                count: args.next()?.trim().parse().ok()?,
            }
        }
        "breakpoints" | "info" => UserCommand::ListBreakpoints,
        "bt" | "backtrace" | "where" => UserCommand::Stack,
        "threads" => UserCommand::Threads,
        "thread" => UserCommand::Thread(rest.parse().ok()?),
        "frame" => UserCommand::Frame(rest.parse().ok()?),
        "quit" | "q" => UserCommand::Quit,
        _ => UserCommand::Raw(line.to_string()),
    };
    Some(cmd)
}

/// Render one broadcast event for the console, or None for events the
/// console does not surface.
pub fn render_event(event: &DebugEvent) -> Option<String> {
    match event {
        DebugEvent::UserOutput { text, is_error, .. } => Some(if *is_error {
            format!("! {}", text.trim_end())
        } else {
            text.trim_end().to_string()
        }),
        DebugEvent::DebugOutput { kind, .. } if *kind == OutputKind::Command => None,
        DebugEvent::DebugOutput { .. } => None,
        DebugEvent::DebuggerReadyForInput => Some("(ready)".to_string()),
        DebugEvent::DebuggerStarted => Some("* debugger started".to_string()),
        DebugEvent::DebuggerRestarted => Some("* debugger restarted".to_string()),
        DebugEvent::SymbolsLoaded {
            success,
            program_name,
        } => Some(if *success {
            format!("* symbols loaded: {}", program_name)
        } else {
            "* no symbols loaded".to_string()
        }),
        DebugEvent::ProgramRunning => Some("* running".to_string()),
        DebugEvent::ProgramStopped { location } => Some(match location {
            Some(loc) => format!("* stopped at {}", loc),
            None => "* stopped".to_string(),
        }),
        DebugEvent::ProgramFinished => Some("* program finished".to_string()),
        DebugEvent::AttachedToProcess => Some("* attached".to_string()),
        DebugEvent::DetachedFromProcess => Some("* detached".to_string()),
        DebugEvent::StackLoaded { stack, selected } => {
            let mut out = String::new();
            for (i, frame) in stack.frames().iter().enumerate() {
                let marker = if i == *selected { '>' } else { ' ' };
                let location = frame
                    .location
                    .as_ref()
                    .map(|l| format!(" at {}", l))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "{} #{} {}{}\n",
                    marker, frame.index, frame.function_name, location
                ));
            }
            Some(out.trim_end().to_string())
        }
        DebugEvent::PlugInMessage { text } => Some(format!("[plugin] {}", text)),
        _ => None,
    }
}
