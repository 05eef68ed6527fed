//! MI output tokenizer
//!
//! Classifies each logical chunk of backend output into a closed token set.
//! Input arrives in arbitrary fragments; complete lines are consumed and a
//! trailing partial line stays buffered for the next read, with one
//! exception: a trailing `(gdb) ` is the prompt, which the backend prints
//! without a newline.
//!
//! A prompt seen while a bracketed command is still open is ambiguous - it
//! can mean "ready for input" or "output interrupted mid-stream" - and is
//! reported as [`Token::MaybeReadyForInput`] so the link can disambiguate
//! with a ping round-trip.

use super::records::{parse_map, RecordCursor, Value};
use super::MARKER_PREFIX;
use dbgmux_core::Location;
use regex::Regex;
use tracing::debug;

const PROMPT: &str = "(gdb) ";

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Debuggee or debugger console output (indistinguishable on this
    /// stream).
    ProgramOutput(String),
    ErrorOutput(String),

    /// Marker: output for transaction `id` starts here.
    BeginCommand { id: u64, ignore: bool },
    /// Marker: output for transaction `id` ends here.
    EndCommand { id: u64, ignore: bool },
    /// Plain output attributed to the open command.
    CommandOutput(String),
    /// A result record (`^done,...`) attributed to the open command.
    CommandResult(String),

    /// Prompt. `ping_id` is nonzero when the prompt came from a ping echo.
    ReadyForInput { ping_id: u64 },
    MaybeReadyForInput,

    BreakpointsChanged,
    FrameChanged,
    ThreadChanged,
    ValueChanged,

    PrepareToLoadSymbols,
    SymbolsLoaded { program: Option<String> },
    NoSymbols { text: String },
    SymbolsReloaded,
    CoreChanged,

    AttachedToProcess { pid: u32 },
    DetachingFromProcess,

    ProgramStarting,
    ProgramPid(u32),
    ProgramRunning,
    ProgramStopped {
        location: Option<Location>,
        text: Option<String>,
    },
    ProgramFinished { text: Option<String> },
    ProgramKilled,

    BeginScriptDefinition,
    PlugInMessage(String),
    DebuggerFinished,
}

pub struct Scanner {
    buffer: String,
    /// Between a begin and end marker: plain lines belong to the command.
    in_command: bool,
    re_reading_symbols: Regex,
    re_attached: Regex,
    re_thread_group_started: Regex,
    re_inferior_exit: Regex,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            in_command: false,
            re_reading_symbols: Regex::new(r#"^Reading symbols from (.+?)(\.\.\.)?$"#).unwrap(),
            re_attached: Regex::new(r"^Attaching to .*process (\d+)").unwrap(),
            re_thread_group_started: Regex::new(r#"pid="(\d+)""#).unwrap(),
            re_inferior_exit: Regex::new(r"^\[Inferior \d+ \(.*\) exited(.*)\]$").unwrap(),
        }
    }

    /// Forget buffered input and marker state; used on restart.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_command = false;
    }

    pub fn append_input(&mut self, data: &str) {
        self.buffer.push_str(data);
    }

    /// Next complete token, or None when the buffer holds no complete line
    /// and no prompt.
    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            let line = match self.take_line() {
                Some(line) => line,
                None => return None,
            };
            if let Some(token) = self.classify(&line) {
                return Some(token);
            }
            // classify consumed the line silently (blank line); keep going
        }
    }

    fn take_line(&mut self) -> Option<String> {
        if let Some(idx) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=idx).collect();
            return Some(line.trim_end_matches(['\n', '\r']).to_string());
        }
        // the prompt arrives with no trailing newline
        if self.buffer == PROMPT || self.buffer == PROMPT.trim_end() {
            self.buffer.clear();
            return Some(PROMPT.trim_end().to_string());
        }
        None
    }

    fn classify(&mut self, line: &str) -> Option<Token> {
        if line.is_empty() {
            return None;
        }

        if line.trim_end() == PROMPT.trim_end() {
            if self.in_command {
                return Some(Token::MaybeReadyForInput);
            }
            return Some(Token::ReadyForInput { ping_id: 0 });
        }

        if let Some(rest) = line.strip_prefix(MARKER_PREFIX) {
            return self.classify_marker(rest);
        }

        if self.in_command {
            return Some(self.classify_in_command(line));
        }

        self.classify_async(line)
    }

    fn classify_marker(&mut self, rest: &str) -> Option<Token> {
        if let Some(id) = tagged_id(rest, "command:") {
            self.in_command = true;
            return Some(Token::BeginCommand { id, ignore: false });
        }
        if let Some(id) = tagged_id(rest, "command done:") {
            self.in_command = false;
            return Some(Token::EndCommand { id, ignore: false });
        }
        if let Some(id) = tagged_id(rest, "nop command:") {
            self.in_command = true;
            return Some(Token::BeginCommand { id, ignore: true });
        }
        if let Some(id) = tagged_id(rest, "nop command done:") {
            self.in_command = false;
            return Some(Token::EndCommand { id, ignore: true });
        }
        if let Some(id) = tagged_id(rest, "debugger ready:") {
            return Some(Token::ReadyForInput { ping_id: id });
        }
        match rest {
            "breakpoints changed:" => return Some(Token::BreakpointsChanged),
            "frame changed:" => return Some(Token::FrameChanged),
            "thread changed:" => return Some(Token::ThreadChanged),
            "value changed:" => return Some(Token::ValueChanged),
            "defining script:" => return Some(Token::BeginScriptDefinition),
            _ => {}
        }
        if let Some(msg) = rest.strip_prefix("message:") {
            return Some(Token::PlugInMessage(msg.to_string()));
        }
        debug!(marker = rest, "unrecognized marker line");
        None
    }

    fn classify_in_command(&mut self, line: &str) -> Token {
        if let Some(rest) = line.strip_prefix('^') {
            return Token::CommandResult(rest.to_string());
        }
        if let Some(rest) = line.strip_prefix('~') {
            return Token::CommandOutput(unquote_stream(rest));
        }
        Token::CommandOutput(format!("{}\n", line))
    }

    fn classify_async(&mut self, line: &str) -> Option<Token> {
        // stream records
        if let Some(rest) = line.strip_prefix('~') {
            return Some(self.classify_console(&unquote_stream(rest)));
        }
        if let Some(rest) = line.strip_prefix('@') {
            return Some(Token::ProgramOutput(unquote_stream(rest)));
        }
        if let Some(rest) = line.strip_prefix('&') {
            return Some(Token::ErrorOutput(unquote_stream(rest)));
        }

        // async records
        if line == "*running" || line.starts_with("*running,") {
            return Some(Token::ProgramRunning);
        }
        if let Some(rest) = line.strip_prefix("*stopped") {
            return Some(self.classify_stopped(rest));
        }
        if let Some(rest) = line.strip_prefix('=') {
            return self.classify_notify(rest);
        }

        // plain text the backend prints outside any structured record
        Some(self.classify_console(&format!("{}\n", line)))
    }

    /// Console text carries several load-bearing phrases; everything else
    /// is program output.
    fn classify_console(&mut self, text: &str) -> Token {
        let trimmed = text.trim_end();

        if let Some(caps) = self.re_reading_symbols.captures(trimmed) {
            return Token::SymbolsLoaded {
                program: Some(caps[1].to_string()),
            };
        }
        if trimmed.contains("no debugging symbols found") {
            return Token::NoSymbols {
                text: text.to_string(),
            };
        }
        if trimmed.starts_with("Load new symbol table") || trimmed.contains("Re-reading symbols")
        {
            return Token::SymbolsReloaded;
        }
        if trimmed.starts_with("Core was generated by") {
            return Token::CoreChanged;
        }
        if let Some(caps) = self.re_attached.captures(trimmed) {
            return Token::AttachedToProcess {
                pid: caps[1].parse().unwrap_or(0),
            };
        }
        if trimmed.starts_with("Detaching from") {
            return Token::DetachingFromProcess;
        }
        if trimmed.starts_with("Starting program:") {
            return Token::ProgramStarting;
        }
        if let Some(caps) = self.re_inferior_exit.captures(trimmed) {
            return Token::ProgramFinished {
                text: Some(format!("Program exited{}\n", &caps[1])),
            };
        }
        if trimmed.starts_with("Kill the program being debugged") {
            return Token::ProgramKilled;
        }

        Token::ProgramOutput(text.to_string())
    }

    fn classify_stopped(&mut self, rest: &str) -> Token {
        let body = rest.strip_prefix(',').unwrap_or("");
        if body.is_empty() {
            return Token::ProgramStopped {
                location: None,
                text: None,
            };
        }

        let record = format!("{}}}", body);
        let mut cur = RecordCursor::new(&record);
        match parse_map(&mut cur) {
            Ok(map) => {
                if map.get("reason").and_then(Value::as_text) == Some("exited-normally") {
                    return Token::ProgramFinished { text: None };
                }
                let location = map.get("frame").and_then(Value::as_map).and_then(|frame| {
                    let file = frame
                        .get("fullname")
                        .or_else(|| frame.get("file"))
                        .and_then(Value::as_text)?;
                    let line = frame.get("line").and_then(Value::as_text)?.parse().ok()?;
                    Some(Location::line(file, line))
                });
                Token::ProgramStopped {
                    location,
                    text: None,
                }
            }
            Err(err) => {
                debug!(%err, "malformed stop record");
                Token::ProgramStopped {
                    location: None,
                    text: None,
                }
            }
        }
    }

    fn classify_notify(&mut self, rest: &str) -> Option<Token> {
        let class = rest.split(',').next().unwrap_or(rest);
        match class {
            "breakpoint-created" | "breakpoint-modified" | "breakpoint-deleted" => {
                Some(Token::BreakpointsChanged)
            }
            "thread-selected" => Some(Token::ThreadChanged),
            "thread-created" | "thread-exited" => Some(Token::ThreadChanged),
            "thread-group-started" => {
                let pid = self
                    .re_thread_group_started
                    .captures(rest)
                    .and_then(|c| c[1].parse().ok())
                    .unwrap_or(0);
                Some(Token::ProgramPid(pid))
            }
            "thread-group-exited" => Some(Token::ProgramFinished { text: None }),
            "library-loaded" | "library-unloaded" => Some(Token::PrepareToLoadSymbols),
            "cmd-param-changed" | "memory-changed" => Some(Token::ValueChanged),
            _ => {
                debug!(class, "ignoring notify record");
                None
            }
        }
    }
}

fn tagged_id(rest: &str, tag: &str) -> Option<u64> {
    rest.strip_prefix(tag)?
        .strip_suffix(':')?
        .parse()
        .ok()
}

/// Stream records quote their content as a C string.
fn unquote_stream(rest: &str) -> String {
    let inner = rest
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(rest);
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
