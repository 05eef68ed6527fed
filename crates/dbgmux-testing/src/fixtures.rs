//! Canned wire samples
//!
//! Small, real-shaped protocol fragments used across the test suites so
//! individual tests do not re-spell framing details.

use dbgmux_core::{Breakpoint, Location};

/// MI marker lines, matching what the adapter's echo commands produce.
pub mod mi {
    pub const PROMPT: &str = "(gdb) ";

    pub fn begin_command(id: u64) -> String {
        format!("\u{1a}\u{1a}:dbgmux nop command:{}:\n", id)
    }

    pub fn end_command(id: u64) -> String {
        format!("\u{1a}\u{1a}:dbgmux nop command done:{}:\n", id)
    }

    pub fn breakpoints_changed_marker() -> String {
        "\u{1a}\u{1a}:dbgmux breakpoints changed:\n".to_string()
    }

    pub fn reading_symbols(program: &str) -> String {
        format!("Reading symbols from {}...\n", program)
    }

    /// A one-entry breakpoint table reply, bracketed for transaction `id`.
    pub fn breakpoint_table_reply(id: u64, index: u32, file: &str, line: u32) -> String {
        format!(
            "{}^done,BreakpointTable={{nr_rows=\"1\",body=[bkpt={{number=\"{}\",\
             type=\"breakpoint\",disp=\"keep\",enabled=\"y\",func=\"main\",\
             file=\"{}\",fullname=\"{}\",line=\"{}\"}}]}}\n{}{}",
            begin_command(id),
            index,
            file,
            file,
            line,
            end_command(id),
            PROMPT
        )
    }

    /// An empty-table reply for transaction `id`.
    pub fn empty_breakpoint_table_reply(id: u64) -> String {
        format!(
            "{}^done,BreakpointTable={{nr_rows=\"0\",body=[]}}\n{}{}",
            begin_command(id),
            end_command(id),
            PROMPT
        )
    }

    pub fn stopped_at(file: &str, line: u32) -> String {
        format!(
            "*stopped,reason=\"breakpoint-hit\",frame={{func=\"main\",file=\"{}\",\
             fullname=\"{}\",line=\"{}\"}}\n",
            file, file, line
        )
    }
}

/// XML-protocol documents.
pub mod xdebug {
    pub fn init(idekey: &str, uri: &str) -> String {
        format!(r#"<init idekey="{}" fileuri="{}" language="PHP"/>"#, idekey, uri)
    }

    pub fn response_break(id: u64, uri: &str, line: u32) -> String {
        format!(
            r#"<response command="run" transaction_id="{}" status="break"><message filename="{}" lineno="{}"/></response>"#,
            id, uri, line
        )
    }
}

/// A confirmed line breakpoint.
pub fn confirmed_breakpoint(index: u32, file: &str, line: u32) -> Breakpoint {
    let mut bp = Breakpoint::pending(Location::line(file, line));
    bp.debugger_index = index;
    bp
}
