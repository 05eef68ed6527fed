//! MI line-protocol adapter
//!
//! The backend speaks a line-oriented machine-interface dialect on a plain
//! text stream that also carries debuggee output. Correlation is
//! echo-based: the adapter brackets every command with marker lines
//! carrying the transaction ID, so interleaved asynchronous output can be
//! attributed unambiguously. The markers are intrinsic to this wire
//! protocol, not an implementation accident, and stay isolated inside this
//! module.

mod link;
mod parse;
mod records;
mod scanner;

pub use link::MiLink;
pub use records::{parse_map, parse_map_list, parse_value, RecordCursor, Value};
pub use scanner::{Scanner, Token};

/// Every marker line starts with two SUB bytes; debuggee output cannot
/// plausibly collide with it.
pub(crate) const MARKER_PREFIX: &str = "\u{1a}\u{1a}:dbgmux ";

pub(crate) fn begin_marker(id: u64, ignore: bool) -> String {
    if ignore {
        format!("{}nop command:{}:", MARKER_PREFIX, id)
    } else {
        format!("{}command:{}:", MARKER_PREFIX, id)
    }
}

pub(crate) fn end_marker(id: u64, ignore: bool) -> String {
    if ignore {
        format!("{}nop command done:{}:", MARKER_PREFIX, id)
    } else {
        format!("{}command done:{}:", MARKER_PREFIX, id)
    }
}

pub(crate) fn ready_marker(ping_id: u64) -> String {
    format!("{}debugger ready:{}:", MARKER_PREFIX, ping_id)
}

/// The `echo` command that makes the backend print a marker line. The
/// backend interprets `\032` as the SUB byte.
pub(crate) fn echo_of(marker: &str) -> String {
    format!(
        "echo {}\\n\n",
        marker.replace('\u{1a}', "\\032")
    )
}
