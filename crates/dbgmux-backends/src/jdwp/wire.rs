//! Frame codec for the binary VM protocol
//!
//! Connection setup is a 14-byte handshake each side echoes verbatim.
//! After that, every message is a frame:
//!
//! ```text
//! +--------+--------+-------+---------+---------+---------
//! | length |   id   | flags | cmd-set | command | payload
//! |  4B BE |  4B BE |  1B   |   1B    |   1B    |  ...
//! +--------+--------+-------+---------+---------+---------
//! ```
//!
//! `length` includes the header. Flags bit 0x80 marks a reply; on replies
//! the cmd-set/command bytes instead hold a 2-byte big-endian error code.

use bytes::{Buf, BytesMut};
use dbgmux_core::{Error, Result};

pub const HANDSHAKE: &[u8] = b"JDWP-Handshake";
pub const HEADER_LEN: usize = 11;
const REPLY_FLAG: u8 = 0x80;

// command sets
pub const SET_VIRTUAL_MACHINE: u8 = 1;
pub const SET_THREAD_REFERENCE: u8 = 11;
pub const SET_THREAD_GROUP_REFERENCE: u8 = 12;
pub const SET_EVENT_REQUEST: u8 = 15;
pub const SET_EVENT: u8 = 64;

// VirtualMachine commands
pub const VM_ALL_THREADS: u8 = 4;
pub const VM_TOP_LEVEL_THREAD_GROUPS: u8 = 5;
pub const VM_ID_SIZES: u8 = 7;
pub const VM_SUSPEND: u8 = 8;
pub const VM_RESUME: u8 = 9;
pub const VM_EXIT: u8 = 10;

// ThreadReference commands
pub const THREAD_NAME: u8 = 1;
pub const THREAD_GROUP: u8 = 5;
pub const THREAD_FRAMES: u8 = 6;

// ThreadGroupReference commands
pub const THREAD_GROUP_NAME: u8 = 1;
pub const THREAD_GROUP_PARENT: u8 = 2;

// EventRequest commands
pub const EVENT_REQUEST_SET: u8 = 1;
pub const EVENT_REQUEST_CLEAR: u8 = 2;
pub const EVENT_REQUEST_CLEAR_ALL_BREAKPOINTS: u8 = 3;

// Event commands
pub const EVENT_COMPOSITE: u8 = 100;

// event kinds inside a composite event
pub const EVENT_BREAKPOINT: u8 = 2;
pub const EVENT_THREAD_START: u8 = 6;
pub const EVENT_THREAD_DEATH: u8 = 7;
pub const EVENT_CLASS_UNLOAD: u8 = 9;
pub const EVENT_VM_START: u8 = 90;
pub const EVENT_VM_DEATH: u8 = 99;

/// Suspend-all policy for event requests.
pub const SUSPEND_ALL: u8 = 2;

/// VM unavailable: the session is over.
pub const ERROR_VM_DEAD: u16 = 112;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Reply { error_code: u16 },
    Command { command_set: u8, command: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub kind: FrameKind,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn is_reply(&self) -> bool {
        matches!(self.kind, FrameKind::Reply { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedItem {
    /// The peer's handshake echo arrived; frames follow.
    Handshake,
    Frame(Frame),
}

/// Incremental frame decoder. Partial input stays buffered; feed more bytes
/// and poll again.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
    handshake_done: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.handshake_done = false;
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn next(&mut self) -> Result<Option<DecodedItem>> {
        if !self.handshake_done {
            if self.buf.len() < HANDSHAKE.len() {
                return Ok(None);
            }
            if &self.buf[..HANDSHAKE.len()] != HANDSHAKE {
                return Err(Error::Protocol("bad handshake from VM".to_string()));
            }
            self.buf.advance(HANDSHAKE.len());
            self.handshake_done = true;
            return Ok(Some(DecodedItem::Handshake));
        }

        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let length = unpack4(&self.buf[0..4]) as usize;
        if length < HEADER_LEN {
            return Err(Error::Protocol(format!("frame length {} too small", length)));
        }
        if self.buf.len() < length {
            return Ok(None);
        }

        let id = unpack4(&self.buf[4..8]);
        let flags = self.buf[8];
        let kind = if flags & REPLY_FLAG != 0 {
            FrameKind::Reply {
                error_code: unpack2(&self.buf[9..11]) as u16,
            }
        } else {
            FrameKind::Command {
                command_set: self.buf[9],
                command: self.buf[10],
            }
        };
        let data = self.buf[HEADER_LEN..length].to_vec();
        self.buf.advance(length);

        Ok(Some(DecodedItem::Frame(Frame { id, kind, data })))
    }
}

/// Encode one outgoing command frame.
pub fn encode_command(id: u32, command_set: u8, command: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + data.len());
    out.extend_from_slice(&pack4((HEADER_LEN + data.len()) as u32));
    out.extend_from_slice(&pack4(id));
    out.push(0); // flags
    out.push(command_set);
    out.push(command);
    out.extend_from_slice(data);
    out
}

// big-endian integer packing, the sizes the protocol actually uses

pub fn pack2(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

pub fn pack4(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn pack8(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

pub fn unpack2(data: &[u8]) -> u32 {
    u16::from_be_bytes([data[0], data[1]]) as u32
}

pub fn unpack4(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

pub fn unpack8(data: &[u8]) -> u64 {
    u64::from_be_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])
}

/// Pack an ID using the negotiated size (2, 4, or 8 bytes).
pub fn pack_id(size: usize, value: u64, out: &mut Vec<u8>) {
    match size {
        2 => out.extend_from_slice(&pack2(value as u16)),
        4 => out.extend_from_slice(&pack4(value as u32)),
        _ => out.extend_from_slice(&pack8(value)),
    }
}

/// Unpack an ID of the negotiated size from the front of `data`.
pub fn unpack_id(size: usize, data: &[u8]) -> Result<u64> {
    if data.len() < size {
        return Err(Error::Protocol("truncated id field".to_string()));
    }
    Ok(match size {
        2 => unpack2(data) as u64,
        4 => unpack4(data) as u64,
        _ => unpack8(data),
    })
}

/// Strings are a 4-byte length followed by UTF-8 bytes.
pub fn unpack_string(data: &[u8]) -> Result<(String, usize)> {
    if data.len() < 4 {
        return Err(Error::Protocol("truncated string length".to_string()));
    }
    let len = unpack4(&data[0..4]) as usize;
    if data.len() < 4 + len {
        return Err(Error::Protocol("truncated string body".to_string()));
    }
    let text = std::str::from_utf8(&data[4..4 + len])?.to_string();
    Ok((text, 4 + len))
}

pub fn pack_string(text: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&pack4(text.len() as u32));
    out.extend_from_slice(text.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshaken() -> Decoder {
        let mut d = Decoder::new();
        d.feed(HANDSHAKE);
        assert_eq!(d.next().unwrap(), Some(DecodedItem::Handshake));
        d
    }

    #[test]
    fn test_handshake_must_come_first() {
        let mut d = Decoder::new();
        d.feed(b"HTTP/1.1 200 OK");
        assert!(d.next().is_err());
    }

    #[test]
    fn test_handshake_partial() {
        let mut d = Decoder::new();
        d.feed(&HANDSHAKE[..5]);
        assert_eq!(d.next().unwrap(), None);
        d.feed(&HANDSHAKE[5..]);
        assert_eq!(d.next().unwrap(), Some(DecodedItem::Handshake));
    }

    #[test]
    fn test_command_frame_round_trip() {
        let mut d = handshaken();
        let encoded = encode_command(7, SET_VIRTUAL_MACHINE, VM_ID_SIZES, &[1, 2, 3]);
        assert_eq!(encoded.len(), HEADER_LEN + 3);
        assert_eq!(unpack4(&encoded[0..4]) as usize, encoded.len());

        d.feed(&encoded);
        // an outgoing command parsed back reads as a command frame
        let DecodedItem::Frame(frame) = d.next().unwrap().unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.id, 7);
        assert_eq!(
            frame.kind,
            FrameKind::Command {
                command_set: SET_VIRTUAL_MACHINE,
                command: VM_ID_SIZES
            }
        );
        assert_eq!(frame.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_reply_frame_error_code() {
        let mut d = handshaken();
        let mut frame = Vec::new();
        frame.extend_from_slice(&pack4(HEADER_LEN as u32 + 1));
        frame.extend_from_slice(&pack4(42));
        frame.push(0x80);
        frame.extend_from_slice(&pack2(ERROR_VM_DEAD));
        frame.push(0xFF);

        d.feed(&frame);
        let DecodedItem::Frame(frame) = d.next().unwrap().unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.id, 42);
        assert_eq!(
            frame.kind,
            FrameKind::Reply {
                error_code: ERROR_VM_DEAD
            }
        );
        assert_eq!(frame.data, vec![0xFF]);
    }

    #[test]
    fn test_partial_frame_buffers() {
        let mut d = handshaken();
        let encoded = encode_command(1, SET_EVENT, EVENT_COMPOSITE, &[9; 20]);
        d.feed(&encoded[..HEADER_LEN + 4]);
        assert_eq!(d.next().unwrap(), None);
        d.feed(&encoded[HEADER_LEN + 4..]);
        assert!(matches!(d.next().unwrap(), Some(DecodedItem::Frame(_))));
    }

    #[test]
    fn test_two_frames_in_one_feed() {
        let mut d = handshaken();
        let mut bytes = encode_command(1, SET_VIRTUAL_MACHINE, VM_SUSPEND, &[]);
        bytes.extend(encode_command(2, SET_VIRTUAL_MACHINE, VM_RESUME, &[]));
        d.feed(&bytes);

        let DecodedItem::Frame(a) = d.next().unwrap().unwrap() else {
            panic!()
        };
        let DecodedItem::Frame(b) = d.next().unwrap().unwrap() else {
            panic!()
        };
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(d.next().unwrap(), None);
    }

    #[test]
    fn test_undersized_length_is_an_error() {
        let mut d = handshaken();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&pack4(3));
        bytes.extend_from_slice(&[0; 7]);
        d.feed(&bytes);
        assert!(d.next().is_err());
    }

    #[test]
    fn test_variable_id_sizes() {
        let mut out = Vec::new();
        pack_id(8, 0xDEAD_BEEF_CAFE, &mut out);
        assert_eq!(unpack_id(8, &out).unwrap(), 0xDEAD_BEEF_CAFE);

        let mut out = Vec::new();
        pack_id(4, 0x1234, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(unpack_id(4, &out).unwrap(), 0x1234);

        assert!(unpack_id(8, &[0, 1]).is_err());
    }

    #[test]
    fn test_string_packing() {
        let mut out = Vec::new();
        pack_string("main", &mut out);
        let (text, consumed) = unpack_string(&out).unwrap();
        assert_eq!(text, "main");
        assert_eq!(consumed, 8);

        assert!(unpack_string(&[0, 0, 0, 9, b'x']).is_err());
    }
}
