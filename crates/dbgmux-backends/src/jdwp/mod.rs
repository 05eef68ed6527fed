//! Binary VM debug-wire adapter
//!
//! The backend is a virtual machine reached over a socket speaking a
//! length-prefixed binary protocol: an 11-byte header (4-byte big-endian
//! length including the header, 4-byte request ID, 1 flag byte, 1
//! command-set byte, 1 command byte) followed by the payload. Replies are
//! distinguished from VM-initiated command events by a flags bit; the
//! request ID on a reply is the transaction ID of the command it answers,
//! so no echo correlation is needed.

mod link;
mod registry;
mod wire;

pub use link::JdwpLink;
pub use registry::ClassRegistry;
pub use wire::{DecodedItem, Decoder, Frame, FrameKind};
