//! API-native adapter
//!
//! This backend family is a debugger library linked (or bridged) into the
//! process: requests are synchronous calls, asynchronous state changes
//! arrive on a callback channel, and there is no wire format at all.
//! Commands still flow through the dispatcher so ordering, transaction IDs,
//! and cancellation behave exactly like the remote backends; they simply
//! complete before the transmit call returns.

mod engine;
mod link;

pub use engine::{EngineEvent, NativeEngine};
pub use link::NativeLink;
