//! Protocol adapters for dbgmux
//!
//! Four backend families, one contract ([`dbgmux_link::DebuggerLink`]):
//!
//! - [`mi`] - line-oriented MI protocol with echo-sentinel correlation
//! - [`native`] - API-native engine behind a capability trait
//! - [`jdwp`] - length-prefixed binary VM protocol
//! - [`xdebug`] - NUL-delimited XML-document-per-message protocol
//!
//! Each adapter owns its transport stream exclusively; every write goes
//! through the adapter's `send_raw` choke point so output broadcasting and
//! busy-state tracking stay consistent.

pub mod factory;
pub mod jdwp;
pub mod mi;
pub mod native;
pub mod transport;
pub mod xdebug;

pub use factory::{create_link, BackendKind};
pub use transport::{StreamTransport, Transport};
