//! Byte-stream transport abstraction
//!
//! Adapters treat their backend connection as an abstract bidirectional
//! byte stream; process spawning and socket plumbing stay outside the
//! core. The owner establishes the stream and hands it over; after a
//! backend crash it establishes a fresh one and swaps it in through
//! [`crate::DebuggerLink::replace_transport`].

use async_trait::async_trait;
use dbgmux_core::Result;

/// One backend connection. Reads return 0 bytes at end-of-stream, which
/// the adapters treat as a backend crash.
#[async_trait]
pub trait Transport: Send {
    /// Wait for input and read what is available.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer.
    async fn write_all(&mut self, buf: &[u8]) -> Result<()>;
}
