//! Concrete transport over async I/O pairs
//!
//! The [`Transport`] trait itself lives in `dbgmux-link`; this module
//! provides the implementation everything real uses. Anything satisfying
//! `AsyncRead + AsyncWrite` plugs in: a child process's pipes, a TCP
//! socket, or an in-memory duplex in tests.

use async_trait::async_trait;
use dbgmux_core::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use dbgmux_link::Transport;

/// Transport over any split read/write pair.
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader
            .read(buf)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.writer
            .write_all(buf)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(256);
        let (cr, cw) = tokio::io::split(client);
        let (sr, sw) = tokio::io::split(server);
        let mut a = StreamTransport::new(cr, cw);
        let mut b = StreamTransport::new(sr, sw);

        a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[tokio::test]
    async fn test_eof_reads_zero() {
        let (client, server) = tokio::io::duplex(16);
        let (sr, sw) = tokio::io::split(server);
        drop(client);
        let mut t = StreamTransport::new(sr, sw);
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).await.unwrap(), 0);
    }
}
