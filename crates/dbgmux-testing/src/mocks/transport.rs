//! In-memory transport with a scriptable far end
//!
//! The link side gets a regular [`dbgmux_backends::Transport`]; the test
//! keeps the [`MockBackend`] handle and plays the debugger: emit scripted
//! output, drain and assert on what the link wrote.

use dbgmux_backends::{StreamTransport, Transport};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

const DRAIN_POLL: Duration = Duration::from_millis(20);

pub struct MockBackend {
    reader: ReadHalf<DuplexStream>,
    writer: Option<WriteHalf<DuplexStream>>,
}

/// Build a connected (transport, backend) pair.
pub fn mock_transport() -> (Box<dyn Transport>, MockBackend) {
    let (ours, theirs) = tokio::io::duplex(1 << 20);
    let (link_read, link_write) = tokio::io::split(ours);
    let (backend_read, backend_write) = tokio::io::split(theirs);
    (
        Box::new(StreamTransport::new(link_read, link_write)),
        MockBackend {
            reader: backend_read,
            writer: Some(backend_write),
        },
    )
}

impl MockBackend {
    /// Script one chunk of backend output.
    pub async fn emit(&mut self, data: impl AsRef<[u8]>) {
        self.writer
            .as_mut()
            .expect("backend already closed")
            .write_all(data.as_ref())
            .await
            .expect("mock write");
    }

    /// Script a NUL-terminated message (XML-protocol convenience).
    pub async fn emit_message(&mut self, text: &str) {
        self.emit(text).await;
        self.emit([0u8]).await;
    }

    /// Simulate a backend crash: the link's next read returns EOF.
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
    }

    /// Everything the link wrote since the last drain, as text.
    pub async fn drain_text(&mut self) -> String {
        String::from_utf8_lossy(&self.drain_bytes().await).into_owned()
    }

    /// Everything the link wrote since the last drain, raw.
    pub async fn drain_bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match tokio::time::timeout(DRAIN_POLL, self.reader.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => out.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_drain() {
        let (mut transport, mut backend) = mock_transport();
        backend.emit("hello").await;

        let mut buf = [0u8; 16];
        let n = transport.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        transport.write_all(b"reply").await.unwrap();
        assert_eq!(backend.drain_text().await, "reply");
    }

    #[tokio::test]
    async fn test_close_yields_eof() {
        let (mut transport, mut backend) = mock_transport();
        backend.close().await;
        let mut buf = [0u8; 16];
        assert_eq!(transport.read(&mut buf).await.unwrap(), 0);
    }
}
