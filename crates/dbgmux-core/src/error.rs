//! Error types for the dbgmux core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Location errors
    #[error("Invalid location: {0}. Expected file:line")]
    InvalidLocation(String),

    // Protocol errors (malformed records, framing faults)
    #[error("Protocol error: {0}")]
    Protocol(String),

    // Transport errors (stream closed, connect refused)
    #[error("Transport error: {0}")]
    Transport(String),

    // Connection state errors
    #[error("Not connected: {0}")]
    NotConnected(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// True if this error means the backend session itself is unusable and a
    /// restart is the only recovery.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

// Error conversions
// Note: errors are stored as strings so the enum stays Clone + PartialEq,
// which the event bus and tests rely on.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Protocol(format!("Invalid UTF-8: {}", err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::Protocol(format!("Invalid UTF-8: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidLocation("main.c".to_string());
        assert_eq!(err.to_string(), "Invalid location: main.c. Expected file:line");
    }

    #[test]
    fn test_transport_is_fatal() {
        assert!(Error::Transport("closed".to_string()).is_fatal_to_session());
        assert!(!Error::Protocol("bad record".to_string()).is_fatal_to_session());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
