//! Mock implementations for tests

mod transport;

pub use transport::{mock_transport, MockBackend};
