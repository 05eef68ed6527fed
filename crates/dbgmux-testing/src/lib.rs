//! Test utilities for dbgmux
//!
//! This crate provides mocks, fixtures, and helpers for testing the link
//! layer and the protocol adapters without real debugger processes.
//!
//! # Mocks
//!
//! - [`MockBackend`] - the far end of an in-memory byte stream: scripts
//!   backend output, captures everything the link writes
//! - [`mock_transport`] - builds the (transport, backend handle) pair
//!
//! # Helpers
//!
//! - [`EventCollector`] - drains a link's broadcast subscription into a Vec
//! - [`fixtures`] - canned wire samples for all three remote protocols

pub mod collector;
pub mod fixtures;
mod mocks;

pub use collector::EventCollector;
pub use mocks::{mock_transport, MockBackend};
