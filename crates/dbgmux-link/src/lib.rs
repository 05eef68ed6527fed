//! Command dispatch and correlation core
//!
//! This crate is the backend-agnostic half of the link layer:
//!
//! - [`command`] - the unit of work: payload, lifecycle state, finish hooks
//! - [`dispatcher`] - transaction IDs, foreground/background queues, the
//!   queue-advance algorithm, and reply correlation
//! - [`bus`] - the typed broadcast channel every state change crosses
//! - [`breakpoints`] - the reconciliation state machine that keeps the
//!   client-visible breakpoint list consistent with backend-reported state
//!   across restarts
//! - [`files`] - the session-scoped file-name resolution cache
//! - [`link`] - the `DebuggerLink` capability trait the adapters implement
//!
//! The concrete protocol adapters live in `dbgmux-backends`; they embed a
//! [`dispatcher::Dispatcher`] and drive it from their input loops.

pub mod breakpoints;
pub mod bus;
pub mod command;
pub mod dispatcher;
pub mod files;
pub mod link;
pub mod transport;

pub use breakpoints::{BreakpointDirective, BreakpointManager};
pub use bus::EventBus;
pub use command::{
    simple, Command, CommandOutput, CommandState, Disposition, FinishCtx, FnCommand, IdSizes,
    Payload, SessionNote,
};
pub use dispatcher::{Dispatcher, FinishResult, SendCaps, Transmission};
pub use files::FileNameCache;
pub use link::{DebuggerLink, FeatureSet};
pub use transport::Transport;
