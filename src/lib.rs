//! Bridge between an interactive editor and a debugger engine whose API is
//! only safe to call from a single thread.
//!
//! The editor issues debugging commands (run, step, set breakpoint, inspect
//! frame) from its own threads while the engine asynchronously emits
//! state-change notifications. The bridge serializes every engine call onto
//! one dedicated worker thread: callers enqueue [`bridge::Operation`]s
//! through a [`bridge::Bridge`] handle and optionally block for the result,
//! the worker multiplexes queued commands with engine notifications on a
//! single wait primitive and decides when the editor's display needs
//! refreshing.
//!
//! The debugger engine, the editor host and the buffer renderer are
//! collaborators behind the trait boundaries in [`engine`] and [`host`].

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod log;

pub use bridge::{Bridge, Operation, Reply};
pub use config::BridgeConfig;
pub use error::Error;
pub use host::{BufferId, BreakpointId, EditorHost, MessageLevel, RefreshScope, Renderer};
