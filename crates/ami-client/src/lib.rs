//! ami-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The client keeps one TCP connection to a PBX manager interface open:
//!
//! 1. Connects, checks the greeting line and logs in.
//! 2. Writes actions, each tagged with a unique `ActionID`, from any task.
//! 3. Reads the socket on one task, matches responses back to their
//!    actions, folds list responses with their child events, and hands
//!    every other event to registered listeners.

/// Application layer: the client engine and the transport ports it drives.
pub mod application;

/// Infrastructure layer: TCP transport and configuration file.
pub mod infrastructure;

pub use application::engine::{
    AmiClient, ClientError, ConnectionState, EngineOptions, ProcessReport,
};
