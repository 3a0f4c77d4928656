//! # ami-core
//!
//! Shared library for the Asterisk Manager Interface client: the text
//! message model, stream framing, frame classification and the correlation
//! state machines.
//!
//! This crate has no dependency on sockets or an async runtime.  The client
//! crate owns the connection and drives these types from its read loop.
//!
//! # Architecture overview
//!
//! The manager interface is a CRLF line protocol over one TCP connection.
//! The client sends *actions*; the server answers each with a *response*
//! carrying the action's `ActionID`, and also pushes unsolicited *events*.
//! Some actions are answered by a list: a head response followed by child
//! events and a closing event.
//!
//! - **`protocol`** – The message model (`Envelope`, `ActionMessage`,
//!   `IncomingMessage`, `ResponseMessage`, `EventMessage`), the
//!   `FrameSplitter` that cuts the byte stream into frames, and the
//!   `classify` rule that tells responses, events and malformed frames apart.
//!
//! - **`domain`** – The `Correlator` (pending calls keyed by `ActionID`), the
//!   `ListAggregator` (open list responses) and the `Dispatcher` (ordered
//!   event listeners).

pub mod domain;
pub mod protocol;

pub use domain::{
    CallError, CallOutcome, Continuation, Correlator, Dispatcher, EventSink, ListAggregator,
    Listener, ListenerError, ListenerId, Offer,
};
pub use protocol::{
    classify, Action, ActionId, ActionMessage, EventMessage, FrameKind, FrameSplitter,
    IncomingMessage, MalformedFramePolicy, ResponseMessage,
};
