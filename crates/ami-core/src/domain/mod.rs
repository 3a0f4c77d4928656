//! Protocol state machines: call correlation, list aggregation and event
//! dispatch.
//!
//! Nothing here touches a socket.  The client engine feeds parsed messages
//! in and decides what to do with the results, which keeps every rule here
//! testable without a server.

pub mod aggregator;
pub mod correlator;
pub mod dispatcher;
pub mod sequence;

pub use aggregator::{ListAggregator, Offer};
pub use correlator::{CallError, CallOutcome, Continuation, CorrelationError, Correlator};
pub use dispatcher::{
    DispatchReport, Dispatcher, EventPredicate, EventSink, Listener, ListenerError,
};
pub use sequence::{ListenerId, SequenceCounter};
