//! Protocol module: the text message model, stream framing and frame
//! classification.

pub mod action;
pub mod banner;
pub mod classify;
pub mod event;
pub mod framing;
pub mod incoming;
pub mod message;
pub mod response;

pub use action::{
    Action, ActionId, ActionMessage, CommandAction, CoreShowChannelsAction, DbGetAction,
    GetVarAction, LoginAction, LogoffAction, OriginateAction, PingAction, SetVarAction,
    SipShowPeerAction, StatusAction, ValidationError, MAX_ACTION_ID_LEN,
};
pub use banner::ManagerBanner;
pub use classify::{classify, FrameKind, MalformedFramePolicy};
pub use event::{EventKind, EventMessage, RESPONSE_EVENT};
pub use framing::{FrameSplitter, FramingError, DEFAULT_MAX_BUFFERED_BYTES};
pub use incoming::{ChannelVariables, IncomingMessage, DEFAULT_CHANNEL};
pub use message::{Envelope, VariableValue, EOL, EOM};
pub use response::{ResponseMessage, DB_GET_RESPONSE};
