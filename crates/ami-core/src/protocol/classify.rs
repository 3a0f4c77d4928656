//! Frame classification.
//!
//! A frame is a response when `Response:` appears before any `Event:`, an
//! event when only (or first) `Event:` appears, and malformed when neither
//! marker is present.  The server produces malformed frames when it emits the
//! tail of a list without a fresh header; what happens to them is decided by
//! [`MalformedFramePolicy`].
//!
//! The markers are matched as literal, case-sensitive substrings anywhere in
//! the frame, not only at line starts.

use serde::{Deserialize, Serialize};

const RESPONSE_MARKER: &str = "Response:";
const EVENT_MARKER: &str = "Event:";

/// The kind of a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Response,
    Event,
    Malformed,
}

/// Classifies one raw frame.
///
/// # Examples
///
/// ```rust
/// use ami_core::protocol::{classify, FrameKind};
///
/// assert_eq!(classify("Response: Success\r\nActionID: 1"), FrameKind::Response);
/// assert_eq!(classify("Event: Hangup\r\nResponse: x"), FrameKind::Event);
/// assert_eq!(classify("Channel: SIP/1"), FrameKind::Malformed);
/// ```
pub fn classify(frame: &str) -> FrameKind {
    match (frame.find(RESPONSE_MARKER), frame.find(EVENT_MARKER)) {
        (Some(response), Some(event)) if response < event => FrameKind::Response,
        (Some(_), None) => FrameKind::Response,
        (_, Some(_)) => FrameKind::Event,
        (None, None) => FrameKind::Malformed,
    }
}

/// What the engine does with a frame classified as [`FrameKind::Malformed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedFramePolicy {
    /// Log the frame and discard it.
    #[default]
    Drop,
    /// Treat the frame as a child event of the last action sent on this
    /// connection, provided that action still has an open list.  Otherwise
    /// the frame is dropped.
    AttachToLastAction,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
