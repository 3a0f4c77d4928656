//! Unsolicited server notifications.
//!
//! An event is an [`IncomingMessage`] whose `Event` field names what
//! happened.  Events answering a list action carry the action's `ActionID`
//! and are folded into that action's [`ResponseMessage`] by the list
//! aggregator; all other events go to the registered listeners.
//!
//! [`ResponseMessage`]: crate::protocol::ResponseMessage

use std::ops::Deref;

use crate::protocol::incoming::IncomingMessage;

/// Name of the event synthesized for list trailers that arrive without a
/// header of their own.
pub const RESPONSE_EVENT: &str = "ResponseEvent";

/// Known event types.  Unknown names are kept verbatim in [`EventKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    DialBegin,
    DeviceStateChange,
    Cdr,
    QueueCallerAbandon,
    OriginateResponse,
    DbGetResponse,
    ResponseEvent,
    Other(String),
}

impl EventKind {
    /// Maps an `Event` field value to its kind, case-insensitively.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "dialbegin" => EventKind::DialBegin,
            "devicestatechange" => EventKind::DeviceStateChange,
            "cdr" => EventKind::Cdr,
            "queuecallerabandon" => EventKind::QueueCallerAbandon,
            "originateresponse" => EventKind::OriginateResponse,
            "dbgetresponse" => EventKind::DbGetResponse,
            "responseevent" => EventKind::ResponseEvent,
            _ => EventKind::Other(name.to_string()),
        }
    }

    /// Field names the event type is documented to carry (lower-case).
    ///
    /// `Other` events have no schema and return an empty slice.
    pub fn message_keys(&self) -> &'static [&'static str] {
        match self {
            EventKind::DialBegin => &[
                "privilege",
                "channel",
                "calleridnum",
                "accountcode",
                "uniqueid",
                "destchannel",
                "destuniqueid",
                "dialstring",
            ],
            EventKind::DeviceStateChange => &["device", "state"],
            EventKind::Cdr => &[
                "privilege",
                "accountcode",
                "source",
                "destination",
                "destinationcontext",
                "calleridnum",
                "callerid",
                "channel",
                "destinationchannel",
                "lastapplication",
                "lastdata",
                "starttime",
                "answertime",
                "endtime",
                "duration",
                "billableseconds",
                "disposition",
                "amaflags",
                "uniqueid",
                "userfield",
            ],
            EventKind::QueueCallerAbandon => &[
                "privilege",
                "channel",
                "channelstate",
                "channelstatedesc",
                "calleridnum",
                "calleridname",
                "connectedlinenum",
                "connectedlinename",
                "language",
                "accountcode",
                "context",
                "exten",
                "priority",
                "uniqueid",
                "queue",
                "position",
                "holdtime",
                "originalposition",
            ],
            EventKind::OriginateResponse => &[
                "privilege",
                "exten",
                "context",
                "channel",
                "reason",
                "uniqueid",
                "response",
                "calleridnum",
                "calleridname",
            ],
            EventKind::DbGetResponse => &["family", "key", "val"],
            EventKind::ResponseEvent | EventKind::Other(_) => &[],
        }
    }
}

/// An event received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    message: IncomingMessage,
}

impl EventMessage {
    /// Parses one raw event frame.
    pub fn parse(raw: &str) -> Self {
        Self {
            message: IncomingMessage::parse(raw),
        }
    }

    /// The logical event name (`Event` field), or `""` when absent.
    pub fn name(&self) -> &str {
        self.message.key("event").unwrap_or_default()
    }

    /// The event type.
    pub fn kind(&self) -> EventKind {
        EventKind::from_name(self.name())
    }

    /// `true` when the event's name equals `name`, ignoring case.
    pub fn is(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
    }

    /// Returns the `Privilege` key.
    pub fn privilege(&self) -> Option<&str> {
        self.message.key("privilege")
    }

    /// Returns the `Channel` key.
    pub fn channel(&self) -> Option<&str> {
        self.message.key("channel")
    }

    /// Returns the `Uniqueid` key.
    pub fn unique_id(&self) -> Option<&str> {
        self.message.key("uniqueid")
    }

    /// Recognized fields of this event type that are present on the message.
    pub fn known_fields(&self) -> Vec<(&'static str, &str)> {
        self.kind()
            .message_keys()
            .iter()
            .filter_map(|name| self.message.key(name).map(|value| (*name, value)))
            .collect()
    }

    /// The underlying incoming message.
    pub fn message(&self) -> &IncomingMessage {
        &self.message
    }
}

impl Deref for EventMessage {
    type Target = IncomingMessage;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

impl From<IncomingMessage> for EventMessage {
    fn from(message: IncomingMessage) -> Self {
        Self { message }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_kind_from_event_field() {
        // Arrange / Act
        let event = EventMessage::parse("Event: DialBegin\r\nChannel: SIP/1\r\nDestChannel: SIP/2");

        // Assert
        assert_eq!(event.name(), "DialBegin");
        assert_eq!(event.kind(), EventKind::DialBegin);
        assert!(event.is("dialbegin"));
        assert_eq!(event.channel(), Some("SIP/1"));
    }

    #[test]
    fn test_unknown_event_kind_keeps_name() {
        let event = EventMessage::parse("Event: PeerEntry\r\nObjectName: 100");
        assert_eq!(event.kind(), EventKind::Other("PeerEntry".into()));
        assert!(event.kind().message_keys().is_empty());
    }

    #[test]
    fn test_missing_event_field_yields_empty_name() {
        let event = EventMessage::parse("Foo: bar");
        assert_eq!(event.name(), "");
    }

    #[test]
    fn test_known_fields_lists_present_schema_fields() {
        let event = EventMessage::parse("Event: DeviceStateChange\r\nDevice: SIP/100\r\nState: INUSE\r\nExtra: x");
        assert_eq!(
            event.known_fields(),
            vec![("device", "SIP/100"), ("state", "INUSE")]
        );
    }

    #[test]
    fn test_event_exposes_incoming_accessors_through_deref() {
        let event = EventMessage::parse("Event: CoreShowChannel\r\nActionID: 9\r\nEventList: Complete");
        assert_eq!(event.action_id(), Some("9"));
        assert_eq!(event.event_list(), Some("Complete"));
    }
}
