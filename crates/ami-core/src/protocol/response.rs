//! Direct replies to an action.
//!
//! Most actions get exactly one response.  List actions (`Status`,
//! `CoreShowChannels`, `SIPpeers`, ...) get a *list head* response followed by
//! one event per item and a closing event.  A list head is recognized by
//! `EventList: start` or by a `Message` such as `"Channel status will
//! follow"`.  Such a response starts incomplete and collects child events
//! through [`ResponseMessage::add_event`] until one of them closes the list.
//!
//! Completion is one-way: once a response is complete it stays complete.

use std::ops::Deref;

use crate::protocol::event::EventMessage;
use crate::protocol::incoming::IncomingMessage;

/// Event name that closes a `DBGet` list without an `EventList` marker.
pub const DB_GET_RESPONSE: &str = "DBGetResponse";

/// A response, possibly aggregating the child events of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    message: IncomingMessage,
    events: Vec<EventMessage>,
    completed: bool,
}

impl ResponseMessage {
    /// Parses one raw response frame.
    pub fn parse(raw: &str) -> Self {
        IncomingMessage::parse(raw).into()
    }

    /// `true` when this response heads a list of events.
    pub fn is_list(&self) -> bool {
        contains_ignore_case(self.message.event_list(), "start")
            || contains_ignore_case(self.message(), "follow")
    }

    /// `true` when the response needs no further events.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// `true` unless the `Response` field mentions `error`.
    pub fn is_success(&self) -> bool {
        !contains_ignore_case(self.message.key("response"), "error")
    }

    /// Returns the `Message` key.
    pub fn message(&self) -> Option<&str> {
        self.message.key("message")
    }

    /// Appends a child event; completes the response when the event closes
    /// the list.
    pub fn add_event(&mut self, event: EventMessage) {
        if closes_list(&event) {
            self.completed = true;
        }
        self.events.push(event);
    }

    /// Child events collected so far, in arrival order.
    pub fn events(&self) -> &[EventMessage] {
        &self.events
    }

    /// Consumes the response, returning its child events.
    pub fn into_events(self) -> Vec<EventMessage> {
        self.events
    }

    /// The response's own incoming message.
    pub fn incoming(&self) -> &IncomingMessage {
        &self.message
    }

    /// Mutable access to the response's own incoming message.
    pub fn incoming_mut(&mut self) -> &mut IncomingMessage {
        &mut self.message
    }
}

impl From<IncomingMessage> for ResponseMessage {
    fn from(message: IncomingMessage) -> Self {
        let mut response = Self {
            message,
            events: Vec::new(),
            completed: false,
        };
        response.completed = !response.is_list();
        response
    }
}

impl Deref for ResponseMessage {
    type Target = IncomingMessage;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

fn closes_list(event: &EventMessage) -> bool {
    contains_ignore_case(event.event_list(), "complete")
        || contains_ignore_case(Some(event.name()), "complete")
        || contains_ignore_case(Some(event.name()), DB_GET_RESPONSE)
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()))
        .unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: &str) -> EventMessage {
        EventMessage::parse(raw)
    }

    #[test]
    fn test_plain_response_is_complete_on_construction() {
        let response = ResponseMessage::parse("Response: Success\r\nActionID: 1\r\nPing: Pong");
        assert!(!response.is_list());
        assert!(response.is_complete());
    }

    #[test]
    fn test_eventlist_start_makes_response_incomplete() {
        // Arrange / Act
        let response = ResponseMessage::parse(
            "Response: Success\r\nActionID: 1\r\nEventList: start\r\nMessage: Channels will follow",
        );

        // Assert
        assert!(response.is_list());
        assert!(!response.is_complete());
    }

    #[test]
    fn test_message_follow_alone_marks_a_list() {
        let response = ResponseMessage::parse("Response: Success\r\nMessage: Channel status will follow");
        assert!(response.is_list());
    }

    #[test]
    fn test_eventlist_complete_child_completes_and_stays_complete() {
        // Arrange
        let mut response =
            ResponseMessage::parse("Response: Success\r\nActionID: 1\r\nEventList: start");

        // Act
        response.add_event(event("Event: CoreShowChannel\r\nActionID: 1"));
        let after_item = response.is_complete();
        response.add_event(event("Event: CoreShowChannelsComplete\r\nActionID: 1\r\nEventList: Complete"));
        let after_trailer = response.is_complete();
        response.add_event(event("Event: CoreShowChannel\r\nActionID: 1"));

        // Assert
        assert!(!after_item);
        assert!(after_trailer);
        assert!(response.is_complete());
        assert_eq!(response.events().len(), 3);
    }

    #[test]
    fn test_complete_in_event_name_closes_list() {
        let mut response = ResponseMessage::parse("Response: Success\r\nMessage: Channel status will follow");
        response.add_event(event("Event: StatusComplete\r\nItems: 0"));
        assert!(response.is_complete());
    }

    #[test]
    fn test_db_get_response_closes_list() {
        let mut response = ResponseMessage::parse("Response: Success\r\nMessage: Result will follow");
        response.add_event(event("Event: DBGetResponse\r\nFamily: f\r\nKey: k\r\nVal: v"));
        assert!(response.is_complete());
        assert_eq!(response.into_events()[0].key("val"), Some("v"));
    }

    #[test]
    fn test_is_success_detects_error_case_insensitively() {
        assert!(ResponseMessage::parse("Response: Success").is_success());
        assert!(!ResponseMessage::parse("Response: Error\r\nMessage: Authentication failed").is_success());
        assert!(!ResponseMessage::parse("Response: ERROR").is_success());
    }

    #[test]
    fn test_message_accessor_reads_message_key() {
        let response = ResponseMessage::parse("Response: Error\r\nMessage: Permission denied");
        assert_eq!(response.message(), Some("Permission denied"));
    }
}
