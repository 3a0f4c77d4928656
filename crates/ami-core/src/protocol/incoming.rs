//! Parsing of one delimited frame into an [`IncomingMessage`].
//!
//! Each CRLF-separated line is split on its first colon into a name and a
//! value, both trimmed.  Three kinds of line are recognized:
//!
//! - `Variable: name=value` lines feed the envelope's free variables.
//! - `ChanVariable(<channel>): name=value` lines feed the per-channel
//!   variable table under the lower-cased channel name, or under the
//!   [`DEFAULT_CHANNEL`] bucket when no channel is given.
//! - Everything else becomes a key.
//!
//! After the whole frame has been read, variables collected in the default
//! bucket are merged into the bucket of the message's own `Channel` field,
//! if it has one, and the default bucket is dropped.

use std::collections::HashMap;

use crate::protocol::message::{Envelope, EOL};

/// Bucket name for channel variables that name no channel.
pub const DEFAULT_CHANNEL: &str = "default";

const CHANVARIABLE_PREFIX: &str = "chanvariable";

/// Variables scoped to one channel, keyed by lower-cased variable name.
pub type ChannelVariables = HashMap<String, String>;

/// A message received from the server, parsed from one raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    envelope: Envelope,
    raw_content: String,
    channel_variables: HashMap<String, ChannelVariables>,
}

impl IncomingMessage {
    /// Parses `raw` (one frame, without the trailing empty line).
    ///
    /// Parsing never fails: lines without a colon become keys with an empty
    /// value and empty lines are skipped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ami_core::protocol::IncomingMessage;
    ///
    /// let msg = IncomingMessage::parse("Response: Success\r\nActionID: 7\r\nMessage: Pong");
    /// assert_eq!(msg.key("response"), Some("Success"));
    /// assert_eq!(msg.action_id(), Some("7"));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let mut envelope = Envelope::new();
        let mut channel_variables: HashMap<String, ChannelVariables> = HashMap::new();
        channel_variables.insert(DEFAULT_CHANNEL.to_string(), ChannelVariables::new());

        for line in raw.split(EOL) {
            if line.trim().is_empty() {
                continue;
            }
            let (name, value) = split_line(line);
            let lower = name.to_ascii_lowercase();

            if lower.starts_with(CHANVARIABLE_PREFIX) {
                let channel = channel_from_name(&lower).unwrap_or(DEFAULT_CHANNEL);
                let (var_name, var_value) = split_assignment(value);
                channel_variables
                    .entry(channel.to_string())
                    .or_default()
                    .insert(var_name.to_ascii_lowercase(), var_value.to_string());
            } else if lower == "variable" && value.contains('=') {
                let (var_name, var_value) = split_assignment(value);
                envelope.add_variable(var_name, var_value);
            } else {
                envelope.set_key(&lower, value);
            }
        }

        if let Some(channel) = envelope.key("channel").map(str::to_ascii_lowercase) {
            let defaults = channel_variables.remove(DEFAULT_CHANNEL).unwrap_or_default();
            channel_variables.entry(channel).or_default().extend(defaults);
        }

        Self {
            envelope,
            raw_content: raw.to_string(),
            channel_variables,
        }
    }

    /// Returns the value of key `name`, compared case-insensitively.
    pub fn key(&self, name: &str) -> Option<&str> {
        self.envelope.key(name)
    }

    /// The parsed envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Returns the `ActionID` key.
    pub fn action_id(&self) -> Option<&str> {
        self.envelope.action_id()
    }

    /// Sets the `ActionID` key.
    pub fn set_action_id(&mut self, id: &str) {
        self.envelope.set_key("ActionID", id);
    }

    /// Returns the `EventList` key: `"start"` on list heads, `"Complete"` on
    /// the event that closes a list.
    pub fn event_list(&self) -> Option<&str> {
        self.envelope.key("eventlist")
    }

    /// Returns the `Timestamp` key, present when the server has timestamps on.
    pub fn timestamp(&self) -> Option<&str> {
        self.envelope.key("timestamp")
    }

    /// The exact frame text as received.
    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// Channel variables of `channel`, or of the message's own channel when
    /// `channel` is `None` (the default bucket if it has no `Channel` key).
    pub fn channel_variables(&self, channel: Option<&str>) -> Option<&ChannelVariables> {
        let name = match channel {
            Some(name) => name.to_ascii_lowercase(),
            None => self
                .envelope
                .key("channel")
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
        };
        self.channel_variables.get(&name)
    }

    /// Channel variables of every reported channel, keyed by lower-cased name.
    pub fn all_channel_variables(&self) -> &HashMap<String, ChannelVariables> {
        &self.channel_variables
    }
}

/// Splits `name: value` on the first colon.  A line without a colon yields an
/// empty value.
fn split_line(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (line.trim(), ""),
    }
}

/// Splits `name=value` on the first `=`.
fn split_assignment(text: &str) -> (&str, &str) {
    match text.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (text.trim(), ""),
    }
}

/// Extracts `chan` from `chanvariable(chan)`.
fn channel_from_name(name: &str) -> Option<&str> {
    let open = name.find('(')?;
    let close = name[open + 1..].find(')')? + open + 1;
    Some(&name[open + 1..close])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
