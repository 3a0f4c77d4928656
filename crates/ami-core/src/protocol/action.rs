//! Outgoing actions: the client-issued commands of the manager protocol.
//!
//! Every action carries an `Action` field naming the command and an
//! `ActionID` field the server echoes back on the matching response, which is
//! how responses are correlated to their requests on a shared connection.
//!
//! The identifier is opaque to the server but bounded: at most
//! [`MAX_ACTION_ID_LEN`] characters and never empty.  Both rules are enforced
//! when an [`ActionId`] is constructed, so an invalid identifier can never
//! reach the wire.

use std::borrow::Borrow;
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::message::Envelope;

/// Longest identifier the manager interface accepts.
pub const MAX_ACTION_ID_LEN: usize = 69;

/// Error raised when an action identifier is rejected at construction time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The identifier is the empty string.
    #[error("ActionID cannot be empty")]
    EmptyActionId,

    /// The identifier exceeds [`MAX_ACTION_ID_LEN`] characters.
    #[error("ActionID can be at most {max} characters long, got {len}")]
    ActionIdTooLong { len: usize, max: usize },
}

/// A validated action identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(String);

impl ActionId {
    /// Validates and wraps a caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `id` is empty or longer than
    /// [`MAX_ACTION_ID_LEN`] characters.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ami_core::protocol::ActionId;
    ///
    /// assert!(ActionId::new("call-1").is_ok());
    /// assert!(ActionId::new("").is_err());
    /// assert!(ActionId::new("x".repeat(70)).is_err());
    /// ```
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let len = id.chars().count();
        if len == 0 {
            return Err(ValidationError::EmptyActionId);
        }
        if len > MAX_ACTION_ID_LEN {
            return Err(ValidationError::ActionIdTooLong {
                len,
                max: MAX_ACTION_ID_LEN,
            });
        }
        Ok(Self(id))
    }

    /// Generates a fresh random identifier (32 lower-case hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ActionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ActionId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ActionId::new(value)
    }
}

/// An outgoing action ready to be serialized onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMessage {
    envelope: Envelope,
    id: ActionId,
}

impl ActionMessage {
    /// Creates an action named `name` with a freshly generated identifier.
    pub fn new(name: &str) -> Self {
        Self::with_action_id(name, ActionId::generate())
    }

    /// Creates an action named `name` with an explicit identifier.
    pub fn with_action_id(name: &str, id: ActionId) -> Self {
        let mut envelope = Envelope::new();
        envelope.set_key("Action", name);
        envelope.set_key("ActionID", id.as_str());
        Self { envelope, id }
    }

    /// Replaces the identifier.
    pub fn set_action_id(&mut self, id: ActionId) {
        self.envelope.set_key("ActionID", id.as_str());
        self.id = id;
    }

    /// Builder form of [`ActionMessage::set_action_id`].
    pub fn action_id_override(mut self, id: ActionId) -> Self {
        self.set_action_id(id);
        self
    }

    /// Builder: sets a key.  The `Action` and `ActionID` fields are managed by
    /// the message itself and cannot be changed through this method.
    pub fn key(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_key(name, value);
        self
    }

    /// Builder: sets a key only when `value` is present.
    pub fn optional_key(mut self, name: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.set_key(name, value);
        }
        self
    }

    /// Builder: appends a `Variable: name=value` line.
    pub fn variable(mut self, name: &str, value: impl Into<String>) -> Self {
        self.envelope.add_variable(name, value);
        self
    }

    /// Sets a key in place.
    pub fn set_key(&mut self, name: &str, value: impl Into<String>) {
        let lower = name.trim().to_ascii_lowercase();
        if lower == "action" || lower == "actionid" {
            return;
        }
        self.envelope.set_key(name, value);
    }

    /// Wire name of the command (`Action` field).
    pub fn name(&self) -> &str {
        self.envelope.key("action").unwrap_or_default()
    }

    /// The identifier the matching response will carry.
    pub fn action_id(&self) -> &ActionId {
        &self.id
    }

    /// The underlying envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Renders the action in wire format.
    pub fn serialize(&self) -> String {
        self.envelope.serialize()
    }

    /// Renders the action for logging, with the `Secret` field masked.
    pub fn redacted(&self) -> String {
        let mut copy = self.envelope.clone();
        if copy.key("secret").is_some() {
            copy.set_key("secret", "********");
        }
        copy.serialize()
    }
}

impl fmt::Display for ActionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// A concrete action type with a fixed wire name.
///
/// The wire name is declared once on the type, so nothing depends on Rust
/// type names at runtime.
pub trait Action {
    /// Value of the `Action` field.
    const NAME: &'static str;

    /// Builds the wire message, generating an identifier.
    fn into_message(self) -> ActionMessage;
}

macro_rules! impl_into_action_message {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ActionMessage {
                fn from(action: $ty) -> Self {
                    Action::into_message(action)
                }
            }
        )+
    };
}

// ── Action catalog ────────────────────────────────────────────────────────────

/// Authenticates the session.  Sent automatically by the client on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAction {
    pub username: String,
    pub secret: String,
    /// Event mask, e.g. `"on"`, `"off"` or `"system,call"`.
    pub events: Option<String>,
}

impl LoginAction {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: impl Into<String>) -> Self {
        self.events = Some(events.into());
        self
    }
}

impl Action for LoginAction {
    const NAME: &'static str = "Login";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME)
            .key("Username", self.username)
            .key("Secret", self.secret)
            .optional_key("Events", self.events)
    }
}

/// Ends the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogoffAction;

impl Action for LogoffAction {
    const NAME: &'static str = "Logoff";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME)
    }
}

/// Keep-alive; the server answers `Response: Success` with `Ping: Pong`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingAction;

impl Action for PingAction {
    const NAME: &'static str = "Ping";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME)
    }
}

/// Runs a CLI command on the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAction {
    pub command: String,
}

impl CommandAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Action for CommandAction {
    const NAME: &'static str = "Command";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME).key("Command", self.command)
    }
}

/// Lists active channels (a list action: one event per channel).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreShowChannelsAction;

impl Action for CoreShowChannelsAction {
    const NAME: &'static str = "CoreShowChannels";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME)
    }
}

/// Reports channel status (a list action), optionally for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusAction {
    pub channel: Option<String>,
}

impl Action for StatusAction {
    const NAME: &'static str = "Status";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME).optional_key("Channel", self.channel)
    }
}

/// Reads a channel or global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetVarAction {
    pub variable: String,
    pub channel: Option<String>,
}

impl GetVarAction {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            channel: None,
        }
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

impl Action for GetVarAction {
    const NAME: &'static str = "GetVar";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME)
            .optional_key("Channel", self.channel)
            .key("Variable", self.variable)
    }
}

/// Writes a channel or global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVarAction {
    pub variable: String,
    pub value: String,
    pub channel: Option<String>,
}

impl SetVarAction {
    pub fn new(variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            value: value.into(),
            channel: None,
        }
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

impl Action for SetVarAction {
    const NAME: &'static str = "SetVar";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME)
            .optional_key("Channel", self.channel)
            .key("Variable", self.variable)
            .key("Value", self.value)
    }
}

/// Places an outbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginateAction {
    pub channel: String,
    pub exten: Option<String>,
    pub context: Option<String>,
    pub priority: Option<String>,
    pub application: Option<String>,
    pub data: Option<String>,
    pub timeout_ms: Option<u64>,
    pub caller_id: Option<String>,
    pub account: Option<String>,
    pub is_async: bool,
    pub codecs: Option<String>,
    /// Channel variables, rendered as repeated `Variable:` lines.
    pub variables: Vec<(String, String)>,
}

impl OriginateAction {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Default::default()
        }
    }

    /// Dials `exten@context` at `priority` once the channel answers.
    pub fn dial_extension(
        mut self,
        exten: impl Into<String>,
        context: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        self.exten = Some(exten.into());
        self.context = Some(context.into());
        self.priority = Some(priority.into());
        self
    }

    /// Runs `application(data)` once the channel answers.
    pub fn run_application(
        mut self,
        application: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        self.application = Some(application.into());
        self.data = Some(data.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.push((name.into(), value.into()));
        self
    }
}

impl Action for OriginateAction {
    const NAME: &'static str = "Originate";

    fn into_message(self) -> ActionMessage {
        let mut msg = ActionMessage::new(Self::NAME)
            .key("Channel", self.channel)
            .optional_key("Exten", self.exten)
            .optional_key("Context", self.context)
            .optional_key("Priority", self.priority)
            .optional_key("Application", self.application)
            .optional_key("Data", self.data)
            .optional_key("Timeout", self.timeout_ms.map(|t| t.to_string()))
            .optional_key("CallerID", self.caller_id)
            .optional_key("Account", self.account)
            .optional_key("Codecs", self.codecs);
        if self.is_async {
            msg = msg.key("Async", "true");
        }
        for (name, value) in self.variables {
            msg = msg.variable(&name, value);
        }
        msg
    }
}

/// Shows one SIP peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipShowPeerAction {
    pub peer: String,
}

impl SipShowPeerAction {
    pub fn new(peer: impl Into<String>) -> Self {
        Self { peer: peer.into() }
    }
}

impl Action for SipShowPeerAction {
    const NAME: &'static str = "SIPShowPeer";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME).key("Peer", self.peer)
    }
}

/// Reads an AstDB entry.  The value arrives in a trailing `DBGetResponse`
/// event, which terminates the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbGetAction {
    pub family: String,
    pub key: String,
}

impl DbGetAction {
    pub fn new(family: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            key: key.into(),
        }
    }
}

impl Action for DbGetAction {
    const NAME: &'static str = "DBGet";

    fn into_message(self) -> ActionMessage {
        ActionMessage::new(Self::NAME)
            .key("Family", self.family)
            .key("Key", self.key)
    }
}

impl_into_action_message!(
    LoginAction,
    LogoffAction,
    PingAction,
    CommandAction,
    CoreShowChannelsAction,
    StatusAction,
    GetVarAction,
    SetVarAction,
    OriginateAction,
    SipShowPeerAction,
    DbGetAction,
);

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_id_rejects_empty_string() {
        assert_eq!(ActionId::new(""), Err(ValidationError::EmptyActionId));
    }

    #[test]
    fn test_action_id_accepts_exactly_69_characters() {
        let id = "a".repeat(MAX_ACTION_ID_LEN);
        assert!(ActionId::new(id).is_ok());
    }

    #[test]
    fn test_action_id_rejects_70_characters() {
        // Arrange
        let id = "a".repeat(MAX_ACTION_ID_LEN + 1);

        // Act
        let result = ActionId::new(id);

        // Assert
        assert_eq!(
            result,
            Err(ValidationError::ActionIdTooLong { len: 70, max: 69 })
        );
    }

    #[test]
    fn test_generated_action_ids_are_hex_and_unique() {
        let a = ActionId::generate();
        let b = ActionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_action_sets_action_and_action_id_fields() {
        // Arrange / Act
        let msg = ActionMessage::new("Ping");

        // Assert
        assert_eq!(msg.name(), "Ping");
        assert_eq!(msg.envelope().action_id(), Some(msg.action_id().as_str()));
    }

    #[test]
    fn test_set_key_cannot_overwrite_managed_fields() {
        let id = ActionId::new("fixed").unwrap();
        let msg = ActionMessage::with_action_id("Ping", id)
            .key("Action", "Logoff")
            .key("ActionID", "other");
        assert_eq!(msg.name(), "Ping");
        assert_eq!(msg.envelope().action_id(), Some("fixed"));
    }

    #[test]
    fn test_action_id_override_updates_envelope() {
        let msg = ActionMessage::new("Ping").action_id_override(ActionId::new("x1").unwrap());
        assert_eq!(msg.action_id().as_str(), "x1");
        assert_eq!(msg.envelope().action_id(), Some("x1"));
    }

    #[test]
    fn test_login_action_serializes_credentials() {
        // Arrange
        let login = LoginAction::new("admin", "pw").with_events("off");

        // Act
        let msg: ActionMessage = login.into();
        let id = msg.action_id().clone();

        // Assert
        assert_eq!(
            msg.serialize(),
            format!("action: Login\r\nactionid: {id}\r\nevents: off\r\nsecret: pw\r\nusername: admin\r\n\r\n")
        );
    }

    #[test]
    fn test_redacted_masks_secret() {
        let msg: ActionMessage = LoginAction::new("admin", "pw").into();
        let shown = msg.redacted();
        assert!(shown.contains("secret: ********"));
        assert!(!shown.contains("pw\r\n"));
        assert!(msg.serialize().contains("secret: pw"));
    }

    #[test]
    fn test_catalog_uses_declared_wire_names() {
        let names: Vec<String> = vec![
            ActionMessage::from(LogoffAction).name().to_string(),
            ActionMessage::from(PingAction).name().to_string(),
            ActionMessage::from(CommandAction::new("core show uptime")).name().to_string(),
            ActionMessage::from(CoreShowChannelsAction).name().to_string(),
            ActionMessage::from(StatusAction::default()).name().to_string(),
            ActionMessage::from(GetVarAction::new("X")).name().to_string(),
            ActionMessage::from(SetVarAction::new("X", "1")).name().to_string(),
            ActionMessage::from(OriginateAction::new("SIP/100")).name().to_string(),
            ActionMessage::from(SipShowPeerAction::new("100")).name().to_string(),
            ActionMessage::from(DbGetAction::new("fam", "key")).name().to_string(),
        ];
        assert_eq!(
            names,
            vec![
                "Logoff",
                "Ping",
                "Command",
                "CoreShowChannels",
                "Status",
                "GetVar",
                "SetVar",
                "Originate",
                "SIPShowPeer",
                "DBGet"
            ]
        );
    }

    #[test]
    fn test_originate_renders_variables_and_async_flag() {
        // Arrange
        let action = OriginateAction::new("SIP/100")
            .dial_extension("200", "internal", "1")
            .with_variable("FOO", "bar")
            .with_variable("FOO", "baz");
        let action = OriginateAction {
            is_async: true,
            timeout_ms: Some(30000),
            ..action
        };

        // Act
        let msg: ActionMessage = action.into();
        let env = msg.envelope();

        // Assert
        assert_eq!(env.key("channel"), Some("SIP/100"));
        assert_eq!(env.key("exten"), Some("200"));
        assert_eq!(env.key("async"), Some("true"));
        assert_eq!(env.key("timeout"), Some("30000"));
        assert_eq!(env.variable("foo").unwrap().values(), vec!["bar", "baz"]);
    }

    #[test]
    fn test_get_var_omits_channel_when_absent() {
        let msg: ActionMessage = GetVarAction::new("CDR(duration)").into();
        assert!(msg.envelope().key("channel").is_none());
        assert_eq!(msg.envelope().key("variable"), Some("CDR(duration)"));
    }
}
