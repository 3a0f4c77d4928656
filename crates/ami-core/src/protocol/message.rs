//! The key/value envelope shared by every manager message.
//!
//! Wire format:
//! ```text
//! Name: Value\r\n
//! Name: Value\r\n
//! Variable: key=value\r\n
//! \r\n
//! ```
//! A message is a block of CRLF-terminated field lines closed by an empty
//! line, so the two-line terminator `CRLFCRLF` delimits messages on the
//! stream.
//!
//! # Keys vs. variables (for beginners)
//!
//! *Keys* are the ordinary `Name: Value` header lines.  A message carries at
//! most one value per key, and key names are case-insensitive: `ActionID`,
//! `actionid` and `ACTIONID` all address the same field.  Names are stored
//! lower-cased so lookups and re-serialization agree.
//!
//! *Variables* are the free-form `Variable: key=value` lines used to pass
//! dialplan variables.  Unlike keys they may repeat, and repeated names
//! accumulate into an ordered list instead of overwriting each other.

use std::collections::BTreeMap;

/// End-of-line token.
pub const EOL: &str = "\r\n";

/// End-of-message token (an empty line after the last field).
pub const EOM: &str = "\r\n\r\n";

/// Keys rendered first, in this order, when a message is serialized.
/// The remaining keys follow in lexicographic order.
const LEADING_KEYS: [&str; 4] = ["action", "response", "event", "actionid"];

/// Value of a free-form variable: one string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Single(String),
    Multiple(Vec<String>),
}

impl VariableValue {
    /// Returns every value in insertion order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            VariableValue::Single(v) => vec![v.as_str()],
            VariableValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    /// Returns the first value.
    pub fn first(&self) -> Option<&str> {
        match self {
            VariableValue::Single(v) => Some(v),
            VariableValue::Multiple(vs) => vs.first().map(String::as_str),
        }
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        match self {
            VariableValue::Single(_) => 1,
            VariableValue::Multiple(vs) => vs.len(),
        }
    }

    /// `true` when no value is held (only possible for an empty `Multiple`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, value: String) {
        match self {
            VariableValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = VariableValue::Multiple(vec![first, value]);
            }
            VariableValue::Multiple(vs) => vs.push(value),
        }
    }
}

/// Key/value + free-variable container with case-insensitive field access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    keys: BTreeMap<String, String>,
    variables: BTreeMap<String, VariableValue>,
}

impl Envelope {
    /// Creates an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any previous value.
    pub fn set_key(&mut self, name: &str, value: impl Into<String>) {
        self.keys.insert(normalize(name), value.into());
    }

    /// Returns the value of `name`, compared case-insensitively.
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(&normalize(name)).map(String::as_str)
    }

    /// Removes `name` and returns its previous value.
    pub fn remove_key(&mut self, name: &str) -> Option<String> {
        self.keys.remove(&normalize(name))
    }

    /// All keys, with lower-cased names.
    pub fn keys(&self) -> &BTreeMap<String, String> {
        &self.keys
    }

    /// Sets variable `name` to a single value, replacing previous values.
    pub fn set_variable(&mut self, name: &str, value: impl Into<String>) {
        self.variables
            .insert(normalize(name), VariableValue::Single(value.into()));
    }

    /// Appends a value to variable `name`; repeated names accumulate.
    pub fn add_variable(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.variables.get_mut(&normalize(name)) {
            Some(existing) => existing.push(value),
            None => {
                self.variables
                    .insert(normalize(name), VariableValue::Single(value));
            }
        }
    }

    /// Returns variable `name`, compared case-insensitively.
    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(&normalize(name))
    }

    /// All variables, with lower-cased names.
    pub fn variables(&self) -> &BTreeMap<String, VariableValue> {
        &self.variables
    }

    /// Returns the `ActionID` key.
    pub fn action_id(&self) -> Option<&str> {
        self.key("actionid")
    }

    /// Renders the envelope in wire format, terminated by the empty line.
    ///
    /// Keys come first (`action`, `response`, `event`, `actionid`, then the
    /// rest in lexicographic order), then one
    /// `Variable: name=value` line per variable value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ami_core::protocol::Envelope;
    ///
    /// let mut env = Envelope::new();
    /// env.set_key("Action", "Ping");
    /// env.set_key("ActionID", "42");
    /// assert_eq!(env.serialize(), "action: Ping\r\nactionid: 42\r\n\r\n");
    /// ```
    pub fn serialize(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(self.keys.len() + self.variables.len());

        for leading in LEADING_KEYS {
            if let Some(value) = self.keys.get(leading) {
                lines.push(format!("{leading}: {value}"));
            }
        }
        for (name, value) in &self.keys {
            if !LEADING_KEYS.contains(&name.as_str()) {
                lines.push(format!("{name}: {value}"));
            }
        }
        for (name, value) in &self.variables {
            for single in value.values() {
                lines.push(format!("Variable: {name}={single}"));
            }
        }

        let mut out = lines.join(EOL);
        out.push_str(EOM);
        out
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
