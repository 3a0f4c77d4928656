//! TOML configuration for the client.
//!
//! The default location is the platform config directory:
//! - Windows:  `%APPDATA%\AmiClient\config.toml`
//! - Linux:    `~/.config/ami-client/config.toml`
//! - macOS:    `~/Library/Application Support/AmiClient/config.toml`
//!
//! ```toml
//! [connection]
//! host = "pbx.example.net"
//! port = 5038
//! response_timeout_ms = 5000
//!
//! [credentials]
//! username = "monitor"
//! secret = "change-me"
//! events = "on"
//!
//! [protocol]
//! malformed_frame_policy = "attach_to_last_action"
//! ```
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ami_core::protocol::{LoginAction, MalformedFramePolicy, DEFAULT_MAX_BUFFERED_BYTES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::engine::EngineOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how to connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Only `"tcp"` is supported.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Deadline for the login response and the default for `call`.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Largest chunk requested from the socket per read.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl ConnectionConfig {
    /// `host:port`, as passed to the socket connect call.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Login credentials.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub secret: String,
    /// Value of the Login `Events` field, e.g. `"on"` or `"off"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("secret", &"********")
            .field("events", &self.events)
            .finish()
    }
}

/// Protocol handling knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolConfig {
    /// Substring the greeting line must contain.
    #[serde(default = "default_banner_marker")]
    pub banner_marker: String,
    #[serde(default)]
    pub malformed_frame_policy: MalformedFramePolicy,
    /// Largest unterminated frame accepted before the connection is dropped.
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl From<&ClientConfig> for EngineOptions {
    fn from(config: &ClientConfig) -> Self {
        let mut login = LoginAction::new(&config.credentials.username, &config.credentials.secret);
        login.events = config.credentials.events.clone();
        Self {
            login,
            banner_marker: config.protocol.banner_marker.clone(),
            malformed_frame_policy: config.protocol.malformed_frame_policy,
            max_buffered_bytes: config.protocol.max_buffered_bytes,
            read_chunk_size: config.connection.read_chunk_size,
            response_timeout: config.connection.response_timeout(),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_scheme() -> String {
    "tcp".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5038
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_response_timeout_ms() -> u64 {
    10_000
}
fn default_read_chunk_size() -> usize {
    65_535
}
fn default_banner_marker() -> String {
    "Asterisk".to_string()
}
fn default_max_buffered_bytes() -> usize {
    DEFAULT_MAX_BUFFERED_BYTES
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            banner_marker: default_banner_marker(),
            malformed_frame_policy: MalformedFramePolicy::default(),
            max_buffered_bytes: default_max_buffered_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path for this platform.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning `ClientConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("AmiClient"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("AmiClient")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("ami-client"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_local_manager_port() {
        // Arrange / Act
        let cfg = ClientConfig::default();

        // Assert
        assert_eq!(cfg.connection.scheme, "tcp");
        assert_eq!(cfg.connection.address(), "127.0.0.1:5038");
        assert_eq!(cfg.connection.response_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.connection.read_chunk_size, 65_535);
        assert_eq!(cfg.protocol.banner_marker, "Asterisk");
        assert_eq!(cfg.protocol.malformed_frame_policy, MalformedFramePolicy::Drop);
        assert_eq!(cfg.logging.log_level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ClientConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_partial_sections_override_only_given_fields() {
        // Arrange
        let toml_str = r#"
[connection]
host = "10.0.0.5"

[credentials]
username = "admin"
secret = "amp111"

[protocol]
malformed_frame_policy = "attach_to_last_action"
"#;

        // Act
        let cfg: ClientConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.connection.host, "10.0.0.5");
        assert_eq!(cfg.connection.port, 5038);
        assert_eq!(cfg.credentials.username, "admin");
        assert_eq!(cfg.credentials.events, None);
        assert_eq!(
            cfg.protocol.malformed_frame_policy,
            MalformedFramePolicy::AttachToLastAction
        );
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let result: Result<ClientConfig, _> =
            toml::from_str("[protocol]\nmalformed_frame_policy = \"guess\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_output_redacts_secret() {
        let creds = CredentialsConfig {
            username: "admin".into(),
            secret: "amp111".into(),
            events: None,
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("amp111"));
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&dir.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_load_config_reports_malformed_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_load_round_trip_creates_parent_dirs() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("ami").join("config.toml");
        let mut cfg = ClientConfig::default();
        cfg.connection.port = 15038;
        cfg.credentials.username = "monitor".into();
        cfg.credentials.events = Some("off".into());
        cfg.logging.log_level = "debug".into();

        // Act
        save_config(&path, &cfg).expect("save");
        let loaded = load_config(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_none_events_is_omitted_from_toml() {
        let toml_str = toml::to_string_pretty(&ClientConfig::default()).expect("serialize");
        assert!(!toml_str.contains("events"));
    }

    #[test]
    fn test_default_config_path_ends_with_config_toml() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }

    #[test]
    fn test_engine_options_follow_config() {
        // Arrange
        let mut cfg = ClientConfig::default();
        cfg.credentials.username = "monitor".into();
        cfg.credentials.secret = "s3cret".into();
        cfg.credentials.events = Some("off".into());
        cfg.connection.response_timeout_ms = 2_500;
        cfg.protocol.malformed_frame_policy = MalformedFramePolicy::AttachToLastAction;

        // Act
        let options = EngineOptions::from(&cfg);

        // Assert
        assert_eq!(options.login.username, "monitor");
        assert_eq!(options.login.events.as_deref(), Some("off"));
        assert_eq!(options.response_timeout, Duration::from_millis(2_500));
        assert_eq!(options.malformed_frame_policy, MalformedFramePolicy::AttachToLastAction);
        assert!(!format!("{options:?}").contains("s3cret"));
    }
}
