//! TOML Configuration File Support
//!
//! Centralized configuration loading for the session client, supporting a
//! TOML file at `~/.config/assistant-session/client.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables (`SESSION_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [connection]
//! api_origin = "https://app.example.com"
//! ws_path = "/ws/chat"
//! max_backoff_secs = 30
//! auth_failure_close_code = 4001
//! superseded_close_code = 4002
//! connect_timeout_ms = 10000
//!
//! [api]
//! request_timeout_ms = 15000
//! history_path = "/api/chat/history"
//! datasets_path = "/api/datasets"
//!
//! [session]
//! welcome_message = "Hi! Ask me anything about your data."
//! command_buffer = 64
//! ```

use std::path::PathBuf;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::ClosePolicy;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Connection section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionToml {
    /// Origin of the assistant backend
    pub api_origin: Option<String>,

    /// Path of the persistent connection endpoint
    pub ws_path: Option<String>,

    /// Upper bound on reconnect delay in seconds
    pub max_backoff_secs: Option<u64>,

    /// Close code meaning the credentials were rejected
    pub auth_failure_close_code: Option<u16>,

    /// Close code meaning the session was opened elsewhere
    pub superseded_close_code: Option<u16>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Transport channel capacity
    pub channel_capacity: Option<usize>,
}

/// REST section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Request timeout in milliseconds
    pub request_timeout_ms: Option<u64>,

    /// History endpoint path
    pub history_path: Option<String>,

    /// Dataset list endpoint path
    pub datasets_path: Option<String>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Greeting shown on a fresh conversation (empty disables it)
    pub welcome_message: Option<String>,

    /// Command queue depth between the UI and the client
    pub command_buffer: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Connection configuration section
    pub connection: ConnectionToml,

    /// REST configuration section
    pub api: ApiToml,

    /// Session configuration section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Structs
// =============================================================================

/// Persistent connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Origin of the assistant backend (`https://…` or `http://…`)
    pub api_origin: String,
    /// Path of the persistent connection endpoint
    pub ws_path: String,
    /// Upper bound on reconnect delay in seconds
    pub max_backoff_secs: u64,
    /// Close code meaning the credentials were rejected
    pub auth_failure_close_code: u16,
    /// Close code meaning the session was opened elsewhere
    pub superseded_close_code: u16,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Transport channel capacity
    pub channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let policy = ClosePolicy::default();
        Self {
            api_origin: "http://localhost:8000".to_string(),
            ws_path: "/ws/chat".to_string(),
            max_backoff_secs: policy.max_backoff_secs,
            auth_failure_close_code: policy.auth_failure_code,
            superseded_close_code: policy.superseded_code,
            connect_timeout_ms: 10_000,
            channel_capacity: 100,
        }
    }
}

impl ConnectionConfig {
    /// Close handling derived from these settings
    #[must_use]
    pub fn close_policy(&self) -> ClosePolicy {
        ClosePolicy {
            auth_failure_code: self.auth_failure_close_code,
            superseded_code: self.superseded_close_code,
            max_backoff_secs: self.max_backoff_secs,
        }
    }
}

/// REST settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// History endpoint path
    pub history_path: String,
    /// Dataset list endpoint path
    pub datasets_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            history_path: "/api/chat/history".to_string(),
            datasets_path: "/api/datasets".to_string(),
        }
    }
}

/// Session behavior settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    /// Greeting shown on a fresh conversation
    pub welcome_message: Option<String>,
    /// Command queue depth between the UI and the client
    pub command_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            welcome_message: Some(
                "Hi! I'm your data assistant. Ask me about your datasets or what you're looking at."
                    .to_string(),
            ),
            command_buffer: 64,
        }
    }
}

/// Centralized configuration for the session client
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Connection settings
    pub connection: ConnectionConfig,

    /// REST settings
    pub api: ApiConfig,

    /// Session settings
    pub session: SessionSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: Option<ConfigSource>,
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source.unwrap_or(ConfigSource::Default)
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = Some(source);
    }

    /// Check values that would otherwise fail at connect time
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = Url::parse(&self.connection.api_origin).map_err(|e| {
            ConfigError::ValidationError(format!(
                "api_origin '{}' is not a URL: {e}",
                self.connection.api_origin
            ))
        })?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "api_origin must use http or https, got '{}'",
                origin.scheme()
            )));
        }
        if !self.connection.ws_path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "ws_path must start with '/'".to_string(),
            ));
        }
        if self.connection.max_backoff_secs == 0 {
            return Err(ConfigError::ValidationError(
                "max_backoff_secs must be at least 1".to_string(),
            ));
        }
        if self.connection.auth_failure_close_code == self.connection.superseded_close_code {
            return Err(ConfigError::ValidationError(
                "auth_failure_close_code and superseded_close_code must differ".to_string(),
            ));
        }
        if self.session.command_buffer == 0 || self.connection.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queue sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/assistant-session/client.toml` or
/// `~/.config/assistant-session/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("assistant-session").join("client.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting values are invalid. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the resulting values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.set_source(ConfigSource::File);

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    // Connection settings
    if let Some(ref origin) = toml.connection.api_origin {
        config.connection.api_origin.clone_from(origin);
    }
    if let Some(ref path) = toml.connection.ws_path {
        config.connection.ws_path.clone_from(path);
    }
    if let Some(secs) = toml.connection.max_backoff_secs {
        config.connection.max_backoff_secs = secs;
    }
    if let Some(code) = toml.connection.auth_failure_close_code {
        config.connection.auth_failure_close_code = code;
    }
    if let Some(code) = toml.connection.superseded_close_code {
        config.connection.superseded_close_code = code;
    }
    if let Some(ms) = toml.connection.connect_timeout_ms {
        config.connection.connect_timeout_ms = ms;
    }
    if let Some(capacity) = toml.connection.channel_capacity {
        config.connection.channel_capacity = capacity;
    }

    // REST settings
    if let Some(ms) = toml.api.request_timeout_ms {
        config.api.request_timeout_ms = ms;
    }
    if let Some(ref path) = toml.api.history_path {
        config.api.history_path.clone_from(path);
    }
    if let Some(ref path) = toml.api.datasets_path {
        config.api.datasets_path.clone_from(path);
    }

    // Session settings
    if let Some(ref welcome) = toml.session.welcome_message {
        config.session.welcome_message = non_empty(welcome);
    }
    if let Some(depth) = toml.session.command_buffer {
        config.session.command_buffer = depth;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ClientConfig) {
    apply_env_vars(config, |key| std::env::var(key).ok());
}

fn apply_env_vars<F>(config: &mut ClientConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut touched = false;

    if let Some(origin) = var("SESSION_API_ORIGIN") {
        config.connection.api_origin = origin;
        touched = true;
    }
    if let Some(path) = var("SESSION_WS_PATH") {
        config.connection.ws_path = path;
        touched = true;
    }
    if let Some(secs) = var("SESSION_MAX_BACKOFF").and_then(|v| v.parse().ok()) {
        config.connection.max_backoff_secs = secs;
        touched = true;
    }
    if let Some(code) = var("SESSION_AUTH_CLOSE_CODE").and_then(|v| v.parse().ok()) {
        config.connection.auth_failure_close_code = code;
        touched = true;
    }
    if let Some(code) = var("SESSION_SUPERSEDED_CLOSE_CODE").and_then(|v| v.parse().ok()) {
        config.connection.superseded_close_code = code;
        touched = true;
    }
    if let Some(ms) = var("SESSION_CONNECT_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.connection.connect_timeout_ms = ms;
        touched = true;
    }
    if let Some(ms) = var("SESSION_REQUEST_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.api.request_timeout_ms = ms;
        touched = true;
    }
    if let Some(welcome) = var("SESSION_WELCOME_MESSAGE") {
        config.session.welcome_message = non_empty(&welcome);
        touched = true;
    }

    if touched {
        config.set_source(ConfigSource::Env);
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend origin override
    pub api_origin: Option<String>,

    /// Maximum backoff override (seconds)
    pub max_backoff_secs: Option<u64>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,

    /// Welcome message override (empty disables it)
    pub welcome_message: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend origin override
    #[must_use]
    pub fn with_api_origin(mut self, origin: String) -> Self {
        self.api_origin = Some(origin);
        self
    }

    /// Set maximum backoff override
    #[must_use]
    pub fn with_max_backoff_secs(mut self, secs: u64) -> Self {
        self.max_backoff_secs = Some(secs);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Set welcome message override
    #[must_use]
    pub fn with_welcome_message(mut self, message: String) -> Self {
        self.welcome_message = Some(message);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.api_origin.is_some()
            || self.max_backoff_secs.is_some()
            || self.connect_timeout_ms.is_some()
            || self.welcome_message.is_some()
        {
            config.set_source(ConfigSource::Cli);
        }

        if let Some(ref origin) = self.api_origin {
            config.connection.api_origin.clone_from(origin);
        }
        if let Some(secs) = self.max_backoff_secs {
            config.connection.max_backoff_secs = secs;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connection.connect_timeout_ms = ms;
        }
        if let Some(ref welcome) = self.welcome_message {
            config.session.welcome_message = non_empty(welcome);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
