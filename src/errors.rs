//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde_json::Value;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Cloneable so a single session-wide failure (timeout, stream closure)
/// can be delivered to every pending request.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// The module process could not be started.
    Spawn(String),
    /// The module answered with a JSON-RPC `error` payload.
    Protocol(Value),
    /// No terminal response arrived within the configured window.
    Timeout {
        /// Module identifier the session was launched for.
        module: String,
        /// Time elapsed between session creation and expiry.
        elapsed: Duration,
    },
    /// Stdio failure: write error, closed output, duplicate correlation id.
    Transport(String),
    /// A stdout line could not be framed (too long, invalid UTF-8).
    Framing(String),
    /// Required provider credentials are missing from every source.
    Credential {
        /// Provider whose requirements were not met.
        provider: String,
        /// Token fields that are absent or blank.
        missing: Vec<String>,
    },
    /// Caller supplied an invalid request.
    BadRequest(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Protocol(payload) => match payload.get("message").and_then(Value::as_str) {
                Some(message) => write!(f, "protocol: {message}"),
                None => write!(f, "protocol: {payload}"),
            },
            Self::Timeout { module, elapsed } => write!(
                f,
                "timeout: MCP module '{module}' timed out after {}ms",
                elapsed.as_millis()
            ),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Framing(msg) => write!(f, "framing: {msg}"),
            Self::Credential { provider, missing } => write!(
                f,
                "credential: missing required credentials for provider '{provider}': {}",
                missing.join(", ")
            ),
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
