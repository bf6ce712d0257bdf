//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Seed request rejected before any work was scheduled.
    InvalidRequest(String),
    /// Hostname has no registered agent token.
    UnknownAgent(String),
    /// Agent could not be reached or answered a required query badly.
    AgentUnreachable(String),
    /// Agent command was issued but the agent reported failure.
    AgentCommandFailed(String),
    /// Host state does not allow the seed to proceed.
    Precondition(String),
    /// Copy progress stopped moving for too many polls.
    TransferStalled(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Background task panicked or was aborted.
    Internal(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::UnknownAgent(msg) => write!(f, "unknown agent: {msg}"),
            Self::AgentUnreachable(msg) => write!(f, "agent unreachable: {msg}"),
            Self::AgentCommandFailed(msg) => write!(f, "agent command failed: {msg}"),
            Self::Precondition(msg) => write!(f, "precondition: {msg}"),
            Self::TransferStalled(msg) => write!(f, "transfer stalled: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
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

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::AgentUnreachable(crate::agent::http_client::redact(err))
    }
}
