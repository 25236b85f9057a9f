// ================================================================
// File: holibot-common/src/error.rs
// ================================================================

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Failure of an outbound send/fetch/delete call.
///
/// Terminal errors can never succeed on retry (the message is gone, or we
/// are not allowed to touch it). Everything else is transient and is left
/// for the next poll.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("message or channel not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid channel id {0}")]
    InvalidChannel(u64),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("channel client unavailable")]
    Unavailable,

    #[error("transient failure: {0}")]
    Transient(String),
}

impl ChannelError {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelError::NotFound | ChannelError::Forbidden(_) | ChannelError::InvalidChannel(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        !self.is_terminal()
    }
}
