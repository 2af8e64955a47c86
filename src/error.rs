//! Error types for the messaging client core.

use thiserror::Error;

/// Main error type for the client.
///
/// `ChannelUnavailable`, `StaleResponse` and `MalformedEvent` are absorbed
/// inside the chat service and never reach the caller of an event handler.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Gateway is not connected
    #[error("channel unavailable")]
    ChannelUnavailable,

    /// Response no longer matches local state
    #[error("stale response: {0}")]
    StaleResponse(String),

    /// Inbound payload missing required fields
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Remote directory request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Local identity rejected
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;

impl From<std::io::Error> for ParleyError {
    fn from(err: std::io::Error) -> Self {
        ParleyError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for ParleyError {
    fn from(err: reqwest::Error) -> Self {
        ParleyError::Http(err.to_string())
    }
}

impl From<config::ConfigError> for ParleyError {
    fn from(err: config::ConfigError) -> Self {
        ParleyError::Config(err.to_string())
    }
}
