//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the isolate IPC substrate.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed construction parameters (negative permits, empty ids).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation invoked in a state that forbids it (double init, stopped driver).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Normal end-of-session signal. Never reported as a fault.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Named entry or session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Admission limit reached (e.g. max concurrent sessions).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Internal errors, including recovered callback panics.
    #[error("internal error: {0}")]
    Internal(String),

    /// Transport faults.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Map to the wire error code carried in IPC error responses.
    pub fn to_ipc_error_code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) | Error::Serialization(_) => "INVALID_ARGUMENT",
            Error::IllegalState(_) => "FAILED_PRECONDITION",
            Error::ChannelClosed(_) => "UNAVAILABLE",
            Error::NotFound(_) => "NOT_FOUND",
            Error::QuotaExceeded(_) => "RESOURCE_EXHAUSTED",
            Error::Internal(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// True for the graceful channel-closure signal.
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, Error::ChannelClosed(_))
    }
}

// Convenience constructors
impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn channel_closed(msg: impl Into<String>) -> Self {
        Self::ChannelClosed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(msg.into()))
    }
}
