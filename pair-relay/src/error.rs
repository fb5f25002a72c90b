//! Error types for pair-relay.

use pair_types::{ErrorCode, SessionId, WireError};

/// Main error type for pair-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Session store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Session absent or expired. The two cases are deliberately merged.
    #[error("session not found or expired")]
    NotFound,

    /// A live session already uses this id.
    #[error("session already exists: {id}")]
    AlreadyExists {
        /// The duplicate id.
        id: SessionId,
    },

    /// Input rejected before any mutation.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Why it was rejected.
        reason: String,
    },

    /// The session's ICE candidate list is full.
    #[error("too many ICE candidates (limit: {limit})")]
    CandidateLimit {
        /// Configured maximum.
        limit: usize,
    },
}

/// Relay connection errors. Each is reported to the offending connection
/// as an `error` frame and never closes it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame could not be parsed.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Signaling sent before joining a session.
    #[error("join a session before sending signaling messages")]
    NotJoined,

    /// Join target is unknown or expired.
    #[error("session not found or expired")]
    SessionNotFound,

    /// Join target already has its maximum number of participants.
    #[error("session is full (limit: {limit})")]
    SessionFull {
        /// Configured maximum.
        limit: usize,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {reason}")]
    RateLimited {
        /// Reason for rate limiting.
        reason: String,
    },
}

impl ProtocolError {
    /// The stable code sent to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Wire(WireError::UnsupportedType(_)) => ErrorCode::UnsupportedType,
            ProtocolError::Wire(_) => ErrorCode::InvalidMessage,
            ProtocolError::NotJoined => ErrorCode::NotJoined,
            ProtocolError::SessionNotFound => ErrorCode::SessionNotFound,
            ProtocolError::SessionFull { .. } => ErrorCode::SessionFull,
            ProtocolError::RateLimited { .. } => ErrorCode::RateLimited,
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
