//! Error types for pairlink wire types.

use thiserror::Error;

/// Errors raised while parsing identifiers or relay frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame is not valid JSON
    #[error("invalid json: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Frame is valid JSON but not an object
    #[error("message must be a JSON object")]
    NotAnObject,

    /// The `type` discriminator is absent or not a string
    #[error("message is missing a string `type` field")]
    MissingType,

    /// The `type` discriminator is not one the relay understands
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),

    /// A required field is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present but unusable
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Serializing a server event failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::UnsupportedType("chat".into());
        assert_eq!(err.to_string(), "unsupported message type: chat");

        let err = WireError::InvalidField {
            field: "sessionId",
            reason: "empty".into(),
        };
        assert_eq!(err.to_string(), "invalid field `sessionId`: empty");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}
