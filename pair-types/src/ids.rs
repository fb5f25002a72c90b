//! Identity types for pairlink.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

/// Maximum length in bytes of a session or client identifier.
pub const MAX_ID_LEN: usize = 128;

/// Identifier of a pairing session.
///
/// Restricted to `[A-Za-z0-9_-]` so the `|` delimiter of the signed
/// assertion can never appear inside an id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random SessionId (UUID v4, simple form).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Parse and validate a SessionId.
    pub fn parse(value: impl Into<String>) -> Result<Self, WireError> {
        let value = value.into();
        if value.is_empty() {
            return Err(invalid("sessionId", "must not be empty"));
        }
        if value.len() > MAX_ID_LEN {
            return Err(invalid(
                "sessionId",
                format!("longer than {} bytes", MAX_ID_LEN),
            ));
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(invalid(
                "sessionId",
                "only ASCII letters, digits, '-' and '_' are allowed",
            ));
        }
        Ok(Self(value))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Identifier a browser tab chooses for itself when joining a session.
///
/// Unique only within its session.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Parse and validate a ClientId.
    pub fn parse(value: impl Into<String>) -> Result<Self, WireError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(invalid("clientId", "must not be empty"));
        }
        if value.len() > MAX_ID_LEN {
            return Err(invalid(
                "clientId",
                format!("longer than {} bytes", MAX_ID_LEN),
            ));
        }
        if value.chars().any(char::is_control) {
            return Err(invalid("clientId", "control characters are not allowed"));
        }
        Ok(Self(value))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> WireError {
    WireError::InvalidField {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_session_ids_are_unique_and_valid() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(SessionId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn session_id_rejects_delimiter() {
        // '|' separates fields in the signed assertion
        assert!(SessionId::parse("abc|def").is_err());
        assert!(SessionId::parse("abc def").is_err());
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("a".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn session_id_accepts_simple_ids() {
        assert!(SessionId::parse("abc").is_ok());
        assert!(SessionId::parse("s1").is_ok());
        assert!(SessionId::parse("A-b_9").is_ok());
        assert!(SessionId::parse("a".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    fn client_id_validation() {
        assert!(ClientId::parse("host-1").is_ok());
        assert!(ClientId::parse("tab 7f3a").is_ok());
        assert!(ClientId::parse("   ").is_err());
        assert!(ClientId::parse("bad\nid").is_err());
        assert!(ClientId::parse("x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = SessionId::parse("abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");

        let decoded: ClientId = serde_json::from_str("\"peer-1\"").unwrap();
        assert_eq!(decoded.as_str(), "peer-1");

        let bad: Result<SessionId, _> = serde_json::from_str("\"a|b\"");
        assert!(bad.is_err());
    }

    #[test]
    fn debug_includes_type_name() {
        let id = SessionId::parse("abc").unwrap();
        assert_eq!(format!("{:?}", id), "SessionId(abc)");
        assert_eq!(id.to_string(), "abc");
    }
}
