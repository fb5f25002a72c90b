//! The session record shared between the relay and its HTTP clients.

use serde::{Deserialize, Serialize};

use crate::SessionId;

/// Maximum accepted size in bytes of a host public key.
pub const MAX_HOST_KEY_LEN: usize = 8192;

/// A time-boxed pairing session.
///
/// Timestamps are Unix epoch milliseconds. `expires_at` is authoritative:
/// a session is unusable at or after that instant regardless of `active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Primary key.
    pub id: SessionId,
    /// Public key material of the initiating peer (opaque to the relay).
    pub host_public_key: String,
    /// Base64url HMAC-SHA256 over `id|hostPublicKey|expiresAt`.
    pub signature: String,
    /// Expiry instant in epoch milliseconds.
    pub expires_at: u64,
    /// Creation instant in epoch milliseconds.
    pub created_at: u64,
    /// Advisory status flag.
    pub active: bool,
}

impl Session {
    /// Whether the session is expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Milliseconds left before expiry (zero once expired).
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at.saturating_sub(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            id: SessionId::parse("s1").unwrap(),
            host_public_key: "pubkeyA".into(),
            signature: "sig".into(),
            expires_at: 1_700_000_000_000,
            created_at: 1_699_999_700_000,
            active: true,
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let session = sample();
        assert!(!session.is_expired(1_699_999_999_999));
        assert!(session.is_expired(1_700_000_000_000));
        assert_eq!(session.remaining_ms(1_699_999_999_000), 1_000);
        assert_eq!(session.remaining_ms(1_800_000_000_000), 0);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], "s1");
        assert_eq!(json["hostPublicKey"], "pubkeyA");
        assert_eq!(json["expiresAt"], 1_700_000_000_000u64);
        assert_eq!(json["createdAt"], 1_699_999_700_000u64);
        assert_eq!(json["active"], true);
    }
}
