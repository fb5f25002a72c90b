//! Pairing codes for pairlink.
//!
//! This module provides:
//! - The signed assertion message `"{id}|{hostPublicKey}|{expiresAtEpochMillis}"`
//! - Query-string encoding/decoding of the pairing code carried by a QR image
//! - Verification of a scanned code (signature, then expiry)
//!
//! The pairing flow:
//! 1. The host device creates a session; the relay signs its assertion
//! 2. The code is rendered as a QR image (`?sessionId=..&hostPublicKey=..`)
//! 3. The joining device scans it and submits it for verification
//! 4. Both devices open relay connections tagged with the session id
//!
//! Field order and the `|` delimiter are part of the signed contract:
//! changing either invalidates every outstanding code.

use pair_types::{Session, SessionId, MAX_HOST_KEY_LEN};
use url::form_urlencoded;

use crate::Signer;

/// Query parameter carrying the session id.
pub const PARAM_SESSION_ID: &str = "sessionId";
/// Query parameter carrying the host public key.
pub const PARAM_HOST_PUBLIC_KEY: &str = "hostPublicKey";
/// Query parameter carrying the expiry in epoch milliseconds.
pub const PARAM_EXPIRES_AT: &str = "expiresAt";
/// Accepted alias of [`PARAM_EXPIRES_AT`].
pub const PARAM_EXPIRES_AT_ALIAS: &str = "expiresAtEpochMillis";
/// Query parameter carrying the signature.
pub const PARAM_SIGNATURE: &str = "signature";

/// Error type for pairing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// The code could not be parsed.
    InvalidPayload(String),
    /// A required query parameter is absent.
    MissingField(&'static str),
    /// The signature does not match the assertion.
    InvalidSignature,
    /// The code has expired.
    Expired,
}

impl std::fmt::Display for PairingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingError::InvalidPayload(msg) => write!(f, "invalid pairing code: {}", msg),
            PairingError::MissingField(field) => {
                write!(f, "invalid pairing code: missing {}", field)
            }
            PairingError::InvalidSignature => write!(f, "invalid code"),
            PairingError::Expired => write!(f, "pairing code has expired"),
        }
    }
}

impl std::error::Error for PairingError {}

/// Build the message a session signature covers.
pub fn assertion_message(id: &SessionId, host_public_key: &str, expires_at_ms: u64) -> String {
    format!("{}|{}|{}", id, host_public_key, expires_at_ms)
}

/// The signed assertion embedded in a QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    /// Session being offered.
    pub session_id: SessionId,
    /// Public key of the host device.
    pub host_public_key: String,
    /// Expiry in epoch milliseconds.
    pub expires_at: u64,
    /// Base64url HMAC-SHA256 over [`PairingCode::assertion`].
    pub signature: String,
}

impl PairingCode {
    /// Build the code for a stored session.
    pub fn for_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            host_public_key: session.host_public_key.clone(),
            expires_at: session.expires_at,
            signature: session.signature.clone(),
        }
    }

    /// Build and sign a code.
    pub fn sign(
        session_id: SessionId,
        host_public_key: impl Into<String>,
        expires_at: u64,
        signer: &Signer,
    ) -> Self {
        let host_public_key = host_public_key.into();
        let signature = signer.sign(&assertion_message(&session_id, &host_public_key, expires_at));
        Self {
            session_id,
            host_public_key,
            expires_at,
            signature,
        }
    }

    /// The message the signature covers.
    pub fn assertion(&self) -> String {
        assertion_message(&self.session_id, &self.host_public_key, self.expires_at)
    }

    /// Check if the code has expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Verify the signature, then the expiry.
    pub fn verify(&self, signer: &Signer, now_ms: u64) -> Result<(), PairingError> {
        if !signer.verify(&self.assertion(), &self.signature) {
            return Err(PairingError::InvalidSignature);
        }
        if self.is_expired(now_ms) {
            return Err(PairingError::Expired);
        }
        Ok(())
    }

    /// Encode as a form-urlencoded query string (no leading `?`).
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair(PARAM_SESSION_ID, self.session_id.as_str())
            .append_pair(PARAM_HOST_PUBLIC_KEY, &self.host_public_key)
            .append_pair(PARAM_EXPIRES_AT, &self.expires_at.to_string())
            .append_pair(PARAM_SIGNATURE, &self.signature)
            .finish()
    }

    /// Append the code to `base_url` as its query string.
    pub fn to_url(&self, base_url: &str) -> String {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", base_url, separator, self.to_query())
    }

    /// Decode a code from a query string or a full URL.
    pub fn from_query(input: &str) -> Result<Self, PairingError> {
        let input = input.trim();
        let query = match input.split_once('?') {
            Some((_, query)) => query,
            None => input,
        };
        let query = query.split('#').next().unwrap_or_default();

        let mut session_id = None;
        let mut host_public_key = None;
        let mut expires_at = None;
        let mut signature = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match &*key {
                PARAM_SESSION_ID => &mut session_id,
                PARAM_HOST_PUBLIC_KEY => &mut host_public_key,
                PARAM_EXPIRES_AT | PARAM_EXPIRES_AT_ALIAS => &mut expires_at,
                PARAM_SIGNATURE => &mut signature,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let session_id = session_id.ok_or(PairingError::MissingField(PARAM_SESSION_ID))?;
        let session_id = SessionId::parse(session_id)
            .map_err(|e| PairingError::InvalidPayload(e.to_string()))?;

        let host_public_key =
            host_public_key.ok_or(PairingError::MissingField(PARAM_HOST_PUBLIC_KEY))?;
        if host_public_key.is_empty() {
            return Err(PairingError::InvalidPayload("empty hostPublicKey".into()));
        }
        if host_public_key.len() > MAX_HOST_KEY_LEN {
            return Err(PairingError::InvalidPayload(format!(
                "hostPublicKey longer than {} bytes",
                MAX_HOST_KEY_LEN
            )));
        }

        let expires_at = expires_at.ok_or(PairingError::MissingField(PARAM_EXPIRES_AT))?;
        let expires_at = expires_at
            .parse::<u64>()
            .map_err(|e| PairingError::InvalidPayload(format!("expiresAt: {}", e)))?;

        let signature = signature.ok_or(PairingError::MissingField(PARAM_SIGNATURE))?;

        Ok(Self {
            session_id,
            host_public_key,
            expires_at,
            signature,
        })
    }
}
