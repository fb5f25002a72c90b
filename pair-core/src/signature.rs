//! Pairing-code signatures.
//!
//! Signatures are HMAC-SHA256 over the assertion message, keyed by a secret
//! that only the relay holds, and encoded as URL-safe base64 without padding
//! so they can travel in a query string unchanged.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of a decoded signature.
pub const SIGNATURE_LEN: usize = 32;

/// Signs and verifies session assertions with a server-held secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    /// Create a signer from secret bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Create a signer with a random 32-byte secret.
    ///
    /// Codes signed by it do not survive a process restart.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        let signer = Self::new(bytes);
        bytes.zeroize();
        signer
    }

    fn mac(&self, message: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        mac
    }

    /// Sign `message`. Deterministic for a given secret.
    pub fn sign(&self, message: &str) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(message).finalize().into_bytes())
    }

    /// Check `signature` against `message`.
    ///
    /// Malformed signatures (bad base64, wrong length) yield `false`. The
    /// length is checked before the constant-time comparison.
    pub fn verify(&self, message: &str, signature: &str) -> bool {
        let provided = match URL_SAFE_NO_PAD.decode(signature.trim_end_matches('=')) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        if provided.len() != SIGNATURE_LEN {
            return false;
        }
        self.mac(message).verify_slice(&provided).is_ok()
    }
}

// Intentionally opaque debug to avoid logging secrets
impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signer([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-signing-secret-0123456789ab";

    #[test]
    fn matches_rfc4231_vector() {
        // RFC 4231 test case 2
        let signer = Signer::new(b"Jefe");
        let sig = signer.sign("what do ya want for nothing?");
        assert_eq!(sig, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM");
    }

    #[test]
    fn sign_is_deterministic() {
        let signer = Signer::new(SECRET);
        assert_eq!(signer.sign("s1|pubkeyA|1"), signer.sign("s1|pubkeyA|1"));
        assert_ne!(signer.sign("s1|pubkeyA|1"), signer.sign("s1|pubkeyA|2"));
    }

    #[test]
    fn signature_is_url_safe() {
        let signer = Signer::new(SECRET);
        for i in 0..64 {
            let sig = signer.sign(&format!("session-{i}|key|{i}"));
            assert_eq!(sig.len(), 43);
            assert!(sig
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        }
    }

    #[test]
    fn verify_accepts_own_signature() {
        let signer = Signer::new(SECRET);
        for message in ["", "s1|pubkeyA|1700000000000", "ünïcode|ключ|42"] {
            let sig = signer.sign(message);
            assert!(signer.verify(message, &sig));
        }
    }

    #[test]
    fn verify_rejects_single_bit_tamper() {
        let signer = Signer::new(SECRET);
        let message = "s1|pubkeyA|1700000000000";
        let sig = signer.sign(message);
        let mut bytes = URL_SAFE_NO_PAD.decode(&sig).unwrap();

        for bit in 0..(SIGNATURE_LEN * 8) {
            bytes[bit / 8] ^= 1 << (bit % 8);
            let tampered = URL_SAFE_NO_PAD.encode(&bytes);
            assert!(!signer.verify(message, &tampered), "bit {bit} flip accepted");
            bytes[bit / 8] ^= 1 << (bit % 8);
        }
    }

    #[test]
    fn assertion_vectors() {
        let signer = Signer::new(SECRET);
        let sig = signer.sign("s1|pubkeyA|1700000000000");

        assert!(signer.verify("s1|pubkeyA|1700000000000", &sig));
        let other = Signer::new(b"another-secret-entirely-00000000");
        assert!(!other.verify("s1|pubkeyA|1700000000000", &sig));
        assert!(!signer.verify("s1|pubkeyA|1700000000001", &sig));
    }

    #[test]
    fn verify_rejects_malformed_input() {
        let signer = Signer::new(SECRET);
        let message = "s1|pubkeyA|1700000000000";
        let sig = signer.sign(message);

        assert!(!signer.verify(message, ""));
        assert!(!signer.verify(message, "not base64!!"));
        assert!(!signer.verify(message, &sig[..20]));
        assert!(!signer.verify(message, &format!("{sig}AAAA")));
        assert!(!signer.verify(message, &URL_SAFE_NO_PAD.encode([0u8; 64])));
    }

    #[test]
    fn verify_tolerates_padding() {
        let signer = Signer::new(SECRET);
        let sig = signer.sign("m");
        assert!(signer.verify("m", &format!("{sig}=")));
    }

    #[test]
    fn random_signers_differ() {
        let a = Signer::random();
        let b = Signer::random();
        assert_ne!(a.sign("m"), b.sign("m"));
    }

    #[test]
    fn debug_is_redacted() {
        let signer = Signer::new(SECRET);
        let debug = format!("{:?}", signer);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("test-signing-secret"));
    }
}
