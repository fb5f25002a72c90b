//! # pair-core
//!
//! Pure logic for pairlink (no I/O, instant tests).
//!
//! This crate holds the two pieces of the pairing flow that need no network
//! or clock of their own:
//! - [`Signer`]: HMAC-SHA256 signing and constant-time verification of
//!   session assertions
//! - [`PairingCode`]: the signed, expiry-bearing query string that a QR code
//!   carries from the host device to the joining device
//!
//! Callers pass the current time in explicitly, so every expiry decision is
//! deterministic under test.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pairing;
pub mod signature;

pub use pairing::{assertion_message, PairingCode, PairingError};
pub use signature::{Signer, SIGNATURE_LEN};
