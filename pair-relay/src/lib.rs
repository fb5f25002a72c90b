//! # pairlink-relay
//!
//! Signaling relay for QR-code device pairing.
//!
//! This crate implements a relay server that:
//! - Issues time-boxed pairing sessions with HMAC-signed pairing codes
//! - Verifies scanned codes against the live session
//! - Forwards WebRTC handshake and key-exchange messages between the peers
//!   of a session over WebSocket
//! - Never sees plaintext (end-to-end keys are negotiated by the peers)
//!
//! ## Architecture
//!
//! ```text
//! Host tab ──┐                            ┌── Joining tab
//!            │    HTTP + WebSocket        │
//!            ├───────────────────────────►│
//!            │                            │
//!        ┌───┴────────────────────────────┴───┐
//!        │           pairlink-relay           │
//!        │  ┌──────────────┐ ┌─────────────┐  │
//!        │  │ SessionStore │ │ RelayRouter │  │
//!        │  └──────────────┘ └─────────────┘  │
//!        └────────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Relay connections exchange JSON text frames:
//! - `join-session` → `peer-joined` (to every member)
//! - `webrtc-offer`, `webrtc-answer`, `ice-candidate`, `key-exchange`
//!   (forwarded verbatim)
//! - `typing` (normalized)
//! - `peer-left`, `session-ended`, `error` (server → client)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod limits;
pub mod registry;
pub mod router;
pub mod server;
pub mod signaling;
pub mod store;
