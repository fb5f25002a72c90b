//! # pair-types
//!
//! Wire format types for the pairlink signaling relay.
//!
//! This crate provides the foundational types used across all pairlink crates:
//! - [`SessionId`], [`ClientId`] - Identity types
//! - [`Session`] - The session record exchanged over HTTP
//! - [`ClientMessage`], [`ServerEvent`] - Relay envelope (JSON text frames)
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod session;

pub use error::WireError;
pub use ids::{ClientId, SessionId, MAX_ID_LEN};
pub use messages::{
    ClientMessage, ErrorCode, ErrorEvent, JoinSession, PeerJoined, PeerLeft, ServerEvent,
    SessionEnded, Signal, SignalKind, Typing,
};
pub use session::{Session, MAX_HOST_KEY_LEN};
