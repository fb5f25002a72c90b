//! Rate limiting for pairlink-relay.
//!
//! Protects the relay against connection flooding, session-creation spam, and
//! chatty relay connections.
//!
//! ## Design Notes
//!
//! Browsers reach the relay over plain HTTP and WebSocket, so the client IP is
//! the only identity available before a connection joins a session. We rate
//! limit by:
//! - **client IP** for WebSocket upgrades and session creation
//! - **connection id** for relay frames
//!
//! All keyed limiters are governor rate limiters backed by DashMap.

use crate::config::LimitsConfig;
use crate::registry::ConnectionId;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits WebSocket upgrades per client IP.
    ///
    /// Configured via `limits.connections_per_ip`.
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,

    /// Limits session creation per client IP.
    ///
    /// Configured via `limits.sessions_per_minute`.
    session_limiter: Arc<KeyedLimiter<IpAddr>>,

    /// Limits relay frames per connection.
    ///
    /// Configured via `limits.messages_per_minute`.
    message_limiter: Arc<KeyedLimiter<ConnectionId>>,

    /// Global rate limiter across all connections.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_limiter", &"KeyedLimiter<IpAddr>")
            .field("session_limiter", &"KeyedLimiter<IpAddr>")
            .field("message_limiter", &"KeyedLimiter<ConnectionId>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configured values are zero. [`Config::validate`]
    /// rejects such configurations.
    ///
    /// [`Config::validate`]: crate::config::Config::validate
    pub fn new(config: &LimitsConfig) -> Self {
        let connections_per_minute = NonZeroU32::new(config.connections_per_ip)
            .expect("connections_per_ip must be > 0");
        let sessions_per_minute = NonZeroU32::new(config.sessions_per_minute)
            .expect("sessions_per_minute must be > 0");
        let messages_per_minute =
            NonZeroU32::new(config.messages_per_minute).expect("messages_per_minute must be > 0");
        let global_rps = NonZeroU32::new(config.global_requests_per_second)
            .expect("global_requests_per_second must be > 0");

        Self {
            connection_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(
                connections_per_minute,
            ))),
            session_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(sessions_per_minute))),
            message_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(messages_per_minute))),
            global_limiter: Arc::new(RateLimiter::direct(Quota::per_second(global_rps))),
        }
    }

    /// Check if a WebSocket upgrade from `ip` is allowed.
    pub fn check_connection(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if `ip` may create another session.
    pub fn check_session(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.session_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::SessionLimitExceeded)
    }

    /// Check if a relay frame on `connection` is allowed.
    pub fn check_message(&self, connection: ConnectionId) -> Result<(), RateLimitError> {
        self.message_limiter
            .check_key(&connection)
            .map_err(|_| RateLimitError::MessageLimitExceeded)
    }

    /// Check if the global frame rate is within limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Number of tracked keys across the keyed limiters (for metrics).
    pub fn tracked_keys(&self) -> usize {
        self.connection_limiter.len() + self.session_limiter.len() + self.message_limiter.len()
    }

    /// Evict idle entries from the keyed limiters.
    ///
    /// `retain_recent()` drops keys whose cells have fully recharged, which
    /// covers closed connections and clients that went away. Called from the
    /// cleanup task.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.session_limiter.retain_recent();
        self.message_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many WebSocket upgrades from this IP.
    ConnectionLimitExceeded,
    /// Too many session creations from this IP.
    SessionLimitExceeded,
    /// Too many frames on this connection.
    MessageLimitExceeded,
    /// Global frame rate exceeded across all connections.
    GlobalLimitExceeded,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLimitExceeded => {
                write!(f, "connection rate limit exceeded")
            }
            Self::SessionLimitExceeded => {
                write!(f, "session creation rate limit exceeded")
            }
            Self::MessageLimitExceeded => {
                write!(f, "message rate limit exceeded")
            }
            Self::GlobalLimitExceeded => {
                write!(f, "global rate limit exceeded")
            }
        }
    }
}

impl std::error::Error for RateLimitError {}
