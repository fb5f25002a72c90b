//! Main PairRelay server coordination.
//!
//! PairRelay owns the session store, the relay router, and the rate limiters,
//! and is shared with every HTTP and WebSocket handler.

use crate::clock::Clock;
use crate::config::Config;
use crate::limits::RateLimits;
use crate::router::RelayRouter;
use crate::store::SessionStore;
use pair_core::Signer;
use pair_types::SessionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64`, no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Sessions created over HTTP.
    pub sessions_created: AtomicU64,
    /// Sessions deleted explicitly.
    pub sessions_deleted: AtomicU64,
    /// Sessions removed by the sweeper.
    pub sessions_expired: AtomicU64,
    /// Pairing codes that verified.
    pub codes_verified: AtomicU64,
    /// Pairing codes rejected (bad signature, expired, or stale).
    pub codes_rejected: AtomicU64,
    /// Relay connections opened.
    pub connections_total: AtomicU64,
    /// Frames queued to a peer.
    pub messages_relayed: AtomicU64,
    /// Frames dropped on a full or closed peer queue.
    pub messages_dropped: AtomicU64,
    /// Total rate limit rejections (connection + session + message + global).
    pub rate_limit_hits: AtomicU64,
    /// Total protocol errors reported to relay connections.
    pub errors_total: AtomicU64,
}

impl RelayMetrics {
    /// Bump a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main relay server.
pub struct PairRelay {
    config: Config,
    store: Arc<SessionStore>,
    router: RelayRouter,
    /// Rate limiters for upgrades, session creation, and relay frames.
    rate_limits: RateLimits,
    /// Operational metrics (counters).
    metrics: Arc<RelayMetrics>,
}

impl std::fmt::Debug for PairRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairRelay")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("router", &self.router)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl PairRelay {
    /// Create a new PairRelay with the given config, signer, and clock.
    pub fn new(config: Config, signer: Signer, clock: Arc<dyn Clock>) -> Self {
        let metrics = Arc::new(RelayMetrics::default());
        let store = Arc::new(SessionStore::new(
            Arc::new(signer),
            clock,
            config.sessions.max_ice_candidates,
        ));
        let router = RelayRouter::new(store.clone(), config.relay.clone(), metrics.clone());
        let rate_limits = RateLimits::new(&config.limits);
        Self {
            config,
            store,
            router,
            rate_limits,
            metrics,
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Get a clone of the store Arc for background tasks.
    pub fn store_arc(&self) -> Arc<SessionStore> {
        self.store.clone()
    }

    /// Get access to the relay router.
    pub fn router(&self) -> &RelayRouter {
        &self.router
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Get a clone of the metrics Arc for background tasks.
    pub fn metrics_arc(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    /// Delete a session and detach its relay members.
    ///
    /// Returns `true` if a live session was removed.
    pub async fn end_session(&self, session_id: &SessionId) -> bool {
        let removed = self.store.delete(session_id);
        let evicted = self.router.end_session(session_id).await;
        if removed {
            RelayMetrics::incr(&self.metrics.sessions_deleted);
            tracing::info!(
                "Session {} deleted ({} relay member(s) detached)",
                session_id,
                evicted
            );
        }
        removed
    }

    /// Joined relay connections across all sessions.
    pub fn total_connections(&self) -> usize {
        self.router.registry().total_connections()
    }

    /// Sessions with at least one joined relay connection.
    pub fn total_relay_sessions(&self) -> usize {
        self.router.registry().total_sessions()
    }
}
