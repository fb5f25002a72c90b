//! Prometheus metrics endpoint.

use crate::server::PairRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<PairRelay>>) -> impl IntoResponse {
    let (content_type, body) = render(&relay);
    ([(CONTENT_TYPE, content_type)], body)
}

fn render(relay: &PairRelay) -> (&'static str, String) {
    let m = relay.metrics();

    // Gauges: current state
    let sessions = relay.store().len();
    let connections = relay.total_connections();
    let relay_sessions = relay.total_relay_sessions();
    let limiter_keys = relay.rate_limits().tracked_keys();

    // Counters: monotonic since startup
    let created = m.sessions_created.load(Ordering::Relaxed);
    let deleted = m.sessions_deleted.load(Ordering::Relaxed);
    let expired = m.sessions_expired.load(Ordering::Relaxed);
    let verified = m.codes_verified.load(Ordering::Relaxed);
    let rejected = m.codes_rejected.load(Ordering::Relaxed);
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let relayed = m.messages_relayed.load(Ordering::Relaxed);
    let dropped = m.messages_dropped.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP pairlink_relay_sessions_active Number of live pairing sessions
# TYPE pairlink_relay_sessions_active gauge
pairlink_relay_sessions_active {sessions}

# HELP pairlink_relay_connections_active Number of joined relay connections
# TYPE pairlink_relay_connections_active gauge
pairlink_relay_connections_active {connections}

# HELP pairlink_relay_relay_sessions_active Number of sessions with joined connections
# TYPE pairlink_relay_relay_sessions_active gauge
pairlink_relay_relay_sessions_active {relay_sessions}

# HELP pairlink_relay_rate_limiter_keys Number of tracked rate limiter keys
# TYPE pairlink_relay_rate_limiter_keys gauge
pairlink_relay_rate_limiter_keys {limiter_keys}

# HELP pairlink_relay_info Server information
# TYPE pairlink_relay_info gauge
pairlink_relay_info{{version="{version}"}} 1

# HELP pairlink_relay_sessions_created_total Total sessions created
# TYPE pairlink_relay_sessions_created_total counter
pairlink_relay_sessions_created_total {created}

# HELP pairlink_relay_sessions_deleted_total Total sessions deleted explicitly
# TYPE pairlink_relay_sessions_deleted_total counter
pairlink_relay_sessions_deleted_total {deleted}

# HELP pairlink_relay_sessions_expired_total Total sessions removed by the sweeper
# TYPE pairlink_relay_sessions_expired_total counter
pairlink_relay_sessions_expired_total {expired}

# HELP pairlink_relay_codes_verified_total Total pairing codes verified
# TYPE pairlink_relay_codes_verified_total counter
pairlink_relay_codes_verified_total {verified}

# HELP pairlink_relay_codes_rejected_total Total pairing codes rejected
# TYPE pairlink_relay_codes_rejected_total counter
pairlink_relay_codes_rejected_total {rejected}

# HELP pairlink_relay_connections_total Total relay connections accepted
# TYPE pairlink_relay_connections_total counter
pairlink_relay_connections_total {conns_total}

# HELP pairlink_relay_messages_relayed_total Total frames queued to peers
# TYPE pairlink_relay_messages_relayed_total counter
pairlink_relay_messages_relayed_total {relayed}

# HELP pairlink_relay_messages_dropped_total Total frames dropped on full peer queues
# TYPE pairlink_relay_messages_dropped_total counter
pairlink_relay_messages_dropped_total {dropped}

# HELP pairlink_relay_rate_limit_hits_total Total rate limit rejections
# TYPE pairlink_relay_rate_limit_hits_total counter
pairlink_relay_rate_limit_hits_total {rate_limits}

# HELP pairlink_relay_errors_total Total protocol errors
# TYPE pairlink_relay_errors_total counter
pairlink_relay_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    ("text/plain; version=0.0.4; charset=utf-8", body)
}
