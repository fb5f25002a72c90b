//! WebSocket relay endpoint.
//!
//! Each upgraded socket is split into a reader loop, which feeds the router
//! one frame at a time, and a writer task draining the connection's outbound
//! queue.

use crate::error::ProtocolError;
use crate::http::ApiError;
use crate::server::{PairRelay, RelayMetrics};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::ConnectInfo;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(relay): Extension<Arc<PairRelay>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    if let Some(ConnectInfo(addr)) = connect_info {
        if let Err(e) = relay.rate_limits().check_connection(addr.ip()) {
            RelayMetrics::incr(&relay.metrics().rate_limit_hits);
            tracing::warn!("Rejected WebSocket upgrade from {}: {}", addr.ip(), e);
            return ApiError::RateLimited(e.to_string()).into_response();
        }
    }

    let max_bytes = relay.config().relay.max_message_bytes;
    ws.max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| handle_socket(socket, relay))
}

/// Drive one relay connection until the peer goes away.
async fn handle_socket(socket: WebSocket, relay: Arc<PairRelay>) {
    let (mut sender, mut receiver) = socket.split();
    let router = relay.router();
    let (mut conn, mut rx) = router.open();
    let conn_id = conn.id();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("New relay connection {}", conn_id);

    while let Some(result) = receiver.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                tracing::debug!("Ignoring binary frame on connection {}", conn_id);
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("WebSocket error on connection {}: {}", conn_id, e);
                break;
            }
        };

        let limits = relay.rate_limits();
        if let Err(e) = limits
            .check_message(conn_id)
            .and_then(|_| limits.check_global())
        {
            RelayMetrics::incr(&relay.metrics().rate_limit_hits);
            tracing::warn!("Rate limited connection {}: {}", conn_id, e);
            router.reject(
                &conn,
                &ProtocolError::RateLimited {
                    reason: e.to_string(),
                },
            );
            continue;
        }

        router.handle_text(&mut conn, &text).await;
    }

    // Closing always leaves, so peers see peer-left
    router.leave(&mut conn).await;
    send_task.abort();
    tracing::info!("Relay connection {} closed", conn_id);
}
