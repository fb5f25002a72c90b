//! Relay message routing.
//!
//! Every relay connection gets a [`RelayConnection`] that tracks its state.
//! The router classifies each inbound frame, applies join policy, and hands
//! the frame to the registry for fan-out.

use crate::config::RelayConfig;
use crate::error::{ProtocolError, ProtocolResult};
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::server::RelayMetrics;
use crate::store::SessionStore;
use pair_types::{
    ClientId, ClientMessage, JoinSession, ServerEvent, SessionId, Signal, SignalKind,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connection state machine states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open, not yet joined to a session.
    Connecting,
    /// Joined, nothing relayed yet.
    Joined {
        /// Session this connection belongs to.
        session_id: SessionId,
        /// Client id the connection joined with.
        client_id: ClientId,
    },
    /// Joined and has relayed at least one message.
    Active {
        /// Session this connection belongs to.
        session_id: SessionId,
        /// Client id the connection joined with.
        client_id: ClientId,
    },
    /// Closed; further frames are ignored.
    Closed,
}

impl ConnectionState {
    /// Session and client id, when joined.
    pub fn membership(&self) -> Option<(&SessionId, &ClientId)> {
        match self {
            ConnectionState::Joined {
                session_id,
                client_id,
            }
            | ConnectionState::Active {
                session_id,
                client_id,
            } => Some((session_id, client_id)),
            ConnectionState::Connecting | ConnectionState::Closed => None,
        }
    }
}

/// A single relay connection as seen by the router.
#[derive(Debug)]
pub struct RelayConnection {
    handle: ConnectionHandle,
    state: ConnectionState,
}

impl RelayConnection {
    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Current state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    fn send(&self, event: &ServerEvent) {
        match event.to_frame() {
            Ok(frame) => {
                self.handle.try_deliver(Arc::from(frame));
            }
            Err(e) => tracing::error!("Failed to serialize event: {}", e),
        }
    }
}

/// Routes relay frames between the connections of a session.
pub struct RelayRouter {
    registry: ConnectionRegistry,
    store: Arc<SessionStore>,
    config: RelayConfig,
    metrics: Arc<RelayMetrics>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RelayRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRouter")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RelayRouter {
    /// Create a router over `store`.
    pub fn new(store: Arc<SessionStore>, config: RelayConfig, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            registry: ConnectionRegistry::new(config.max_participants),
            store,
            config,
            metrics,
            next_id: AtomicU64::new(1),
        }
    }

    /// The membership registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Open a connection. The receiver yields frames to write to the peer.
    pub fn open(&self) -> (RelayConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(self.config.send_queue.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
        let connection = RelayConnection {
            handle: ConnectionHandle::new(id, tx),
            state: ConnectionState::Connecting,
        };
        (connection, rx)
    }

    /// Handle one inbound text frame. Failures are reported to the sender as
    /// an `error` frame and never close the connection.
    pub async fn handle_text(&self, conn: &mut RelayConnection, text: &str) {
        if conn.state == ConnectionState::Closed {
            return;
        }
        if let Err(e) = self.dispatch(conn, text).await {
            self.reject(conn, &e);
        }
    }

    /// Report `error` to the connection.
    pub fn reject(&self, conn: &RelayConnection, error: &ProtocolError) {
        self.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Rejected frame on connection {}: {}", conn.id(), error);
        conn.send(&ServerEvent::error(error.code(), error.to_string()));
    }

    async fn dispatch(&self, conn: &mut RelayConnection, text: &str) -> ProtocolResult<()> {
        match ClientMessage::parse(text)? {
            ClientMessage::Join(join) => self.join(conn, join).await,
            ClientMessage::Signal(signal) => self.relay(conn, signal).await,
        }
    }

    /// Attach the connection to a session, leaving any previous one.
    ///
    /// A failed join leaves the current membership untouched. Repeating the
    /// join the connection already holds is a no-op.
    pub async fn join(&self, conn: &mut RelayConnection, join: JoinSession) -> ProtocolResult<()> {
        let JoinSession {
            session_id,
            client_id,
        } = join;

        if self.config.require_known_session && self.store.get(&session_id).is_none() {
            return Err(ProtocolError::SessionNotFound);
        }

        if conn.state.membership() == Some((&session_id, &client_id))
            && self
                .registry
                .is_bound(&session_id, &client_id, conn.id())
                .await
        {
            return Ok(());
        }

        // Switching client id inside one session frees the old seat first
        let renaming = conn
            .state
            .membership()
            .is_some_and(|(current, _)| current == &session_id);
        if renaming {
            self.leave_current(conn).await;
        }

        let joined = self
            .registry
            .join(&session_id, &client_id, conn.handle.clone())
            .await?;

        if self.config.require_known_session && self.store.get(&session_id).is_none() {
            // Deleted while joining; the eviction tells this member too
            self.registry.evict_session(&session_id).await;
            return Err(ProtocolError::SessionNotFound);
        }

        if !renaming {
            self.leave_current(conn).await;
        }
        self.metrics
            .messages_dropped
            .fetch_add(joined.delivery.dropped as u64, Ordering::Relaxed);

        tracing::info!(
            "Connection {} joined session {} as {} ({} peer(s))",
            conn.id(),
            session_id,
            client_id,
            joined.peers
        );
        conn.state = ConnectionState::Joined {
            session_id,
            client_id,
        };
        Ok(())
    }

    /// Forward a signaling frame to every other member of the sender's
    /// session.
    pub async fn relay(&self, conn: &mut RelayConnection, signal: Signal) -> ProtocolResult<()> {
        let (session_id, client_id) = match conn.state.membership() {
            Some((session_id, client_id)) => (session_id.clone(), client_id.clone()),
            None => return Err(ProtocolError::NotJoined),
        };

        let frame: Arc<str> = if signal.kind == SignalKind::Typing {
            let typing = ServerEvent::typing(client_id.clone(), signal.is_typing());
            Arc::from(typing.to_frame()?)
        } else {
            Arc::from(signal.raw)
        };

        let delivery = match self
            .registry
            .broadcast(&session_id, &client_id, conn.id(), frame)
            .await
        {
            Some(delivery) => delivery,
            None => {
                // Evicted or replaced by a newer connection
                conn.state = ConnectionState::Connecting;
                return Err(ProtocolError::NotJoined);
            }
        };

        self.metrics
            .messages_relayed
            .fetch_add(delivery.delivered as u64, Ordering::Relaxed);
        self.metrics
            .messages_dropped
            .fetch_add(delivery.dropped as u64, Ordering::Relaxed);
        tracing::debug!(
            "Relayed {} from {} in session {} to {} peer(s)",
            signal.kind.as_str(),
            client_id,
            session_id,
            delivery.delivered
        );

        conn.state = ConnectionState::Active {
            session_id,
            client_id,
        };
        Ok(())
    }

    /// Detach the connection from its session and close it.
    pub async fn leave(&self, conn: &mut RelayConnection) {
        self.leave_current(conn).await;
        conn.state = ConnectionState::Closed;
    }

    /// Detach every member of a deleted session.
    pub async fn end_session(&self, session_id: &SessionId) -> usize {
        self.registry.evict_session(session_id).await
    }

    async fn leave_current(&self, conn: &mut RelayConnection) {
        if let Some((session_id, client_id)) = conn.state.membership() {
            if self.registry.leave(session_id, client_id, conn.id()).await {
                tracing::info!(
                    "Connection {} left session {} ({})",
                    conn.id(),
                    session_id,
                    client_id
                );
            }
        }
        conn.state = ConnectionState::Connecting;
    }
}
