//! Relay membership and delivery.
//!
//! A `DashMap` indexes session ids to their member sets, and each member set
//! sits behind its own `RwLock`. Fan-out for one session only touches that
//! session's members.

use crate::error::{ProtocolError, ProtocolResult};
use dashmap::DashMap;
use pair_types::{ClientId, ServerEvent, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Process-unique id of one relay connection.
pub type ConnectionId = u64;

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
}

impl ConnectionHandle {
    /// Wrap the sender of a connection's outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { id, tx }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting. Returns `false` when the queue is full
    /// or the connection is gone.
    pub fn try_deliver(&self, frame: Arc<str>) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Frames queued for a peer.
    pub delivered: usize,
    /// Frames dropped on a full or closed queue.
    pub dropped: usize,
}

impl Delivery {
    fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.dropped += 1;
        }
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    /// Members present before this join, excluding the joiner.
    pub peers: usize,
    /// Whether an older connection with the same client id was replaced.
    pub replaced: bool,
    /// Frames sent while announcing the join.
    pub delivery: Delivery,
}

#[derive(Debug, Default)]
struct SessionMembers {
    members: HashMap<ClientId, ConnectionHandle>,
    /// Set once the entry has been unlinked from the index. Joiners that
    /// raced with the unlink retry against a fresh entry.
    closed: bool,
}

/// Index of live relay connections per session.
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, Arc<RwLock<SessionMembers>>>,
    max_participants: usize,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("sessions_count", &self.sessions.len())
            .field("max_participants", &self.max_participants)
            .finish()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry. A `max_participants` of zero means
    /// unlimited.
    pub fn new(max_participants: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_participants,
        }
    }

    /// Add `client_id` to a session and announce it.
    ///
    /// Existing members receive `peer-joined` for the joiner, and the joiner
    /// receives one `peer-joined` per existing member. Both happen under the
    /// session's write lock, so two racing joiners see each other exactly
    /// once.
    pub async fn join(
        &self,
        session_id: &SessionId,
        client_id: &ClientId,
        handle: ConnectionHandle,
    ) -> ProtocolResult<Joined> {
        loop {
            let members = self.members_or_insert(session_id);
            let mut guard = members.write().await;
            if guard.closed {
                continue;
            }

            let rejoin = guard.members.contains_key(client_id);
            if !rejoin
                && self.max_participants > 0
                && guard.members.len() >= self.max_participants
            {
                return Err(ProtocolError::SessionFull {
                    limit: self.max_participants,
                });
            }

            let mut delivery = Delivery::default();
            let announce = frame(&ServerEvent::peer_joined(client_id.clone()));
            for (peer_id, peer) in guard.members.iter() {
                if peer_id == client_id {
                    continue;
                }
                if let Some(announce) = &announce {
                    delivery.record(peer.try_deliver(announce.clone()));
                }
                if let Some(existing) = frame(&ServerEvent::peer_joined(peer_id.clone())) {
                    delivery.record(handle.try_deliver(existing));
                }
            }

            let replaced = guard.members.insert(client_id.clone(), handle).is_some();
            let peers = guard.members.len() - 1;

            tracing::debug!(
                "Joined {} to session {} (members: {}, replaced: {})",
                client_id,
                session_id,
                guard.members.len(),
                replaced
            );

            return Ok(Joined {
                peers,
                replaced,
                delivery,
            });
        }
    }

    /// Remove `client_id` from a session if it is still bound to
    /// `connection_id`, and tell the remaining members.
    ///
    /// Returns `true` if the member was removed.
    pub async fn leave(
        &self,
        session_id: &SessionId,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> bool {
        let Some(members) = self.members(session_id) else {
            return false;
        };
        let mut guard = members.write().await;

        let owned = guard
            .members
            .get(client_id)
            .is_some_and(|handle| handle.id() == connection_id);
        if !owned {
            return false;
        }
        guard.members.remove(client_id);

        if let Some(left) = frame(&ServerEvent::peer_left(client_id.clone())) {
            for peer in guard.members.values() {
                peer.try_deliver(left.clone());
            }
        }

        if guard.members.is_empty() {
            guard.closed = true;
            self.sessions
                .remove_if(session_id, |_, current| Arc::ptr_eq(current, &members));
        }

        tracing::debug!(
            "{} left session {} (remaining: {})",
            client_id,
            session_id,
            guard.members.len()
        );
        true
    }

    /// Deliver `frame` to every member except `from`.
    ///
    /// Returns `None` when `from` is not a member bound to `connection_id`.
    pub async fn broadcast(
        &self,
        session_id: &SessionId,
        from: &ClientId,
        connection_id: ConnectionId,
        frame: Arc<str>,
    ) -> Option<Delivery> {
        let members = self.members(session_id)?;
        let guard = members.read().await;

        let sender = guard.members.get(from)?;
        if sender.id() != connection_id {
            return None;
        }

        let mut delivery = Delivery::default();
        for (peer_id, peer) in guard.members.iter() {
            if peer_id != from {
                delivery.record(peer.try_deliver(frame.clone()));
            }
        }
        Some(delivery)
    }

    /// Detach every member of a session and send each `session-ended`.
    ///
    /// Returns the number of members detached.
    pub async fn evict_session(&self, session_id: &SessionId) -> usize {
        let Some((_, members)) = self.sessions.remove(session_id) else {
            return 0;
        };
        let mut guard = members.write().await;
        guard.closed = true;

        let ended = frame(&ServerEvent::session_ended(session_id.clone()));
        let evicted = guard.members.len();
        for (_, peer) in guard.members.drain() {
            if let Some(ended) = &ended {
                peer.try_deliver(ended.clone());
            }
        }

        if evicted > 0 {
            tracing::info!(
                "Evicted {} member(s) from session {}",
                evicted,
                session_id
            );
        }
        evicted
    }

    /// Whether `client_id` is a member of the session through
    /// `connection_id`.
    pub async fn is_bound(
        &self,
        session_id: &SessionId,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> bool {
        match self.members(session_id) {
            Some(members) => members
                .read()
                .await
                .members
                .get(client_id)
                .is_some_and(|handle| handle.id() == connection_id),
            None => false,
        }
    }

    #[cfg(test)]
    async fn members_of(&self, session_id: &SessionId) -> Vec<ClientId> {
        let Some(members) = self.members(session_id) else {
            return Vec::new();
        };
        let guard = members.read().await;
        let mut ids: Vec<ClientId> = guard.members.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of members in a session.
    pub async fn participant_count(&self, session_id: &SessionId) -> usize {
        match self.members(session_id) {
            Some(members) => members.read().await.members.len(),
            None => 0,
        }
    }

    /// Joined connections across all sessions.
    pub fn total_connections(&self) -> usize {
        self.sessions
            .iter()
            .map(|entry| {
                // Gauge only, so skip sessions that are mid-update
                entry
                    .value()
                    .try_read()
                    .map(|guard| guard.members.len())
                    .unwrap_or(0)
            })
            .sum()
    }

    /// Sessions with at least one joined connection.
    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn members(&self, session_id: &SessionId) -> Option<Arc<RwLock<SessionMembers>>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    fn members_or_insert(&self, session_id: &SessionId) -> Arc<RwLock<SessionMembers>> {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SessionMembers::default())))
            .value()
            .clone()
    }
}

fn frame(event: &ServerEvent) -> Option<Arc<str>> {
    match event.to_frame() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            tracing::error!("Failed to serialize relay event: {}", e);
            None
        }
    }
}
