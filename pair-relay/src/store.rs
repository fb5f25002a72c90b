//! In-memory session store.
//!
//! Sessions and their ephemeral signaling blobs share one entry in a sharded
//! concurrent map, so every mutation of a session (create, re-sign, delete,
//! sweep) happens under that entry's shard lock. Reads are expiry-aware: an
//! expired entry is removed on first touch and reported as absent.

use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::signaling::SignalingBlobs;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pair_core::{assertion_message, Signer};
use pair_types::{Session, SessionId, MAX_HOST_KEY_LEN};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Fields that may change after creation.
///
/// `expires_at` and `created_at` are immutable, and the signature is never
/// set directly: it is recomputed whenever the host key changes.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    /// New host public key.
    pub host_public_key: Option<String>,
    /// New advisory status.
    pub active: Option<bool>,
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    signaling: SignalingBlobs,
}

impl SessionEntry {
    fn new(session: Session) -> Self {
        Self {
            session,
            signaling: SignalingBlobs::default(),
        }
    }
}

/// Authoritative table of live sessions.
pub struct SessionStore {
    entries: DashMap<SessionId, SessionEntry>,
    signer: Arc<Signer>,
    clock: Arc<dyn Clock>,
    max_ice_candidates: usize,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("entries", &self.entries.len())
            .field("clock", &self.clock)
            .field("max_ice_candidates", &self.max_ice_candidates)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an empty store.
    pub fn new(signer: Arc<Signer>, clock: Arc<dyn Clock>, max_ice_candidates: usize) -> Self {
        Self {
            entries: DashMap::new(),
            signer,
            clock,
            max_ice_candidates,
        }
    }

    /// The signer used for session assertions.
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Current time according to the store's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Create and sign a session expiring `ttl` from now.
    ///
    /// The record is signed before it is inserted, so no reader ever sees it
    /// with a placeholder signature.
    ///
    /// Ids are unique among live sessions only. An id whose session expired
    /// or was deleted can be created again with fresh blobs. Ids from
    /// [`SessionId::generate`] are random uuids and never collide in practice.
    pub fn create(
        &self,
        id: SessionId,
        host_public_key: impl Into<String>,
        ttl: Duration,
    ) -> StoreResult<Session> {
        let host_public_key = host_public_key.into();
        validate_host_key(&host_public_key)?;
        if ttl.is_zero() {
            return Err(StoreError::InvalidInput {
                reason: "ttl must be greater than zero".into(),
            });
        }

        let now = self.clock.now_ms();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let mut session = Session {
            id,
            host_public_key,
            signature: String::new(),
            expires_at: now.saturating_add(ttl_ms),
            created_at: now,
            active: true,
        };
        session.signature = self.sign(&session);

        match self.entries.entry(session.id.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().session.is_expired(now) {
                    return Err(StoreError::AlreadyExists {
                        id: session.id.clone(),
                    });
                }
                occupied.insert(SessionEntry::new(session.clone()));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SessionEntry::new(session.clone()));
            }
        }

        tracing::debug!(
            "Created session {} (expires in {}ms)",
            session.id,
            session.remaining_ms(now)
        );
        Ok(session)
    }

    /// Look up a live session. Expired sessions are removed and reported
    /// as absent.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.read_live(id, |entry| entry.session.clone()).ok()
    }

    /// Merge `update` into a live session, re-signing if the key changed.
    pub fn update(&self, id: &SessionId, update: SessionUpdate) -> StoreResult<Session> {
        if let Some(key) = &update.host_public_key {
            validate_host_key(key)?;
        }
        self.write_live(id, |entry| {
            if let Some(key) = update.host_public_key {
                entry.session.host_public_key = key;
                entry.session.signature = self.sign(&entry.session);
            }
            if let Some(active) = update.active {
                entry.session.active = active;
            }
            Ok(entry.session.clone())
        })
    }

    /// Delete a session and its signaling blobs. Idempotent.
    ///
    /// Returns `true` if a live session was removed.
    pub fn delete(&self, id: &SessionId) -> bool {
        let now = self.clock.now_ms();
        match self.entries.remove(id) {
            Some((_, entry)) => {
                tracing::debug!("Deleted session {}", id);
                !entry.session.is_expired(now)
            }
            None => false,
        }
    }

    /// Remove every expired session. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.session.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Snapshot of live sessions, oldest first.
    pub fn list(&self) -> Vec<Session> {
        let now = self.clock.now_ms();
        let mut sessions: Vec<Session> = self
            .entries
            .iter()
            .filter(|entry| !entry.session.is_expired(now))
            .map(|entry| entry.session.clone())
            .collect();
        sessions.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        sessions
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.entries
            .iter()
            .filter(|entry| !entry.session.is_expired(now))
            .count()
    }

    /// Whether there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the session's current offer.
    pub fn set_offer(&self, id: &SessionId, offer: Value) -> StoreResult<()> {
        self.write_live(id, |entry| {
            entry.signaling.set_offer(offer);
            Ok(())
        })
    }

    /// The session's current offer, if any.
    pub fn offer(&self, id: &SessionId) -> StoreResult<Option<Value>> {
        self.read_live(id, |entry| entry.signaling.offer.clone())
    }

    /// Replace the session's current answer.
    pub fn set_answer(&self, id: &SessionId, answer: Value) -> StoreResult<()> {
        self.write_live(id, |entry| {
            entry.signaling.set_answer(answer);
            Ok(())
        })
    }

    /// The session's current answer, if any.
    pub fn answer(&self, id: &SessionId) -> StoreResult<Option<Value>> {
        self.read_live(id, |entry| entry.signaling.answer.clone())
    }

    /// Append an ICE candidate. Returns the new candidate count.
    pub fn add_ice_candidate(&self, id: &SessionId, candidate: Value) -> StoreResult<usize> {
        let limit = self.max_ice_candidates;
        self.write_live(id, |entry| entry.signaling.push_candidate(candidate, limit))
    }

    /// ICE candidates in arrival order.
    pub fn ice_candidates(&self, id: &SessionId) -> StoreResult<Vec<Value>> {
        self.read_live(id, |entry| entry.signaling.ice_candidates.clone())
    }

    /// Snapshot of all signaling blobs of a session.
    pub fn signaling(&self, id: &SessionId) -> StoreResult<SignalingBlobs> {
        self.read_live(id, |entry| entry.signaling.clone())
    }

    fn sign(&self, session: &Session) -> String {
        self.signer.sign(&assertion_message(
            &session.id,
            &session.host_public_key,
            session.expires_at,
        ))
    }

    fn read_live<R>(&self, id: &SessionId, f: impl FnOnce(&SessionEntry) -> R) -> StoreResult<R> {
        let now = self.clock.now_ms();
        {
            let entry = match self.entries.get(id) {
                Some(entry) => entry,
                None => return Err(StoreError::NotFound),
            };
            if !entry.session.is_expired(now) {
                return Ok(f(entry.value()));
            }
        }
        self.remove_expired(id, now);
        Err(StoreError::NotFound)
    }

    fn write_live<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut SessionEntry) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let now = self.clock.now_ms();
        {
            let mut entry = match self.entries.get_mut(id) {
                Some(entry) => entry,
                None => return Err(StoreError::NotFound),
            };
            if !entry.session.is_expired(now) {
                return f(entry.value_mut());
            }
        }
        self.remove_expired(id, now);
        Err(StoreError::NotFound)
    }

    fn remove_expired(&self, id: &SessionId, now: u64) -> bool {
        let removed = self
            .entries
            .remove_if(id, |_, entry| entry.session.is_expired(now))
            .is_some();
        if removed {
            tracing::debug!("Session {} expired on access", id);
        }
        removed
    }
}

fn validate_host_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidInput {
            reason: "hostPublicKey must not be empty".into(),
        });
    }
    if key.len() > MAX_HOST_KEY_LEN {
        return Err(StoreError::InvalidInput {
            reason: format!("hostPublicKey longer than {} bytes", MAX_HOST_KEY_LEN),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pair_core::PairingCode;
    use serde_json::json;

    const START: u64 = 1_700_000_000_000;

    fn test_store() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let signer = Arc::new(Signer::new(b"store-test-secret-00000000000000"));
        (SessionStore::new(signer, clock.clone(), 4), clock)
    }

    fn sid(id: &str) -> SessionId {
        SessionId::parse(id).unwrap()
    }

    #[test]
    fn create_signs_before_insert() {
        let (store, _clock) = test_store();
        let session = store
            .create(sid("s1"), "pubkeyA", Duration::from_secs(60))
            .unwrap();

        assert_eq!(session.created_at, START);
        assert_eq!(session.expires_at, START + 60_000);
        assert!(session.active);
        assert!(store
            .signer()
            .verify("s1|pubkeyA|1700000060000", &session.signature));
        assert_eq!(store.get(&sid("s1")), Some(session));
    }

    #[test]
    fn get_respects_ttl_boundary_exactly() {
        let (store, clock) = test_store();
        store
            .create(sid("s1"), "pubkeyA", Duration::from_millis(2_000))
            .unwrap();

        clock.set(START + 1_999);
        assert!(store.get(&sid("s1")).is_some());

        clock.set(START + 2_000);
        assert!(store.get(&sid("s1")).is_none());

        // Lazily removed, so rewinding does not resurrect it
        clock.set(START);
        assert!(store.get(&sid("s1")).is_none());
    }

    #[test]
    fn duplicate_live_id_is_rejected() {
        let (store, clock) = test_store();
        store.create(sid("dup"), "k1", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.create(sid("dup"), "k2", Duration::from_secs(1)),
            Err(StoreError::AlreadyExists { id: sid("dup") })
        );

        // An expired holder of the id does not block reuse
        clock.advance(Duration::from_secs(1));
        let session = store.create(sid("dup"), "k3", Duration::from_secs(1)).unwrap();
        assert_eq!(session.host_public_key, "k3");
    }

    #[test]
    fn invalid_input_is_rejected_without_mutation() {
        let (store, _clock) = test_store();
        assert!(matches!(
            store.create(sid("s1"), "", Duration::from_secs(1)),
            Err(StoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            store.create(sid("s1"), "k", Duration::ZERO),
            Err(StoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            store.create(sid("s1"), "k".repeat(MAX_HOST_KEY_LEN + 1), Duration::from_secs(1)),
            Err(StoreError::InvalidInput { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn update_resigns_and_keeps_timestamps() {
        let (store, clock) = test_store();
        let original = store
            .create(sid("s1"), "pubkeyA", Duration::from_secs(60))
            .unwrap();
        clock.advance(Duration::from_secs(5));

        let updated = store
            .update(
                &sid("s1"),
                SessionUpdate {
                    host_public_key: Some("pubkeyB".into()),
                    active: None,
                },
            )
            .unwrap();

        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.expires_at, original.expires_at);
        assert_ne!(updated.signature, original.signature);
        let code = PairingCode::for_session(&updated);
        assert!(code.verify(store.signer(), store.now_ms()).is_ok());
        assert!(PairingCode::for_session(&original)
            .verify(store.signer(), store.now_ms())
            .is_err());
    }

    #[test]
    fn update_active_flag_keeps_signature() {
        let (store, _clock) = test_store();
        let original = store.create(sid("s1"), "k", Duration::from_secs(60)).unwrap();
        let updated = store
            .update(
                &sid("s1"),
                SessionUpdate {
                    host_public_key: None,
                    active: Some(false),
                },
            )
            .unwrap();
        assert!(!updated.active);
        assert_eq!(updated.signature, original.signature);
    }

    #[test]
    fn update_missing_or_expired_is_not_found() {
        let (store, clock) = test_store();
        assert_eq!(
            store.update(&sid("nope"), SessionUpdate::default()),
            Err(StoreError::NotFound)
        );

        store.create(sid("s1"), "k", Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(
            store.update(&sid("s1"), SessionUpdate::default()),
            Err(StoreError::NotFound)
        );
    }

    #[test]
    fn delete_is_idempotent_and_clears_blobs() {
        let (store, _clock) = test_store();
        let id = sid("s1");
        store.create(id.clone(), "k", Duration::from_secs(60)).unwrap();
        store.set_offer(&id, json!({ "sdp": "X" })).unwrap();
        store.set_answer(&id, json!({ "sdp": "Y" })).unwrap();
        store.add_ice_candidate(&id, json!({ "candidate": "c1" })).unwrap();
        assert!(!store.signaling(&id).unwrap().is_empty());

        assert!(store.delete(&id));
        assert!(!store.delete(&id));

        assert_eq!(store.offer(&id), Err(StoreError::NotFound));
        assert_eq!(store.answer(&id), Err(StoreError::NotFound));
        assert_eq!(store.ice_candidates(&id), Err(StoreError::NotFound));

        // Re-creating the id starts with empty blobs
        store.create(id.clone(), "k", Duration::from_secs(60)).unwrap();
        assert!(store.signaling(&id).unwrap().is_empty());
    }

    #[test]
    fn sweep_removes_expired_sessions_and_listing() {
        let (store, clock) = test_store();
        store.create(sid("short"), "k", Duration::from_secs(2)).unwrap();
        store.create(sid("long"), "k", Duration::from_secs(600)).unwrap();
        store.set_offer(&sid("short"), json!("offer")).unwrap();

        clock.advance(Duration::from_secs(3));
        assert_eq!(store.sweep_expired(), 1);

        assert!(store.get(&sid("short")).is_none());
        let listed: Vec<_> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![sid("long")]);
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn list_is_oldest_first() {
        let (store, clock) = test_store();
        store.create(sid("b"), "k", Duration::from_secs(60)).unwrap();
        clock.advance(Duration::from_millis(1));
        store.create(sid("a"), "k", Duration::from_secs(60)).unwrap();

        let listed: Vec<_> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![sid("b"), sid("a")]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn candidate_limit_is_enforced() {
        let (store, _clock) = test_store();
        let id = sid("s1");
        store.create(id.clone(), "k", Duration::from_secs(60)).unwrap();
        for i in 0..4 {
            assert_eq!(store.add_ice_candidate(&id, json!(i)), Ok(i + 1));
        }
        assert_eq!(
            store.add_ice_candidate(&id, json!(4)),
            Err(StoreError::CandidateLimit { limit: 4 })
        );
        assert_eq!(store.ice_candidates(&id).unwrap().len(), 4);
    }

    #[test]
    fn blobs_of_expired_session_are_unreachable() {
        let (store, clock) = test_store();
        let id = sid("s1");
        store.create(id.clone(), "k", Duration::from_secs(1)).unwrap();
        store.set_offer(&id, json!("offer")).unwrap();

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.offer(&id), Err(StoreError::NotFound));
        assert_eq!(
            store.set_answer(&id, json!("answer")),
            Err(StoreError::NotFound)
        );
    }

    #[test]
    fn concurrent_sweep_and_delete_remove_once() {
        let (store, clock) = test_store();
        let store = Arc::new(store);
        for i in 0..200 {
            store
                .create(sid(&format!("s{i}")), "k", Duration::from_secs(1))
                .unwrap();
        }
        clock.advance(Duration::from_secs(1));

        let sweeper = {
            let store = store.clone();
            std::thread::spawn(move || store.sweep_expired())
        };
        let deleter = {
            let store = store.clone();
            std::thread::spawn(move || {
                (0..200)
                    .filter(|i| store.entries.remove(&sid(&format!("s{i}"))).is_some())
                    .count()
            })
        };

        let swept = sweeper.join().unwrap();
        let deleted = deleter.join().unwrap();
        assert_eq!(swept + deleted, 200);
        assert!(store.entries.is_empty());
    }

    #[test]
    fn concurrent_creates_are_all_recorded() {
        let (store, _clock) = test_store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .create(SessionId::generate(), format!("k{t}-{i}"), Duration::from_secs(60))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
