//! Ephemeral signaling blobs.
//!
//! The relay keeps the latest offer, the latest answer, and the ICE candidates
//! posted for a session so a client that polls over HTTP can catch up. Blobs
//! live inside the session's store entry and disappear with it.

use crate::error::{StoreError, StoreResult};
use serde::Serialize;
use serde_json::Value;

/// Offer, answer and ICE candidates of one session. All values are opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingBlobs {
    /// Current SDP offer.
    pub offer: Option<Value>,
    /// Current SDP answer.
    pub answer: Option<Value>,
    /// ICE candidates in arrival order.
    pub ice_candidates: Vec<Value>,
}

impl SignalingBlobs {
    /// Replace the current offer.
    pub fn set_offer(&mut self, offer: Value) {
        self.offer = Some(offer);
    }

    /// Replace the current answer.
    pub fn set_answer(&mut self, answer: Value) {
        self.answer = Some(answer);
    }

    /// Append a candidate unless `limit` is reached.
    pub fn push_candidate(&mut self, candidate: Value, limit: usize) -> StoreResult<usize> {
        if self.ice_candidates.len() >= limit {
            return Err(StoreError::CandidateLimit { limit });
        }
        self.ice_candidates.push(candidate);
        Ok(self.ice_candidates.len())
    }

    /// Whether nothing has been posted yet.
    pub fn is_empty(&self) -> bool {
        self.offer.is_none() && self.answer.is_none() && self.ice_candidates.is_empty()
    }
}
