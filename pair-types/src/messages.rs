//! Relay envelope for pairlink.
//!
//! Every frame on a relay connection is a JSON object with a string `type`.
//! Inbound frames are parsed into a [`ClientMessage`]; signaling payloads are
//! kept as the exact text received so the relay can forward them untouched.
//! Frames the relay originates are [`ServerEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ClientId, SessionId, WireError};

/// Kinds of signaling message the relay forwards between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// SDP offer from the initiating peer
    WebrtcOffer,
    /// SDP answer from the responding peer
    WebrtcAnswer,
    /// Trickled ICE candidate
    IceCandidate,
    /// Public key material for the application-level key agreement
    KeyExchange,
    /// Typing indicator
    Typing,
}

impl SignalKind {
    /// All forwardable kinds.
    pub const ALL: [SignalKind; 5] = [
        SignalKind::WebrtcOffer,
        SignalKind::WebrtcAnswer,
        SignalKind::IceCandidate,
        SignalKind::KeyExchange,
        SignalKind::Typing,
    ];

    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::WebrtcOffer => "webrtc-offer",
            SignalKind::WebrtcAnswer => "webrtc-answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::KeyExchange => "key-exchange",
            SignalKind::Typing => "typing",
        }
    }

    /// Look up a kind by wire name.
    pub fn from_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// Wire name of the join message.
pub const JOIN_SESSION: &str = "join-session";

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Attach this connection to a session
    Join(JoinSession),
    /// Signaling payload to forward to the other participants
    Signal(Signal),
}

/// `join-session` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSession {
    /// Session to join
    pub session_id: SessionId,
    /// Self-chosen identifier of the joining tab
    pub client_id: ClientId,
}

/// A signaling frame, kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Classified kind
    pub kind: SignalKind,
    /// Parsed object, used only for normalization
    pub body: Map<String, Value>,
    /// The exact text received
    pub raw: String,
}

impl Signal {
    /// Typing state carried by a `typing` frame (absent means false).
    pub fn is_typing(&self) -> bool {
        self.body
            .get("isTyping")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl ClientMessage {
    /// Parse an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text).map_err(WireError::InvalidJson)?;
        let body = match value {
            Value::Object(map) => map,
            _ => return Err(WireError::NotAnObject),
        };

        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or(WireError::MissingType)?;

        if kind == JOIN_SESSION {
            let session_id = SessionId::parse(string_field(&body, "sessionId")?)?;
            let client_id = ClientId::parse(string_field(&body, "clientId")?)?;
            return Ok(ClientMessage::Join(JoinSession {
                session_id,
                client_id,
            }));
        }

        match SignalKind::from_type(kind) {
            Some(kind) => Ok(ClientMessage::Signal(Signal {
                kind,
                body,
                raw: text.to_string(),
            })),
            None => Err(WireError::UnsupportedType(kind.to_string())),
        }
    }
}

fn string_field(body: &Map<String, Value>, field: &'static str) -> Result<String, WireError> {
    match body.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(WireError::InvalidField {
            field,
            reason: "expected a string".into(),
        }),
        None => Err(WireError::MissingField(field)),
    }
}

/// Frames emitted by the relay itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Another client joined the session
    PeerJoined(PeerJoined),
    /// Another client left the session
    PeerLeft(PeerLeft),
    /// Normalized typing indicator
    Typing(Typing),
    /// The session was deleted; this connection is no longer joined
    SessionEnded(SessionEnded),
    /// The previous frame from this connection was rejected
    Error(ErrorEvent),
}

/// Payload of `peer-joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerJoined {
    /// The client that joined
    pub client_id: ClientId,
}

/// Payload of `peer-left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeft {
    /// The client that left
    pub client_id: ClientId,
}

/// Payload of a forwarded `typing` indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    /// The client that is typing
    pub client_id: ClientId,
    /// Whether it is currently typing
    pub is_typing: bool,
}

/// Payload of `session-ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnded {
    /// The deleted session
    pub session_id: SessionId,
}

/// Stable error codes reported to relay clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Malformed frame
    InvalidMessage,
    /// Unknown `type`
    UnsupportedType,
    /// Signaling sent before a successful join
    NotJoined,
    /// Unknown or expired session (indistinguishable on purpose)
    SessionNotFound,
    /// Session already has its maximum number of participants
    SessionFull,
    /// Too many frames
    RateLimited,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl ServerEvent {
    /// `peer-joined` for `client_id`.
    pub fn peer_joined(client_id: ClientId) -> Self {
        ServerEvent::PeerJoined(PeerJoined { client_id })
    }

    /// `peer-left` for `client_id`.
    pub fn peer_left(client_id: ClientId) -> Self {
        ServerEvent::PeerLeft(PeerLeft { client_id })
    }

    /// Normalized `typing` from `client_id`.
    pub fn typing(client_id: ClientId, is_typing: bool) -> Self {
        ServerEvent::Typing(Typing {
            client_id,
            is_typing,
        })
    }

    /// `session-ended` for `session_id`.
    pub fn session_ended(session_id: SessionId) -> Self {
        ServerEvent::SessionEnded(SessionEnded { session_id })
    }

    /// `error` with a code and message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorEvent {
            code,
            message: message.into(),
        })
    }

    /// Serialize to a JSON text frame.
    pub fn to_frame(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_join() {
        let msg =
            ClientMessage::parse(r#"{"type":"join-session","sessionId":"abc","clientId":"host-1"}"#)
                .unwrap();
        match msg {
            ClientMessage::Join(join) => {
                assert_eq!(join.session_id.as_str(), "abc");
                assert_eq!(join.client_id.as_str(), "host-1");
            }
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn join_requires_both_ids() {
        let err = ClientMessage::parse(r#"{"type":"join-session","sessionId":"abc"}"#).unwrap_err();
        assert!(matches!(err, WireError::MissingField("clientId")));

        let err = ClientMessage::parse(r#"{"type":"join-session","sessionId":7,"clientId":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, WireError::InvalidField { field: "sessionId", .. }));

        let err =
            ClientMessage::parse(r#"{"type":"join-session","sessionId":"a|b","clientId":"x"}"#)
                .unwrap_err();
        assert!(matches!(err, WireError::InvalidField { field: "sessionId", .. }));
    }

    #[test]
    fn signal_keeps_raw_text() {
        let text = r#"{"type":"webrtc-offer","sdp":"X"}"#;
        let msg = ClientMessage::parse(text).unwrap();
        match msg {
            ClientMessage::Signal(signal) => {
                assert_eq!(signal.kind, SignalKind::WebrtcOffer);
                assert_eq!(signal.raw, text);
                assert_eq!(signal.body["sdp"], "X");
            }
            other => panic!("expected signal, got {:?}", other),
        }
    }

    #[test]
    fn every_signal_kind_is_recognized() {
        for kind in SignalKind::ALL {
            let text = json!({ "type": kind.as_str() }).to_string();
            match ClientMessage::parse(&text).unwrap() {
                ClientMessage::Signal(signal) => assert_eq!(signal.kind, kind),
                other => panic!("expected signal, got {:?}", other),
            }
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(WireError::InvalidJson(_))
        ));
        assert!(matches!(
            ClientMessage::parse("[1,2]"),
            Err(WireError::NotAnObject)
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"sdp":"X"}"#),
            Err(WireError::MissingType)
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"chat"}"#),
            Err(WireError::UnsupportedType(t)) if t == "chat"
        ));
    }

    #[test]
    fn typing_flag_defaults_to_false() {
        let parse = |text: &str| match ClientMessage::parse(text).unwrap() {
            ClientMessage::Signal(signal) => signal,
            other => panic!("expected signal, got {:?}", other),
        };
        assert!(parse(r#"{"type":"typing","isTyping":true}"#).is_typing());
        assert!(!parse(r#"{"type":"typing"}"#).is_typing());
        assert!(!parse(r#"{"type":"typing","isTyping":"yes"}"#).is_typing());
    }

    #[test]
    fn server_events_use_wire_names() {
        let client = ClientId::parse("peer-1").unwrap();

        let frame = ServerEvent::peer_joined(client.clone()).to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "type": "peer-joined", "clientId": "peer-1" }));

        let frame = ServerEvent::peer_left(client.clone()).to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "type": "peer-left", "clientId": "peer-1" }));

        let frame = ServerEvent::typing(client, true).to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({ "type": "typing", "clientId": "peer-1", "isTyping": true })
        );

        let frame = ServerEvent::error(ErrorCode::SessionFull, "full")
            .to_frame()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({ "type": "error", "code": "session-full", "message": "full" })
        );
    }

    #[test]
    fn server_events_deserialize() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"session-ended","sessionId":"abc"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::session_ended(SessionId::parse("abc").unwrap())
        );
    }
}
