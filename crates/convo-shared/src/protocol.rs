//! Real-time event protocol.
//!
//! Frames are JSON text of the form `{"event": "<name>", "data": {...}}`.
//! Inbound frames decode into [`ClientEvent`] through a single dispatch table
//! in [`ClientEvent::parse`]; outbound frames are [`ServerEvent`] values.
//!
//! Call-signaling bodies (SDP, ICE candidates, caller/callee cards) are kept
//! as raw JSON and re-emitted byte-for-byte.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ProtocolError;
use crate::message::Message;
use crate::types::{CallKind, UserId};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const EVENT_TYPING: &str = "typing";
pub const EVENT_STOP_TYPING: &str = "stopTyping";
pub const EVENT_CALL_OFFER: &str = "call:offer";
pub const EVENT_CALL_ANSWER: &str = "call:answer";
pub const EVENT_CALL_ICE: &str = "call:ice-candidate";
pub const EVENT_CALL_END: &str = "call:end";

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Events a connected client may send.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Typing(TypingSignal),
    StopTyping(TypingSignal),
    CallOffer(CallOffer),
    CallAnswer(CallAnswer),
    CallIceCandidate(CallIceCandidate),
    CallEnd(CallEnd),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub receiver_id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOffer {
    pub to: UserId,
    pub offer: Box<RawValue>,
    #[serde(default)]
    pub caller: Option<Box<RawValue>>,
    #[serde(default)]
    pub call_type: Option<CallKind>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswer {
    pub to: UserId,
    pub answer: Box<RawValue>,
    #[serde(default)]
    pub callee: Option<Box<RawValue>>,
    #[serde(default)]
    pub call_type: Option<CallKind>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallIceCandidate {
    pub to: UserId,
    pub candidate: Box<RawValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallEnd {
    pub to: UserId,
}

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(borrow)]
    event: Cow<'a, str>,
    #[serde(borrow, default)]
    data: Option<&'a RawValue>,
}

fn decode<T: for<'de> Deserialize<'de>>(
    event: &'static str,
    data: &str,
) -> Result<T, ProtocolError> {
    serde_json::from_str(data).map_err(|source| ProtocolError::InvalidPayload { event, source })
}

impl ClientEvent {
    /// Decode one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope<'_> = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let data = envelope.data.map(RawValue::get).unwrap_or("null");

        let event = match envelope.event.as_ref() {
            EVENT_TYPING => ClientEvent::Typing(decode(EVENT_TYPING, data)?),
            EVENT_STOP_TYPING => ClientEvent::StopTyping(decode(EVENT_STOP_TYPING, data)?),
            EVENT_CALL_OFFER => ClientEvent::CallOffer(decode(EVENT_CALL_OFFER, data)?),
            EVENT_CALL_ANSWER => ClientEvent::CallAnswer(decode(EVENT_CALL_ANSWER, data)?),
            EVENT_CALL_ICE => ClientEvent::CallIceCandidate(decode(EVENT_CALL_ICE, data)?),
            EVENT_CALL_END => ClientEvent::CallEnd(decode(EVENT_CALL_END, data)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };

        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Typing(_) => EVENT_TYPING,
            ClientEvent::StopTyping(_) => EVENT_STOP_TYPING,
            ClientEvent::CallOffer(_) => EVENT_CALL_OFFER,
            ClientEvent::CallAnswer(_) => EVENT_CALL_ANSWER,
            ClientEvent::CallIceCandidate(_) => EVENT_CALL_ICE,
            ClientEvent::CallEnd(_) => EVENT_CALL_END,
        }
    }

    /// Identity the event is addressed to.
    pub fn target(&self) -> &UserId {
        match self {
            ClientEvent::Typing(signal) | ClientEvent::StopTyping(signal) => &signal.receiver_id,
            ClientEvent::CallOffer(offer) => &offer.to,
            ClientEvent::CallAnswer(answer) => &answer.to,
            ClientEvent::CallIceCandidate(ice) => &ice.to,
            ClientEvent::CallEnd(end) => &end.to,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Events pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full set of identities currently online.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<UserId>),

    #[serde(rename = "newMessage")]
    NewMessage(Message),

    /// Lightweight preview for toast/system notifications.
    #[serde(rename = "notify")]
    Notify(Notification),

    #[serde(rename = "messageEdited")]
    MessageEdited(Message),

    #[serde(rename = "typing")]
    Typing(TypingNotice),

    #[serde(rename = "stopTyping")]
    StopTyping(TypingNotice),

    #[serde(rename = "call:offer")]
    CallOffer(RelayedOffer),

    #[serde(rename = "call:answer")]
    CallAnswer(RelayedAnswer),

    #[serde(rename = "call:ice-candidate")]
    CallIceCandidate(RelayedIceCandidate),

    #[serde(rename = "call:ended")]
    CallEnded(RelayedEnd),

    /// Structured failure acknowledgement sent back to the originator.
    #[serde(rename = "error")]
    Error(EventError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(rename = "avatarURL")]
    pub avatar_url: String,
    pub message_preview: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub sender_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedOffer {
    pub from: UserId,
    pub offer: Box<RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_type: Option<CallKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedAnswer {
    pub from: UserId,
    pub answer: Box<RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_type: Option<CallKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayedIceCandidate {
    pub from: UserId,
    pub candidate: Box<RawValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayedEnd {
    pub from: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventError {
    pub code: String,
    pub message: String,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "getOnlineUsers",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::Notify(_) => "notify",
            ServerEvent::MessageEdited(_) => "messageEdited",
            ServerEvent::Typing(_) => EVENT_TYPING,
            ServerEvent::StopTyping(_) => EVENT_STOP_TYPING,
            ServerEvent::CallOffer(_) => "call:offer",
            ServerEvent::CallAnswer(_) => "call:answer",
            ServerEvent::CallIceCandidate(_) => "call:ice-candidate",
            ServerEvent::CallEnded(_) => "call:ended",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error(EventError {
            code: code.into(),
            message: message.into(),
        })
    }

    /// Serialize to a JSON text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typing() {
        let event = ClientEvent::parse(r#"{"event":"typing","data":{"receiverId":"bob"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::Typing(_)));
        assert_eq!(event.target().as_str(), "bob");
    }

    #[test]
    fn test_parse_ice_keeps_candidate_bytes() {
        let frame = r#"{"event":"call:ice-candidate","data":{"to":"bob","candidate":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54400 typ host",  "sdpMid":"0"}}}"#;
        let ClientEvent::CallIceCandidate(ice) = ClientEvent::parse(frame).unwrap() else {
            panic!("expected ICE candidate");
        };
        assert_eq!(
            ice.candidate.get(),
            r#"{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54400 typ host",  "sdpMid":"0"}"#
        );
    }

    #[test]
    fn test_parse_offer_optional_fields() {
        let frame = r#"{"event":"call:offer","data":{"to":"bob","offer":{"type":"offer","sdp":"v=0"},"callType":"video"}}"#;
        let ClientEvent::CallOffer(offer) = ClientEvent::parse(frame).unwrap() else {
            panic!("expected offer");
        };
        assert!(offer.caller.is_none());
        assert_eq!(offer.call_type, Some(CallKind::Video));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let err = ClientEvent::parse(r#"{"event":"call:ring","data":{"to":"bob"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(ref name) if name == "call:ring"));
        assert_eq!(err.code(), "unknown_event");
    }

    #[test]
    fn test_missing_target_rejected() {
        let err = ClientEvent::parse(r#"{"event":"typing","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { event: EVENT_TYPING, .. }));

        let err = ClientEvent::parse(r#"{"event":"call:end"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            ClientEvent::parse("not json").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
    }

    #[test]
    fn test_server_event_envelope() {
        let event = ServerEvent::Typing(TypingNotice {
            sender_id: UserId::parse("alice").unwrap(),
        });
        assert_eq!(
            event.to_text().unwrap(),
            r#"{"event":"typing","data":{"senderId":"alice"}}"#
        );
    }

    #[test]
    fn test_relayed_answer_verbatim() {
        let answer = RawValue::from_string(r#"{"type":"answer", "sdp":"v=0\r\n"}"#.to_string()).unwrap();
        let event = ServerEvent::CallAnswer(RelayedAnswer {
            from: UserId::parse("bob").unwrap(),
            answer,
            callee: None,
            call_type: None,
        });
        assert_eq!(
            event.to_text().unwrap(),
            r#"{"event":"call:answer","data":{"from":"bob","answer":{"type":"answer", "sdp":"v=0\r\n"}}}"#
        );
    }
}
