//! Typing-indicator and call-signaling relays.
//!
//! Both are stateless: resolve the target through the registry, tag the
//! payload with the sender identity and forward it untouched. Nothing is
//! queued for offline targets and the sender is not told about the drop.
//! No call-session state is kept here; ring timeouts and busy handling are
//! the clients' business.

use tracing::debug;

use convo_shared::protocol::{
    CallAnswer, CallEnd, CallIceCandidate, CallOffer, ClientEvent, RelayedAnswer, RelayedEnd,
    RelayedIceCandidate, RelayedOffer, ServerEvent, TypingNotice,
};
use convo_shared::UserId;

use crate::registry::ConnectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Forwarded to this many live connections of the target.
    Forwarded(usize),
    /// Target offline; payload discarded.
    Dropped,
}

#[derive(Clone)]
pub struct SignalRelay {
    registry: ConnectionRegistry,
}

impl SignalRelay {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Forward one client event from `from` to its target.
    pub async fn relay(&self, from: &UserId, event: ClientEvent) -> RelayOutcome {
        let name = event.name();
        let target = event.target().clone();

        let outbound = match event {
            ClientEvent::Typing(_) => typing(from, true),
            ClientEvent::StopTyping(_) => typing(from, false),
            ClientEvent::CallOffer(offer) => call_offer(from, offer),
            ClientEvent::CallAnswer(answer) => call_answer(from, answer),
            ClientEvent::CallIceCandidate(ice) => call_ice(from, ice),
            ClientEvent::CallEnd(end) => call_end(from, end),
        };

        match self.registry.send_to(&target, &[outbound]).await {
            0 => {
                debug!(event = name, from = %from, to = %target, "Target offline, dropping");
                RelayOutcome::Dropped
            }
            reached => {
                debug!(event = name, from = %from, to = %target, reached, "Relayed");
                RelayOutcome::Forwarded(reached)
            }
        }
    }
}

fn typing(from: &UserId, started: bool) -> ServerEvent {
    let notice = TypingNotice {
        sender_id: from.clone(),
    };
    if started {
        ServerEvent::Typing(notice)
    } else {
        ServerEvent::StopTyping(notice)
    }
}

fn call_offer(from: &UserId, offer: CallOffer) -> ServerEvent {
    ServerEvent::CallOffer(RelayedOffer {
        from: from.clone(),
        offer: offer.offer,
        caller: offer.caller,
        call_type: offer.call_type,
    })
}

fn call_answer(from: &UserId, answer: CallAnswer) -> ServerEvent {
    ServerEvent::CallAnswer(RelayedAnswer {
        from: from.clone(),
        answer: answer.answer,
        callee: answer.callee,
        call_type: answer.call_type,
    })
}

fn call_ice(from: &UserId, ice: CallIceCandidate) -> ServerEvent {
    ServerEvent::CallIceCandidate(RelayedIceCandidate {
        from: from.clone(),
        candidate: ice.candidate,
    })
}

fn call_end(from: &UserId, _end: CallEnd) -> ServerEvent {
    ServerEvent::CallEnded(RelayedEnd { from: from.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{attach, drain, user};

    fn parse(frame: &str) -> ClientEvent {
        ClientEvent::parse(frame).unwrap()
    }

    #[tokio::test]
    async fn test_offer_forwarded_verbatim_with_sender() {
        let registry = ConnectionRegistry::new();
        let relay = SignalRelay::new(registry.clone());
        let (_, mut bob_rx) = attach(&registry, "bob").await;
        drain(&mut bob_rx);

        let frame = r#"{"event":"call:offer","data":{"to":"bob","offer":{"type":"offer","sdp":"v=0\r\no=- 46117 2 IN IP4 127.0.0.1\r\n"},"caller":{"id":"alice","name":"Alice"},"callType":"audio"}}"#;
        let outcome = relay.relay(&user("alice"), parse(frame)).await;
        assert_eq!(outcome, RelayOutcome::Forwarded(1));

        let events = drain(&mut bob_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].to_text().unwrap(),
            r#"{"event":"call:offer","data":{"from":"alice","offer":{"type":"offer","sdp":"v=0\r\no=- 46117 2 IN IP4 127.0.0.1\r\n"},"caller":{"id":"alice","name":"Alice"},"callType":"audio"}}"#
        );
    }

    #[tokio::test]
    async fn test_ice_and_end() {
        let registry = ConnectionRegistry::new();
        let relay = SignalRelay::new(registry.clone());
        let (_, mut alice_rx) = attach(&registry, "alice").await;
        drain(&mut alice_rx);

        let ice = r#"{"event":"call:ice-candidate","data":{"to":"alice","candidate":{"candidate":"candidate:842163049 1 udp 1677729535 203.0.113.7 3478 typ srflx","sdpMLineIndex":0}}}"#;
        relay.relay(&user("bob"), parse(ice)).await;
        relay
            .relay(&user("bob"), parse(r#"{"event":"call:end","data":{"to":"alice"}}"#))
            .await;

        let texts: Vec<String> = drain(&mut alice_rx)
            .iter()
            .map(|e| e.to_text().unwrap())
            .collect();
        assert_eq!(
            texts,
            vec![
                r#"{"event":"call:ice-candidate","data":{"from":"bob","candidate":{"candidate":"candidate:842163049 1 udp 1677729535 203.0.113.7 3478 typ srflx","sdpMLineIndex":0}}}"#.to_string(),
                r#"{"event":"call:ended","data":{"from":"bob"}}"#.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_target_silently_dropped() {
        let registry = ConnectionRegistry::new();
        let relay = SignalRelay::new(registry.clone());
        let (_, mut alice_rx) = attach(&registry, "alice").await;
        drain(&mut alice_rx);

        let frame = r#"{"event":"call:answer","data":{"to":"ghost","answer":{"type":"answer","sdp":"v=0"}}}"#;
        assert_eq!(
            relay.relay(&user("alice"), parse(frame)).await,
            RelayOutcome::Dropped
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_tagged_with_sender() {
        let registry = ConnectionRegistry::new();
        let relay = SignalRelay::new(registry.clone());
        let (_, mut bob_rx) = attach(&registry, "bob").await;
        drain(&mut bob_rx);

        relay
            .relay(&user("alice"), parse(r#"{"event":"typing","data":{"receiverId":"bob"}}"#))
            .await;
        relay
            .relay(&user("alice"), parse(r#"{"event":"stopTyping","data":{"receiverId":"bob"}}"#))
            .await;

        let events = drain(&mut bob_rx);
        assert!(matches!(&events[0], ServerEvent::Typing(n) if n.sender_id == user("alice")));
        assert!(matches!(&events[1], ServerEvent::StopTyping(n) if n.sender_id == user("alice")));
    }
}
