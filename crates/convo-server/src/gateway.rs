//! WebSocket gateway: one task pair per connection.
//!
//! The reader parses inbound frames and hands them to the signal relay.
//! The writer drains the connection's outbound queue, which is the only
//! path by which anything reaches the socket.

use std::collections::HashMap;

use axum::extract::rejection::QueryRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use convo_shared::constants::IDENTITY_QUERY_PARAM;
use convo_shared::protocol::{ClientEvent, ServerEvent};
use convo_shared::{ConnectionId, UserId};

use crate::api::AppState;
use crate::error::ServerError;
use crate::relay::{RelayOutcome, SignalRelay};

/// Identity is checked before the upgrade, so a bad handshake always gets
/// the JSON error body.
pub async fn ws_handler(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ServerError> {
    let Query(params) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let raw = params.get(IDENTITY_QUERY_PARAM).ok_or_else(|| {
        ServerError::BadRequest(format!("Missing {IDENTITY_QUERY_PARAM} query parameter"))
    })?;
    let identity = UserId::parse(raw)?;
    let ws = ws.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: UserId) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection = ConnectionId::new();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_text() {
                Ok(text) => text,
                Err(e) => {
                    warn!(event = event.name(), error = %e, "Failed to encode event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    state.registry.connect(identity.clone(), connection, tx).await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if let Err(err) = dispatch(&state.relay, &identity, &text).await {
                    debug!(user = %identity, error = %err, "Rejected frame");
                    state
                        .registry
                        .send_to_connection(connection, err.to_event())
                        .await;
                }
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(user = %identity, error = %e, "Socket read failed");
                break;
            }
        }
    }

    state.registry.disconnect(connection).await;
    writer.abort();
}

/// Parse one inbound frame and relay it.
pub async fn dispatch(
    relay: &SignalRelay,
    from: &UserId,
    text: &str,
) -> Result<RelayOutcome, ServerError> {
    let event = ClientEvent::parse(text)?;
    Ok(relay.relay(from, event).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{attach, drain, user};
    use crate::registry::ConnectionRegistry;

    #[tokio::test]
    async fn test_dispatch_errors_carry_codes() {
        let relay = SignalRelay::new(ConnectionRegistry::new());
        let alice = user("alice");

        let err = dispatch(&relay, &alice, "not json").await.unwrap_err();
        assert_eq!(err.code(), "malformed_frame");

        let err = dispatch(&relay, &alice, r#"{"event":"call:ring","data":{}}"#)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unknown_event");

        let err = dispatch(&relay, &alice, r#"{"event":"call:offer","data":{"to":"bob"}}"#)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_payload");
        assert!(matches!(err.to_event(), ServerEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_dispatch_relays_to_target() {
        let registry = ConnectionRegistry::new();
        let relay = SignalRelay::new(registry.clone());
        let (_, mut bob_rx) = attach(&registry, "bob").await;
        drain(&mut bob_rx);

        let outcome = dispatch(&relay, &user("alice"), r#"{"event":"typing","data":{"receiverId":"bob"}}"#)
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Forwarded(1));
        assert_eq!(drain(&mut bob_rx).len(), 1);

        let outcome = dispatch(&relay, &user("alice"), r#"{"event":"call:end","data":{"to":"carol"}}"#)
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Dropped);
    }
}
