//! Connection registry and presence broadcaster.
//!
//! Tracks which identities hold a live real-time connection. An identity may
//! hold several connections at once (tabs, devices); it stays online until
//! its last connection goes away.
//!
//! Every connect and disconnect pushes the full online set to every live
//! connection. The broadcast happens under the same write lock as the
//! mutation, so all connections see presence snapshots in mutation order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use convo_shared::protocol::ServerEvent;
use convo_shared::{ConnectionId, UserId};

/// Outbound queue of one connection, drained by its socket writer.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

struct LiveConnection {
    identity: UserId,
    outbound: Outbound,
}

#[derive(Default)]
struct RegistryInner {
    by_identity: HashMap<UserId, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, LiveConnection>,
}

impl RegistryInner {
    fn online(&self) -> Vec<UserId> {
        let mut online: Vec<UserId> = self.by_identity.keys().cloned().collect();
        online.sort();
        online
    }

    fn broadcast_presence(&self) {
        let event = ServerEvent::OnlineUsers(self.online());
        for (id, live) in &self.connections {
            if live.outbound.send(event.clone()).is_err() {
                debug!(connection = %id, "Skipping presence for closed connection");
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection for `identity` and broadcast presence.
    pub async fn connect(&self, identity: UserId, connection: ConnectionId, outbound: Outbound) {
        let mut inner = self.inner.write().await;

        inner
            .by_identity
            .entry(identity.clone())
            .or_default()
            .insert(connection);
        inner.connections.insert(
            connection,
            LiveConnection {
                identity: identity.clone(),
                outbound,
            },
        );

        info!(
            user = %identity,
            connection = %connection,
            online = inner.by_identity.len(),
            "Connection registered"
        );

        inner.broadcast_presence();
    }

    /// Drop one connection. The identity goes offline only when this was its
    /// last connection. Returns the identity that owned the connection.
    pub async fn disconnect(&self, connection: ConnectionId) -> Option<UserId> {
        let mut inner = self.inner.write().await;

        let live = inner.connections.remove(&connection)?;
        let now_offline = match inner.by_identity.get_mut(&live.identity) {
            Some(set) => {
                set.remove(&connection);
                set.is_empty()
            }
            None => false,
        };
        if now_offline {
            inner.by_identity.remove(&live.identity);
        }

        info!(
            user = %live.identity,
            connection = %connection,
            still_online = !now_offline,
            "Connection closed"
        );

        inner.broadcast_presence();
        Some(live.identity)
    }

    /// Live connections of `identity`; empty when offline.
    pub async fn lookup(&self, identity: &UserId) -> Vec<ConnectionId> {
        self.inner
            .read()
            .await
            .by_identity
            .get(identity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Sorted set of online identities.
    pub async fn online(&self) -> Vec<UserId> {
        self.inner.read().await.online()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Push `events`, in order, to every live connection of `identity`.
    ///
    /// At-most-once: no acknowledgement, no retry, nothing queued for
    /// offline identities. Returns how many connections were reached.
    pub async fn send_to(&self, identity: &UserId, events: &[ServerEvent]) -> usize {
        let inner = self.inner.read().await;
        let Some(set) = inner.by_identity.get(identity) else {
            return 0;
        };

        let mut reached = 0;
        for id in set {
            let Some(live) = inner.connections.get(id) else {
                continue;
            };
            if events.iter().all(|event| live.outbound.send(event.clone()).is_ok()) {
                reached += 1;
            } else {
                debug!(user = %identity, connection = %id, "Outbound queue closed");
            }
        }
        reached
    }

    /// Push one event to a single connection, e.g. an error acknowledgement.
    pub async fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        self.inner
            .read()
            .await
            .connections
            .get(&connection)
            .map(|live| live.outbound.send(event).is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use convo_shared::protocol::TypingNotice;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    /// Register a fresh connection for `identity`, returning its id and inbox.
    pub(crate) async fn attach(
        registry: &ConnectionRegistry,
        identity: &str,
    ) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::new();
        registry.connect(user(identity), connection, tx).await;
        (connection, rx)
    }

    /// Drain everything queued so far.
    pub(crate) fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_connect_lookup_disconnect() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx) = attach(&registry, "u").await;

        assert_eq!(registry.lookup(&user("u")).await, vec![c1]);

        assert_eq!(registry.disconnect(c1).await, Some(user("u")));
        assert!(registry.lookup(&user("u")).await.is_empty());
        assert!(registry.online().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_tab_keeps_identity_online() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = attach(&registry, "u").await;
        let (c2, _rx2) = attach(&registry, "u").await;

        registry.disconnect(c1).await;

        assert_eq!(registry.lookup(&user("u")).await, vec![c2]);
        assert_eq!(registry.online().await, vec![user("u")]);
    }

    #[tokio::test]
    async fn test_presence_broadcast_to_everyone() {
        let registry = ConnectionRegistry::new();
        let (_, mut alice_rx) = attach(&registry, "alice").await;
        let (bob_conn, mut bob_rx) = attach(&registry, "bob").await;

        let alice_events = drain(&mut alice_rx);
        assert_eq!(alice_events.len(), 2);
        assert!(matches!(
            alice_events.last(),
            Some(ServerEvent::OnlineUsers(online)) if *online == vec![user("alice"), user("bob")]
        ));
        assert_eq!(drain(&mut bob_rx).len(), 1);

        registry.disconnect(bob_conn).await;
        assert!(matches!(
            drain(&mut alice_rx).as_slice(),
            [ServerEvent::OnlineUsers(online)] if *online == vec![user("alice")]
        ));
    }

    #[tokio::test]
    async fn test_unknown_disconnect_is_noop() {
        let registry = ConnectionRegistry::new();
        let (_, mut rx) = attach(&registry, "alice").await;
        drain(&mut rx);

        assert_eq!(registry.disconnect(ConnectionId::new()).await, None);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_send_to_every_connection_of_identity() {
        let registry = ConnectionRegistry::new();
        let (_, mut tab1) = attach(&registry, "bob").await;
        let (_, mut tab2) = attach(&registry, "bob").await;
        drain(&mut tab1);
        drain(&mut tab2);

        let event = ServerEvent::Typing(TypingNotice {
            sender_id: user("alice"),
        });
        assert_eq!(registry.send_to(&user("bob"), &[event]).await, 2);
        assert_eq!(drain(&mut tab1).len(), 1);
        assert_eq!(drain(&mut tab2).len(), 1);

        assert_eq!(registry.send_to(&user("carol"), &[]).await, 0);
    }

    #[tokio::test]
    async fn test_closed_queue_is_skipped() {
        let registry = ConnectionRegistry::new();
        let (_, rx) = attach(&registry, "bob").await;
        drop(rx);

        let event = ServerEvent::error("x", "y");
        assert_eq!(registry.send_to(&user("bob"), &[event]).await, 0);
    }
}
