//! Registry of open WebSocket connections.
//!
//! Maps each user to their open connections, each with its own bounded
//! outbound queue. Delivery never blocks the caller: a full queue drops the
//! event for that connection, a closed queue unregisters it. There is no
//! acknowledgement and no retry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc::{self, error::TrySendError};

use tradepost_core::{ConnectionId, UserId};

use super::protocol::ServerEvent;

type Connections = HashMap<UserId, HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>;

/// Fan-out hub for pushing events to connected users.
#[derive(Debug)]
pub struct Hub {
    connections: RwLock<Connections>,
    capacity: usize,
}

impl Hub {
    /// Create a hub whose per-connection queues hold `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new connection for `user`.
    ///
    /// Returns the connection id and the receiving end of its queue; the
    /// socket's writer task drains it.
    pub fn register(&self, user: UserId) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let conn = ConnectionId::new();

        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        connections.entry(user).or_default().insert(conn, tx);

        tracing::debug!(user_id = %user, connection_id = %conn, "Socket registered");
        (conn, rx)
    }

    /// Remove a connection. Removing an unknown connection is a no-op.
    pub fn unregister(&self, user: UserId, conn: ConnectionId) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(user_conns) = connections.get_mut(&user) {
            user_conns.remove(&conn);
            if user_conns.is_empty() {
                connections.remove(&user);
            }
        }
        tracing::debug!(user_id = %user, connection_id = %conn, "Socket unregistered");
    }

    /// Drop every connection of `user`.
    ///
    /// Closing the queues ends each socket's writer task, which in turn
    /// closes the socket. Returns how many connections were dropped.
    pub fn disconnect_user(&self, user: UserId) -> usize {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user)
            .map_or(0, |conns| conns.len());
        if removed > 0 {
            tracing::info!(user_id = %user, connections = removed, "Sockets disconnected");
        }
        removed
    }

    /// Push `event` to every open connection of `user`.
    ///
    /// Returns the number of connections the event was queued on.
    pub fn send_to_user(&self, user: UserId, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let connections = self
                .connections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(user_conns) = connections.get(&user) else {
                return 0;
            };

            for (conn, tx) in user_conns {
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            user_id = %user,
                            connection_id = %conn,
                            event = event.kind(),
                            "Socket queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*conn),
                }
            }
        }

        for conn in closed {
            self.unregister(user, conn);
        }

        delivered
    }

    /// Push `event` to each user in `users`.
    pub fn send_to_users(&self, users: impl IntoIterator<Item = UserId>, event: &ServerEvent) {
        for user in users {
            self.send_to_user(user, event);
        }
    }

    /// Push `event` to a single connection. Returns whether it was queued.
    pub fn send_to_connection(&self, user: UserId, conn: ConnectionId, event: ServerEvent) -> bool {
        let tx = {
            let connections = self
                .connections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            connections.get(&user).and_then(|c| c.get(&conn)).cloned()
        };

        let Some(tx) = tx else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    user_id = %user,
                    connection_id = %conn,
                    event = event.kind(),
                    "Socket queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister(user, conn);
                false
            }
        }
    }

    /// Whether `user` has at least one open connection.
    #[cfg(test)]
    pub fn is_online(&self, user: UserId) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .is_some_and(|c| !c.is_empty())
    }

    /// Total open connections across all users.
    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fans_out_to_every_connection() {
        let hub = Hub::new(8);
        let user = UserId::new();
        let (_, mut first) = hub.register(user);
        let (_, mut second) = hub.register(user);

        assert_eq!(hub.send_to_user(user, &ServerEvent::Pong), 2);
        assert!(matches!(first.recv().await, Some(ServerEvent::Pong)));
        assert!(matches!(second.recv().await, Some(ServerEvent::Pong)));
    }

    #[test]
    fn test_offline_user_gets_nothing() {
        let hub = Hub::new(8);
        assert_eq!(hub.send_to_user(UserId::new(), &ServerEvent::Pong), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let hub = Hub::new(1);
        let user = UserId::new();
        let (_conn, _rx) = hub.register(user);

        assert_eq!(hub.send_to_user(user, &ServerEvent::Pong), 1);
        assert_eq!(hub.send_to_user(user, &ServerEvent::Pong), 0);
        // Still registered; a slow reader is not a dead one.
        assert!(hub.is_online(user));
    }

    #[test]
    fn test_closed_receiver_is_unregistered() {
        let hub = Hub::new(4);
        let user = UserId::new();
        let (_, rx) = hub.register(user);
        drop(rx);

        assert_eq!(hub.send_to_user(user, &ServerEvent::Pong), 0);
        assert!(!hub.is_online(user));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_connection_targets_one_socket() {
        let hub = Hub::new(4);
        let user = UserId::new();
        let (first_id, mut first) = hub.register(user);
        let (_, mut second) = hub.register(user);

        assert!(hub.send_to_connection(user, first_id, ServerEvent::Pong));
        assert!(matches!(first.recv().await, Some(ServerEvent::Pong)));
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn test_unregister() {
        let hub = Hub::new(4);
        let user = UserId::new();
        let (a, _rx_a) = hub.register(user);
        let (b, _rx_b) = hub.register(user);

        hub.unregister(user, a);
        assert!(hub.is_online(user));
        hub.unregister(user, b);
        assert!(!hub.is_online(user));
        hub.unregister(user, b);
    }

    #[tokio::test]
    async fn test_disconnect_user_closes_every_queue() {
        let hub = Hub::new(4);
        let user = UserId::new();
        let other = UserId::new();
        let (_, mut first) = hub.register(user);
        let (_, mut second) = hub.register(user);
        let (_, _other_rx) = hub.register(other);

        assert_eq!(hub.disconnect_user(user), 2);
        assert!(first.recv().await.is_none());
        assert!(second.recv().await.is_none());
        assert!(!hub.is_online(user));
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.disconnect_user(user), 0);
    }
}
