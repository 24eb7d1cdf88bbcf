use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use duel_core::types::Addr;

use crate::protocol::ServerMessage;

const ROOM_CAPACITY: usize = 64;

/// One broadcast fan-out primitive per room: one `broadcast::Sender` per
/// game, subscribed to by every connected client. Here a room key can be
/// a user address, a match id, or a match id flagged as the spectator
/// room for that match (§4.10's four fan-out primitives).
struct Room {
    tx: broadcast::Sender<ServerMessage>,
}

impl Room {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(ROOM_CAPACITY);
        Self { tx }
    }

    fn send(&self, msg: ServerMessage) {
        // No receivers is the common case (room momentarily empty) and is
        // not an error; every other send failure is unreachable for a
        // broadcast channel, so this only ever silently drops on an empty
        // room, matching "ignores closed sockets" (§4.10).
        let _ = self.tx.send(msg);
    }
}

#[derive(Default)]
struct Rooms {
    by_user: HashMap<Addr, Room>,
    by_match: HashMap<String, Room>,
    by_match_spectators: HashMap<String, Room>,
}

/// Registers WS sessions into user/match/spectator rooms and exposes the
/// four fan-out primitives from §4.10. Each physical socket subscribes to
/// whichever rooms are relevant to it (always its own user room; the
/// match room or spectator room once it joins one) and forwards received
/// `ServerMessage`s out over its own connection.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    rooms: Arc<RwLock<Rooms>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe_user(&self, user: &Addr) -> broadcast::Receiver<ServerMessage> {
        let mut rooms = self.rooms.write().await;
        rooms
            .by_user
            .entry(user.clone())
            .or_insert_with(Room::new)
            .tx
            .subscribe()
    }

    /// Enforces `MAX_CONNECTIONS_PER_USER` (§4.10) before subscribing.
    /// The receiver count of a user's room doubles as its live connection
    /// count, since every authenticated session subscribes to its own
    /// user room exactly once.
    pub async fn try_subscribe_user(
        &self,
        user: &Addr,
        max_connections: usize,
    ) -> Option<broadcast::Receiver<ServerMessage>> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.by_user.entry(user.clone()).or_insert_with(Room::new);
        if room.tx.receiver_count() >= max_connections {
            return None;
        }
        Some(room.tx.subscribe())
    }

    pub async fn user_connection_count(&self, user: &Addr) -> usize {
        self.rooms
            .read()
            .await
            .by_user
            .get(user)
            .map(|r| r.tx.receiver_count())
            .unwrap_or(0)
    }

    pub async fn subscribe_match(&self, match_id: &str) -> broadcast::Receiver<ServerMessage> {
        let mut rooms = self.rooms.write().await;
        rooms
            .by_match
            .entry(match_id.to_string())
            .or_insert_with(Room::new)
            .tx
            .subscribe()
    }

    pub async fn subscribe_spectators(&self, match_id: &str) -> broadcast::Receiver<ServerMessage> {
        let mut rooms = self.rooms.write().await;
        rooms
            .by_match_spectators
            .entry(match_id.to_string())
            .or_insert_with(Room::new)
            .tx
            .subscribe()
    }

    /// Live spectator count for `match_id`, used to gate the spectator
    /// aggregates broadcast (§4.8: "if spectator count > 0").
    pub async fn spectator_count(&self, match_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .by_match_spectators
            .get(match_id)
            .map(|r| r.tx.receiver_count())
            .unwrap_or(0)
    }

    pub async fn broadcast_to_user(&self, user: &Addr, msg: ServerMessage) {
        let rooms = self.rooms.read().await;
        match rooms.by_user.get(user) {
            Some(room) => room.send(msg),
            None => warn!("No active room for user {}, dropping message", user),
        }
    }

    pub async fn broadcast_to_match(&self, match_id: &str, msg: ServerMessage) {
        let rooms = self.rooms.read().await;
        if let Some(room) = rooms.by_match.get(match_id) {
            room.send(msg);
        }
    }

    pub async fn broadcast_to_spectators(&self, match_id: &str, msg: ServerMessage) {
        let rooms = self.rooms.read().await;
        if let Some(room) = rooms.by_match_spectators.get(match_id) {
            room.send(msg);
        }
    }

    pub async fn broadcast_to_match_and_spectators(&self, match_id: &str, msg: ServerMessage) {
        let rooms = self.rooms.read().await;
        if let Some(room) = rooms.by_match.get(match_id) {
            room.send(msg.clone());
        }
        if let Some(room) = rooms.by_match_spectators.get(match_id) {
            room.send(msg);
        }
    }

    /// Drops the room for `match_id` once a match reaches a terminal
    /// state and every spectator/player session has moved on, so its
    /// `broadcast::Sender` doesn't linger forever.
    pub async fn close_match_rooms(&self, match_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms.by_match.remove(match_id);
        rooms.by_match_spectators.remove(match_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_to_match_reaches_every_subscriber() {
        let registry = SessionRegistry::new();
        let mut rx1 = registry.subscribe_match("m1").await;
        let mut rx2 = registry.subscribe_match("m1").await;

        registry
            .broadcast_to_match("m1", ServerMessage::error("x", "y"))
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_to_match_and_spectators_reaches_both_rooms() {
        let registry = SessionRegistry::new();
        let mut player_rx = registry.subscribe_match("m1").await;
        let mut spectator_rx = registry.subscribe_spectators("m1").await;

        registry
            .broadcast_to_match_and_spectators("m1", ServerMessage::error("x", "y"))
            .await;

        assert!(player_rx.try_recv().is_ok());
        assert!(spectator_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_to_a_room_with_no_subscribers_does_not_panic() {
        let registry = SessionRegistry::new();
        registry.broadcast_to_user(&"nobody".to_string(), ServerMessage::error("x", "y")).await;
    }

    #[tokio::test]
    async fn try_subscribe_user_enforces_the_connection_cap() {
        let registry = SessionRegistry::new();
        let user = "p1".to_string();
        let _a = registry.try_subscribe_user(&user, 2).await.unwrap();
        let _b = registry.try_subscribe_user(&user, 2).await.unwrap();
        assert!(registry.try_subscribe_user(&user, 2).await.is_none());
        assert_eq!(registry.user_connection_count(&user).await, 2);
    }
}
