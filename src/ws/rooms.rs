//! Room-addressed fan-out. One broadcast channel per table room and one per
//! user room; sockets subscribe on join and the engine publishes through
//! the `Broadcaster` port without ever seeing a socket.

use crate::config::BROADCAST_CHANNEL_CAPACITY;
use crate::engine::{Broadcaster, PrivateCards, TableEvent};
use crate::ws::messages::ServerMessage;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

#[derive(Default)]
pub struct RoomBus {
    tables: RwLock<HashMap<String, broadcast::Sender<ServerMessage>>>,
    users: RwLock<HashMap<String, broadcast::Sender<ServerMessage>>>,
}

impl RoomBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_table(&self, table_id: &str) -> broadcast::Receiver<ServerMessage> {
        let mut tables = self.tables.write().expect("rooms lock poisoned");
        tables
            .entry(table_id.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_user(&self, user_id: &str) -> broadcast::Receiver<ServerMessage> {
        let mut users = self.users.write().expect("rooms lock poisoned");
        users
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn send_table(&self, table_id: &str, msg: ServerMessage) {
        let tables = self.tables.read().expect("rooms lock poisoned");
        if let Some(tx) = tables.get(table_id) {
            // A send error only means nobody is in the room right now.
            let _ = tx.send(msg);
        }
    }

    fn send_user(&self, user_id: &str, msg: ServerMessage) {
        let users = self.users.read().expect("rooms lock poisoned");
        if let Some(tx) = users.get(user_id) {
            let _ = tx.send(msg);
        }
    }
}

impl Broadcaster for RoomBus {
    fn table_event(&self, table_id: &str, event: TableEvent) {
        self.send_table(table_id, ServerMessage::Event(event));
    }

    fn private_cards(&self, user_id: &str, cards: PrivateCards) {
        self.send_user(user_id, ServerMessage::PrivateCards(cards));
    }
}
