//! Player sessions.

use std::fmt;

use protocol::ColorId;
use uuid::Uuid;

use super::connection::{Connection, ConnectionId};
use crate::actor::Actor;

/// Stable identity token, reused across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(String);

impl PlayerId {
    /// Mint a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One connected identity. May be attached to several sockets at once.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Attached sockets in attach order, which is also fan-out order.
    pub connections: Vec<Connection>,
    pub alive: bool,
    /// Held only while alive.
    pub color: Option<ColorId>,
    pub score: u64,
    /// Present iff alive.
    pub actor: Option<Box<dyn Actor>>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, connection: Connection) -> Self {
        Self {
            id,
            name,
            connections: vec![connection],
            alive: false,
            color: None,
            score: 0,
            actor: None,
        }
    }

    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    /// Detach one socket. Returns `true` if it was attached.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id() != id);
        self.connections.len() != before
    }

    /// True when no attached socket is still open.
    pub fn is_connection_closed(&self) -> bool {
        self.connections.iter().all(Connection::is_closed)
    }

    /// Forward a direction key to the live actor.
    pub fn keypress(&mut self, key: i64) {
        if let Some(actor) = self.actor.as_mut() {
            actor.keypress(key);
        }
    }

    /// Drop every transport handle.
    pub fn shutdown(&mut self) {
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_differ() {
        let a = PlayerId::generate();
        let b = PlayerId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_closed_only_when_every_socket_closed() {
        let (first, first_rx) = Connection::channel(1);
        let (second, second_rx) = Connection::channel(2);
        let mut player = Player::new(PlayerId::from("p"), "Ada".into(), first);
        player.add_connection(second);

        drop(first_rx);
        assert!(!player.is_connection_closed());
        drop(second_rx);
        assert!(player.is_connection_closed());

        assert!(player.remove_connection(1));
        assert!(!player.remove_connection(1));
        assert_eq!(player.connections.len(), 1);
    }
}
