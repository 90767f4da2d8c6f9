//! Server -> Client message building.

use serde::Serialize;
use serde_json::{json, Value};

use super::server_tag;
use crate::ColorId;

/// One grid cell as sent in a `world` snapshot: `[glyph, color]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WireCell(pub char, pub ColorId);

/// One line of the `top_scores` table: `[name, score, color]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireTopScore(pub String, pub u64, pub ColorId);

/// Outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Handshake { name: String, id: String, settings: Value },
    Sync { frame: u64, speed: f64 },
    World { rows: Vec<Vec<WireCell>> },
    TopScores(Vec<WireTopScore>),
    PlayerJoined { id: String, name: String, color: ColorId, score: u64 },
    PlayerGameOver { id: String },
    PlayerScore { id: String, score: u64 },
    ResetWorld,
    Render { x: usize, y: usize, glyph: char, color: ColorId },
    Error(String),
    Pong(Value),
}

impl ServerMessage {
    /// The message tag (first list element).
    pub fn tag(&self) -> &'static str {
        match self {
            ServerMessage::Handshake { .. } => server_tag::HANDSHAKE,
            ServerMessage::Sync { .. } => server_tag::SYNC,
            ServerMessage::World { .. } => server_tag::WORLD,
            ServerMessage::TopScores(_) => server_tag::TOP_SCORES,
            ServerMessage::PlayerJoined { .. } => server_tag::P_JOINED,
            ServerMessage::PlayerGameOver { .. } => server_tag::P_GAMEOVER,
            ServerMessage::PlayerScore { .. } => server_tag::P_SCORE,
            ServerMessage::ResetWorld => server_tag::RESET_WORLD,
            ServerMessage::Render { .. } => server_tag::RENDER,
            ServerMessage::Error(_) => server_tag::ERROR,
            ServerMessage::Pong(_) => server_tag::PONG,
        }
    }

    /// Encode as a JSON list.
    pub fn to_value(&self) -> Value {
        let tag = self.tag();
        match self {
            ServerMessage::Handshake { name, id, settings } => json!([tag, name, id, settings]),
            ServerMessage::Sync { frame, speed } => json!([tag, frame, speed]),
            ServerMessage::World { rows } => json!([tag, rows]),
            ServerMessage::TopScores(entries) => json!([tag, entries]),
            ServerMessage::PlayerJoined { id, name, color, score } => {
                json!([tag, id, name, color, score])
            }
            ServerMessage::PlayerGameOver { id } => json!([tag, id]),
            ServerMessage::PlayerScore { id, score } => json!([tag, id, score]),
            ServerMessage::ResetWorld => json!([tag]),
            ServerMessage::Render { x, y, glyph, color } => json!([tag, x, y, glyph, color]),
            ServerMessage::Error(text) => json!([tag, text]),
            ServerMessage::Pong(payload) => json!([tag, payload]),
        }
    }
}

/// Encode a batch of messages into one text frame.
pub fn encode_batch(messages: &[ServerMessage]) -> String {
    Value::Array(messages.iter().map(ServerMessage::to_value).collect()).to_string()
}
