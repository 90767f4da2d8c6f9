//! Message definitions for the snakepit protocol.
//!
//! Every message is a JSON list whose first element names the message kind.
//! Server frames carry a list of such messages; client frames carry one.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Message tags for client -> server messages.
pub mod client_tag {
    pub const NEW_PLAYER: &str = "new_player";
    pub const JOIN: &str = "join";
    pub const PING: &str = "ping";
}

/// Message tags for server -> client messages.
pub mod server_tag {
    pub const HANDSHAKE: &str = "handshake";
    pub const SYNC: &str = "sync";
    pub const WORLD: &str = "world";
    pub const TOP_SCORES: &str = "top_scores";
    pub const P_JOINED: &str = "p_joined";
    pub const P_GAMEOVER: &str = "p_gameover";
    pub const P_SCORE: &str = "p_score";
    pub const RESET_WORLD: &str = "reset_world";
    pub const RENDER: &str = "render";
    pub const ERROR: &str = "error";
    pub const PONG: &str = "pong";
}
