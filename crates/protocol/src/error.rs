//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding or validating client messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Message is not a non-empty list")]
    NotAList,

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("Missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("Invalid player name.")]
    InvalidPlayerName,

    #[error("Invalid player ID.")]
    InvalidPlayerId,
}
