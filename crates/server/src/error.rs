//! Engine error types.

use thiserror::Error;

use crate::ledger::StoreError;

/// Errors raised by game operations.
///
/// Everything except [`GameError::Invariant`] is contained to the message or
/// connection that caused it. An invariant failure inside the frame loop is
/// fatal for the round.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Maximum players reached")]
    Capacity,

    #[error("There is no place for a new snake in this world :(")]
    NoPlace,

    #[error("Unknown player {0}")]
    UnknownPlayer(String),

    #[error("Score store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broken game state: {0}")]
    Invariant(String),
}
