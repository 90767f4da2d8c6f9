//! Shared protocol crate for snakepit.
//!
//! This crate contains:
//! - Message definitions for both directions
//! - JSON batch encoding of server messages
//! - Validation of client-supplied names and identity tokens

mod error;
pub mod packets;
mod validate;

pub use error::ProtocolError;
pub use validate::{validate_player_id, validate_player_name, MAX_PLAYER_ID_LEN, MAX_PLAYER_NAME_LEN};

/// Palette index painted on the grid. `0` is reserved for neutral elements.
pub type ColorId = u8;

/// Neutral palette index (UI text, stones, dead bodies).
pub const COLOR_NEUTRAL: ColorId = 0;
