//! Snakepit game server library.

pub mod actor;
pub mod colors;
pub mod config;
pub mod error;
pub mod grid;
pub mod ledger;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::GameError;
pub use server::{run, serve, Game, ServerExit, SharedGame};
