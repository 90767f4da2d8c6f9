//! Movable entities controlled by players.
//!
//! The orchestrator only talks to actors through the [`Actor`] trait: it asks
//! where the head is going, tells the actor to advance, and collects its
//! game-over render. How an actor moves and grows is its own business.

mod snake;

pub use snake::{Snake, CH_BODY, CH_DEAD_BODY, CH_DEAD_HEAD, CH_DEAD_TAIL, CH_HEAD, CH_TAIL};

use crate::grid::{Cell, Draw, Grid, Position};

/// Outcome of advancing an actor by one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The actor moved. `render` describes the cells it changed and `eaten`
    /// carries the value of a digit it picked up on the way.
    Moved { render: Vec<Draw>, eaten: Option<u8> },
    /// The actor ran into an occupied cell (or off the field) and did not move.
    Hit(Cell),
}

pub trait Actor: Send + Sync + std::fmt::Debug {
    /// Current head position.
    fn head(&self) -> Position;

    /// Where the head will be after the next advance.
    fn next_head(&self) -> Position;

    /// Move one step on `grid`. The grid is not modified here.
    fn advance(&mut self, grid: &Grid) -> Advance;

    /// Apply a direction key from the owning player.
    fn keypress(&mut self, key: i64);

    /// Writes that turn the body into a corpse.
    fn render_game_over(&self) -> Vec<Draw>;
}

/// Glyphs that mark a living body on the grid.
pub const BODY_GLYPHS: [char; 3] = [CH_HEAD, CH_BODY, CH_TAIL];

pub fn is_body_glyph(glyph: char) -> bool {
    BODY_GLYPHS.contains(&glyph)
}
