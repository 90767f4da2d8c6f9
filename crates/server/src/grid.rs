//! Grid state management.
//!
//! The grid is the authoritative picture of the playing field: every cell
//! holds a glyph and the palette index it is painted with.

use protocol::packets::WireCell;
use protocol::{ColorId, COLOR_NEUTRAL};

pub const CH_VOID: char = ' ';
pub const CH_STONE: char = '#';
/// Reported for moves that leave the field. Never stored.
pub const CH_WALL: char = '|';

/// A grid coordinate. Signed so that off-field positions can be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dir: Direction) -> Self {
        let (dx, dy) = dir.delta();
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Movement direction. Discriminants are the wire key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    pub fn from_key(key: i64) -> Option<Self> {
        usize::try_from(key).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// Contents of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub glyph: char,
    pub color: ColorId,
}

impl Cell {
    pub const VOID: Cell = Cell::new(CH_VOID, COLOR_NEUTRAL);
    pub const WALL: Cell = Cell::new(CH_WALL, COLOR_NEUTRAL);

    pub const fn new(glyph: char, color: ColorId) -> Self {
        Self { glyph, color }
    }

    pub fn is_void(&self) -> bool {
        self.glyph == CH_VOID
    }

    /// Value of a digit pickup, if this cell holds one.
    pub fn digit(&self) -> Option<u8> {
        match self.glyph {
            '1'..='9' => self.glyph.to_digit(10).map(|d| d as u8),
            _ => None,
        }
    }
}

/// A single-cell write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub x: usize,
    pub y: usize,
    pub glyph: char,
    pub color: ColorId,
}

impl Draw {
    pub const fn new(x: usize, y: usize, glyph: char, color: ColorId) -> Self {
        Self { x, y, glyph, color }
    }

    /// Write at a position already known to lie on the grid.
    pub fn at(pos: Position, glyph: char, color: ColorId) -> Self {
        Self::new(pos.x as usize, pos.y as usize, glyph, color)
    }
}

/// The shared playing field.
#[derive(Debug, Clone)]
pub struct Grid {
    size_x: usize,
    size_y: usize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(size_x: usize, size_y: usize) -> Self {
        Self {
            size_x,
            size_y,
            cells: vec![Cell::VOID; size_x * size_y],
        }
    }

    pub fn size_x(&self) -> usize {
        self.size_x
    }

    pub fn size_y(&self) -> usize {
        self.size_y
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.size_x && (pos.y as usize) < self.size_y
    }

    /// Cell at `(x, y)`. Panics if out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.cells[self.index(x, y)]
    }

    /// Cell at `pos`, or `None` off the field.
    pub fn at(&self, pos: Position) -> Option<Cell> {
        self.contains(pos).then(|| self.get(pos.x as usize, pos.y as usize))
    }

    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        let idx = self.index(x, y);
        self.cells[idx] = cell;
    }

    /// Apply one write.
    pub fn draw(&mut self, draw: &Draw) {
        self.set(draw.x, draw.y, Cell::new(draw.glyph, draw.color));
    }

    pub fn is_void(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_void()
    }

    /// Clear every cell.
    pub fn reset(&mut self) {
        self.cells.fill(Cell::VOID);
    }

    /// Row-major snapshot for the `world` message.
    pub fn rows(&self) -> Vec<Vec<WireCell>> {
        self.cells
            .chunks(self.size_x)
            .map(|row| row.iter().map(|c| WireCell(c.glyph, c.color)).collect())
            .collect()
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        assert!(x < self.size_x && y < self.size_y, "({x}, {y}) is off the grid");
        y * self.size_x + x
    }
}
