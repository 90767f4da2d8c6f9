//! The snake actor.

use std::collections::VecDeque;

use protocol::{ColorId, COLOR_NEUTRAL};
use rand::Rng;
use tracing::debug;

use super::{Actor, Advance};
use crate::config::SnakeConfig;
use crate::error::GameError;
use crate::grid::{Cell, Direction, Draw, Grid, Position, CH_VOID};

pub const CH_HEAD: char = '$';
pub const CH_BODY: char = '*';
pub const CH_TAIL: char = '$';

pub const CH_DEAD_HEAD: char = 'x';
pub const CH_DEAD_BODY: char = '+';
pub const CH_DEAD_TAIL: char = 'x';

/// A snake: a chain of cells that grows after eating digits.
#[derive(Debug, Clone)]
pub struct Snake {
    color: ColorId,
    /// Head first.
    body: VecDeque<Position>,
    /// Direction requested for the next move.
    direction: Direction,
    /// Direction of the last move, used to reject reversals.
    current_direction: Direction,
    /// Frames left during which the tail stays put.
    grow: u32,
}

impl Snake {
    /// Build a snake from an explicit body (head first).
    pub fn from_body(color: ColorId, body: impl IntoIterator<Item = Position>, direction: Direction) -> Self {
        Self {
            color,
            body: body.into_iter().collect(),
            direction,
            current_direction: direction,
            grow: 0,
        }
    }

    /// Place a new snake on free cells of `grid`, keeping a margin from the
    /// borders. Returns the snake and the writes that draw it.
    pub fn place<R: Rng>(
        color: ColorId,
        config: &SnakeConfig,
        grid: &Grid,
        rng: &mut R,
    ) -> Result<(Self, Vec<Draw>), GameError> {
        for attempt in 0..config.init_retries {
            if let Some(placed) = Self::try_place(color, config, grid, rng) {
                return Ok(placed);
            }
            debug!("Snake placement attempt {} for color {} failed", attempt + 1, color);
        }
        Err(GameError::NoPlace)
    }

    fn try_place<R: Rng>(
        color: ColorId,
        config: &SnakeConfig,
        grid: &Grid,
        rng: &mut R,
    ) -> Option<(Self, Vec<Draw>)> {
        let length = config.init_length;
        let distance = length + config.init_min_distance_border;
        let x = rng.random_range(distance..=grid.size_x() - distance);
        let y = rng.random_range(distance..=grid.size_y() - distance);
        let direction = Direction::ALL[rng.random_range(0..Direction::ALL.len())];

        // Lay the body out from tail to head.
        let mut body = VecDeque::with_capacity(length);
        let mut render = Vec::with_capacity(length);
        let mut pos = Position::new(x as i32, y as i32);
        for i in 0..length {
            if grid.at(pos)?.glyph != CH_VOID {
                return None;
            }
            let glyph = if i == 0 {
                CH_TAIL
            } else if i == length - 1 {
                CH_HEAD
            } else {
                CH_BODY
            };
            body.push_front(pos);
            render.push(Draw::at(pos, glyph, color));
            pos = pos.offset(direction);
        }

        let snake = Self {
            color,
            body,
            direction,
            current_direction: direction,
            grow: 0,
        };
        Some((snake, render))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    fn render_move(&mut self, new_head: Position) -> Vec<Draw> {
        let mut render = Vec::with_capacity(4);
        let old_head = self.body[0];
        self.body.push_front(new_head);
        render.push(Draw::at(new_head, CH_HEAD, self.color));
        render.push(Draw::at(old_head, CH_BODY, self.color));
        self.current_direction = self.direction;

        if self.grow > 0 {
            // The tail stays in place while growing.
            self.grow -= 1;
        } else if let Some(old_tail) = self.body.pop_back() {
            render.push(Draw::at(old_tail, CH_VOID, COLOR_NEUTRAL));
            if let Some(&new_tail) = self.body.back() {
                render.push(Draw::at(new_tail, CH_TAIL, self.color));
            }
        }
        render
    }
}

impl Actor for Snake {
    fn head(&self) -> Position {
        self.body[0]
    }

    fn next_head(&self) -> Position {
        self.head().offset(self.direction)
    }

    fn advance(&mut self, grid: &Grid) -> Advance {
        let next = self.next_head();
        let target = match grid.at(next) {
            Some(cell) => cell,
            None => return Advance::Hit(Cell::WALL),
        };

        let eaten = target.digit();
        if eaten.is_none() && !target.is_void() {
            return Advance::Hit(target);
        }
        if let Some(value) = eaten {
            self.grow += u32::from(value);
        }

        Advance::Moved {
            render: self.render_move(next),
            eaten,
        }
    }

    fn keypress(&mut self, key: i64) {
        if let Some(dir) = Direction::from_key(key) {
            if dir != self.current_direction.opposite() {
                self.direction = dir;
            }
        }
    }

    fn render_game_over(&self) -> Vec<Draw> {
        let last = self.body.len().saturating_sub(1);
        self.body
            .iter()
            .enumerate()
            .map(|(i, &pos)| {
                let glyph = if i == 0 {
                    CH_DEAD_HEAD
                } else if i == last {
                    CH_DEAD_TAIL
                } else {
                    CH_DEAD_BODY
                };
                Draw::at(pos, glyph, COLOR_NEUTRAL)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CH_STONE;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn horizontal(color: ColorId) -> Snake {
        // Head at (5, 5) heading right, tail at (3, 5).
        Snake::from_body(
            color,
            [Position::new(5, 5), Position::new(4, 5), Position::new(3, 5)],
            Direction::Right,
        )
    }

    #[test]
    fn test_place_draws_full_body() {
        let grid = Grid::new(40, 40);
        let mut rng = StdRng::seed_from_u64(7);
        let (snake, render) = Snake::place(3, &SnakeConfig::default(), &grid, &mut rng).unwrap();

        assert_eq!(snake.len(), 5);
        assert_eq!(render.len(), 5);
        assert!(render.iter().all(|d| d.color == 3));
        assert_eq!(render[0].glyph, CH_TAIL);
        assert_eq!(render[4].glyph, CH_HEAD);
        assert_eq!(Draw::at(snake.head(), CH_HEAD, 3), render[4]);
    }

    #[test]
    fn test_place_fails_on_full_grid() {
        let mut grid = Grid::new(40, 40);
        for y in 0..40 {
            for x in 0..40 {
                grid.set(x, y, Cell::new(CH_STONE, 0));
            }
        }
        let mut rng = StdRng::seed_from_u64(7);
        let result = Snake::place(3, &SnakeConfig::default(), &grid, &mut rng);
        assert!(matches!(result, Err(GameError::NoPlace)));
    }

    #[test]
    fn test_move_into_void() {
        let grid = Grid::new(10, 10);
        let mut snake = horizontal(2);
        let outcome = snake.advance(&grid);

        assert_eq!(
            outcome,
            Advance::Moved {
                render: vec![
                    Draw::new(6, 5, CH_HEAD, 2),
                    Draw::new(5, 5, CH_BODY, 2),
                    Draw::new(3, 5, CH_VOID, COLOR_NEUTRAL),
                    Draw::new(4, 5, CH_TAIL, 2),
                ],
                eaten: None,
            }
        );
        assert_eq!(snake.head(), Position::new(6, 5));
        assert_eq!(snake.len(), 3);
    }

    #[test]
    fn test_eating_digit_grows() {
        let mut grid = Grid::new(10, 10);
        grid.set(6, 5, Cell::new('2', 4));
        let mut snake = horizontal(2);

        match snake.advance(&grid) {
            Advance::Moved { render, eaten } => {
                assert_eq!(eaten, Some(2));
                // Tail stays put while growing.
                assert_eq!(render.len(), 2);
            }
            other => panic!("expected move, got {other:?}"),
        }
        assert_eq!(snake.len(), 4);
        snake.advance(&grid);
        assert_eq!(snake.len(), 5);
        snake.advance(&grid);
        assert_eq!(snake.len(), 5);
    }

    #[test]
    fn test_hit_stone_and_wall() {
        let mut grid = Grid::new(10, 10);
        grid.set(6, 5, Cell::new(CH_STONE, 0));
        let mut snake = horizontal(2);
        assert_eq!(snake.advance(&grid), Advance::Hit(Cell::new(CH_STONE, 0)));
        assert_eq!(snake.head(), Position::new(5, 5));

        let mut edge = Snake::from_body(2, [Position::new(9, 0), Position::new(8, 0)], Direction::Right);
        assert_eq!(edge.advance(&grid), Advance::Hit(Cell::WALL));
    }

    #[test]
    fn test_reverse_keypress_ignored() {
        let mut snake = horizontal(2);
        snake.keypress(Direction::Left as i64);
        assert_eq!(snake.next_head(), Position::new(6, 5));
        snake.keypress(Direction::Up as i64);
        assert_eq!(snake.next_head(), Position::new(5, 4));
        snake.keypress(99);
        assert_eq!(snake.next_head(), Position::new(5, 4));
    }

    #[test]
    fn test_game_over_render_is_neutral_corpse() {
        let snake = horizontal(2);
        let render = snake.render_game_over();
        assert_eq!(
            render,
            vec![
                Draw::new(5, 5, CH_DEAD_HEAD, COLOR_NEUTRAL),
                Draw::new(4, 5, CH_DEAD_BODY, COLOR_NEUTRAL),
                Draw::new(3, 5, CH_DEAD_TAIL, COLOR_NEUTRAL),
            ]
        );
    }
}
