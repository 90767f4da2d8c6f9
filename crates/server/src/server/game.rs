//! Game state.
//!
//! [`Game`] is the only mutator of the grid, the players, the color pool and
//! the ledger. Every public operation finishes its state change before
//! returning; callers hold the game lock across a whole operation, so other
//! tasks never see a half-applied transition. Outbound messages are queued on
//! the connections' channels in the order they are produced.

use std::collections::HashSet;
use std::sync::Arc;

use protocol::packets::{encode_batch, ClientMessage, ServerMessage, WireTopScore};
use protocol::{ColorId, COLOR_NEUTRAL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionId, Outbound};
use super::player::{Player, PlayerId};
use crate::actor::{is_body_glyph, Advance, Snake};
use crate::colors::ColorPool;
use crate::config::Config;
use crate::error::GameError;
use crate::grid::{Cell, Draw, Grid, CH_STONE};
use crate::ledger::{ScoreLedger, ScoreStore};

/// Banner drawn when the last snake dies.
pub const GAME_OVER_TEXT: &str = ">>> GAME OVER <<<";

/// Glyph of a spawned digit pickup.
pub const DIGIT_GLYPH: char = '1';

/// Random draws per spawn before giving up for the frame.
const SPAWN_ATTEMPTS: usize = 2;

/// Why a snake died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Death {
    /// Ran into an occupied cell.
    Hit(Cell),
    /// Ran head-first into another snake in the same frame.
    FrontalCrash,
    /// Killed by the server (disconnect, frame cap, shutdown).
    Forced,
}

/// Main game state.
pub struct Game {
    config: Config,
    /// Handshake settings, serialized once.
    settings: Value,
    grid: Grid,
    /// Insertion ordered.
    players: Vec<Player>,
    colors: ColorPool,
    ledger: ScoreLedger,
    store: Arc<dyn ScoreStore>,
    rng: StdRng,
    pub frame: u64,
    /// Ticks per second.
    pub speed: f64,
    /// Whether a frame loop currently owns this game.
    pub running: bool,
    next_connection_id: ConnectionId,
}

impl Game {
    /// Create a game, loading the ledger from `store`.
    pub fn new(config: Config, store: Arc<dyn ScoreStore>) -> Result<Self, GameError> {
        Self::with_rng(config, store, StdRng::from_os_rng())
    }

    pub fn with_rng(config: Config, store: Arc<dyn ScoreStore>, rng: StdRng) -> Result<Self, GameError> {
        let entries = store.load()?;
        let ledger = ScoreLedger::from_entries(entries, config.game.max_top_scores);
        info!("Loaded {} top scores", ledger.entries().len());

        let settings = serde_json::to_value(config.client_settings())
            .map_err(|e| GameError::Invariant(format!("unserializable settings: {e}")))?;

        Ok(Self {
            grid: Grid::new(config.field.size_x, config.field.size_y),
            colors: ColorPool::new(config.game.num_colors),
            speed: config.game.speed,
            config,
            settings,
            players: Vec::new(),
            ledger,
            store,
            rng,
            frame: 0,
            running: false,
            next_connection_id: 1,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.alive).count()
    }

    fn index_of(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| &p.id == id)
    }

    /// Allocate a transport handle for a newly accepted socket.
    pub fn open_connection(&mut self) -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        Connection::channel(id)
    }

    // ---- Broadcast ------------------------------------------------------

    /// Send `messages` as one frame to every attached socket. Sockets that
    /// refuse the frame are detached; the rest still receive it.
    fn broadcast(&mut self, messages: &[ServerMessage]) {
        if messages.is_empty() {
            return;
        }
        let frame: Arc<str> = Arc::from(encode_batch(messages));
        for player in &mut self.players {
            Self::fan_out(player, &frame);
        }
    }

    fn send_to_player(&mut self, idx: usize, messages: &[ServerMessage]) {
        let frame: Arc<str> = Arc::from(encode_batch(messages));
        Self::fan_out(&mut self.players[idx], &frame);
    }

    fn fan_out(player: &mut Player, frame: &Arc<str>) {
        let player_id = &player.id;
        player.connections.retain(|conn| match conn.send_frame(Arc::clone(frame)) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping handle of player {}: {}", player_id, e);
                false
            }
        });
    }

    /// Send an `error` notice to one player's sockets.
    pub fn send_error(&mut self, id: &PlayerId, text: &str) {
        if let Some(idx) = self.index_of(id) {
            self.send_to_player(idx, &[ServerMessage::Error(text.to_string())]);
        }
    }

    /// Send an `error` notice to everybody.
    pub fn send_error_all(&mut self, text: &str) {
        self.broadcast(&[ServerMessage::Error(text.to_string())]);
    }

    /// Top scores as shown to clients. The colors are decoration and are
    /// rolled afresh on every call.
    pub fn top_scores(&mut self) -> Vec<WireTopScore> {
        let Game { ledger, colors, rng, .. } = self;
        ledger
            .entries()
            .iter()
            .map(|e| WireTopScore(e.name.clone(), e.score, colors.random(rng)))
            .collect()
    }

    fn joined_message(player: &Player) -> ServerMessage {
        ServerMessage::PlayerJoined {
            id: player.id.to_string(),
            name: player.name.clone(),
            color: player.color.unwrap_or(COLOR_NEUTRAL),
            score: player.score,
        }
    }

    /// Write `render` to the grid, then turn it into `render` messages.
    fn apply_render(&mut self, render: &[Draw]) -> Vec<ServerMessage> {
        for draw in render {
            self.grid.draw(draw);
        }
        render
            .iter()
            .map(|d| ServerMessage::Render {
                x: d.x,
                y: d.y,
                glyph: d.glyph,
                color: d.color,
            })
            .collect()
    }

    /// Writes that place `text` centered on the grid.
    pub fn render_text(&self, text: &str, color: ColorId) -> Vec<Draw> {
        let len = text.chars().count();
        let pos_y = self.grid.size_y() / 2;
        let pos_x = (self.grid.size_x() as f64 / 2.0 - len as f64 / 2.0).max(0.0) as usize;
        text.chars()
            .enumerate()
            .map(|(i, ch)| Draw::new(pos_x + i, pos_y, ch, color))
            .collect()
    }

    // ---- Sessions -------------------------------------------------------

    /// Register a player for `conn`, or attach `conn` to the existing player
    /// owning `requested`. The socket then receives everything it needs to
    /// mirror the current game.
    pub fn new_player(&mut self, name: String, requested: Option<PlayerId>, conn: Connection) -> PlayerId {
        if let Some(id) = requested {
            if let Some(idx) = self.index_of(&id) {
                info!("Player {} ({}) attached connection {}", id, self.players[idx].name, conn.id());
                self.players[idx].add_connection(conn.clone());
                let name = self.players[idx].name.clone();
                self.send_welcome(&conn, &name, &id);
                return id;
            }
            debug!("Unknown player id {}, minting a new one", id);
        }

        let mut id = PlayerId::generate();
        while self.index_of(&id).is_some() {
            id = PlayerId::generate();
        }
        self.send_welcome(&conn, &name, &id);
        info!("New player {} ({}) on connection {}", id, name, conn.id());
        self.players.push(Player::new(id.clone(), name, conn));
        id
    }

    fn send_welcome(&mut self, conn: &Connection, name: &str, id: &PlayerId) {
        let mut messages = vec![
            ServerMessage::Handshake {
                name: name.to_string(),
                id: id.to_string(),
                settings: self.settings.clone(),
            },
            ServerMessage::Sync {
                frame: self.frame,
                speed: self.speed,
            },
            ServerMessage::World { rows: self.grid.rows() },
            ServerMessage::TopScores(self.top_scores()),
        ];
        messages.extend(self.players.iter().filter(|p| p.alive).map(Self::joined_message));
        if let Err(e) = conn.send(&messages) {
            debug!("Welcome not delivered: {}", e);
        }
    }

    /// Put a player into play with a fresh snake.
    pub fn join(&mut self, id: &PlayerId) -> Result<(), GameError> {
        if !self.may_join(id)? {
            return Ok(());
        }
        let idx = self
            .index_of(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.to_string()))?;

        let color = self.colors.take(id, &mut self.rng).ok_or(GameError::Capacity)?;
        let (snake, render) = match Snake::place(color, &self.config.snake, &self.grid, &mut self.rng) {
            Ok(placed) => placed,
            Err(e) => {
                self.colors.release(color);
                return Err(e);
            }
        };

        let player = &mut self.players[idx];
        player.actor = Some(Box::new(snake));
        player.color = Some(color);
        player.alive = true;
        info!("Player {} ({}) joined with color {}", player.id, player.name, color);

        let mut messages = vec![Self::joined_message(player)];
        messages.extend(self.apply_render(&render));
        self.broadcast(&messages);
        Ok(())
    }

    /// Whether `id` still needs a snake. `Ok(false)` means it already has
    /// one; errors are the refusals known before placement is tried.
    fn may_join(&self, id: &PlayerId) -> Result<bool, GameError> {
        let player = self.player(id).ok_or_else(|| GameError::UnknownPlayer(id.to_string()))?;
        if player.alive {
            return Ok(false);
        }
        if self.alive_count() >= self.config.game.max_players {
            return Err(GameError::Capacity);
        }
        Ok(true)
    }

    /// Forward a direction key to a player's snake.
    pub fn keypress(&mut self, id: &PlayerId, key: i64) {
        if let Some(idx) = self.index_of(id) {
            self.players[idx].keypress(key);
        }
    }

    /// Resolve a snake's death and return the writes it causes. Messages
    /// about the death are broadcast right away; the writes are left for
    /// the caller to apply.
    fn game_over(&mut self, idx: usize, death: Death) -> Vec<Draw> {
        let (id, name, score, color, actor) = {
            let player = &mut self.players[idx];
            player.alive = false;
            (
                player.id.clone(),
                player.name.clone(),
                player.score,
                player.color.take(),
                player.actor.take(),
            )
        };
        info!("Player {} ({}) game over: {:?}", id, name, death);

        let mut messages = vec![ServerMessage::PlayerGameOver { id: id.to_string() }];
        if let Death::Hit(cell) = death {
            if is_body_glyph(cell.glyph) {
                // Look up the owner while the victim's color is still held,
                // so running into yourself resolves to yourself.
                let killer = self
                    .colors
                    .holder(cell.color)
                    .cloned()
                    .and_then(|kid| self.index_of(&kid));
                if let Some(k) = killer.filter(|&k| k != idx && self.players[k].alive) {
                    let killer = &mut self.players[k];
                    killer.score += self.config.game.kill_points;
                    info!("Player {} scored a kill on {}", killer.id, id);
                    messages.push(ServerMessage::PlayerScore {
                        id: killer.id.to_string(),
                        score: killer.score,
                    });
                }
            }
        }
        self.broadcast(&messages);

        if let Some(color) = color {
            self.colors.release(color);
        }
        self.record_score(&name, score);
        let top = ServerMessage::TopScores(self.top_scores());
        self.broadcast(&[top]);

        let mut render = actor.map(|a| a.render_game_over()).unwrap_or_default();
        if self.alive_count() == 0 {
            let color = self.colors.random(&mut self.rng);
            render.extend(self.render_text(GAME_OVER_TEXT, color));
        }
        render
    }

    fn record_score(&mut self, name: &str, score: u64) {
        if !self.ledger.record(name, score) {
            return;
        }
        if let Err(e) = self.store.save(self.ledger.entries()) {
            warn!("Failed to store top scores: {}", e);
        }
    }

    /// Drop a player for good. Kills the snake if it is still alive.
    pub fn player_disconnected(&mut self, id: &PlayerId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        self.players[idx].shutdown();
        if self.players[idx].alive {
            let render = self.game_over(idx, Death::Forced);
            let messages = self.apply_render(&render);
            self.broadcast(&messages);
        }
        let player = self.players.remove(idx);
        info!("Player {} ({}) disconnected", player.id, player.name);
    }

    /// A socket attached to `id` went away. The player only goes when it was
    /// the last open one.
    pub fn connection_closed(&mut self, id: &PlayerId, conn: ConnectionId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        self.players[idx].remove_connection(conn);
        if self.players[idx].is_connection_closed() {
            self.player_disconnected(id);
        } else {
            debug!("Player {} keeps {} connection(s)", id, self.players[idx].connections.len());
        }
    }

    /// Disconnect every player whose sockets have all closed.
    pub fn disconnect_closed(&mut self) {
        let closed: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.is_connection_closed())
            .map(|p| p.id.clone())
            .collect();
        for id in closed {
            self.player_disconnected(&id);
        }
    }

    /// Kill every living snake.
    pub fn kill_all(&mut self) {
        let mut render = Vec::new();
        for idx in 0..self.players.len() {
            if self.players[idx].alive {
                render.extend(self.game_over(idx, Death::Forced));
            }
        }
        let messages = self.apply_render(&render);
        self.broadcast(&messages);
    }

    /// Kill every snake, then close every socket.
    pub fn shutdown(&mut self, code: u16, reason: &str) {
        self.kill_all();
        info!("Closing all connections: {}", reason);
        for player in &self.players {
            for conn in &player.connections {
                conn.close(code, reason);
            }
        }
    }

    // ---- Rounds & frames ------------------------------------------------

    /// Clear the field for a new round.
    pub fn reset_world(&mut self) {
        self.frame = 0;
        self.speed = self.config.game.speed;
        self.grid.reset();
        self.broadcast(&[ServerMessage::ResetWorld]);
        info!("World reset");
    }

    /// Claim the game for a new frame loop. Returns `true` if the caller
    /// must start one.
    pub fn begin_round(&mut self) -> bool {
        if self.running {
            return false;
        }
        if self.frame > 0 {
            self.reset_world();
        }
        self.running = true;
        true
    }

    /// Advance every snake by one frame and broadcast the resulting writes.
    pub fn next_frame(&mut self) -> Result<(), GameError> {
        self.frame += 1;
        let mut messages = Vec::new();
        let crashed = self.frontal_crashes();

        for idx in 0..self.players.len() {
            if !self.players[idx].alive {
                continue;
            }
            if crashed.contains(&idx) {
                let render = self.game_over(idx, Death::FrontalCrash);
                messages.extend(self.apply_render(&render));
                continue;
            }

            let advance = match self.players[idx].actor.as_mut() {
                Some(actor) => actor.advance(&self.grid),
                None => {
                    let id = &self.players[idx].id;
                    return Err(GameError::Invariant(format!("player {id} is alive without a snake")));
                }
            };
            match advance {
                Advance::Moved { render, eaten } => {
                    messages.extend(self.apply_render(&render));
                    if let Some(value) = eaten {
                        let player = &mut self.players[idx];
                        player.score += u64::from(value);
                        messages.push(ServerMessage::PlayerScore {
                            id: player.id.to_string(),
                            score: player.score,
                        });
                    }
                }
                Advance::Hit(cell) => {
                    let render = self.game_over(idx, Death::Hit(cell));
                    messages.extend(self.apply_render(&render));
                }
            }
        }

        let digit = self.spawn_digit(false);
        messages.extend(self.apply_render(&digit));
        if self.config.game.stones_enabled {
            let stone = self.spawn_stone(false);
            messages.extend(self.apply_render(&stone));
        }

        self.broadcast(&messages);
        Ok(())
    }

    /// Snakes about to run head-first into each other: either both heads
    /// target the same cell or they swap places.
    fn frontal_crashes(&self) -> HashSet<usize> {
        let heads: Vec<_> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.alive)
            .filter_map(|(i, p)| p.actor.as_ref().map(|a| (i, a.head(), a.next_head())))
            .collect();

        let mut crashed = HashSet::new();
        for (n, &(a, a_head, a_next)) in heads.iter().enumerate() {
            for &(b, b_head, b_next) in &heads[n + 1..] {
                if a_next == b_next || (a_next == b_head && b_next == a_head) {
                    crashed.insert(a);
                    crashed.insert(b);
                }
            }
        }
        crashed
    }

    fn roll(&mut self, rate: u32) -> bool {
        self.rng.random_range(1..=100) <= rate
    }

    /// Up to two random draws for an empty cell.
    fn spawn_place(&mut self) -> Option<(usize, usize)> {
        for _ in 0..SPAWN_ATTEMPTS {
            let x = self.rng.random_range(0..self.grid.size_x());
            let y = self.rng.random_range(0..self.grid.size_y());
            if self.grid.is_void(x, y) {
                return Some((x, y));
            }
        }
        None
    }

    /// Maybe drop a digit pickup. `right_now` skips the chance roll.
    pub fn spawn_digit(&mut self, right_now: bool) -> Vec<Draw> {
        if !right_now && !self.roll(self.config.game.digit_spawn_rate) {
            return Vec::new();
        }
        match self.spawn_place() {
            Some((x, y)) => {
                let color = self.colors.random(&mut self.rng);
                vec![Draw::new(x, y, DIGIT_GLYPH, color)]
            }
            None => Vec::new(),
        }
    }

    /// Maybe drop a stone. `right_now` skips the chance roll.
    pub fn spawn_stone(&mut self, right_now: bool) -> Vec<Draw> {
        if !right_now && !self.roll(self.config.game.stone_spawn_rate) {
            return Vec::new();
        }
        match self.spawn_place() {
            Some((x, y)) => vec![Draw::new(x, y, CH_STONE, COLOR_NEUTRAL)],
            None => Vec::new(),
        }
    }

    // ---- Client messages ------------------------------------------------

    /// Handle one decoded message from `conn`. `session` is the player the
    /// socket introduced itself as, if any. Returns `true` when the caller
    /// must start a frame loop.
    pub fn handle_message(&mut self, conn: &Connection, session: &mut Option<PlayerId>, msg: ClientMessage) -> bool {
        match (session.clone(), msg) {
            (_, ClientMessage::Ping(payload)) => {
                if let Err(e) = conn.send(&[ServerMessage::Pong(payload)]) {
                    debug!("Pong not delivered: {}", e);
                }
            }
            (None, ClientMessage::NewPlayer { name, id }) => {
                *session = Some(self.new_player(name, id.map(PlayerId::from), conn.clone()));
            }
            (None, other) => {
                debug!("Connection {} sent {:?} before new_player", conn.id(), other);
            }
            (Some(id), ClientMessage::Key(key)) => self.keypress(&id, key),
            (Some(id), ClientMessage::Join) => {
                let refused = match self.may_join(&id) {
                    Ok(false) => return false,
                    Ok(true) => {
                        let start = self.begin_round();
                        match self.join(&id) {
                            Ok(()) => return start,
                            Err(e) => {
                                if start {
                                    self.running = false;
                                }
                                e
                            }
                        }
                    }
                    Err(e) => e,
                };
                info!("Join refused for {}: {}", id, refused);
                self.send_error(&id, &refused.to_string());
            }
            (Some(id), ClientMessage::NewPlayer { .. }) => {
                debug!("Player {} sent new_player twice", id);
            }
        }
        false
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers shared by the game and frame loop tests.

    use super::*;
    use crate::actor::{CH_BODY, CH_HEAD, CH_TAIL};
    use crate::grid::{Direction, Position};
    use crate::ledger::MemoryStore;

    /// Config with spawning switched off so frames are deterministic.
    pub fn quiet_config() -> Config {
        let mut config = Config::default();
        config.game.digit_spawn_rate = 0;
        config.game.stone_spawn_rate = 0;
        config
    }

    pub fn test_game(config: Config) -> Game {
        Game::with_rng(config, Arc::new(MemoryStore::default()), StdRng::seed_from_u64(42)).unwrap()
    }

    /// Decode every queued frame into its individual messages.
    pub fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            match item {
                Outbound::Frame(frame) => {
                    let batch: Vec<Value> = serde_json::from_str(&frame).unwrap();
                    out.extend(batch);
                }
                Outbound::Close { code, reason } => out.push(serde_json::json!(["#close", code, reason])),
            }
        }
        out
    }

    pub fn tags(messages: &[Value]) -> Vec<String> {
        messages.iter().map(|m| m[0].as_str().unwrap().to_string()).collect()
    }

    /// Connect and introduce a player. Returns its id and socket queue.
    pub fn add_player(game: &mut Game, name: &str) -> (PlayerId, Connection, mpsc::UnboundedReceiver<Outbound>) {
        let (conn, rx) = game.open_connection();
        let id = game.new_player(name.to_string(), None, conn.clone());
        (id, conn, rx)
    }

    /// Leave a player marked alive without a snake.
    pub fn strip_actor(game: &mut Game, id: &PlayerId) {
        let idx = game.index_of(id).unwrap();
        game.players[idx].actor = None;
    }

    /// Clear the grid and replace every snake with the given bodies, painted
    /// in their owners' colors. Bodies are listed head first.
    pub fn arrange(game: &mut Game, snakes: &[(&PlayerId, Vec<(i32, i32)>, Direction)]) {
        game.grid.reset();
        for (id, body, dir) in snakes {
            let idx = game.index_of(id).unwrap();
            let color = game.players[idx].color.unwrap();
            let last = body.len() - 1;
            for (i, &(x, y)) in body.iter().enumerate() {
                let glyph = match i {
                    0 => CH_HEAD,
                    i if i == last => CH_TAIL,
                    _ => CH_BODY,
                };
                game.grid.set(x as usize, y as usize, Cell::new(glyph, color));
            }
            let snake = Snake::from_body(color, body.iter().map(|&(x, y)| Position::new(x, y)), *dir);
            game.players[idx].actor = Some(Box::new(snake));
        }
    }
}
