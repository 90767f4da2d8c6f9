//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::server::game::GAME_OVER_TEXT;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write default config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub field: FieldConfig,
    #[serde(default)]
    pub snake: SnakeConfig,
}

impl Config {
    /// Load configuration from `path`, writing defaults if the file is absent,
    /// then apply `SNAKEPIT_*` environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            default_config
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override individual settings from `SNAKEPIT_<NAME>` variables.
    pub fn apply_env_overrides(&mut self) {
        env_override("SNAKEPIT_HOST", &mut self.server.host);
        env_override("SNAKEPIT_PORT", &mut self.server.port);
        env_override("SNAKEPIT_TOP_SCORES_FILE", &mut self.server.top_scores_file);
        env_override("SNAKEPIT_SERVER_NAME", &mut self.server.name);

        let game = &mut self.game;
        env_override("SNAKEPIT_GAME_SPEED", &mut game.speed);
        env_override_opt("SNAKEPIT_GAME_SPEED_INCREASE", &mut game.speed_increase);
        env_override("SNAKEPIT_GAME_SPEED_INCREASE_RATE", &mut game.speed_increase_rate);
        env_override_opt("SNAKEPIT_GAME_SPEED_MAX", &mut game.speed_max);
        env_override_opt("SNAKEPIT_GAME_FRAMES_MAX", &mut game.frames_max);
        env_override_opt("SNAKEPIT_GAME_START_WAIT_FOR_PLAYERS", &mut game.start_wait_for_players);
        env_override("SNAKEPIT_GAME_SHUTDOWN_ON_FRAMES_MAX", &mut game.shutdown_on_frames_max);
        env_override("SNAKEPIT_MAX_PLAYERS", &mut game.max_players);
        env_override("SNAKEPIT_MAX_TOP_SCORES", &mut game.max_top_scores);
        env_override("SNAKEPIT_NUM_COLORS", &mut game.num_colors);
        env_override("SNAKEPIT_KILL_POINTS", &mut game.kill_points);
        env_override("SNAKEPIT_DIGIT_MIN", &mut game.digit_min);
        env_override("SNAKEPIT_DIGIT_MAX", &mut game.digit_max);
        env_override("SNAKEPIT_STONES_ENABLED", &mut game.stones_enabled);
        env_override("SNAKEPIT_DIGIT_SPAWN_RATE", &mut game.digit_spawn_rate);
        env_override("SNAKEPIT_STONE_SPAWN_RATE", &mut game.stone_spawn_rate);

        env_override("SNAKEPIT_FIELD_SIZE_X", &mut self.field.size_x);
        env_override("SNAKEPIT_FIELD_SIZE_Y", &mut self.field.size_y);
        env_override("SNAKEPIT_INIT_LENGTH", &mut self.snake.init_length);
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.max_players > self.game.num_colors as usize {
            return Err(ConfigError::Invalid("max_players > num_colors".into()));
        }
        if self.game.num_colors == 0 {
            return Err(ConfigError::Invalid("num_colors must be at least 1".into()));
        }
        if !(self.game.speed > 0.0 && self.game.speed.is_finite()) {
            return Err(ConfigError::Invalid("game speed must be a positive number".into()));
        }
        if let Some(max) = self.game.speed_max {
            if !(max > 0.0 && max.is_finite()) {
                return Err(ConfigError::Invalid("speed_max must be a positive number".into()));
            }
        }
        if !(self.game.speed_increase_rate >= 0.0 && self.game.speed_increase_rate.is_finite()) {
            return Err(ConfigError::Invalid("speed_increase_rate must be a non-negative number".into()));
        }
        let banner_len = GAME_OVER_TEXT.chars().count();
        if self.field.size_x < banner_len {
            return Err(ConfigError::Invalid(format!("field size_x < {banner_len}")));
        }
        if self.snake.init_length < 2 {
            return Err(ConfigError::Invalid("init_length must be at least 2".into()));
        }
        let distance = self.snake.init_length + self.snake.init_min_distance_border;
        if self.field.size_x / 2 < distance {
            return Err(ConfigError::Invalid(
                "field size_x too small for init_length and init_min_distance_border".into(),
            ));
        }
        if self.field.size_y / 2 < distance {
            return Err(ConfigError::Invalid(
                "field size_y too small for init_length and init_min_distance_border".into(),
            ));
        }
        if self.game.digit_min == 0 || self.game.digit_min > self.game.digit_max || self.game.digit_max > 9 {
            return Err(ConfigError::Invalid("digit range must lie within 1..=9".into()));
        }
        Ok(())
    }

    /// The read-only settings snapshot sent to clients in the handshake.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            server_name: self.server.name.clone(),
            game_speed: self.game.speed,
            game_speed_increase: self.game.speed_increase,
            game_speed_increase_rate: self.game.speed_increase_rate,
            game_speed_max: self.game.speed_max,
            game_frames_max: self.game.frames_max,
            game_start_wait_for_players: self.game.start_wait_for_players,
            game_shutdown_on_frames_max: self.game.shutdown_on_frames_max,
            max_players: self.game.max_players,
            field_size_x: self.field.size_x,
            field_size_y: self.field.size_y,
            kill_points: self.game.kill_points,
            init_length: self.snake.init_length,
            digit_min: self.game.digit_min,
            digit_max: self.game.digit_max,
            stones_enabled: self.game.stones_enabled,
        }
    }
}

fn env_override<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} '{}', keeping configured value", key, raw),
        }
    }
}

fn env_override_opt<T: FromStr>(key: &str, target: &mut Option<T>) {
    if let Ok(raw) = std::env::var(key) {
        if raw.is_empty() {
            *target = None;
            return;
        }
        match raw.parse() {
            Ok(value) => *target = Some(value),
            Err(_) => warn!("Invalid {} '{}', keeping configured value", key, raw),
        }
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Server name shown to clients.
    #[serde(default = "default_name")]
    pub name: String,
    /// Where the top-score ledger is persisted.
    #[serde(default = "default_top_scores_file")]
    pub top_scores_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: default_name(),
            top_scores_file: default_top_scores_file(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8111
}
fn default_name() -> String {
    "SnakeServer".to_string()
}
fn default_top_scores_file() -> PathBuf {
    PathBuf::from("scores/top_scores.json")
}

/// Game rules and pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GameConfig {
    /// Base speed in ticks per second.
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Frame after which the speed starts ramping up.
    #[serde(default)]
    pub speed_increase: Option<u64>,
    /// Multiplicative per-frame speed increase once ramping.
    #[serde(default = "default_speed_increase_rate")]
    pub speed_increase_rate: f64,
    #[serde(default)]
    pub speed_max: Option<f64>,
    /// Frame count after which every snake is killed.
    #[serde(default)]
    pub frames_max: Option<u64>,
    /// Hold the first frame until this many players are alive.
    #[serde(default)]
    pub start_wait_for_players: Option<usize>,
    /// Terminate the process once `frames_max` is reached.
    #[serde(default)]
    pub shutdown_on_frames_max: bool,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default = "default_max_top_scores")]
    pub max_top_scores: usize,
    #[serde(default = "default_num_colors")]
    pub num_colors: u8,
    /// Bonus awarded to the owner of a body a snake crashed into.
    #[serde(default = "default_kill_points")]
    pub kill_points: u64,
    #[serde(default = "default_digit_min")]
    pub digit_min: u8,
    #[serde(default = "default_digit_max")]
    pub digit_max: u8,
    #[serde(default)]
    pub stones_enabled: bool,
    /// Chance in a hundred per frame.
    #[serde(default = "default_spawn_rate")]
    pub digit_spawn_rate: u32,
    /// Chance in a hundred per frame.
    #[serde(default = "default_spawn_rate")]
    pub stone_spawn_rate: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            speed_increase: None,
            speed_increase_rate: default_speed_increase_rate(),
            speed_max: None,
            frames_max: None,
            start_wait_for_players: None,
            shutdown_on_frames_max: false,
            max_players: default_max_players(),
            max_top_scores: default_max_top_scores(),
            num_colors: default_num_colors(),
            kill_points: default_kill_points(),
            digit_min: default_digit_min(),
            digit_max: default_digit_max(),
            stones_enabled: false,
            digit_spawn_rate: default_spawn_rate(),
            stone_spawn_rate: default_spawn_rate(),
        }
    }
}

fn default_speed() -> f64 {
    4.0
}
fn default_speed_increase_rate() -> f64 {
    0.001
}
fn default_max_players() -> usize {
    6
}
fn default_max_top_scores() -> usize {
    15
}
fn default_num_colors() -> u8 {
    6
}
fn default_kill_points() -> u64 {
    1000
}
fn default_digit_min() -> u8 {
    1
}
fn default_digit_max() -> u8 {
    9
}
fn default_spawn_rate() -> u32 {
    6
}

/// Playing field dimensions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldConfig {
    #[serde(default = "default_field_size")]
    pub size_x: usize,
    #[serde(default = "default_field_size")]
    pub size_y: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            size_x: default_field_size(),
            size_y: default_field_size(),
        }
    }
}

fn default_field_size() -> usize {
    40
}

/// Snake placement.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnakeConfig {
    #[serde(default = "default_init_length")]
    pub init_length: usize,
    #[serde(default = "default_init_min_distance_border")]
    pub init_min_distance_border: usize,
    /// Placement attempts before a join is refused.
    #[serde(default = "default_init_retries")]
    pub init_retries: usize,
}

impl Default for SnakeConfig {
    fn default() -> Self {
        Self {
            init_length: default_init_length(),
            init_min_distance_border: default_init_min_distance_border(),
            init_retries: default_init_retries(),
        }
    }
}

fn default_init_length() -> usize {
    5
}
fn default_init_min_distance_border() -> usize {
    2
}
fn default_init_retries() -> usize {
    10
}

/// Settings visible to clients, keyed the way the web client expects them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientSettings {
    pub server_name: String,
    pub game_speed: f64,
    pub game_speed_increase: Option<u64>,
    pub game_speed_increase_rate: f64,
    pub game_speed_max: Option<f64>,
    pub game_frames_max: Option<u64>,
    pub game_start_wait_for_players: Option<usize>,
    pub game_shutdown_on_frames_max: bool,
    pub max_players: usize,
    pub field_size_x: usize,
    pub field_size_y: usize,
    pub kill_points: u64,
    pub init_length: usize,
    pub digit_min: u8,
    pub digit_max: u8,
    pub stones_enabled: bool,
}
