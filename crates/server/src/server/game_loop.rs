//! Frame scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::connection::CLOSE_GOING_AWAY;
use super::game::Game;
use crate::error::GameError;

/// The game as shared between connection tasks and the frame loop.
pub type SharedGame = Arc<RwLock<Game>>;

const WAIT_FOR_PLAYERS_POLL: Duration = Duration::from_millis(500);

pub const FRAME_CAP_REASON: &str = "Server shutdown because frames limit reached";

/// How a frame loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// No snake left alive. The next `join` starts a new round.
    Drained,
    /// Frame cap reached with shutdown configured. Every socket has been
    /// asked to close.
    Shutdown,
}

/// Round to 6 decimal places.
fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Drive frames until every snake is dead or the frame cap stops the server.
///
/// The caller must have set `running` (see [`Game::begin_round`]); it is
/// cleared under the same lock that observes the exit condition.
pub async fn run_game_loop(state: SharedGame) -> Result<LoopExit, GameError> {
    let (wait_for, frames_max, shutdown_on_cap, ramp_start, ramp_rate, speed_max, mut tick) = {
        let game = state.read().await;
        let cfg = &game.config().game;
        (
            cfg.start_wait_for_players.filter(|&n| n > 0),
            cfg.frames_max.filter(|&n| n > 0),
            cfg.shutdown_on_frames_max,
            cfg.speed_increase.filter(|&n| n > 0),
            cfg.speed_increase_rate,
            cfg.speed_max,
            Duration::from_secs_f64(1.0 / game.speed),
        )
    };

    if let Some(wanted) = wait_for {
        if state.read().await.frame == 0 {
            info!("Waiting for {} players", wanted);
            while state.read().await.alive_count() < wanted {
                sleep(WAIT_FOR_PLAYERS_POLL).await;
            }
        }
    }

    info!("Game loop started");
    loop {
        {
            let mut game = state.write().await;

            if let Err(e) = game.next_frame() {
                error!("Frame {} failed: {}", game.frame, e);
                game.send_error_all(&format!("Internal server error: {e}"));
                game.running = false;
                return Err(e);
            }

            if game.alive_count() == 0 {
                game.running = false;
                info!("Round over after {} frames", game.frame);
                return Ok(LoopExit::Drained);
            }

            if let Some(max) = frames_max {
                if game.frame >= max {
                    info!("Frame limit {} reached", max);
                    game.kill_all();
                    if shutdown_on_cap {
                        game.shutdown(CLOSE_GOING_AWAY, FRAME_CAP_REASON);
                        game.running = false;
                        return Ok(LoopExit::Shutdown);
                    }
                }
            }

            let ramping = ramp_start.is_some_and(|start| game.frame >= start);
            if ramping && speed_max.is_none_or(|max| game.speed < max) {
                let mut speed = round6(game.speed + game.speed * ramp_rate);
                if let Some(max) = speed_max {
                    speed = speed.min(max);
                }
                game.speed = speed;
                tick = Duration::from_secs_f64(1.0 / speed);
                debug!("Speed {} at frame {}", speed, game.frame);
            }
        }

        sleep(tick).await;

        state.write().await.disconnect_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Direction;
    use crate::server::game::test_support::*;
    use serde_json::json;

    fn shared(game: Game) -> SharedGame {
        Arc::new(RwLock::new(game))
    }

    #[test]
    fn test_round6() {
        assert_eq!(round6(4.0 + 4.0 * 0.001), 4.004);
        assert_eq!(round6(1.23456789), 1.234568);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_drains_when_last_snake_dies() {
        let mut game = test_game(quiet_config());
        let (a, _, _rx) = add_player(&mut game, "Ada");
        game.join(&a).unwrap();
        arrange(&mut game, &[(&a, vec![(0, 0), (0, 1)], Direction::Up)]);
        assert!(game.begin_round());
        let state = shared(game);

        let exit = run_game_loop(Arc::clone(&state)).await.unwrap();
        assert_eq!(exit, LoopExit::Drained);
        let game = state.read().await;
        assert!(!game.running);
        assert_eq!(game.frame, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_cap_with_shutdown_closes_everyone() {
        let mut config = quiet_config();
        config.game.frames_max = Some(3);
        config.game.shutdown_on_frames_max = true;
        let mut game = test_game(config);
        let (a, _, mut rx) = add_player(&mut game, "Ada");
        game.join(&a).unwrap();
        arrange(&mut game, &[(&a, vec![(10, 20), (9, 20)], Direction::Right)]);
        game.begin_round();
        let state = shared(game);

        let exit = run_game_loop(Arc::clone(&state)).await.unwrap();
        assert_eq!(exit, LoopExit::Shutdown);
        {
            let game = state.read().await;
            assert_eq!(game.frame, 3);
            assert_eq!(game.alive_count(), 0);
            assert!(!game.running);
        }

        let messages = drain(&mut rx);
        let over = messages.iter().position(|m| m[0] == "p_gameover").unwrap();
        let close = messages.len() - 1;
        assert!(over < close);
        assert_eq!(messages[close], json!(["#close", 1001, FRAME_CAP_REASON]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_cap_without_shutdown_ends_round() {
        let mut config = quiet_config();
        config.game.frames_max = Some(2);
        let mut game = test_game(config);
        let (a, _, mut rx) = add_player(&mut game, "Ada");
        game.join(&a).unwrap();
        arrange(&mut game, &[(&a, vec![(10, 20), (9, 20)], Direction::Right)]);
        game.begin_round();
        let state = shared(game);

        assert_eq!(run_game_loop(Arc::clone(&state)).await.unwrap(), LoopExit::Drained);
        assert_eq!(state.read().await.frame, 3);
        assert!(drain(&mut rx).iter().all(|m| !matches!(m[0].as_str(), Some("#close"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_ramp_is_capped() {
        let mut config = quiet_config();
        config.game.speed_increase = Some(1);
        config.game.speed_increase_rate = 0.4;
        config.game.speed_max = Some(6.0);
        config.game.frames_max = Some(3);
        let mut game = test_game(config);
        let (a, _, _rx) = add_player(&mut game, "Ada");
        game.join(&a).unwrap();
        arrange(&mut game, &[(&a, vec![(10, 20), (9, 20)], Direction::Right)]);
        game.begin_round();
        let state = shared(game);

        run_game_loop(Arc::clone(&state)).await.unwrap();
        assert_eq!(state.read().await.speed, 6.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_enough_players() {
        let mut config = quiet_config();
        config.game.start_wait_for_players = Some(2);
        let mut game = test_game(config);
        let (a, _, _rx) = add_player(&mut game, "Ada");
        game.join(&a).unwrap();
        game.begin_round();
        let state = shared(game);

        let waited = tokio::time::timeout(Duration::from_secs(5), run_game_loop(Arc::clone(&state))).await;
        assert!(waited.is_err());
        assert_eq!(state.read().await.frame, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_starts_once_enough_players_alive() {
        let mut config = quiet_config();
        config.game.start_wait_for_players = Some(2);
        config.game.frames_max = Some(3);
        let mut game = test_game(config);
        let (a, _, _ra) = add_player(&mut game, "Ada");
        let (b, _, _rb) = add_player(&mut game, "Bob");
        game.join(&a).unwrap();
        arrange(&mut game, &[(&a, vec![(10, 20), (9, 20)], Direction::Right)]);
        game.begin_round();
        let state = shared(game);

        let handle = tokio::spawn(run_game_loop(Arc::clone(&state)));
        sleep(Duration::from_secs(2)).await;
        assert_eq!(state.read().await.frame, 0);

        {
            let mut game = state.write().await;
            game.join(&b).unwrap();
            arrange(
                &mut game,
                &[
                    (&a, vec![(10, 20), (9, 20)], Direction::Right),
                    (&b, vec![(10, 25), (9, 25)], Direction::Right),
                ],
            );
        }

        let exit = handle.await.unwrap().unwrap();
        assert_eq!(exit, LoopExit::Drained);
        assert!(state.read().await.frame >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_state_is_reported_to_everyone() {
        let mut game = test_game(quiet_config());
        let (a, _, mut rx) = add_player(&mut game, "Ada");
        game.join(&a).unwrap();
        strip_actor(&mut game, &a);
        game.begin_round();
        drain(&mut rx);
        let state = shared(game);

        let result = run_game_loop(Arc::clone(&state)).await;
        assert!(matches!(result, Err(GameError::Invariant(_))));
        assert!(!state.read().await.running);

        let messages = drain(&mut rx);
        let text = messages[0][1].as_str().unwrap();
        assert!(text.starts_with("Internal server error: Broken game state"));
    }
}
