//! WebSocket transport and process lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use protocol::packets::{ClientMessage, ServerMessage};
use protocol::ProtocolError;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::ledger::JsonFileStore;

pub mod connection;
pub mod game;
pub mod game_loop;
pub mod player;

pub use connection::{Connection, ConnectionId, Outbound, CLOSE_GOING_AWAY};
pub use game::{Game, GAME_OVER_TEXT};
pub use game_loop::{run_game_loop, LoopExit, SharedGame};
pub use player::{Player, PlayerId};

/// Text frame a client sends to hang up.
const CLOSE_REQUEST: &str = "close";

/// How long open sockets get to finish after the server decided to stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the server stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerExit {
    /// The frame cap was reached with shutdown configured.
    FrameCap,
    /// The frame loop failed.
    Fatal(String),
    /// Interrupted from outside (Ctrl-C).
    Interrupted,
}

impl ServerExit {
    /// Process exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            // 128 + SIGTERM
            ServerExit::FrameCap => 143,
            ServerExit::Fatal(_) => 1,
            ServerExit::Interrupted => 0,
        }
    }
}

/// Bind the configured address and serve until the game stops the server
/// or Ctrl-C arrives.
pub async fn run(config: Config) -> anyhow::Result<ServerExit> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let store = Arc::new(JsonFileStore::new(&config.server.top_scores_file));
    let game = Game::new(config, store)?;

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", listener.local_addr()?);

    serve(listener, Arc::new(RwLock::new(game)), ctrl_c()).await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Accept connections on `listener` until the game asks to stop or
/// `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, state: SharedGame, shutdown: F) -> anyhow::Result<ServerExit>
where
    F: Future<Output = ()>,
{
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<ServerExit>();
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    let exit = loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        let exit_tx = exit_tx.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state, exit_tx).await {
                                debug!("Connection from {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
            Some(exit) = exit_rx.recv() => break exit,
            () = &mut shutdown => {
                info!("Interrupted, shutting down");
                state.write().await.shutdown(CLOSE_GOING_AWAY, "Server shutdown");
                break ServerExit::Interrupted;
            }
            Some(done) = connections.join_next() => {
                if let Err(e) = done {
                    warn!("Connection task failed: {}", e);
                }
            }
        }
    };

    info!("Server stopping: {:?}", exit);
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!("Aborting {} lingering connections", connections.len());
        connections.abort_all();
    }
    Ok(exit)
}

/// Run a frame loop in its own task. Panics are caught there and reported
/// like any other loop failure.
fn spawn_game_loop(state: SharedGame, exit_tx: mpsc::UnboundedSender<ServerExit>) {
    tokio::spawn(async move {
        let exit = match tokio::spawn(run_game_loop(Arc::clone(&state))).await {
            Ok(Ok(LoopExit::Drained)) => return,
            Ok(Ok(LoopExit::Shutdown)) => ServerExit::FrameCap,
            Ok(Err(e)) => {
                error!("Game loop failed: {}", e);
                ServerExit::Fatal(e.to_string())
            }
            Err(e) => {
                error!("Game loop panicked: {}", e);
                let mut game = state.write().await;
                game.running = false;
                game.send_error_all(&format!("Internal server error: {e}"));
                ServerExit::Fatal(e.to_string())
            }
        };
        let _ = exit_tx.send(exit);
    });
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedGame,
    exit_tx: mpsc::UnboundedSender<ServerExit>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();
    let (conn, mut outbound) = state.write().await.open_connection();
    info!("New connection {} from {}", conn.id(), addr);

    // Writer: drains this socket's queue until it is closed or told to close.
    tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            let (message, last) = match item {
                Outbound::Frame(text) => (Message::text(text.to_string()), false),
                Outbound::Close { code, reason } => (
                    Message::Close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    })),
                    true,
                ),
            };
            if let Err(e) = write.send(message).await {
                debug!("Failed to write to {}: {}", addr, e);
                break;
            }
            if last {
                break;
            }
        }
    });

    let mut session: Option<PlayerId> = None;
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error from {}: {}", addr, e);
                break;
            }
        };
        if text.as_str() == CLOSE_REQUEST {
            break;
        }

        let msg = match ClientMessage::parse(text.as_str()) {
            Ok(msg) => msg,
            Err(e @ (ProtocolError::InvalidPlayerName | ProtocolError::InvalidPlayerId)) => {
                let _ = conn.send(&[ServerMessage::Error(e.to_string())]);
                continue;
            }
            Err(e) => {
                debug!("Ignoring message from {}: {}", addr, e);
                continue;
            }
        };

        let start = state.write().await.handle_message(&conn, &mut session, msg);
        if start {
            spawn_game_loop(Arc::clone(&state), exit_tx.clone());
        }
    }

    if let Some(id) = &session {
        state.write().await.connection_closed(id, conn.id());
    }
    info!("Connection {} from {} closed", conn.id(), addr);
    Ok(())
}
