//! Transport handles.
//!
//! A [`Connection`] is the sending half of one WebSocket's outbound queue.
//! The socket's writer task owns the receiving half; once that task ends the
//! handle reports itself closed and sends start failing.

use std::sync::Arc;

use protocol::packets::{encode_batch, ServerMessage};
use thiserror::Error;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

/// WebSocket close code 1001.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Something queued for a socket's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// One encoded batch of messages.
    Frame(Arc<str>),
    /// Close the socket with a code and reason.
    Close { code: u16, reason: String },
}

/// A send to a connection whose writer has gone away.
#[derive(Debug, Error)]
#[error("connection {0} is closed")]
pub struct TransportClosed(pub ConnectionId);

#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    /// Create a handle and the queue its writer drains.
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue an already encoded frame.
    pub fn send_frame(&self, frame: Arc<str>) -> Result<(), TransportClosed> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportClosed(self.id))
    }

    /// Encode and queue a batch of messages.
    pub fn send(&self, messages: &[ServerMessage]) -> Result<(), TransportClosed> {
        self.send_frame(Arc::from(encode_batch(messages)))
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}
