//! The duplex text channel abstraction (spec §4.1, §6).
//!
//! A `DuelChannel` is the opaque handle a waiting entry or a match runner holds for a
//! participant's connection. It is deliberately thin: send a text frame, or close. The
//! concrete implementation (an Axum WebSocket split sink fed through an mpsc queue, see
//! `gateway.rs`) is never reached into directly by the pool or the runner, matching the
//! design note that a runner must never reach back into the pool after pairing.

use tokio::sync::mpsc;

#[derive(Debug)]
pub enum ChannelCommand {
    Send(String),
    Close,
}

/// A cheaply clonable handle to a participant's outbound frame queue.
///
/// Cloning and sending never blocks on network I/O: frames are queued and a dedicated
/// writer task (owned by the gateway) drains them onto the real socket. This is what
/// lets a match runner hold channel handles for both participants without risking a
/// slow socket write stalling the whole match loop.
#[derive(Debug, Clone)]
pub struct DuelChannel {
    tx: mpsc::Sender<ChannelCommand>,
}

impl DuelChannel {
    pub fn new(tx: mpsc::Sender<ChannelCommand>) -> Self {
        Self { tx }
    }

    /// Queue a text frame for delivery. Returns an error if the writer task has
    /// already torn down (the connection is gone) -- callers should translate this
    /// into whatever failure-handling the caller's layer uses (for producer tasks,
    /// a synthetic `disconnected` event).
    pub async fn send(&self, frame: impl Into<String>) -> Result<(), crate::error::Error> {
        self.tx
            .send(ChannelCommand::Send(frame.into()))
            .await
            .map_err(|_| crate::error::Error::Transport("channel closed".into()))
    }

    /// Ask the writer task to close the underlying socket after flushing.
    pub async fn close(&self) {
        let _ = self.tx.send(ChannelCommand::Close).await;
    }
}
