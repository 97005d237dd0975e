//! Per-connection session state.

use crate::protocol::{Role, ServerMessage};
use std::fmt;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Unique id minted per accepted connection.
///
/// Guards registry cleanup against the takeover race: a superseded
/// connection's teardown carries its own id and must not evict the session
/// that replaced it under the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One authenticated peer connection, exclusively owned by its registry
/// entry. The outbound handle feeds the connection's writer task; the close
/// handle tells both connection tasks to stop.
pub struct Session {
    pub identity: String,
    pub role: Role,
    pub conn_id: ConnId,
    /// Cleared at every liveness sweep, set again by probe acknowledgment.
    pub alive: bool,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    closer: watch::Sender<bool>,
}

impl Session {
    pub fn new(
        identity: String,
        role: Role,
        conn_id: ConnId,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        closer: watch::Sender<bool>,
    ) -> Self {
        Self {
            identity,
            role,
            conn_id,
            alive: true,
            outbound,
            closer,
        }
    }

    /// Fire-and-forget enqueue onto the connection's writer task.
    /// Returns false when the writer has already gone away.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).is_ok()
    }

    /// Signal the connection tasks to shut down.
    pub fn close(&self) {
        let _ = self.closer.send(true);
    }
}
