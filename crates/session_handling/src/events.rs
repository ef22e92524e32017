//! Session lifecycle events.
//!
//! The server publishes these on a broadcast channel after each state change,
//! so that game systems can react to players joining and leaving without
//! being wired into the handlers themselves.

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, PlayerSessionId, SessionId};

/// Why a player left the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveReason {
    /// The transport reported the connection closed
    Disconnected,
    /// The session was destroyed while the player was connected
    SessionDestroyed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PlayerJoined {
        session_id: SessionId,
        connection_id: ConnectionId,
        player_session_id: PlayerSessionId,
        timestamp: u64,
    },
    PlayerLeft {
        session_id: SessionId,
        connection_id: ConnectionId,
        player_session_id: PlayerSessionId,
        reason: LeaveReason,
        timestamp: u64,
    },
    SessionDestroyed {
        session_id: SessionId,
        evicted_players: usize,
        timestamp: u64,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::PlayerJoined { session_id, .. }
            | SessionEvent::PlayerLeft { session_id, .. }
            | SessionEvent::SessionDestroyed { session_id, .. } => *session_id,
        }
    }
}
