//! # Session Handling
//!
//! Lifecycle of a multiplayer session's player connections: how a client joins
//! a backend-allocated session, how the hosting server authorizes and tracks
//! that join, and how both sides tear down on leave or session destruction.
//!
//! ## Architecture Overview
//!
//! * **Connection descriptors** - [`SessionConnectionConfig`] (backend → client)
//!   and [`PlayerConnectionConfig`] (transport → server)
//! * **Client handler** - [`SessionClient`], implementing [`ClientSessionHandler`]
//!   on top of a [`ClientTransport`]
//! * **Server handler** - [`SessionServer`], implementing [`ServerSessionHandler`]:
//!   reservation check-and-claim, roster tracking, session destruction
//! * **Backend** - anything implementing [`SessionBackend`]; [`InMemoryBackend`]
//!   is the in-process version
//!
//! ### Join Flow
//!
//! 1. The backend allocates a session and reserves a slot for a player
//! 2. The client hands the descriptor to [`ClientSessionHandler::handle_player_join_session`]
//! 3. The server's transport delivers the inbound connection to
//!    [`ServerSessionHandler::validate_player_join_session`]
//! 4. On success the connection is in the roster until it leaves or the
//!    session is destroyed; the backend is told when the slot frees up
//!
//! ## Thread Safety
//!
//! The four handler operations are synchronous and may be called concurrently
//! from any thread. Each server session keeps its roster and reservations
//! behind one mutex, so claiming a reservation is a single atomic step.
//! Backend notifications are queued to a Tokio task and never block a handler.
//!
//! ## Error Handling
//!
//! Join and validation report only `bool`; leave and destroy never fail.
//! [`SessionError`], [`BackendError`] and [`TransportError`] explain failures
//! on the side APIs and in logs.

pub use backend::{
    BackendSessionStatus, BackendSettings, InMemoryBackend, PlayerSessionStatus,
    ReceivedNotification,
};
pub use client::SessionClient;
pub use config::SessionSettings;
pub use error::{BackendError, SessionError, TransportError};
pub use events::{LeaveReason, SessionEvent};
pub use roster::{ClaimRejection, Roster};
pub use server::{NotificationStats, NotificationStatsSnapshot, SessionServer};
pub use traits::{ClientSessionHandler, ClientTransport, ServerSessionHandler, SessionBackend};
pub use types::{
    current_timestamp, ClientSessionState, ConnectionId, PlayerConnectionConfig, PlayerSessionId,
    Reservation, ReservationState, SessionConfig, SessionConnectionConfig, SessionEndpoint,
    SessionId, SessionState,
};

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod roster;
pub mod server;
pub mod traits;
pub mod types;

#[cfg(test)]
mod tests;
