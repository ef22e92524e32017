//! Capability traits at the seams between session handling, the game's
//! networking layer and the session backend.
//!
//! * [`ClientSessionHandler`] and [`ServerSessionHandler`] are what this crate
//!   exposes; the transport calls them at the right moments.
//! * [`ClientTransport`] and [`SessionBackend`] are what this crate consumes.

use async_trait::async_trait;

use crate::error::{BackendError, TransportError};
use crate::types::{
    PlayerConnectionConfig, PlayerSessionId, SessionConnectionConfig, SessionEndpoint, SessionId,
};

/// Session handling invoked on the client side.
pub trait ClientSessionHandler: Send + Sync {
    /// Handles the player join session process.
    ///
    /// Returns `true` only once the handshake completed and the local client is
    /// in-session. On `false` the client is back in its pre-session state and
    /// the descriptor is spent.
    fn handle_player_join_session(&self, config: &SessionConnectionConfig) -> bool;

    /// Handles the player leave session process.
    ///
    /// Idempotent: calling it while not in a session does nothing harmful.
    fn handle_player_leave_session(&self);
}

/// Session handling invoked on the server side.
pub trait ServerSessionHandler: Send + Sync {
    /// Handles the destroy session process. Idempotent and terminal.
    fn handle_destroy_session(&self);

    /// Validates a player join attempt and claims its reservation on success.
    ///
    /// The check and the claim form a single atomic step. On `false` the
    /// transport must reject the connection.
    fn validate_player_join_session(&self, config: &PlayerConnectionConfig) -> bool;

    /// Handles the player leave session process. Unknown connections are a no-op.
    fn handle_player_leave_session(&self, config: &PlayerConnectionConfig);
}

/// The client half of the transport: performs the real connect/disconnect.
pub trait ClientTransport: Send + Sync {
    /// Connects to the session endpoint, presenting the player session id.
    fn connect(
        &self,
        endpoint: &SessionEndpoint,
        player_session_id: &PlayerSessionId,
    ) -> Result<(), TransportError>;

    /// Tears down the current connection. Must tolerate having nothing to tear down.
    fn disconnect(&self);
}

/// Notifications sent to the backend that owns the authoritative session records.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// The player session is no longer in use.
    async fn notify_player_left(
        &self,
        session_id: SessionId,
        player_session_id: &PlayerSessionId,
    ) -> Result<(), BackendError>;

    /// The hosted session has ended.
    async fn notify_session_ended(&self, session_id: SessionId) -> Result<(), BackendError>;
}
