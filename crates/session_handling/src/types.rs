//! # Core Type Definitions
//!
//! Value types shared by the client and server sides of session handling.
//!
//! ## Key Types
//!
//! - [`SessionConnectionConfig`] - Backend-issued descriptor a client uses to join
//! - [`PlayerConnectionConfig`] - Transport-issued descriptor of an inbound connection
//! - [`PlayerSessionId`] - Identifier correlating a connection with a reservation
//! - [`SessionId`] - Identifier of a backend-allocated session
//! - [`Reservation`] - The backend's record that a player is expected to connect

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::SystemTime;
use uuid::Uuid;

use crate::error::SessionError;

/// Identifier assigned by the transport to an open connection.
///
/// Unique among the connections that are currently open; the transport may
/// reuse a value once the previous connection with it has closed.
pub type ConnectionId = u32;

/// Unique identifier for a registered player in a session.
///
/// The backend issues one per reservation and the connecting peer presents it
/// back to the server, which is how a connection is matched to a reservation.
///
/// # Examples
///
/// ```rust
/// use session_handling::PlayerSessionId;
///
/// let fixed = PlayerSessionId::from("abc");
/// assert_eq!(fixed.as_str(), "abc");
///
/// let generated = PlayerSessionId::generate();
/// assert!(generated.as_str().starts_with("psess-"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerSessionId(String);

impl PlayerSessionId {
    /// Creates a player session id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier using UUID v4.
    pub fn generate() -> Self {
        Self(format!("psess-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PlayerSessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PlayerSessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlayerSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a backend-allocated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random session ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The properties for handling a join session request on the client.
///
/// Produced by the backend once per accepted client. It describes exactly one
/// join attempt: after the attempt (successful or not) it is spent, and a retry
/// needs a fresh descriptor from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConnectionConfig {
    /// Identifier of the reservation this descriptor was issued for
    pub player_session_id: PlayerSessionId,
    /// DNS name of the instance running the session (may be empty)
    pub dns_name: String,
    /// IP address of the session (may be empty)
    pub ip_address: String,
    /// Port number of the session
    pub port: u16,
}

impl SessionConnectionConfig {
    /// Resolves the descriptor into the endpoint the transport should connect to.
    ///
    /// The IP address wins when present; the DNS name is used otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidDescriptor`] when the player session id is
    /// empty, the port is zero, neither endpoint field is set, or the IP address
    /// does not parse.
    pub fn endpoint(&self) -> Result<SessionEndpoint, SessionError> {
        if self.player_session_id.is_empty() {
            return Err(SessionError::InvalidDescriptor(
                "player session id is empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(SessionError::InvalidDescriptor("port must be 1-65535".to_string()));
        }

        let ip = self.ip_address.trim();
        if !ip.is_empty() {
            let addr: IpAddr = ip.parse().map_err(|_| {
                SessionError::InvalidDescriptor(format!("invalid ip address: {ip}"))
            })?;
            return Ok(SessionEndpoint::Ip(SocketAddr::new(addr, self.port)));
        }

        let host = self.dns_name.trim();
        if !host.is_empty() {
            return Ok(SessionEndpoint::Dns {
                host: host.to_string(),
                port: self.port,
            });
        }

        Err(SessionError::InvalidDescriptor(
            "neither ip address nor dns name is set".to_string(),
        ))
    }
}

/// A resolved connect target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionEndpoint {
    Ip(SocketAddr),
    Dns { host: String, port: u16 },
}

impl fmt::Display for SessionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEndpoint::Ip(addr) => write!(f, "{addr}"),
            SessionEndpoint::Dns { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

/// The properties for handling player connect/disconnect on the server.
///
/// Produced by the transport for every inbound connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerConnectionConfig {
    /// Transport-assigned identifier for the connection
    pub connection_id: ConnectionId,
    /// Player session id presented by the connecting peer
    pub player_session_id: PlayerSessionId,
}

impl PlayerConnectionConfig {
    pub fn new(connection_id: ConnectionId, player_session_id: impl Into<PlayerSessionId>) -> Self {
        Self {
            connection_id,
            player_session_id: player_session_id.into(),
        }
    }
}

/// The backend's record that a specific player is expected to connect.
///
/// `expires_at` is decided by the backend. The server only compares it with
/// the current time and never invents a deadline of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub player_session_id: PlayerSessionId,
    pub session_id: SessionId,
    pub issued_at: SystemTime,
    pub expires_at: Option<SystemTime>,
}

impl Reservation {
    /// Creates a reservation with no expiry deadline.
    pub fn new(session_id: SessionId, player_session_id: impl Into<PlayerSessionId>) -> Self {
        Self {
            player_session_id: player_session_id.into(),
            session_id,
            issued_at: SystemTime::now(),
            expires_at: None,
        }
    }

    /// Returns the same reservation with a backend-chosen expiry deadline.
    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Backend description of an allocated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: SessionId,
    pub session_name: String,
    pub max_players: usize,
    pub dns_name: String,
    pub ip_address: String,
    pub port: u16,
    /// Unix timestamp (seconds) of the allocation
    pub created_at: u64,
}

/// Lifecycle of a hosted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Known to the server, not yet activated by the backend
    Created,
    /// Accepting players
    Active,
    /// Terminal
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Active => "active",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Server-side lifecycle of a single reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationState {
    /// Issued by the backend, not yet presented by any connection
    Pending,
    /// Claimed by a validated connection
    Active { connection_id: ConnectionId },
    /// The player left or was evicted
    Left,
    /// Withdrawn while still pending (backend expiry or session destruction)
    Retired,
}

impl ReservationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationState::Left | ReservationState::Retired)
    }
}

/// Client-side session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientSessionState {
    Idle,
    Joining,
    InSession,
}

/// Returns the current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
