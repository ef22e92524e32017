//! Error types for session handling.
//!
//! None of these cross the join/validate contract, which only reports `bool`.
//! They describe why a decision came out the way it did and are logged where
//! the decision is made.

use crate::types::{PlayerSessionId, SessionId};

/// Errors produced by the session handlers themselves.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A connection descriptor cannot describe a join attempt
    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// The session has been destroyed and accepts no further changes
    #[error("Session {0} has been destroyed")]
    SessionDestroyed(SessionId),

    /// A reservation or config names a different session than the one hosted
    #[error("Session mismatch: expected {expected}, got {actual}")]
    SessionMismatch { expected: SessionId, actual: SessionId },

    /// The player session id is already known to this session
    #[error("Reservation already recorded for player session {0}")]
    DuplicateReservation(PlayerSessionId),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors reported by a session backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Session {0} has ended")]
    SessionEnded(SessionId),

    #[error("Session {0} is full")]
    SessionFull(SessionId),

    #[error("Player session already exists: {0}")]
    DuplicatePlayerSession(PlayerSessionId),

    /// The backend could not be reached or refused the call
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by a client transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),
}
