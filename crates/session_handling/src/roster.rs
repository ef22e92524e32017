//! The per-session roster and reservation ledger.
//!
//! [`Roster`] is plain data with no locking of its own. The server keeps it
//! behind a single mutex so that every method here runs inside one critical
//! section, which is what makes [`Roster::try_claim`] an atomic
//! check-and-claim.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::error::SessionError;
use crate::types::{ConnectionId, PlayerConnectionConfig, PlayerSessionId, Reservation, ReservationState};

/// Why a join attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimRejection {
    #[error("no reservation for player session {0}")]
    UnknownReservation(PlayerSessionId),

    #[error("player session {player_session_id} already claimed by connection {connection_id}")]
    AlreadyClaimed {
        player_session_id: PlayerSessionId,
        connection_id: ConnectionId,
    },

    #[error("reservation for player session {0} has expired")]
    Expired(PlayerSessionId),

    #[error("reservation for player session {0} is no longer usable")]
    Spent(PlayerSessionId),

    #[error("connection {0} is already in the roster")]
    ConnectionInUse(ConnectionId),
}

#[derive(Debug, Clone)]
struct ReservationEntry {
    reservation: Reservation,
    state: ReservationState,
    /// Set once the backend acknowledged that this player session is free.
    released: bool,
}

/// Validated connections of one session, plus the reservations they claim.
#[derive(Debug, Default)]
pub struct Roster {
    entries: HashMap<ConnectionId, PlayerConnectionConfig>,
    reservations: HashMap<PlayerSessionId, ReservationEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a backend-issued reservation in the `Pending` state.
    pub fn add_reservation(&mut self, reservation: Reservation) -> Result<(), SessionError> {
        if self.reservations.contains_key(&reservation.player_session_id) {
            return Err(SessionError::DuplicateReservation(
                reservation.player_session_id,
            ));
        }
        self.reservations.insert(
            reservation.player_session_id.clone(),
            ReservationEntry {
                reservation,
                state: ReservationState::Pending,
                released: false,
            },
        );
        Ok(())
    }

    /// Checks the presented reservation and, if it is usable, claims it for
    /// the connection and inserts the roster entry.
    ///
    /// Nothing is modified when a rejection is returned.
    pub fn try_claim(
        &mut self,
        config: &PlayerConnectionConfig,
        now: SystemTime,
        enforce_expiry: bool,
    ) -> Result<(), ClaimRejection> {
        if self.entries.contains_key(&config.connection_id) {
            return Err(ClaimRejection::ConnectionInUse(config.connection_id));
        }

        let player_session_id = &config.player_session_id;
        let entry = self
            .reservations
            .get_mut(player_session_id)
            .ok_or_else(|| ClaimRejection::UnknownReservation(player_session_id.clone()))?;

        match entry.state {
            ReservationState::Active { connection_id } => {
                return Err(ClaimRejection::AlreadyClaimed {
                    player_session_id: player_session_id.clone(),
                    connection_id,
                });
            }
            state if state.is_terminal() => {
                return Err(ClaimRejection::Spent(player_session_id.clone()));
            }
            _ => {}
        }

        if enforce_expiry && entry.reservation.is_expired_at(now) {
            return Err(ClaimRejection::Expired(player_session_id.clone()));
        }

        entry.state = ReservationState::Active {
            connection_id: config.connection_id,
        };
        self.entries.insert(config.connection_id, config.clone());
        Ok(())
    }

    /// Removes the entry for a connection and marks its reservation `Left`.
    ///
    /// Returns the removed entry, or `None` if the connection was never
    /// validated or has already left.
    pub fn release(&mut self, connection_id: ConnectionId) -> Option<PlayerConnectionConfig> {
        let removed = self.entries.remove(&connection_id)?;
        if let Some(entry) = self.reservations.get_mut(&removed.player_session_id) {
            entry.state = ReservationState::Left;
        }
        Some(removed)
    }

    /// Withdraws a reservation that is still pending.
    pub fn retire(&mut self, player_session_id: &PlayerSessionId) -> bool {
        match self.reservations.get_mut(player_session_id) {
            Some(entry) if entry.state == ReservationState::Pending => {
                entry.state = ReservationState::Retired;
                true
            }
            _ => false,
        }
    }

    /// Evicts every entry and retires every pending reservation.
    ///
    /// Returns the evicted entries ordered by connection id.
    pub fn evict_all(&mut self) -> Vec<PlayerConnectionConfig> {
        let mut evicted: Vec<_> = self.entries.drain().map(|(_, config)| config).collect();
        evicted.sort_by_key(|config| config.connection_id);

        for entry in self.reservations.values_mut() {
            entry.state = match entry.state {
                ReservationState::Pending => ReservationState::Retired,
                ReservationState::Active { .. } => ReservationState::Left,
                terminal => terminal,
            };
        }
        evicted
    }

    /// Records the backend's acknowledgement that a player session is free.
    pub fn mark_released(&mut self, player_session_id: &PlayerSessionId) {
        if let Some(entry) = self.reservations.get_mut(player_session_id) {
            entry.released = true;
        }
    }

    pub fn is_released(&self, player_session_id: &PlayerSessionId) -> bool {
        self.reservations
            .get(player_session_id)
            .is_some_and(|entry| entry.released)
    }

    pub fn reservation_state(&self, player_session_id: &PlayerSessionId) -> Option<ReservationState> {
        self.reservations.get(player_session_id).map(|entry| entry.state)
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&PlayerConnectionConfig> {
        self.entries.get(&connection_id)
    }

    /// Entries ordered by connection id.
    pub fn snapshot(&self) -> Vec<PlayerConnectionConfig> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by_key(|config| config.connection_id);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_reservations(&self) -> usize {
        self.reservations
            .values()
            .filter(|entry| entry.state == ReservationState::Pending)
            .count()
    }
}
