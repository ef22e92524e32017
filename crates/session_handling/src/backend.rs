//! In-process session backend.
//!
//! [`InMemoryBackend`] plays the part of the remote session service: it
//! allocates sessions, issues reservations with an optional time-to-live and
//! keeps the authoritative status of every player session up to date from the
//! notifications it receives. The host binary and the tests use it; a
//! production deployment would implement [`SessionBackend`] against the real
//! service instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use crate::error::BackendError;
use crate::traits::SessionBackend;
use crate::types::{
    current_timestamp, PlayerSessionId, Reservation, SessionConfig, SessionConnectionConfig,
    SessionId,
};

fn default_reservation_ttl_secs() -> Option<u64> {
    Some(60)
}

/// Where allocated sessions are reachable, and how long reservations last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub ip_address: String,
    #[serde(default)]
    pub dns_name: String,
    pub port: u16,
    /// Lifetime of an unclaimed reservation; `None` means no deadline
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            ip_address: "127.0.0.1".to_string(),
            dns_name: String::new(),
            port: 7777,
            reservation_ttl_secs: default_reservation_ttl_secs(),
        }
    }
}

/// Backend-side status of a player session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerSessionStatus {
    Reserved,
    Completed,
    /// Never claimed before its deadline; no longer counts toward capacity
    Expired,
}

/// Backend-side status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendSessionStatus {
    Active,
    Terminated,
}

/// A notification as received by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivedNotification {
    PlayerLeft {
        session_id: SessionId,
        player_session_id: PlayerSessionId,
    },
    SessionEnded {
        session_id: SessionId,
    },
}

#[derive(Debug)]
struct PlayerSessionRecord {
    reservation: Reservation,
    status: PlayerSessionStatus,
}

impl PlayerSessionRecord {
    fn status_at(&self, now: SystemTime) -> PlayerSessionStatus {
        match self.status {
            PlayerSessionStatus::Reserved if self.reservation.is_expired_at(now) => {
                PlayerSessionStatus::Expired
            }
            status => status,
        }
    }
}

#[derive(Debug)]
struct BackendSession {
    config: SessionConfig,
    status: BackendSessionStatus,
    player_sessions: HashMap<PlayerSessionId, PlayerSessionRecord>,
}

impl BackendSession {
    /// Moves reservations past their deadline to `Expired`.
    fn expire_reservations(&mut self, now: SystemTime) -> usize {
        let mut expired = 0;
        for record in self.player_sessions.values_mut() {
            if record.status_at(now) != record.status {
                record.status = PlayerSessionStatus::Expired;
                expired += 1;
            }
        }
        expired
    }

    fn complete(&mut self, session_id: SessionId, player_session_id: &PlayerSessionId) {
        self.player_sessions
            .entry(player_session_id.clone())
            .or_insert_with(|| PlayerSessionRecord {
                reservation: Reservation::new(session_id, player_session_id.clone()),
                status: PlayerSessionStatus::Reserved,
            })
            .status = PlayerSessionStatus::Completed;
    }
}

#[derive(Debug, Default)]
struct BackendState {
    sessions: HashMap<SessionId, BackendSession>,
    received: Vec<ReceivedNotification>,
}

#[derive(Debug)]
pub struct InMemoryBackend {
    settings: BackendSettings,
    state: Mutex<BackendState>,
    failing: AtomicBool,
}

impl InMemoryBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(BackendState::default()),
            failing: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent notification fail with [`BackendError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Allocates a new session on the configured endpoint.
    pub fn create_session(
        &self,
        name: impl Into<String>,
        max_players: usize,
    ) -> Result<SessionConfig, BackendError> {
        let config = SessionConfig {
            session_id: SessionId::new(),
            session_name: name.into(),
            max_players,
            dns_name: self.settings.dns_name.clone(),
            ip_address: self.settings.ip_address.clone(),
            port: self.settings.port,
            created_at: current_timestamp(),
        };

        self.lock().sessions.insert(
            config.session_id,
            BackendSession {
                config: config.clone(),
                status: BackendSessionStatus::Active,
                player_sessions: HashMap::new(),
            },
        );
        info!("🆕 Backend allocated session {} ({})", config.session_id, config.session_name);
        Ok(config)
    }

    /// Issues a reservation for a player.
    ///
    /// Returns the descriptor to hand to the client and the reservation to
    /// hand to the hosting server.
    pub fn reserve_player(
        &self,
        session_id: SessionId,
        player_session_id: PlayerSessionId,
    ) -> Result<(SessionConnectionConfig, Reservation), BackendError> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(BackendError::UnknownSession(session_id))?;

        if session.status == BackendSessionStatus::Terminated {
            return Err(BackendError::SessionEnded(session_id));
        }
        if session.player_sessions.contains_key(&player_session_id) {
            return Err(BackendError::DuplicatePlayerSession(player_session_id));
        }

        let now = SystemTime::now();
        let expired = session.expire_reservations(now);
        if expired > 0 {
            debug!("⏰ Backend expired {} reservations in session {}", expired, session_id);
        }
        let reserved = session
            .player_sessions
            .values()
            .filter(|record| record.status == PlayerSessionStatus::Reserved)
            .count();
        if reserved >= session.config.max_players {
            return Err(BackendError::SessionFull(session_id));
        }

        let descriptor = SessionConnectionConfig {
            player_session_id: player_session_id.clone(),
            dns_name: session.config.dns_name.clone(),
            ip_address: session.config.ip_address.clone(),
            port: session.config.port,
        };
        let mut reservation = Reservation::new(session_id, player_session_id.clone());
        if let Some(ttl) = self.settings.reservation_ttl_secs {
            reservation = reservation.with_expiry(now + Duration::from_secs(ttl));
        }
        session.player_sessions.insert(
            player_session_id.clone(),
            PlayerSessionRecord {
                reservation: reservation.clone(),
                status: PlayerSessionStatus::Reserved,
            },
        );

        debug!("🎟️ Backend reserved {} in session {}", player_session_id, session_id);
        Ok((descriptor, reservation))
    }

    pub fn player_session_status(
        &self,
        session_id: SessionId,
        player_session_id: &PlayerSessionId,
    ) -> Option<PlayerSessionStatus> {
        self.lock()
            .sessions
            .get(&session_id)
            .and_then(|session| session.player_sessions.get(player_session_id))
            .map(|record| record.status_at(SystemTime::now()))
    }

    pub fn session_status(&self, session_id: SessionId) -> Option<BackendSessionStatus> {
        self.lock().sessions.get(&session_id).map(|session| session.status)
    }

    /// Every notification received so far, in arrival order.
    pub fn notifications(&self) -> Vec<ReceivedNotification> {
        self.lock().received.clone()
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend is failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    async fn notify_player_left(
        &self,
        session_id: SessionId,
        player_session_id: &PlayerSessionId,
    ) -> Result<(), BackendError> {
        self.check_available()?;

        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(BackendError::UnknownSession(session_id))?;
        session.complete(session_id, player_session_id);
        state.received.push(ReceivedNotification::PlayerLeft {
            session_id,
            player_session_id: player_session_id.clone(),
        });
        Ok(())
    }

    async fn notify_session_ended(&self, session_id: SessionId) -> Result<(), BackendError> {
        self.check_available()?;

        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(BackendError::UnknownSession(session_id))?;
        session.status = BackendSessionStatus::Terminated;
        for record in session.player_sessions.values_mut() {
            if record.status == PlayerSessionStatus::Reserved {
                record.status = PlayerSessionStatus::Completed;
            }
        }
        state.received.push(ReceivedNotification::SessionEnded { session_id });
        Ok(())
    }
}
