//! Server-side session handler.
//!
//! [`SessionServer`] owns one hosted session: its lifecycle state, its roster
//! and the reservations the backend issued for it. All mutation happens under
//! one mutex, and the lock is never held while the backend is contacted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::notifier::{BackendNotifier, Notification, NotificationStats, NotificationStatsSnapshot};
use crate::config::SessionSettings;
use crate::error::SessionError;
use crate::events::{LeaveReason, SessionEvent};
use crate::roster::Roster;
use crate::traits::{ServerSessionHandler, SessionBackend};
use crate::types::{
    current_timestamp, ConnectionId, PlayerConnectionConfig, PlayerSessionId, Reservation, ReservationState,
    SessionConfig, SessionId, SessionState,
};

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) state: SessionState,
    pub(crate) config: Option<SessionConfig>,
    pub(crate) roster: Roster,
}

/// State shared between the handler and its notification worker.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) session_id: SessionId,
    inner: Mutex<SessionInner>,
    pub(crate) stats: NotificationStats,
}

impl SessionShared {
    /// Locks the session state.
    ///
    /// A poisoned lock is recovered: every writer leaves the roster
    /// consistent before it can panic, and teardown paths must not fail.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The server session handler for one backend-allocated session.
///
/// # Examples
///
/// ```rust
/// use session_handling::{
///     InMemoryBackend, PlayerConnectionConfig, ServerSessionHandler, SessionServer, SessionSettings,
///     BackendSettings,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = Arc::new(InMemoryBackend::new(BackendSettings::default()));
/// let session = backend.create_session("arena", 8)?;
/// let server = SessionServer::spawn(session.session_id, SessionSettings::default(), backend.clone());
/// server.handle_create_session(&session);
///
/// let (_descriptor, reservation) = backend.reserve_player(session.session_id, "abc".into())?;
/// server.add_reservation(reservation)?;
///
/// assert!(server.validate_player_join_session(&PlayerConnectionConfig::new(42, "abc")));
/// assert!(!server.validate_player_join_session(&PlayerConnectionConfig::new(43, "abc")));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionServer {
    shared: Arc<SessionShared>,
    settings: SessionSettings,
    notifier: BackendNotifier,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionServer {
    /// Creates the handler in the `Created` state and starts its backend
    /// notification worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        session_id: SessionId,
        settings: SessionSettings,
        backend: Arc<dyn SessionBackend>,
    ) -> Self {
        let shared = Arc::new(SessionShared {
            session_id,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                config: None,
                roster: Roster::new(),
            }),
            stats: NotificationStats::default(),
        });
        let notifier =
            BackendNotifier::spawn(backend, shared.clone(), settings.notification_timeout());
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));

        info!("🎮 Session {} created", session_id);
        Self {
            shared,
            settings,
            notifier,
            events,
        }
    }

    /// Handles the backend's session creation callback, moving the session
    /// from `Created` to `Active`.
    ///
    /// Returns `false` if the config names another session or the session has
    /// already been activated or destroyed.
    pub fn handle_create_session(&self, config: &SessionConfig) -> bool {
        if config.session_id != self.shared.session_id {
            warn!(
                "❌ Refusing to activate session {}: config is for {}",
                self.shared.session_id, config.session_id
            );
            return false;
        }

        let mut inner = self.shared.lock();
        if inner.state != SessionState::Created {
            warn!(
                "❌ Refusing to activate session {} in state {}",
                self.shared.session_id, inner.state
            );
            return false;
        }
        inner.state = SessionState::Active;
        inner.config = Some(config.clone());
        drop(inner);

        info!(
            "✅ Session {} ({}) is active, up to {} players",
            config.session_id, config.session_name, config.max_players
        );
        true
    }

    /// Records a reservation issued by the backend for this session.
    pub fn add_reservation(&self, reservation: Reservation) -> Result<(), SessionError> {
        if reservation.session_id != self.shared.session_id {
            return Err(SessionError::SessionMismatch {
                expected: self.shared.session_id,
                actual: reservation.session_id,
            });
        }

        let mut inner = self.shared.lock();
        if inner.state == SessionState::Destroyed {
            return Err(SessionError::SessionDestroyed(self.shared.session_id));
        }
        let player_session_id = reservation.player_session_id.clone();
        inner.roster.add_reservation(reservation)?;
        drop(inner);

        debug!("🎟️ Reservation recorded for player session {}", player_session_id);
        Ok(())
    }

    /// Withdraws an unclaimed reservation, typically because the backend's
    /// expiry policy retired it. Returns `false` if it was not pending.
    pub fn retire_reservation(&self, player_session_id: &PlayerSessionId) -> bool {
        let retired = self.shared.lock().roster.retire(player_session_id);
        if retired {
            debug!("🗑️ Reservation for player session {} retired", player_session_id);
        }
        retired
    }

    /// Waits until every backend notification dispatched so far has been
    /// delivered (or has failed) and its outcome applied.
    pub async fn flush_notifications(&self) {
        self.notifier.flush().await;
    }

    /// Subscribes to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    pub fn session_state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn session_config(&self) -> Option<SessionConfig> {
        self.shared.lock().config.clone()
    }

    pub fn player_count(&self) -> usize {
        self.shared.lock().roster.len()
    }

    pub fn pending_reservations(&self) -> usize {
        self.shared.lock().roster.pending_reservations()
    }

    /// Current roster entries ordered by connection id.
    pub fn roster(&self) -> Vec<PlayerConnectionConfig> {
        self.shared.lock().roster.snapshot()
    }

    /// Roster entry for a validated connection.
    pub fn player(&self, connection_id: ConnectionId) -> Option<PlayerConnectionConfig> {
        self.shared.lock().roster.get(connection_id).cloned()
    }

    pub fn reservation_state(&self, player_session_id: &PlayerSessionId) -> Option<ReservationState> {
        self.shared.lock().roster.reservation_state(player_session_id)
    }

    /// Whether the backend has acknowledged that the player session is free.
    pub fn is_released_by_backend(&self, player_session_id: &PlayerSessionId) -> bool {
        self.shared.lock().roster.is_released(player_session_id)
    }

    pub fn notification_stats(&self) -> NotificationStatsSnapshot {
        self.shared.stats.snapshot()
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl ServerSessionHandler for SessionServer {
    fn handle_destroy_session(&self) {
        let session_id = self.shared.session_id;
        let mut inner = self.shared.lock();
        if inner.state == SessionState::Destroyed {
            debug!("Session {} already destroyed", session_id);
            return;
        }
        inner.state = SessionState::Destroyed;
        let evicted = inner.roster.evict_all();

        // Events go out under the lock so they follow roster order.
        let timestamp = current_timestamp();
        for entry in &evicted {
            self.publish(SessionEvent::PlayerLeft {
                session_id,
                connection_id: entry.connection_id,
                player_session_id: entry.player_session_id.clone(),
                reason: LeaveReason::SessionDestroyed,
                timestamp,
            });
        }
        self.notifier.dispatch(&self.shared, Notification::SessionEnded);
        self.publish(SessionEvent::SessionDestroyed {
            session_id,
            evicted_players: evicted.len(),
            timestamp,
        });
        drop(inner);

        info!(
            "💥 Session {} destroyed, evicted {} players",
            session_id,
            evicted.len()
        );
    }

    fn validate_player_join_session(&self, config: &PlayerConnectionConfig) -> bool {
        let session_id = self.shared.session_id;
        let mut inner = self.shared.lock();
        if inner.state != SessionState::Active {
            warn!(
                "❌ Rejecting connection {} ({}): session {} is {}",
                config.connection_id, config.player_session_id, session_id, inner.state
            );
            return false;
        }

        let claim = inner.roster.try_claim(
            config,
            SystemTime::now(),
            self.settings.enforce_reservation_expiry,
        );
        if claim.is_ok() {
            self.publish(SessionEvent::PlayerJoined {
                session_id,
                connection_id: config.connection_id,
                player_session_id: config.player_session_id.clone(),
                timestamp: current_timestamp(),
            });
        }
        drop(inner);

        match claim {
            Ok(()) => {
                info!(
                    "🔗 Connection {} joined session {} as {}",
                    config.connection_id, session_id, config.player_session_id
                );
                true
            }
            Err(rejection) => {
                warn!(
                    "❌ Rejecting connection {}: {}",
                    config.connection_id, rejection
                );
                false
            }
        }
    }

    fn handle_player_leave_session(&self, config: &PlayerConnectionConfig) {
        let mut inner = self.shared.lock();
        let Some(entry) = inner.roster.release(config.connection_id) else {
            drop(inner);
            debug!(
                "Connection {} was not in the roster, nothing to release",
                config.connection_id
            );
            return;
        };

        self.notifier.dispatch(
            &self.shared,
            Notification::PlayerLeft {
                player_session_id: entry.player_session_id.clone(),
            },
        );
        self.publish(SessionEvent::PlayerLeft {
            session_id: self.shared.session_id,
            connection_id: entry.connection_id,
            player_session_id: entry.player_session_id.clone(),
            reason: LeaveReason::Disconnected,
            timestamp: current_timestamp(),
        });
        drop(inner);

        if entry.player_session_id != config.player_session_id {
            debug!(
                "Connection {} presented {} on leave but claimed {}",
                entry.connection_id, config.player_session_id, entry.player_session_id
            );
        }
        info!(
            "❌ Connection {} ({}) left session {}",
            entry.connection_id, entry.player_session_id, self.shared.session_id
        );
    }
}
