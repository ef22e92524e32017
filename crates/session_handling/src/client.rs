//! Client-side session handler.
//!
//! [`SessionClient`] drives join/leave from the connecting player's point of
//! view and leaves the socket work to a [`ClientTransport`]. The transport is
//! called without the state lock held, so a leave can arrive while a
//! handshake is in flight; the join then reports failure and tears the link
//! down. A new join is refused until that handshake has returned, so the
//! teardown can only ever hit the aborted link.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::traits::{ClientSessionHandler, ClientTransport};
use crate::types::{ClientSessionState, PlayerSessionId, SessionConnectionConfig, SessionEndpoint};

#[derive(Debug)]
struct ClientInner {
    state: ClientSessionState,
    player_session_id: Option<PlayerSessionId>,
    endpoint: Option<SessionEndpoint>,
    /// Set while `connect` runs, independently of `state`, which a leave resets.
    connecting: bool,
    /// Player session ids of every descriptor already used for an attempt.
    spent: HashSet<PlayerSessionId>,
}

impl ClientInner {
    fn reset(&mut self) {
        self.state = ClientSessionState::Idle;
        self.player_session_id = None;
        self.endpoint = None;
    }
}

/// The client session handler.
#[derive(Debug)]
pub struct SessionClient<T: ClientTransport> {
    transport: T,
    inner: Mutex<ClientInner>,
}

impl<T: ClientTransport> SessionClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            inner: Mutex::new(ClientInner {
                state: ClientSessionState::Idle,
                player_session_id: None,
                endpoint: None,
                connecting: false,
                spent: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClientInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ClientSessionState {
        self.lock().state
    }

    pub fn is_in_session(&self) -> bool {
        self.state() == ClientSessionState::InSession
    }

    /// Player session id of the join in progress or in effect.
    pub fn current_player_session_id(&self) -> Option<PlayerSessionId> {
        self.lock().player_session_id.clone()
    }

    pub fn current_endpoint(&self) -> Option<SessionEndpoint> {
        self.lock().endpoint.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: ClientTransport> ClientSessionHandler for SessionClient<T> {
    fn handle_player_join_session(&self, config: &SessionConnectionConfig) -> bool {
        let endpoint = match config.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("❌ Cannot join session: {}", e);
                return false;
            }
        };
        let player_session_id = config.player_session_id.clone();

        {
            let mut inner = self.lock();
            if inner.connecting {
                warn!(
                    "❌ Cannot join session as {}: a handshake is still in flight",
                    player_session_id
                );
                return false;
            }
            if inner.state != ClientSessionState::Idle {
                warn!(
                    "❌ Cannot join session as {}: client is already {:?}",
                    player_session_id, inner.state
                );
                return false;
            }
            if !inner.spent.insert(player_session_id.clone()) {
                warn!(
                    "❌ Descriptor for {} was already used, a new one is required",
                    player_session_id
                );
                return false;
            }
            inner.state = ClientSessionState::Joining;
            inner.player_session_id = Some(player_session_id.clone());
            inner.endpoint = Some(endpoint.clone());
            inner.connecting = true;
        }

        debug!("🔌 Connecting to {} as {}", endpoint, player_session_id);
        let result = self.transport.connect(&endpoint, &player_session_id);

        let mut inner = self.lock();
        // No other join can start while connecting, so Joining means this one.
        let still_joining = inner.state == ClientSessionState::Joining;

        match result {
            Ok(()) if still_joining => {
                inner.connecting = false;
                inner.state = ClientSessionState::InSession;
                info!("✅ Joined session at {} as {}", endpoint, player_session_id);
                true
            }
            Ok(()) => {
                drop(inner);
                // The join was aborted while the handshake ran. Joins stay
                // refused until the late link is down.
                self.transport.disconnect();
                self.lock().connecting = false;
                warn!("⚠️ Join as {} aborted during handshake", player_session_id);
                false
            }
            Err(e) => {
                inner.connecting = false;
                if still_joining {
                    inner.reset();
                }
                warn!("❌ Failed to join session at {}: {}", endpoint, e);
                false
            }
        }
    }

    fn handle_player_leave_session(&self) {
        let (previous, player_session_id) = {
            let mut inner = self.lock();
            let previous = inner.state;
            let player_session_id = inner.player_session_id.clone();
            inner.reset();
            (previous, player_session_id)
        };

        match previous {
            ClientSessionState::Idle => {
                debug!("Leave requested while not in a session");
            }
            ClientSessionState::Joining => {
                self.transport.disconnect();
                info!(
                    "🛑 Aborted join in progress for {}",
                    player_session_id.map(|id| id.to_string()).unwrap_or_default()
                );
            }
            ClientSessionState::InSession => {
                self.transport.disconnect();
                info!(
                    "👋 Left session as {}",
                    player_session_id.map(|id| id.to_string()).unwrap_or_default()
                );
            }
        }
    }
}
