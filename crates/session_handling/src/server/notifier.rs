//! Backend notification dispatch.
//!
//! Handlers never call the backend directly. They push a [`Notification`] onto
//! an unbounded channel, which never blocks, and a worker task delivers the
//! notifications in order. Once a call resolves, its outcome is applied back
//! to the session state under the session lock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::session::SessionShared;
use crate::traits::SessionBackend;
use crate::types::PlayerSessionId;

/// Work item for the notification worker.
#[derive(Debug)]
pub(crate) enum Notification {
    PlayerLeft { player_session_id: PlayerSessionId },
    SessionEnded,
    /// Resolves once everything queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

/// Counters describing how backend notifications went.
#[derive(Debug, Default)]
pub struct NotificationStats {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl NotificationStats {
    pub fn snapshot(&self) -> NotificationStatsSnapshot {
        NotificationStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`NotificationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStatsSnapshot {
    pub dispatched: u64,
    pub delivered: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl NotificationStatsSnapshot {
    /// Notifications dispatched but not yet resolved either way.
    pub fn in_flight(&self) -> u64 {
        self.dispatched
            .saturating_sub(self.delivered + self.failed + self.timed_out)
    }
}

/// Sending half of the notification pipeline.
#[derive(Debug)]
pub(crate) struct BackendNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl BackendNotifier {
    /// Starts the worker task. Must be called from within a Tokio runtime.
    pub(crate) fn spawn(
        backend: Arc<dyn SessionBackend>,
        shared: Arc<SessionShared>,
        timeout: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver, backend, shared, timeout));
        Self { sender }
    }

    /// Queues a notification without waiting for it.
    pub(crate) fn dispatch(&self, shared: &SessionShared, notification: Notification) {
        if !matches!(notification, Notification::Flush(_)) {
            shared.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(e) = self.sender.send(notification) {
            // Only happens if the worker task is gone (runtime shut down).
            warn!("⚠️ Backend notifier stopped, dropping {:?}", e.0);
        }
    }

    /// Waits until every notification queued so far has been handled.
    pub(crate) async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.sender.send(Notification::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Notification>,
    backend: Arc<dyn SessionBackend>,
    shared: Arc<SessionShared>,
    timeout: Duration,
) {
    let session_id = shared.session_id;

    while let Some(notification) = receiver.recv().await {
        match notification {
            Notification::PlayerLeft { player_session_id } => {
                let call = backend.notify_player_left(session_id, &player_session_id);
                match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(())) => {
                        shared.lock().roster.mark_released(&player_session_id);
                        shared.stats.delivered.fetch_add(1, Ordering::Relaxed);
                        debug!("📨 Backend acknowledged player session {} is free", player_session_id);
                    }
                    Ok(Err(e)) => {
                        shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("⚠️ Failed to notify backend that {} left: {}", player_session_id, e);
                    }
                    Err(_) => {
                        shared.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                        warn!("⏰ Backend did not acknowledge that {} left within {:?}", player_session_id, timeout);
                    }
                }
            }
            Notification::SessionEnded => {
                match tokio::time::timeout(timeout, backend.notify_session_ended(session_id)).await {
                    Ok(Ok(())) => {
                        shared.stats.delivered.fetch_add(1, Ordering::Relaxed);
                        info!("📨 Backend acknowledged end of session {}", session_id);
                    }
                    Ok(Err(e)) => {
                        shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("⚠️ Failed to notify backend that session {} ended: {}", session_id, e);
                    }
                    Err(_) => {
                        shared.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                        warn!("⏰ Backend did not acknowledge end of session {} within {:?}", session_id, timeout);
                    }
                }
            }
            Notification::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Backend notifier for session {} stopped", session_id);
}
