//! Main application logic and lifecycle management.
//!
//! [`Application`] allocates a session on the in-process backend, hosts it
//! with a [`SessionServer`], reports on it while it runs and destroys it
//! cleanly on shutdown.

use crate::{
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use session_handling::{
    InMemoryBackend, ServerSessionHandler, SessionConfig, SessionEvent, SessionServer,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

/// Upper bound for delivering outstanding backend notifications at shutdown.
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The session host process.
pub struct Application {
    config: AppConfig,
    backend: Arc<InMemoryBackend>,
    server: Arc<SessionServer>,
    session: SessionConfig,
}

impl Application {
    /// Allocates and activates the hosted session.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        display_banner();

        let backend = Arc::new(InMemoryBackend::new(config.backend.clone()));
        let session = backend.create_session(&config.session.name, config.session.max_players)?;
        let server = Arc::new(SessionServer::spawn(
            session.session_id,
            config.session.handling.clone(),
            backend.clone(),
        ));
        if !server.handle_create_session(&session) {
            return Err(format!("Session {} could not be activated", session.session_id).into());
        }

        let app = Self {
            config,
            backend,
            server,
            session,
        };
        app.log_configuration_summary();
        Ok(app)
    }

    /// Backend that issues reservations for the hosted session.
    pub fn backend(&self) -> &Arc<InMemoryBackend> {
        &self.backend
    }

    /// Server handler for the transport layer to call into.
    pub fn server(&self) -> &Arc<SessionServer> {
        &self.server
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Runs until a shutdown signal arrives, then tears the session down.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let event_handle = spawn_event_logger(&self.server);
        let monitoring_handle = spawn_monitor(&self.server, self.config.session.monitor_interval_secs);

        info!("🚀 Hosting session {} - press Ctrl+C to shut down", self.session.session_id);
        wait_for_shutdown_signal().await?;

        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up second shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again, exiting immediately.");
            std::process::exit(1);
        });

        if let Some(handle) = monitoring_handle {
            handle.abort();
        }

        self.shutdown().await;
        event_handle.abort();
        Ok(())
    }

    /// Destroys the session and waits (bounded) for the backend to hear about it.
    pub async fn shutdown(&self) {
        info!("🛑 Destroying session {}", self.session.session_id);
        self.server.handle_destroy_session();

        if tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, self.server.flush_notifications())
            .await
            .is_err()
        {
            warn!("⏰ Backend notifications still pending after {:?}", NOTIFICATION_DRAIN_TIMEOUT);
        }

        let stats = self.server.notification_stats();
        info!("📊 Final Statistics:");
        info!("  - Notifications dispatched: {}", stats.dispatched);
        info!("  - Notifications delivered: {}", stats.delivered);
        info!("  - Notifications failed: {}", stats.failed + stats.timed_out);
        info!("✅ Session host shutdown complete");
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🎮 Session: {} ({})", self.session.session_name, self.session.session_id);
        info!("  👥 Max players: {}", self.session.max_players);
        info!(
            "  🌐 Endpoint: {} / {}:{}",
            self.session.ip_address, self.session.dns_name, self.session.port
        );
        match self.config.backend.reservation_ttl_secs {
            Some(ttl) => info!("  ⏱️ Reservation TTL: {}s", ttl),
            None => info!("  ⏱️ Reservation TTL: none"),
        }
    }
}

fn spawn_event_logger(server: &SessionServer) -> JoinHandle<()> {
    let mut events = server.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::PlayerJoined { connection_id, player_session_id, .. }) => {
                    info!("👋 Player {} joined on connection {}", player_session_id, connection_id);
                }
                Ok(SessionEvent::PlayerLeft { connection_id, player_session_id, reason, .. }) => {
                    info!(
                        "🚪 Player {} left connection {} ({:?})",
                        player_session_id, connection_id, reason
                    );
                }
                Ok(SessionEvent::SessionDestroyed { evicted_players, .. }) => {
                    info!("💥 Session destroyed with {} players evicted", evicted_players);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_monitor(server: &Arc<SessionServer>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }

    let server = server.clone();
    Some(tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = server.notification_stats();
            info!(
                "📊 Session {}: {} players, {} pending reservations, {} notifications in flight, {} failed",
                server.session_state(),
                server.player_count(),
                server.pending_reservations(),
                stats.in_flight(),
                stats.failed + stats.timed_out
            );
        }
    }))
}
