use crate::*;
use async_trait::async_trait;
use std::sync::{Arc, Barrier};
use std::time::{Duration, SystemTime};

struct Fixture {
    backend: Arc<InMemoryBackend>,
    session: SessionConfig,
    server: Arc<SessionServer>,
}

impl Fixture {
    /// An active session at 203.0.113.5:7777 with the given reservations.
    fn new(reserved: &[&str]) -> Self {
        Self::with_settings(reserved, SessionSettings::default())
    }

    fn with_settings(reserved: &[&str], settings: SessionSettings) -> Self {
        let backend = Arc::new(InMemoryBackend::new(BackendSettings {
            ip_address: "203.0.113.5".to_string(),
            dns_name: String::new(),
            port: 7777,
            reservation_ttl_secs: None,
        }));
        let session = backend
            .create_session("test-session", 64)
            .expect("session should be allocated");
        let server = Arc::new(SessionServer::spawn(
            session.session_id,
            settings,
            backend.clone(),
        ));
        assert!(server.handle_create_session(&session));

        let fixture = Self {
            backend,
            session,
            server,
        };
        for id in reserved {
            fixture.reserve(id);
        }
        fixture
    }

    fn reserve(&self, id: &str) -> SessionConnectionConfig {
        let (descriptor, reservation) = self
            .backend
            .reserve_player(self.session.session_id, id.into())
            .expect("reservation should be issued");
        self.server
            .add_reservation(reservation)
            .expect("server should accept reservation");
        descriptor
    }
}

#[derive(Default)]
struct AcceptingTransport;

impl ClientTransport for AcceptingTransport {
    fn connect(&self, _: &SessionEndpoint, _: &PlayerSessionId) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&self) {}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_join_validate_leave() {
    let fixture = Fixture::new(&[]);
    let descriptor = fixture.reserve("abc");

    let client = SessionClient::new(AcceptingTransport);
    assert!(client.handle_player_join_session(&descriptor));
    assert_eq!(
        client.current_endpoint(),
        Some(SessionEndpoint::Ip("203.0.113.5:7777".parse().unwrap()))
    );

    let connection = PlayerConnectionConfig::new(42, "abc");
    assert!(fixture.server.validate_player_join_session(&connection));
    assert_eq!(fixture.server.roster(), vec![connection.clone()]);
    assert_eq!(fixture.server.player(42), Some(connection.clone()));

    fixture.server.handle_player_leave_session(&connection);
    client.handle_player_leave_session();
    assert!(fixture.server.roster().is_empty());
    assert_eq!(client.state(), ClientSessionState::Idle);
    assert_eq!(fixture.server.player(42), None);

    fixture.server.flush_notifications().await;
    assert_eq!(
        fixture
            .backend
            .player_session_status(fixture.session.session_id, &"abc".into()),
        Some(PlayerSessionStatus::Completed)
    );
    assert!(fixture.server.is_released_by_backend(&"abc".into()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_concurrent_duplicate_claim() {
    let fixture = Fixture::new(&["xyz"]);
    let barrier = Arc::new(Barrier::new(2));

    let attempts: Vec<_> = [10, 11]
        .into_iter()
        .map(|connection_id| {
            let server = fixture.server.clone();
            let barrier = barrier.clone();
            tokio::task::spawn_blocking(move || {
                barrier.wait();
                server.validate_player_join_session(&PlayerConnectionConfig::new(connection_id, "xyz"))
            })
        })
        .collect();

    let results: Vec<bool> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|result| result.expect("validation task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|accepted| **accepted).count(), 1);
    let roster = fixture.server.roster();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].player_session_id, "xyz".into());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_many_contenders_single_winner() {
    const CONTENDERS: u32 = 32;
    let fixture = Fixture::new(&["contested"]);
    let barrier = Arc::new(Barrier::new(CONTENDERS as usize));

    let attempts: Vec<_> = (0..CONTENDERS)
        .map(|connection_id| {
            let server = fixture.server.clone();
            let barrier = barrier.clone();
            tokio::task::spawn_blocking(move || {
                barrier.wait();
                server.validate_player_join_session(&PlayerConnectionConfig::new(
                    connection_id,
                    "contested",
                ))
            })
        })
        .collect();

    let winners = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|result| *result.as_ref().expect("validation task panicked"))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(fixture.server.player_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_joins_and_leaves_for_distinct_players() {
    let ids: Vec<String> = (0..16).map(|i| format!("player-{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let fixture = Fixture::new(&refs);

    let workers: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let server = fixture.server.clone();
            let config = PlayerConnectionConfig::new(index as u32, id.as_str());
            tokio::task::spawn_blocking(move || {
                assert!(server.validate_player_join_session(&config));
                if index % 2 == 0 {
                    server.handle_player_leave_session(&config);
                }
            })
        })
        .collect();

    for worker in futures::future::join_all(workers).await {
        worker.expect("worker panicked");
    }

    let roster = fixture.server.roster();
    assert_eq!(roster.len(), 8);
    assert!(roster.iter().all(|entry| entry.connection_id % 2 == 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_destroy_clears_roster() {
    let fixture = Fixture::new(&["p1", "p2", "p3"]);
    assert!(fixture
        .server
        .validate_player_join_session(&PlayerConnectionConfig::new(5, "p1")));
    assert!(fixture
        .server
        .validate_player_join_session(&PlayerConnectionConfig::new(6, "p2")));
    assert_eq!(fixture.server.player_count(), 2);

    fixture.server.handle_destroy_session();

    assert!(fixture.server.roster().is_empty());
    assert_eq!(fixture.server.session_state(), SessionState::Destroyed);
    // "p3" was still pending and valid, but the session is gone.
    assert!(!fixture
        .server
        .validate_player_join_session(&PlayerConnectionConfig::new(7, "p3")));
    assert_eq!(
        fixture.server.reservation_state(&"p3".into()),
        Some(ReservationState::Retired)
    );
    assert_eq!(
        fixture.server.reservation_state(&"p1".into()),
        Some(ReservationState::Left)
    );

    fixture.server.flush_notifications().await;
    assert_eq!(
        fixture.backend.session_status(fixture.session.session_id),
        Some(BackendSessionStatus::Terminated)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_destroy_is_idempotent() {
    let fixture = Fixture::new(&["p1"]);
    fixture.server.handle_destroy_session();
    fixture.server.handle_destroy_session();
    fixture.server.flush_notifications().await;

    let ended: Vec<_> = fixture
        .backend
        .notifications()
        .into_iter()
        .filter(|n| matches!(n, ReceivedNotification::SessionEnded { .. }))
        .collect();
    assert_eq!(ended.len(), 1);
    assert_eq!(fixture.server.notification_stats().dispatched, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_leave_is_idempotent() {
    let fixture = Fixture::new(&["abc"]);
    let connection = PlayerConnectionConfig::new(42, "abc");
    assert!(fixture.server.validate_player_join_session(&connection));

    fixture.server.handle_player_leave_session(&connection);
    let after_first = fixture.server.roster();
    fixture.server.handle_player_leave_session(&connection);
    assert_eq!(fixture.server.roster(), after_first);

    fixture.server.flush_notifications().await;
    assert_eq!(fixture.backend.notifications().len(), 1);
    assert_eq!(fixture.server.notification_stats().delivered, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_leave_for_unvalidated_connection_is_noop() {
    let fixture = Fixture::new(&["abc"]);

    // Handshake aborted before validation ever ran.
    fixture
        .server
        .handle_player_leave_session(&PlayerConnectionConfig::new(99, "abc"));

    assert_eq!(
        fixture.server.reservation_state(&"abc".into()),
        Some(ReservationState::Pending)
    );
    assert!(fixture
        .server
        .validate_player_join_session(&PlayerConnectionConfig::new(100, "abc")));
    fixture.server.flush_notifications().await;
    assert!(fixture.backend.notifications().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_claim_not_reusable_after_leave() {
    let fixture = Fixture::new(&["abc"]);
    let first = PlayerConnectionConfig::new(1, "abc");
    assert!(fixture.server.validate_player_join_session(&first));
    fixture.server.handle_player_leave_session(&first);

    assert!(!fixture
        .server
        .validate_player_join_session(&PlayerConnectionConfig::new(2, "abc")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejections() {
    let fixture = Fixture::new(&["abc"]);
    let server = &fixture.server;

    assert!(!server.validate_player_join_session(&PlayerConnectionConfig::new(1, "unknown")));

    server
        .add_reservation(
            Reservation::new(fixture.session.session_id, "stale")
                .with_expiry(SystemTime::now() - Duration::from_secs(1)),
        )
        .unwrap();
    assert!(!server.validate_player_join_session(&PlayerConnectionConfig::new(2, "stale")));

    assert!(server.retire_reservation(&"abc".into()));
    assert!(!server.validate_player_join_session(&PlayerConnectionConfig::new(3, "abc")));
    assert!(server.roster().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expiry_can_be_left_to_backend() {
    let settings = SessionSettings {
        enforce_reservation_expiry: false,
        ..Default::default()
    };
    let fixture = Fixture::with_settings(&[], settings);
    fixture
        .server
        .add_reservation(
            Reservation::new(fixture.session.session_id, "late")
                .with_expiry(SystemTime::now() - Duration::from_secs(1)),
        )
        .unwrap();

    assert!(fixture
        .server
        .validate_player_join_session(&PlayerConnectionConfig::new(1, "late")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_must_be_active_to_validate() {
    let backend = Arc::new(InMemoryBackend::new(BackendSettings::default()));
    let session = backend.create_session("pending", 4).unwrap();
    let server = SessionServer::spawn(session.session_id, SessionSettings::default(), backend.clone());
    let (_, reservation) = backend.reserve_player(session.session_id, "early".into()).unwrap();
    server.add_reservation(reservation).unwrap();

    assert_eq!(server.session_state(), SessionState::Created);
    assert!(!server.validate_player_join_session(&PlayerConnectionConfig::new(1, "early")));

    let other = backend.create_session("other", 4).unwrap();
    assert!(!server.handle_create_session(&other));
    assert!(server.handle_create_session(&session));
    assert!(!server.handle_create_session(&session));
    assert_eq!(server.session_config(), Some(session.clone()));

    assert!(server.validate_player_join_session(&PlayerConnectionConfig::new(1, "early")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_reservation_errors() {
    let fixture = Fixture::new(&["abc"]);

    assert!(matches!(
        fixture.server.add_reservation(Reservation::new(SessionId::new(), "foreign")),
        Err(SessionError::SessionMismatch { .. })
    ));
    assert!(matches!(
        fixture
            .server
            .add_reservation(Reservation::new(fixture.session.session_id, "abc")),
        Err(SessionError::DuplicateReservation(_))
    ));

    fixture.server.handle_destroy_session();
    assert!(matches!(
        fixture
            .server
            .add_reservation(Reservation::new(fixture.session.session_id, "late")),
        Err(SessionError::SessionDestroyed(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lifecycle_events_are_published() {
    let fixture = Fixture::new(&["p1", "p2"]);
    let mut events = fixture.server.subscribe();

    let p1 = PlayerConnectionConfig::new(1, "p1");
    assert!(fixture.server.validate_player_join_session(&p1));
    assert!(fixture
        .server
        .validate_player_join_session(&PlayerConnectionConfig::new(2, "p2")));
    fixture.server.handle_player_leave_session(&p1);
    fixture.server.handle_destroy_session();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert_eq!(received.len(), 5);
    assert!(matches!(&received[0], SessionEvent::PlayerJoined { connection_id: 1, .. }));
    assert!(matches!(
        &received[2],
        SessionEvent::PlayerLeft { connection_id: 1, reason: LeaveReason::Disconnected, .. }
    ));
    assert!(matches!(
        &received[3],
        SessionEvent::PlayerLeft { connection_id: 2, reason: LeaveReason::SessionDestroyed, .. }
    ));
    assert!(matches!(
        &received[4],
        SessionEvent::SessionDestroyed { evicted_players: 1, .. }
    ));
    assert!(received
        .iter()
        .all(|event| event.session_id() == fixture.session.session_id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_racing_handlers_publish_events_in_roster_order() {
    const PLAYERS: u32 = 16;
    let ids: Vec<String> = (0..PLAYERS).map(|i| format!("racer-{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let settings = SessionSettings {
        event_channel_capacity: 1024,
        ..Default::default()
    };
    let fixture = Fixture::with_settings(&refs, settings);
    let mut events = fixture.server.subscribe();

    // Every join races a leave for the same connection, and all of them race destroy.
    let barrier = Arc::new(Barrier::new(PLAYERS as usize * 2 + 1));
    let mut tasks = Vec::new();
    for (connection_id, id) in (0..PLAYERS).zip(ids.iter()) {
        let config = PlayerConnectionConfig::new(connection_id, id.as_str());
        for leaving in [false, true] {
            let server = fixture.server.clone();
            let barrier = barrier.clone();
            let config = config.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                barrier.wait();
                if leaving {
                    server.handle_player_leave_session(&config);
                } else {
                    server.validate_player_join_session(&config);
                }
            }));
        }
    }
    let destroyer = {
        let server = fixture.server.clone();
        let barrier = barrier.clone();
        tokio::task::spawn_blocking(move || {
            barrier.wait();
            server.handle_destroy_session();
        })
    };
    for result in futures::future::join_all(tasks).await {
        result.expect("handler task panicked");
    }
    destroyer.await.expect("destroy task panicked");

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    let mut joined = std::collections::HashSet::new();
    let mut destroyed = false;
    for event in &received {
        assert!(!destroyed, "event published after SessionDestroyed: {event:?}");
        match event {
            SessionEvent::PlayerJoined { connection_id, .. } => {
                assert!(joined.insert(*connection_id));
            }
            SessionEvent::PlayerLeft { connection_id, .. } => {
                assert!(
                    joined.remove(connection_id),
                    "PlayerLeft for {connection_id} before its PlayerJoined"
                );
            }
            SessionEvent::SessionDestroyed { .. } => destroyed = true,
        }
    }
    assert!(destroyed);
    assert!(joined.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_notifications_are_counted() {
    let fixture = Fixture::new(&["abc"]);
    fixture.backend.set_failing(true);

    let connection = PlayerConnectionConfig::new(42, "abc");
    assert!(fixture.server.validate_player_join_session(&connection));
    fixture.server.handle_player_leave_session(&connection);
    fixture.server.handle_destroy_session();
    fixture.server.flush_notifications().await;

    let stats = fixture.server.notification_stats();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.in_flight(), 0);
    assert!(!fixture.server.is_released_by_backend(&"abc".into()));
    // Local state is unaffected by the backend failing.
    assert!(fixture.server.roster().is_empty());
    assert_eq!(fixture.server.session_state(), SessionState::Destroyed);
}

struct StalledBackend;

#[async_trait]
impl SessionBackend for StalledBackend {
    async fn notify_player_left(
        &self,
        _: SessionId,
        _: &PlayerSessionId,
    ) -> Result<(), BackendError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    async fn notify_session_ended(&self, _: SessionId) -> Result<(), BackendError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_backend_times_out_without_blocking_handlers() {
    let session_id = SessionId::new();
    let settings = SessionSettings {
        notification_timeout_ms: 20,
        ..Default::default()
    };
    let server = SessionServer::spawn(session_id, settings, Arc::new(StalledBackend));

    // Returns immediately even though the backend never answers.
    server.handle_destroy_session();
    assert_eq!(server.session_state(), SessionState::Destroyed);

    server.flush_notifications().await;
    let stats = server.notification_stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.delivered, 0);
}
