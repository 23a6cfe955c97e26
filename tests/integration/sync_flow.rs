//! Sync, leaderboard refresh and expiry against the mock backend.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use tokio_test::assert_err;
use std::sync::Arc;

use amacar::clock::ClockService;
use amacar::engine::Engine;
use amacar::expiry::{classify, ExpiryThresholds, TimeState};
use amacar::state::{Action, AppState, NotificationLevel, Resource, StateError, StateService};
use amacar::storage;
use amacar::types::{AmacarError, BiddingSession, DealerOffer, SearchFilters, SessionStatus};

use crate::mock_backend::MockBackend;

fn engine(backend: Arc<MockBackend>) -> Engine {
    let (state, _task) = StateService::spawn(AppState::default());
    Engine::new(backend, state)
}

#[tokio::test]
async fn test_failed_resync_keeps_last_good_data() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend.clone());
    engine.sync_all().await.unwrap();

    backend.set_error("connection reset");
    let report = engine.sync_all().await.unwrap();
    assert!(!report.is_clean());
    assert!(report.failures.contains(&Resource::Sessions));
    assert!(report.failures.contains(&Resource::Auctions));
    assert!(report.failures.contains(&Resource::Bids("A-1".into())));

    let snap = engine.state().snapshot();
    assert_eq!(snap.sessions.len(), 1);
    assert_eq!(snap.auctions.len(), 1);
    assert_eq!(snap.bid_book("A-1").unwrap().bids().len(), 3);
    assert!(snap.fetch_error(&Resource::Auctions).is_some());

    backend.clear_error();
    assert!(engine.sync_all().await.unwrap().is_clean());
    let snap = engine.state().snapshot();
    assert!(snap.fetch_error(&Resource::Auctions).is_none());
}

#[tokio::test]
async fn test_offer_refresh_reranks_leaderboard() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend.clone());
    engine.sync_all().await.unwrap();

    let snap = engine.state().snapshot();
    assert_eq!(snap.leaderboard("S-1").unwrap().leader().unwrap().dealer_id, "D-2");

    backend.set_session_offer(
        "S-1",
        DealerOffer::new("D-1", "Eastside Subaru", dec!(32500), dec!(34000), Utc::now()),
    );
    assert!(engine.refresh_offers("S-1").await.unwrap());

    let snap = engine.state().snapshot();
    let board = snap.leaderboard("S-1").unwrap();
    assert_eq!(board.leader().unwrap().dealer_id, "D-1");
    assert_eq!(board.leader().unwrap().savings, dec!(1500));
    assert_eq!(board.rank_of("D-2"), Some(2));
}

#[tokio::test]
async fn test_negative_offer_in_session_snapshot_never_ranks() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend.clone());
    engine.sync_all().await.unwrap();

    backend.push_raw_offer(
        "S-1",
        DealerOffer::new("D-9", "Bogus Motors", dec!(-500), dec!(34000), Utc::now()),
    );
    engine.sync_all().await.unwrap();

    let snap = engine.state().snapshot();
    let session = snap.session("S-1").unwrap();
    assert!(session.offer("D-9").is_none());
    let board = snap.leaderboard("S-1").unwrap();
    assert_eq!(board.leader().unwrap().dealer_id, "D-2");
    assert_eq!(board.entries.len(), 2);
    assert!(snap
        .notifications
        .iter()
        .any(|n| n.level == NotificationLevel::Error && n.message.contains("S-1")));
}

#[tokio::test]
async fn test_lapsed_session_refuses_accept_without_tick() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend);
    let now = Utc::now();
    let mut lapsed = BiddingSession::new(
        "S-9",
        crate::mock_backend::criteria("Mazda", "CX-5", dec!(30000)),
        now - Duration::hours(2),
        Some(now - Duration::seconds(1)),
    );
    lapsed
        .upsert_offer(DealerOffer::new("D-1", "Eastside Mazda", dec!(29000), dec!(30000), now))
        .unwrap();
    engine.state().dispatch(Action::SessionCreated(lapsed)).await.unwrap();

    let err = engine.accept_offer("S-9", "D-1").await.unwrap_err();
    assert!(matches!(
        err.downcast::<StateError>(),
        Ok(StateError::Domain(AmacarError::SessionClosed { status: SessionStatus::Expired, .. }))
    ));
}

#[tokio::test]
async fn test_accepted_offer_survives_resync() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend.clone());
    engine.sync_all().await.unwrap();

    let handoff = engine.accept_offer("S-1", "D-2").await.unwrap();
    assert_eq!(handoff.accepted_amount, dec!(32900));
    assert_eq!(handoff.vehicle_description, "2023 Subaru Forester");

    // Backend still reports the session as open; the local decision stands.
    engine.sync_all().await.unwrap();
    let snap = engine.state().snapshot();
    let session = snap.session("S-1").unwrap();
    assert_eq!(session.status, SessionStatus::Accepted);
    assert_eq!(session.accepted().unwrap().dealer_id, "D-2");
    assert!(snap.leaderboard("S-1").unwrap().entries.iter().any(|e| e.is_accepted));
}

#[tokio::test]
async fn test_clock_ticks_expire_sessions() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend);
    engine.sync_all().await.unwrap();

    let expires_at = engine.state().snapshot().session("S-1").unwrap().expires_at.unwrap();
    let thresholds = ExpiryThresholds::default();
    assert_eq!(classify(Some(expires_at), Utc::now(), &thresholds).state, TimeState::Active);

    engine
        .state()
        .dispatch(Action::ClockTick(expires_at - Duration::minutes(5)))
        .await
        .unwrap();
    assert_eq!(engine.state().snapshot().session("S-1").unwrap().status, SessionStatus::Active);

    engine
        .state()
        .dispatch(Action::ClockTick(expires_at + Duration::seconds(1)))
        .await
        .unwrap();
    let snap = engine.state().snapshot();
    assert_eq!(snap.session("S-1").unwrap().status, SessionStatus::Expired);
    assert_err!(engine.accept_offer("S-1", "D-1").await);
}

#[tokio::test]
async fn test_clock_drives_state_ticks() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend);
    let clock = ClockService::spawn(std::time::Duration::from_millis(5));
    let mut ticks = clock.subscribe();
    assert_eq!(clock.subscriber_count(), 1);

    for _ in 0..3 {
        let now = ticks.tick().await.unwrap();
        engine.state().dispatch(Action::ClockTick(now)).await.unwrap();
    }

    drop(ticks);
    assert_eq!(clock.subscriber_count(), 0);
    clock.shutdown().await;
}

#[tokio::test]
async fn test_search_filters_results() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend.clone());

    let filters = SearchFilters {
        make: Some("toyota".into()),
        ..Default::default()
    };
    assert!(engine.search(filters).await.unwrap());
    let snap = engine.state().snapshot();
    assert_eq!(snap.search.results.len(), 1);
    assert_eq!(snap.search.pagination.unwrap().total_items, 1);

    backend.set_error("timeout");
    assert!(!engine.search(SearchFilters::default()).await.unwrap());
    let snap = engine.state().snapshot();
    assert_eq!(snap.search.results.len(), 1);
    assert!(!snap.search.loading);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let backend = Arc::new(MockBackend::new());
    let engine = engine(backend);
    engine.sync_all().await.unwrap();
    engine.accept_offer("S-1", "D-1").await.unwrap();

    let mut path = std::env::temp_dir();
    path.push(format!("amacar_it_state_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    storage::save_state(&engine.state().snapshot(), Some(&path)).unwrap();
    let restored = storage::load_state(Some(&path)).unwrap().unwrap();
    storage::delete_state(Some(&path)).unwrap();

    let session = restored.session("S-1").unwrap();
    assert_eq!(session.status, SessionStatus::Accepted);
    assert_eq!(restored.leaderboard("S-1").unwrap().entries.len(), 2);
    assert!(restored.bid_books.is_empty());
}
