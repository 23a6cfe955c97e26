//! Live-auction bid decisions end to end.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use amacar::bidding::BidActionError;
use amacar::engine::Engine;
use amacar::state::{Action, AppState, NotificationLevel, StateError, StateService};
use amacar::types::{AmacarError, AppointmentStatus, BidStatus};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use crate::mock_backend::{bid, MockBackend};

async fn synced(backend: Arc<MockBackend>) -> Engine {
    let (state, _task) = StateService::spawn(AppState::default());
    let engine = Engine::new(backend, state);
    let report = engine.sync_all().await.unwrap();
    assert!(report.is_clean());
    engine
}

fn bid_error(err: anyhow::Error) -> BidActionError {
    match err.downcast::<StateError>() {
        Ok(StateError::BidAction(e)) => e,
        other => panic!("expected a bid action error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_accept_then_schedule_appointment() {
    let backend = Arc::new(MockBackend::new());
    let engine = synced(backend.clone()).await;

    let resolution = assert_ok!(engine.accept_bid("A-1", "B-2").await);
    assert_eq!(resolution.bid.status, BidStatus::Accepted);
    assert_eq!(backend.server_bid_status("A-1", "B-2"), Some(BidStatus::Accepted));

    let handoff = resolution.appointment.unwrap();
    assert_eq!(handoff.dealer_id, "dealer-B-2");
    assert_eq!(handoff.accepted_amount, dec!(19250));
    assert_eq!(handoff.vehicle_description, "2023 Toyota Corolla");
    assert_eq!(handoff.dealer_contact.phone.as_deref(), Some("2065550100"));

    let appointment = engine.schedule_appointment(&handoff).await.unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Pending);
    let confirmed = engine.confirm_appointment(&appointment.id).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

    let snap = engine.state().snapshot();
    assert_eq!(snap.appointments.len(), 1);
    assert_eq!(snap.appointments[0].status, AppointmentStatus::Confirmed);
    assert_eq!(snap.notifications.back().unwrap().level, NotificationLevel::Success);
}

#[tokio::test]
async fn test_double_click_sends_one_request() {
    let backend = Arc::new(MockBackend::new());
    let engine = Arc::new(synced(backend.clone()).await);
    let gate = backend.gate_accepts();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.accept_bid("A-1", "B-2").await })
    };

    // Wait until the first accept is parked inside the backend.
    while backend.accept_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    assert!(engine.state().snapshot().bid_book("A-1").unwrap().is_in_flight("B-2"));

    let same = engine.accept_bid("A-1", "B-2").await.unwrap_err();
    assert_eq!(bid_error(same), BidActionError::ActionInFlight("B-2".into()));

    let other = engine.accept_bid("A-1", "B-3").await.unwrap_err();
    assert!(matches!(bid_error(other), BidActionError::AcceptInFlight { .. }));

    // Rejecting a different bid is still allowed while an accept is pending.
    engine.reject_bid("A-1", "B-1").await.unwrap();

    gate.add_permits(1);
    first.await.unwrap().unwrap();

    assert_eq!(backend.accept_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.reject_calls.load(Ordering::SeqCst), 1);
    let snap = engine.state().snapshot();
    let book = snap.bid_book("A-1").unwrap();
    assert_eq!(book.accepted().unwrap().id, "B-2");
    assert_eq!(book.bid("B-1").unwrap().status, BidStatus::Rejected);
    assert_eq!(book.bid("B-3").unwrap().status, BidStatus::Pending);
}

#[tokio::test]
async fn test_resolved_bid_cannot_be_flipped() {
    let backend = Arc::new(MockBackend::new());
    let engine = synced(backend.clone()).await;

    engine.reject_bid("A-1", "B-1").await.unwrap();
    let err = engine.accept_bid("A-1", "B-1").await.unwrap_err();
    assert!(matches!(
        bid_error(err),
        BidActionError::AlreadyResolved { status: BidStatus::Rejected, .. }
    ));
    assert_eq!(backend.accept_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backend_failure_leaves_bid_pending() {
    let backend = Arc::new(MockBackend::new());
    let engine = synced(backend.clone()).await;

    backend.set_error("503 Service Unavailable");
    assert_err!(engine.accept_bid("A-1", "B-3").await);

    let snap = engine.state().snapshot();
    let book = snap.bid_book("A-1").unwrap();
    assert_eq!(book.bid("B-3").unwrap().status, BidStatus::Pending);
    assert!(!book.is_in_flight("B-3"));
    assert_eq!(snap.notifications.back().unwrap().level, NotificationLevel::Error);

    backend.clear_error();
    engine.accept_bid("A-1", "B-3").await.unwrap();
    assert_eq!(backend.server_bid_status("A-1", "B-3"), Some(BidStatus::Accepted));
}

#[tokio::test]
async fn test_resync_does_not_revert_local_decision() {
    let backend = Arc::new(MockBackend::new());
    let engine = synced(backend.clone()).await;

    engine.accept_bid("A-1", "B-2").await.unwrap();
    backend.push_bid(bid("A-1", "B-4", dec!(19900)));
    engine.sync_all().await.unwrap();

    let snap = engine.state().snapshot();
    let book = snap.bid_book("A-1").unwrap();
    assert_eq!(book.bids().len(), 4);
    assert_eq!(book.accepted().unwrap().id, "B-2");

    // The late bid ranks first by amount but can't be accepted.
    assert_eq!(book.ranked()[0].entry.id, "B-4");
    let err = engine.accept_bid("A-1", "B-4").await.unwrap_err();
    assert!(matches!(bid_error(err), BidActionError::AlreadyAccepted { .. }));
}

#[tokio::test]
async fn test_resync_winner_during_accept_releases_bid() {
    let backend = Arc::new(MockBackend::new());
    let engine = Arc::new(synced(backend.clone()).await);
    let gate = backend.gate_accepts();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.accept_bid("A-1", "B-2").await })
    };
    while backend.accept_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // A resync lands while the accept is parked, naming another winner.
    let mut winner = bid("A-1", "B-3", dec!(18900));
    winner.status = BidStatus::Accepted;
    engine
        .state()
        .dispatch(Action::BidsLoaded {
            auction_id: "A-1".into(),
            bids: vec![bid("A-1", "B-1", dec!(18000)), bid("A-1", "B-2", dec!(19250)), winner],
        })
        .await
        .unwrap();

    gate.add_permits(1);
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(
        bid_error(err),
        BidActionError::AlreadyAccepted { ref winner, .. } if winner == "B-3"
    ));

    let snap = engine.state().snapshot();
    let book = snap.bid_book("A-1").unwrap();
    assert!(!book.is_in_flight("B-2"));
    assert_eq!(book.bid("B-2").unwrap().status, BidStatus::Pending);
    assert_eq!(book.accepted().unwrap().id, "B-3");
    assert_eq!(snap.notifications.back().unwrap().level, NotificationLevel::Error);

    // The bid is no longer held locally; the next action reaches the backend.
    assert_err!(engine.reject_bid("A-1", "B-2").await);
    assert_eq!(backend.reject_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_appointment_submit_sends_one_request() {
    let backend = Arc::new(MockBackend::new());
    let engine = Arc::new(synced(backend.clone()).await);
    let handoff = engine.accept_bid("A-1", "B-2").await.unwrap().appointment.unwrap();
    let gate = backend.gate_appointments();

    let first = {
        let engine = engine.clone();
        let handoff = handoff.clone();
        tokio::spawn(async move { engine.schedule_appointment(&handoff).await })
    };
    while backend.create_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let err = engine.schedule_appointment(&handoff).await.unwrap_err();
    assert!(matches!(
        err.downcast::<StateError>(),
        Ok(StateError::Domain(AmacarError::AppointmentInFlight(_)))
    ));
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);

    gate.add_permits(1);
    let appointment = first.await.unwrap().unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Pending);

    let snap = engine.state().snapshot();
    assert_eq!(snap.appointments.len(), 1);
    assert!(snap.appointments_in_flight.is_empty());
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
}
