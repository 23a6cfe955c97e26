//! View route handlers.
//!
//! Every handler reads one immutable state snapshot, so a response never
//! mixes data from before and after an action.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::expiry::{classify, ExpiryThresholds, TimeRemaining, TimeState};
use crate::leaderboard::LeaderboardEntry;
use crate::state::{Notification, StateHandle};
use crate::types::{Appointment, BidStatus, DealerContact, Pagination, SessionStatus, Vehicle};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ViewState {
    pub state: StateHandle,
    pub thresholds: ExpiryThresholds,
    pub started_at: DateTime<Utc>,
}

impl ViewState {
    pub fn new(state: StateHandle, thresholds: ExpiryThresholds) -> Self {
        Self {
            state,
            thresholds,
            started_at: Utc::now(),
        }
    }
}

pub type SharedViewState = Arc<ViewState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub version: u64,
    pub sessions: usize,
    pub auctions: usize,
    pub appointments: usize,
    pub fetch_errors: Vec<FetchErrorView>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchErrorView {
    pub resource: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeView {
    pub display: String,
    pub state: TimeState,
    pub remaining_secs: Option<i64>,
}

impl From<TimeRemaining> for TimeView {
    fn from(t: TimeRemaining) -> Self {
        Self {
            display: t.display(),
            state: t.state,
            remaining_secs: t.remaining.map(|d| d.num_seconds()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub vehicle: String,
    pub status: SessionStatus,
    pub offer_count: usize,
    pub best_offer: Option<Decimal>,
    pub time: TimeView,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardView {
    pub session_id: String,
    pub vehicle: String,
    pub base_price: Decimal,
    pub status: SessionStatus,
    pub time: TimeView,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuctionSummary {
    pub id: String,
    pub vehicle: String,
    pub highest_bid: Option<Decimal>,
    pub bid_count: u32,
    pub time: TimeView,
}

#[derive(Debug, Clone, Serialize)]
pub struct BidView {
    pub rank: u32,
    pub bid_id: String,
    pub bidder_name: String,
    pub bidder_contact: DealerContact,
    pub amount: Decimal,
    pub status: BidStatus,
    /// An accept/reject is waiting on the backend; controls stay disabled.
    pub in_flight: bool,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BidBoardView {
    pub auction_id: String,
    pub accepted_bid: Option<String>,
    pub bids: Vec<BidView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchView {
    pub loading: bool,
    pub results: Vec<Vehicle>,
    pub pagination: Option<Pagination>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/status
pub async fn get_status(State(view): State<SharedViewState>) -> Json<StatusResponse> {
    let snap = view.state.snapshot();
    Json(StatusResponse {
        version: snap.version,
        sessions: snap.sessions.len(),
        auctions: snap.auctions.len(),
        appointments: snap.appointments.len(),
        fetch_errors: snap
            .fetch_errors
            .iter()
            .map(|(resource, message)| FetchErrorView {
                resource: format!("{resource:?}"),
                message: message.clone(),
            })
            .collect(),
        uptime_secs: (Utc::now() - view.started_at).num_seconds(),
    })
}

/// GET /api/sessions
pub async fn get_sessions(State(view): State<SharedViewState>) -> Json<Vec<SessionSummary>> {
    let snap = view.state.snapshot();
    let now = snap.display_time();
    Json(
        snap.sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                vehicle: s.vehicle.to_string(),
                status: s.status,
                offer_count: s.offers.len(),
                best_offer: snap
                    .leaderboard(&s.id)
                    .and_then(|b| b.leader())
                    .map(|e| e.current_offer),
                time: classify(s.expires_at, now, &view.thresholds).into(),
            })
            .collect(),
    )
}

/// GET /api/sessions/:id/leaderboard
pub async fn get_leaderboard(
    State(view): State<SharedViewState>,
    Path(session_id): Path<String>,
) -> Result<Json<LeaderboardView>, StatusCode> {
    let snap = view.state.snapshot();
    let session = snap.session(&session_id).ok_or(StatusCode::NOT_FOUND)?;
    let entries = snap
        .leaderboard(&session_id)
        .map(|b| b.entries.clone())
        .unwrap_or_default();

    Ok(Json(LeaderboardView {
        session_id: session.id.clone(),
        vehicle: session.vehicle.to_string(),
        base_price: session.vehicle.base_price,
        status: session.status,
        time: classify(session.expires_at, snap.display_time(), &view.thresholds).into(),
        entries,
    }))
}

/// GET /api/auctions
pub async fn get_auctions(State(view): State<SharedViewState>) -> Json<Vec<AuctionSummary>> {
    let snap = view.state.snapshot();
    let now = snap.display_time();
    Json(
        snap.auctions
            .values()
            .map(|a| AuctionSummary {
                id: a.id.clone(),
                vehicle: a.vehicle.to_string(),
                highest_bid: a.highest_bid,
                bid_count: a.bid_count,
                time: classify(a.ends_at, now, &view.thresholds).into(),
            })
            .collect(),
    )
}

/// GET /api/auctions/:id/bids
pub async fn get_bids(
    State(view): State<SharedViewState>,
    Path(auction_id): Path<String>,
) -> Result<Json<BidBoardView>, StatusCode> {
    let snap = view.state.snapshot();
    let book = snap.bid_book(&auction_id).ok_or(StatusCode::NOT_FOUND)?;

    let bids = book
        .ranked()
        .into_iter()
        .map(|r| BidView {
            rank: r.rank,
            in_flight: book.is_in_flight(&r.entry.id),
            bid_id: r.entry.id,
            bidder_name: r.entry.bidder_name,
            bidder_contact: r.entry.bidder_contact,
            amount: r.entry.amount,
            status: r.entry.status,
            placed_at: r.entry.placed_at,
        })
        .collect();

    Ok(Json(BidBoardView {
        auction_id: book.auction_id.clone(),
        accepted_bid: book.accepted().map(|b| b.id.clone()),
        bids,
    }))
}

/// GET /api/search
pub async fn get_search(State(view): State<SharedViewState>) -> Json<SearchView> {
    let snap = view.state.snapshot();
    Json(SearchView {
        loading: snap.search.loading,
        results: snap.search.results.clone(),
        pagination: snap.search.pagination,
        error: snap
            .fetch_error(&crate::state::Resource::Search)
            .map(str::to_string),
    })
}

/// GET /api/appointments
pub async fn get_appointments(State(view): State<SharedViewState>) -> Json<Vec<Appointment>> {
    Json(view.state.snapshot().appointments.clone())
}

/// GET /api/notifications (newest first)
pub async fn get_notifications(State(view): State<SharedViewState>) -> Json<Vec<Notification>> {
    let snap = view.state.snapshot();
    Json(snap.notifications.iter().rev().cloned().collect())
}
