//! Application state and its reducer.
//!
//! `AppState` is the single source of truth for everything the client
//! renders. It is mutated only by `reduce`, one `Action` at a time, and
//! published to readers as immutable snapshots by the `service` actor.
//! Derived data (leaderboards) is recomputed in full inside the same
//! reduction that changed its inputs, so readers never see a leaderboard
//! built from a half-applied update.

pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bidding::{ActionTicket, BidAction, BidActionError, BidBook, Settled};
use crate::leaderboard::SessionLeaderboard;
use crate::types::{
    AmacarError, Appointment, Bid, BiddingSession, DealerOffer, LiveAuction, Page, Pagination,
    SearchFilters, Vehicle,
};

pub use service::{StateHandle, StateService};

/// Most recent notifications kept for display.
const MAX_NOTIFICATIONS: usize = 20;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A transient toast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Remote resources whose last fetch can fail independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Resource {
    Sessions,
    Auctions,
    Bids(String),
    Search,
    Appointments,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub filters: SearchFilters,
    pub results: Vec<Vehicle>,
    pub pagination: Option<Pagination>,
    pub loading: bool,
}

/// Everything the client knows. Only the durable slice is serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppState {
    pub sessions: BTreeMap<String, BiddingSession>,
    pub auctions: BTreeMap<String, LiveAuction>,
    pub appointments: Vec<Appointment>,
    #[serde(skip)]
    pub leaderboards: BTreeMap<String, SessionLeaderboard>,
    #[serde(skip)]
    pub bid_books: BTreeMap<String, BidBook>,
    #[serde(skip)]
    pub search: SearchState,
    #[serde(skip)]
    pub notifications: VecDeque<Notification>,
    #[serde(skip)]
    pub fetch_errors: BTreeMap<Resource, String>,
    /// Appointment calls awaiting the backend, by reservation key.
    #[serde(skip)]
    pub appointments_in_flight: BTreeSet<String>,
    /// Latest time seen from the clock service.
    #[serde(skip)]
    pub last_tick: Option<DateTime<Utc>>,
    /// Bumped once per applied action.
    #[serde(skip)]
    pub version: u64,
}

impl AppState {
    /// Rebuild derived data after loading the durable slice from disk.
    pub fn restored(mut self) -> Self {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.refresh_leaderboard(&id);
        }
        self
    }

    pub fn session(&self, id: &str) -> Option<&BiddingSession> {
        self.sessions.get(id)
    }

    pub fn leaderboard(&self, session_id: &str) -> Option<&SessionLeaderboard> {
        self.leaderboards.get(session_id)
    }

    pub fn bid_book(&self, auction_id: &str) -> Option<&BidBook> {
        self.bid_books.get(auction_id)
    }

    /// Time for lifecycle checks: the later of the last tick and the wall
    /// clock, so a stalled tick loop never keeps a session open.
    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        self.last_tick.map_or(wall, |tick| tick.max(wall))
    }

    /// Time the read-only views classify against.
    pub fn display_time(&self) -> DateTime<Utc> {
        self.last_tick.unwrap_or_else(Utc::now)
    }

    pub fn fetch_error(&self, resource: &Resource) -> Option<&str> {
        self.fetch_errors.get(resource).map(String::as_str)
    }

    fn refresh_leaderboard(&mut self, session_id: &str) {
        match self.sessions.get(session_id) {
            Some(session) => {
                self.leaderboards
                    .insert(session_id.to_string(), SessionLeaderboard::for_session(session));
            }
            None => {
                self.leaderboards.remove(session_id);
            }
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
        while self.notifications.len() > MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
    }

    fn session_mut(&mut self, id: &str) -> Result<&mut BiddingSession, AmacarError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| AmacarError::SessionNotFound(id.to_string()))
    }

    /// Like `session_mut`, but first closes the session if its window has
    /// passed and no tick has caught it yet.
    fn open_session_mut(&mut self, id: &str) -> Result<&mut BiddingSession, AmacarError> {
        let now = self.now();
        let session = self.session_mut(id)?;
        if session.expire_if_due(now) {
            debug!(session_id = %id, "Session expired ahead of tick");
        }
        Ok(session)
    }

    fn book_mut(&mut self, auction_id: &str) -> Result<&mut BidBook, BidActionError> {
        self.bid_books
            .get_mut(auction_id)
            .ok_or_else(|| BidActionError::AuctionNotLoaded(auction_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Every state mutation, as a value.
#[derive(Debug, Clone)]
pub enum Action {
    SessionCreated(BiddingSession),
    SessionsLoaded(Vec<BiddingSession>),
    /// One offer changed.
    OfferReceived { session_id: String, offer: DealerOffer },
    /// Several offers changed together; applied all-or-nothing.
    OffersReceived { session_id: String, offers: Vec<DealerOffer> },
    OfferAccepted { session_id: String, dealer_id: String },
    SessionCancelled(String),
    ClockTick(DateTime<Utc>),

    AuctionsLoaded(Vec<LiveAuction>),
    BidsLoaded { auction_id: String, bids: Vec<Bid> },
    BidActionRequested { auction_id: String, bid_id: String, action: BidAction },
    BidActionCompleted { ticket: ActionTicket, error: Option<String> },

    /// Reserve an appointment call under its key before it is sent.
    AppointmentRequested(String),
    /// Release the reservation and record what the backend returned.
    AppointmentSettled { key: String, result: Result<Appointment, String> },

    SearchStarted(SearchFilters),
    SearchLoaded(Page<Vehicle>),

    /// A fetch failed; previously loaded data stays in place.
    FetchFailed { resource: Resource, message: String },
    Notify(Notification),
    DismissNotification(Uuid),
}

/// What a successfully reduced action produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    /// Nothing changed; no snapshot is published.
    Unchanged,
    Ticket(ActionTicket),
    BidResolved(Bid),
    /// The reservation was released but the result no longer fits the book.
    BidConflict(BidActionError),
    OfferAccepted(DealerOffer),
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Domain(#[from] AmacarError),

    #[error(transparent)]
    BidAction(#[from] BidActionError),

    #[error("State service stopped")]
    Closed,
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Apply one action. On `Err` the caller must discard `state`; the
/// service always reduces into a scratch copy.
pub fn reduce(state: &mut AppState, action: Action) -> Result<Outcome, StateError> {
    match action {
        Action::SessionCreated(session) => {
            session.validate_offers()?;
            info!(session_id = %session.id, vehicle = %session.vehicle, "Session created");
            let id = session.id.clone();
            state.sessions.insert(id.clone(), session);
            state.refresh_leaderboard(&id);
            Ok(Outcome::Applied)
        }

        Action::SessionsLoaded(incoming) => {
            for mut session in incoming {
                if let Err(e) = session.validate_offers() {
                    warn!(session_id = %session.id, error = %e, "Skipping session with invalid offer");
                    state.notify(Notification::error(format!("Ignored update for session {}: {e}", session.id)));
                    continue;
                }
                if let Some(existing) = state.sessions.get(&session.id) {
                    merge_session(existing, &mut session);
                }
                let id = session.id.clone();
                state.sessions.insert(id.clone(), session);
                state.refresh_leaderboard(&id);
            }
            state.fetch_errors.remove(&Resource::Sessions);
            Ok(Outcome::Applied)
        }

        Action::OfferReceived { session_id, offer } => {
            let change = state.open_session_mut(&session_id)?.upsert_offer(offer)?;
            debug!(session_id = %session_id, ?change, "Offer applied");
            state.refresh_leaderboard(&session_id);
            Ok(Outcome::Applied)
        }

        Action::OffersReceived { session_id, offers } => {
            // The scratch-copy contract makes this all-or-nothing: the first
            // invalid offer aborts the whole reduction.
            let session = state.open_session_mut(&session_id)?;
            for offer in offers {
                session.upsert_offer(offer)?;
            }
            state.refresh_leaderboard(&session_id);
            Ok(Outcome::Applied)
        }

        Action::OfferAccepted { session_id, dealer_id } => {
            let accepted = state.open_session_mut(&session_id)?.accept_offer(&dealer_id)?.clone();
            info!(session_id = %session_id, dealer_id = %dealer_id, amount = %accepted.current_offer, "Offer accepted");
            state.refresh_leaderboard(&session_id);
            Ok(Outcome::OfferAccepted(accepted))
        }

        Action::SessionCancelled(session_id) => {
            state.session_mut(&session_id)?.cancel()?;
            state.refresh_leaderboard(&session_id);
            Ok(Outcome::Applied)
        }

        Action::ClockTick(tick) => {
            // Every tick is published so views classify against it.
            state.last_tick = Some(state.last_tick.map_or(tick, |last| last.max(tick)));
            let now = state.now();
            let mut expired = Vec::new();
            for session in state.sessions.values_mut() {
                if session.expire_if_due(now) {
                    expired.push(session.id.clone());
                }
            }
            for id in &expired {
                info!(session_id = %id, "Session expired");
                state.refresh_leaderboard(id);
            }
            Ok(Outcome::Applied)
        }

        Action::AuctionsLoaded(auctions) => {
            state.auctions = auctions.into_iter().map(|a| (a.id.clone(), a)).collect();
            state.fetch_errors.remove(&Resource::Auctions);
            Ok(Outcome::Applied)
        }

        Action::BidsLoaded { auction_id, bids } => {
            state
                .bid_books
                .entry(auction_id.clone())
                .or_insert_with(|| BidBook::new(auction_id.clone(), Vec::new()))
                .replace_bids(bids);
            state.fetch_errors.remove(&Resource::Bids(auction_id));
            Ok(Outcome::Applied)
        }

        Action::BidActionRequested { auction_id, bid_id, action } => {
            let ticket = state.book_mut(&auction_id)?.begin(&bid_id, action)?;
            Ok(Outcome::Ticket(ticket))
        }

        Action::BidActionCompleted { ticket, error } => {
            let succeeded = error.is_none();
            let bid = match state.book_mut(&ticket.auction_id)?.complete(&ticket, succeeded)? {
                Settled::Resolved(bid) => bid,
                Settled::Conflict(conflict) => {
                    let reason = error.unwrap_or_else(|| conflict.to_string());
                    state.notify(Notification::error(format!("Could not {} bid: {reason}", ticket.action)));
                    return Ok(Outcome::BidConflict(conflict));
                }
            };
            match error {
                None => {
                    let verb = match ticket.action {
                        BidAction::Accept => "accepted",
                        BidAction::Reject => "rejected",
                    };
                    state.notify(Notification::success(format!("Bid of ${} {verb}", bid.amount)));
                    if ticket.action == BidAction::Accept {
                        if let Some(auction) = state.auctions.get_mut(&ticket.auction_id) {
                            auction.highest_bid = Some(bid.amount);
                        }
                    }
                }
                Some(message) => {
                    warn!(bid_id = %ticket.bid_id, action = %ticket.action, error = %message, "Bid action failed");
                    state.notify(Notification::error(format!("Could not {} bid: {message}", ticket.action)));
                }
            }
            Ok(Outcome::BidResolved(bid))
        }

        Action::AppointmentRequested(key) => {
            if !state.appointments_in_flight.insert(key.clone()) {
                return Err(AmacarError::AppointmentInFlight(key).into());
            }
            Ok(Outcome::Applied)
        }

        Action::AppointmentSettled { key, result } => {
            state.appointments_in_flight.remove(&key);
            match result {
                Ok(appointment) => {
                    match state.appointments.iter_mut().find(|a| a.id == appointment.id) {
                        Some(existing) => *existing = appointment,
                        None => state.appointments.push(appointment),
                    }
                    state.fetch_errors.remove(&Resource::Appointments);
                }
                Err(message) => {
                    warn!(key = %key, error = %message, "Appointment request failed");
                    state.notify(Notification::error(message.clone()));
                    state.fetch_errors.insert(Resource::Appointments, message);
                }
            }
            Ok(Outcome::Applied)
        }

        Action::SearchStarted(filters) => {
            state.search.filters = filters;
            state.search.loading = true;
            Ok(Outcome::Applied)
        }

        Action::SearchLoaded(page) => {
            state.search.results = page.items;
            state.search.pagination = page.pagination;
            state.search.loading = false;
            state.fetch_errors.remove(&Resource::Search);
            Ok(Outcome::Applied)
        }

        Action::FetchFailed { resource, message } => {
            warn!(?resource, error = %message, "Fetch failed, keeping previous data");
            if resource == Resource::Search {
                state.search.loading = false;
            }
            state.notify(Notification::error(message.clone()));
            state.fetch_errors.insert(resource, message);
            Ok(Outcome::Applied)
        }

        Action::Notify(notification) => {
            state.notify(notification);
            Ok(Outcome::Applied)
        }

        Action::DismissNotification(id) => {
            let before = state.notifications.len();
            state.notifications.retain(|n| n.id != id);
            if state.notifications.len() == before {
                Ok(Outcome::Unchanged)
            } else {
                Ok(Outcome::Applied)
            }
        }
    }
}

/// Reconcile a fresh backend snapshot with what we already hold.
///
/// The expiry is fixed at creation and never silently extended, and a
/// locally terminal session does not reopen.
fn merge_session(existing: &BiddingSession, incoming: &mut BiddingSession) {
    if let Some(fixed) = existing.expires_at {
        if incoming.expires_at != Some(fixed) {
            warn!(
                session_id = %incoming.id,
                fixed = %fixed,
                received = ?incoming.expires_at,
                "Ignoring changed session expiry"
            );
            incoming.expires_at = Some(fixed);
        }
    }
    if existing.status.is_terminal() && !incoming.status.is_terminal() {
        incoming.status = existing.status;
    }
    if incoming.accepted_offer.is_none() {
        incoming.accepted_offer = existing.accepted_offer.clone();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
