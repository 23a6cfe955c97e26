//! Shared types for the AMACAR client core.
//!
//! These types form the data model used across all modules: reverse
//! bidding sessions and their dealer offers, live-auction bids, vehicle
//! search results, and appointments handed off after an accepted bid.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

// ---------------------------------------------------------------------------
// Vehicle
// ---------------------------------------------------------------------------

/// What a buyer is shopping for (or a seller is listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleCriteria {
    pub make: String,
    pub model: String,
    pub year: u16,
    /// Reference price that dealer savings are measured against.
    pub base_price: Decimal,
    pub zip_code: String,
}

impl fmt::Display for VehicleCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.year, self.make, self.model)
    }
}

/// A vehicle returned by the backend search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub price: Decimal,
    #[serde(default)]
    pub mileage: Option<u32>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub distance_miles: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub dealer_name: Option<String>,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} (${})", self.year, self.make, self.model, self.price)
    }
}

// ---------------------------------------------------------------------------
// Reverse bidding
// ---------------------------------------------------------------------------

/// Lifecycle of a reverse-bidding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Accepted,
    Expired,
    Cancelled,
}

impl SessionStatus {
    /// Accepted, expired and cancelled sessions never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Accepted | SessionStatus::Expired | SessionStatus::Cancelled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Accepted => "accepted",
            SessionStatus::Expired => "expired",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A dealer's standing price in a reverse-bidding session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerOffer {
    pub dealer_id: String,
    pub dealer_name: String,
    pub current_offer: Decimal,
    /// Price the savings figure is computed against.
    pub original_price: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DealerOffer {
    pub fn new(
        dealer_id: impl Into<String>,
        dealer_name: impl Into<String>,
        current_offer: Decimal,
        original_price: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            dealer_id: dealer_id.into(),
            dealer_name: dealer_name.into(),
            current_offer,
            original_price,
            submitted_at: at,
            updated_at: at,
        }
    }

    /// Ingestion policy: negative prices never enter a session.
    pub fn validate(&self) -> Result<(), AmacarError> {
        if self.current_offer < Decimal::ZERO {
            return Err(AmacarError::InvalidOffer {
                dealer_id: self.dealer_id.clone(),
                reason: format!("negative offer {}", self.current_offer),
            });
        }
        if self.dealer_id.trim().is_empty() {
            return Err(AmacarError::InvalidOffer {
                dealer_id: self.dealer_id.clone(),
                reason: "missing dealer id".to_string(),
            });
        }
        Ok(())
    }

    /// Amount saved relative to the original price (negative if above it).
    pub fn savings(&self) -> Decimal {
        self.original_price - self.current_offer
    }
}

impl fmt::Display for DealerOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ ${}", self.dealer_name, self.current_offer)
    }
}

/// Outcome of inserting or updating a dealer offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferChange {
    Inserted,
    Lowered,
    Raised,
    Unchanged,
}

/// The time-boxed container for dealer offers against one vehicle request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiddingSession {
    pub id: String,
    pub vehicle: VehicleCriteria,
    /// Insertion-ordered; dealer ids are unique.
    pub offers: Vec<DealerOffer>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    /// Fixed at creation. `None` when the backend sent a missing or
    /// malformed timestamp; displays as unknown.
    pub expires_at: Option<DateTime<Utc>>,
    /// Dealer id of the accepted offer, once resolved.
    #[serde(default)]
    pub accepted_offer: Option<String>,
}

impl BiddingSession {
    pub fn new(
        id: impl Into<String>,
        vehicle: VehicleCriteria,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            vehicle,
            offers: Vec::new(),
            status: SessionStatus::Idle,
            created_at,
            expires_at,
            accepted_offer: None,
        }
    }

    pub fn offer(&self, dealer_id: &str) -> Option<&DealerOffer> {
        self.offers.iter().find(|o| o.dealer_id == dealer_id)
    }

    pub fn accepted(&self) -> Option<&DealerOffer> {
        self.accepted_offer.as_deref().and_then(|id| self.offer(id))
    }

    /// Check every offer already held, as when a whole session arrives
    /// from the backend.
    pub fn validate_offers(&self) -> Result<(), AmacarError> {
        self.offers.iter().try_for_each(DealerOffer::validate)
    }

    /// Insert a new offer or supersede the dealer's existing one.
    ///
    /// An updated offer keeps its original insertion slot so equal prices
    /// stay ordered by first appearance.
    pub fn upsert_offer(&mut self, mut offer: DealerOffer) -> Result<OfferChange, AmacarError> {
        offer.validate()?;
        // Zero means the sender didn't price it against anything.
        if offer.original_price.is_zero() {
            offer.original_price = self.vehicle.base_price;
        }
        if self.status.is_terminal() {
            return Err(AmacarError::SessionClosed {
                session_id: self.id.clone(),
                status: self.status,
            });
        }

        let change = match self.offers.iter_mut().find(|o| o.dealer_id == offer.dealer_id) {
            Some(existing) => {
                let change = match offer.current_offer.cmp(&existing.current_offer) {
                    std::cmp::Ordering::Less => OfferChange::Lowered,
                    std::cmp::Ordering::Greater => OfferChange::Raised,
                    std::cmp::Ordering::Equal => OfferChange::Unchanged,
                };
                if change == OfferChange::Raised {
                    warn!(
                        session_id = %self.id,
                        dealer_id = %offer.dealer_id,
                        previous = %existing.current_offer,
                        new = %offer.current_offer,
                        "Dealer raised a reverse-bidding offer"
                    );
                }
                existing.dealer_name = offer.dealer_name;
                existing.current_offer = offer.current_offer;
                existing.original_price = offer.original_price;
                existing.updated_at = offer.updated_at;
                change
            }
            None => {
                self.offers.push(offer);
                OfferChange::Inserted
            }
        };

        if self.status == SessionStatus::Idle {
            self.status = SessionStatus::Active;
        }
        Ok(change)
    }

    /// Resolve the session with one dealer's offer.
    pub fn accept_offer(&mut self, dealer_id: &str) -> Result<&DealerOffer, AmacarError> {
        if self.accepted_offer.is_some() {
            return Err(AmacarError::AlreadyResolved(self.id.clone()));
        }
        if self.status.is_terminal() {
            return Err(AmacarError::SessionClosed {
                session_id: self.id.clone(),
                status: self.status,
            });
        }
        let idx = self
            .offers
            .iter()
            .position(|o| o.dealer_id == dealer_id)
            .ok_or_else(|| AmacarError::OfferNotFound {
                session_id: self.id.clone(),
                dealer_id: dealer_id.to_string(),
            })?;
        self.accepted_offer = Some(dealer_id.to_string());
        self.status = SessionStatus::Accepted;
        Ok(&self.offers[idx])
    }

    pub fn cancel(&mut self) -> Result<(), AmacarError> {
        if self.status.is_terminal() {
            return Err(AmacarError::SessionClosed {
                session_id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = SessionStatus::Cancelled;
        Ok(())
    }

    /// Move an open session to `Expired` once its window has passed.
    /// Returns true if the status changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) if at <= now && !self.status.is_terminal() => {
                self.status = SessionStatus::Expired;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for BiddingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} offers, {})",
            self.id,
            self.vehicle,
            self.offers.len(),
            self.status
        )
    }
}

// ---------------------------------------------------------------------------
// Live auction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl BidStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BidStatus::Pending)
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BidStatus::Pending => "pending",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
            BidStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A dealer bid on a seller's vehicle in an ascending auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub auction_id: String,
    pub bidder_id: String,
    #[serde(default)]
    pub bidder_name: String,
    #[serde(default)]
    pub bidder_contact: DealerContact,
    pub amount: Decimal,
    pub status: BidStatus,
    pub placed_at: DateTime<Utc>,
}

impl fmt::Display for Bid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bid {} by {} @ ${} ({})", self.id, self.bidder_id, self.amount, self.status)
    }
}

/// A seller's vehicle listed into a live auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAuction {
    pub id: String,
    pub vehicle: VehicleCriteria,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub highest_bid: Option<Decimal>,
    #[serde(default)]
    pub bid_count: u32,
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerContact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Everything the appointment scheduler needs after a bid is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub dealer_id: String,
    pub dealer_name: String,
    pub dealer_contact: DealerContact,
    pub vehicle_description: String,
    pub accepted_amount: Decimal,
    #[serde(default)]
    pub bid_id: Option<String>,
    #[serde(default)]
    pub preferred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AppointmentRequest {
    /// Key under which a create request is held while in flight. One
    /// request per accepted bid, or per dealer for offer hand-offs.
    pub fn reservation_key(&self) -> String {
        match &self.bid_id {
            Some(bid_id) => format!("bid:{bid_id}"),
            None => format!("dealer:{}", self.dealer_id),
        }
    }
}

/// Key under which a cancel or confirm of an existing appointment is held.
pub fn appointment_reservation_key(appointment_id: &str) -> String {
    format!("appointment:{appointment_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub dealer_id: String,
    pub dealer_name: String,
    pub vehicle_description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
}

// ---------------------------------------------------------------------------
// Search + pagination
// ---------------------------------------------------------------------------

/// Vehicle search filters. Unset fields are omitted from the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year_min: Option<u16>,
    pub year_max: Option<u16>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub zip_code: Option<String>,
    pub radius_miles: Option<u32>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl SearchFilters {
    /// Key/value pairs in a stable order for building a query string.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(v) = &self.make {
            pairs.push(("make", v.clone()));
        }
        if let Some(v) = &self.model {
            pairs.push(("model", v.clone()));
        }
        if let Some(v) = self.year_min {
            pairs.push(("year_min", v.to_string()));
        }
        if let Some(v) = self.year_max {
            pairs.push(("year_max", v.to_string()));
        }
        if let Some(v) = self.price_min {
            pairs.push(("price_min", v.to_string()));
        }
        if let Some(v) = self.price_max {
            pairs.push(("price_max", v.to_string()));
        }
        if let Some(v) = &self.zip_code {
            pairs.push(("zip", v.clone()));
        }
        if let Some(v) = self.radius_miles {
            pairs.push(("radius", v.to_string()));
        }
        pairs.push(("page", self.page.unwrap_or(1).to_string()));
        pairs.push(("per_page", self.per_page.unwrap_or(20).to_string()));
        pairs
    }
}

/// Pagination block returned alongside list payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the marketplace core.
#[derive(Debug, thiserror::Error)]
pub enum AmacarError {
    #[error("Invalid offer from dealer '{dealer_id}': {reason}")]
    InvalidOffer { dealer_id: String, reason: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {session_id} is {status}")]
    SessionClosed {
        session_id: String,
        status: SessionStatus,
    },

    #[error("No offer from dealer {dealer_id} in session {session_id}")]
    OfferNotFound { session_id: String, dealer_id: String },

    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    #[error("An appointment request is already in flight ({0})")]
    AppointmentInFlight(String),

    #[error("Backend error ({endpoint}): {message}")]
    Backend { endpoint: String, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
