//! Marketplace backend integration.
//!
//! Defines the `MarketplaceBackend` trait (vehicle search, live auctions,
//! bid accept/reject, appointments, dealer sessions) and the JSON
//! envelope every endpoint answers with. `rest::RestBackend` is the
//! reqwest implementation.

pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::expiry::parse_expires_at;
use crate::types::{
    AmacarError, Appointment, AppointmentRequest, Bid, BiddingSession, DealerOffer, LiveAuction,
    Page, Pagination, SearchFilters, SessionStatus, Vehicle, VehicleCriteria,
};

/// Abstraction over the REST backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketplaceBackend: Send + Sync {
    async fn search_vehicles(&self, filters: &SearchFilters) -> Result<Page<Vehicle>>;

    async fn fetch_live_auctions(&self) -> Result<Vec<LiveAuction>>;

    async fn fetch_auction_bids(&self, auction_id: &str) -> Result<Vec<Bid>>;

    async fn accept_bid(&self, auction_id: &str, bid_id: &str) -> Result<()>;

    async fn reject_bid(&self, auction_id: &str, bid_id: &str) -> Result<()>;

    async fn create_appointment(&self, request: &AppointmentRequest) -> Result<Appointment>;

    async fn cancel_appointment(&self, appointment_id: &str) -> Result<Appointment>;

    async fn confirm_appointment(&self, appointment_id: &str) -> Result<Appointment>;

    /// Reverse-bidding sessions visible to the current user.
    async fn list_dealer_sessions(&self) -> Result<Vec<BiddingSession>>;

    async fn fetch_session_offers(&self, session_id: &str) -> Result<Vec<DealerOffer>>;
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// `{ success, data, message?, pagination? }`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl<T> ApiEnvelope<T> {
    /// Fail on `success: false`, otherwise hand back the envelope.
    pub fn ensure_success(self, endpoint: &str) -> Result<Self, AmacarError> {
        if self.success {
            Ok(self)
        } else {
            Err(AmacarError::Backend {
                endpoint: endpoint.to_string(),
                message: self.message.unwrap_or_else(|| "request unsuccessful".to_string()),
            })
        }
    }

    pub fn into_data(self, endpoint: &str) -> Result<T, AmacarError> {
        self.ensure_success(endpoint)?
            .data
            .ok_or_else(|| AmacarError::Backend {
                endpoint: endpoint.to_string(),
                message: "response carried no data".to_string(),
            })
    }
}

impl<T> ApiEnvelope<Vec<T>> {
    pub fn into_page(self, endpoint: &str) -> Result<Page<T>, AmacarError> {
        let env = self.ensure_success(endpoint)?;
        Ok(Page {
            items: env.data.unwrap_or_default(),
            pagination: env.pagination,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Offer as sent by the backend. Ids may arrive as numbers.
#[derive(Debug, Deserialize)]
pub(crate) struct OfferDto {
    dealer_id: serde_json::Value,
    #[serde(default)]
    dealer_name: String,
    current_offer: Decimal,
    #[serde(default, alias = "base_price")]
    original_price: Option<Decimal>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl OfferDto {
    pub(crate) fn into_offer(self, fallback_price: Decimal) -> DealerOffer {
        let now = Utc::now();
        let submitted = self.submitted_at.unwrap_or(now);
        DealerOffer {
            dealer_id: id_string(&self.dealer_id),
            dealer_name: self.dealer_name,
            current_offer: self.current_offer,
            original_price: self.original_price.unwrap_or(fallback_price),
            submitted_at: submitted,
            updated_at: self.updated_at.unwrap_or(submitted),
        }
    }
}

/// Session as sent by the backend. `expires_at` is kept raw so a missing
/// or malformed value degrades to "unknown" instead of failing the batch.
#[derive(Debug, Deserialize)]
pub(crate) struct SessionDto {
    id: serde_json::Value,
    vehicle: VehicleCriteria,
    #[serde(default)]
    offers: Vec<OfferDto>,
    #[serde(default)]
    status: Option<SessionStatus>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    expires_at: Option<serde_json::Value>,
    #[serde(default)]
    accepted_offer: Option<serde_json::Value>,
}

impl SessionDto {
    pub(crate) fn into_session(self) -> BiddingSession {
        let id = id_string(&self.id);
        let expires_at = self.expires_at.as_ref().and_then(|raw| {
            let parsed = match raw {
                serde_json::Value::String(s) => parse_expires_at(s),
                serde_json::Value::Number(n) => n.as_i64().and_then(|ms| parse_expires_at(&ms.to_string())),
                _ => None,
            };
            if parsed.is_none() {
                warn!(session_id = %id, raw = %raw, "Unparseable session expiry");
            }
            parsed
        });
        let base_price = self.vehicle.base_price;
        let offers = self
            .offers
            .into_iter()
            .map(|o| o.into_offer(base_price))
            .collect::<Vec<_>>();
        let status = self.status.unwrap_or(if offers.is_empty() {
            SessionStatus::Idle
        } else {
            SessionStatus::Active
        });

        BiddingSession {
            id,
            vehicle: self.vehicle,
            offers,
            status,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            expires_at,
            accepted_offer: self.accepted_offer.as_ref().map(id_string),
        }
    }
}

/// Render a JSON id (string or number) as a string.
fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
