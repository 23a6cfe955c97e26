//! reqwest implementation of `MarketplaceBackend`.
//!
//! Reads are retried with exponential backoff on 429/5xx. Writes (bid
//! accept/reject, appointment changes) are sent once; the caller decides
//! what to do with a failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ApiEnvelope, MarketplaceBackend, OfferDto, SessionDto};
use crate::types::{
    AmacarError, Appointment, AppointmentRequest, Bid, BiddingSession, DealerOffer, LiveAuction,
    Page, SearchFilters, Vehicle,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RestBackend {
    http: Client,
    base_url: String,
    token: Option<String>,
    backoff_ms: u64,
}

impl RestBackend {
    pub fn new(base_url: &str, token: Option<String>, timeout_secs: Option<u64>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            backoff_ms: BASE_BACKOFF_MS,
        })
    }

    /// Override the retry backoff base.
    pub fn with_backoff(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GET with retry on 429/5xx and transport errors.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<ApiEnvelope<T>> {
        let url = if query.is_empty() {
            self.url(path)
        } else {
            format!("{}?{}", self.url(path), encode_query(query))
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = self.backoff_ms * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self.authorized(self.http.get(&url)).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<ApiEnvelope<T>>()
                            .await
                            .with_context(|| format!("Failed to parse response from {path}"));
                    }

                    if is_retryable(status) {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, path, "Retryable backend error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    return Err(http_error(path, status, &error_text).into());
                }
                Err(e) => {
                    warn!(error = %e, attempt, path, "Backend request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(AmacarError::Backend {
            endpoint: path.to_string(),
            message: format!(
                "failed after {MAX_RETRIES} retries: {}",
                last_error.unwrap_or_default()
            ),
        }
        .into())
    }

    /// Single-shot POST.
    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiEnvelope<T>> {
        let mut builder = self.authorized(self.http.post(self.url(path)));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AmacarError::Backend {
                endpoint: path.to_string(),
                message: format!("Request error: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(http_error(path, status, &error_text).into());
        }

        response
            .json::<ApiEnvelope<T>>()
            .await
            .with_context(|| format!("Failed to parse response from {path}"))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Prefer the envelope's `message` when the error body carries one.
fn http_error(path: &str, status: StatusCode, body: &str) -> AmacarError {
    let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
        .ok()
        .and_then(|env| env.message)
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));
    AmacarError::Backend {
        endpoint: path.to_string(),
        message,
    }
}

fn encode_query(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[async_trait]
impl MarketplaceBackend for RestBackend {
    async fn search_vehicles(&self, filters: &SearchFilters) -> Result<Page<Vehicle>> {
        let path = "/vehicles/search";
        let page = self
            .get::<Vec<Vehicle>>(path, &filters.query_pairs())
            .await?
            .into_page(path)?;
        debug!(count = page.items.len(), "Vehicle search returned");
        Ok(page)
    }

    async fn fetch_live_auctions(&self) -> Result<Vec<LiveAuction>> {
        let path = "/auctions/live";
        let auctions = self.get::<Vec<LiveAuction>>(path, &[]).await?.into_data(path)?;
        debug!(count = auctions.len(), "Fetched live auctions");
        Ok(auctions)
    }

    async fn fetch_auction_bids(&self, auction_id: &str) -> Result<Vec<Bid>> {
        let path = format!("/auctions/{}/bids", segment(auction_id));
        let bids = self.get::<Vec<Bid>>(&path, &[]).await?.into_data(&path)?;
        debug!(auction_id, count = bids.len(), "Fetched auction bids");
        Ok(bids)
    }

    async fn accept_bid(&self, auction_id: &str, bid_id: &str) -> Result<()> {
        let path = format!("/auctions/{}/bids/{}/accept", segment(auction_id), segment(bid_id));
        self.post::<(), serde_json::Value>(&path, None)
            .await?
            .ensure_success(&path)?;
        info!(auction_id, bid_id, "Bid accepted");
        Ok(())
    }

    async fn reject_bid(&self, auction_id: &str, bid_id: &str) -> Result<()> {
        let path = format!("/auctions/{}/bids/{}/reject", segment(auction_id), segment(bid_id));
        self.post::<(), serde_json::Value>(&path, None)
            .await?
            .ensure_success(&path)?;
        info!(auction_id, bid_id, "Bid rejected");
        Ok(())
    }

    async fn create_appointment(&self, request: &AppointmentRequest) -> Result<Appointment> {
        let path = "/appointments";
        let appointment = self
            .post::<AppointmentRequest, Appointment>(path, Some(request))
            .await?
            .into_data(path)?;
        info!(
            appointment_id = %appointment.id,
            dealer_id = %appointment.dealer_id,
            "Appointment created"
        );
        Ok(appointment)
    }

    async fn cancel_appointment(&self, appointment_id: &str) -> Result<Appointment> {
        let path = format!("/appointments/{}/cancel", segment(appointment_id));
        Ok(self
            .post::<(), Appointment>(&path, None)
            .await?
            .into_data(&path)?)
    }

    async fn confirm_appointment(&self, appointment_id: &str) -> Result<Appointment> {
        let path = format!("/appointments/{}/confirm", segment(appointment_id));
        Ok(self
            .post::<(), Appointment>(&path, None)
            .await?
            .into_data(&path)?)
    }

    async fn list_dealer_sessions(&self) -> Result<Vec<BiddingSession>> {
        let path = "/dealer/sessions";
        let sessions = self
            .get::<Vec<SessionDto>>(path, &[])
            .await?
            .into_data(path)?
            .into_iter()
            .map(SessionDto::into_session)
            .collect::<Vec<_>>();
        debug!(count = sessions.len(), "Fetched dealer sessions");
        Ok(sessions)
    }

    async fn fetch_session_offers(&self, session_id: &str) -> Result<Vec<DealerOffer>> {
        let path = format!("/sessions/{}/offers", segment(session_id));
        let offers = self
            .get::<Vec<OfferDto>>(&path, &[])
            .await?
            .into_data(&path)?;
        // Zero original price is filled from the session's base price on upsert.
        Ok(offers
            .into_iter()
            .map(|o| o.into_offer(rust_decimal::Decimal::ZERO))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
