//! Bid accept/reject, offer acceptance and appointment scheduling.
//!
//! A bid action or appointment call is reserved in state before the
//! backend call and released after it, whatever the result. A second click
//! while the first is in flight fails at the reservation and never reaches
//! the backend.

use std::future::Future;

use anyhow::{bail, Result};
use tracing::{info, warn};

use super::Engine;
use crate::bidding::BidAction;
use crate::state::{Action, Outcome, StateError};
use crate::types::{appointment_reservation_key, Appointment, AppointmentRequest, Bid};

/// Result of a completed bid action.
#[derive(Debug, Clone, PartialEq)]
pub struct BidResolution {
    pub bid: Bid,
    /// Prefilled appointment for the winning dealer; only set on accept.
    pub appointment: Option<AppointmentRequest>,
}

impl Engine {
    pub async fn accept_bid(&self, auction_id: &str, bid_id: &str) -> Result<BidResolution> {
        self.resolve_bid(auction_id, bid_id, BidAction::Accept).await
    }

    pub async fn reject_bid(&self, auction_id: &str, bid_id: &str) -> Result<BidResolution> {
        self.resolve_bid(auction_id, bid_id, BidAction::Reject).await
    }

    async fn resolve_bid(&self, auction_id: &str, bid_id: &str, action: BidAction) -> Result<BidResolution> {
        let ticket = match self
            .state
            .dispatch(Action::BidActionRequested {
                auction_id: auction_id.to_string(),
                bid_id: bid_id.to_string(),
                action,
            })
            .await?
        {
            Outcome::Ticket(ticket) => ticket,
            other => bail!("Unexpected outcome reserving bid {bid_id}: {other:?}"),
        };

        let result = match action {
            BidAction::Accept => self.backend.accept_bid(auction_id, bid_id).await,
            BidAction::Reject => self.backend.reject_bid(auction_id, bid_id).await,
        };
        let error = result.as_ref().err().map(|e| e.to_string());

        let outcome = self
            .state
            .dispatch(Action::BidActionCompleted { ticket, error })
            .await?;
        result?;

        let bid = match outcome {
            Outcome::BidResolved(bid) => bid,
            Outcome::BidConflict(conflict) => return Err(StateError::BidAction(conflict).into()),
            other => bail!("Unexpected outcome completing bid {bid_id}: {other:?}"),
        };

        let appointment = match action {
            BidAction::Accept => Some(self.bid_handoff(&bid)),
            BidAction::Reject => None,
        };
        Ok(BidResolution { bid, appointment })
    }

    /// Prefill the appointment form from the accepted bid.
    fn bid_handoff(&self, bid: &Bid) -> AppointmentRequest {
        let vehicle_description = self
            .state
            .snapshot()
            .auctions
            .get(&bid.auction_id)
            .map(|a| a.vehicle.to_string())
            .unwrap_or_else(|| format!("Auction {}", bid.auction_id));

        AppointmentRequest {
            dealer_id: bid.bidder_id.clone(),
            dealer_name: bid.bidder_name.clone(),
            dealer_contact: bid.bidder_contact.clone(),
            vehicle_description,
            accepted_amount: bid.amount,
            bid_id: Some(bid.id.clone()),
            preferred_at: None,
            notes: None,
        }
    }

    /// Accept a reverse-bidding offer and prefill the appointment.
    pub async fn accept_offer(&self, session_id: &str, dealer_id: &str) -> Result<AppointmentRequest> {
        let offer = match self
            .state
            .dispatch(Action::OfferAccepted {
                session_id: session_id.to_string(),
                dealer_id: dealer_id.to_string(),
            })
            .await?
        {
            Outcome::OfferAccepted(offer) => offer,
            other => bail!("Unexpected outcome accepting offer: {other:?}"),
        };

        let vehicle_description = self
            .state
            .snapshot()
            .session(session_id)
            .map(|s| s.vehicle.to_string())
            .unwrap_or_else(|| format!("Session {session_id}"));

        Ok(AppointmentRequest {
            dealer_id: offer.dealer_id,
            dealer_name: offer.dealer_name,
            dealer_contact: Default::default(),
            vehicle_description,
            accepted_amount: offer.current_offer,
            bid_id: None,
            preferred_at: None,
            notes: None,
        })
    }

    /// Ask the dealer for an appointment. A second request for the same
    /// bid (or dealer) while one is pending fails with
    /// `AppointmentInFlight` and is never sent.
    pub async fn schedule_appointment(&self, request: &AppointmentRequest) -> Result<Appointment> {
        let appointment = self
            .reserved_appointment_call(request.reservation_key(), "schedule", || self.backend.create_appointment(request))
            .await?;
        info!(appointment_id = %appointment.id, dealer = %appointment.dealer_name, "Appointment scheduled");
        Ok(appointment)
    }

    pub async fn cancel_appointment(&self, appointment_id: &str) -> Result<Appointment> {
        self.reserved_appointment_call(
            appointment_reservation_key(appointment_id),
            "cancel",
            || self.backend.cancel_appointment(appointment_id),
        )
        .await
    }

    pub async fn confirm_appointment(&self, appointment_id: &str) -> Result<Appointment> {
        self.reserved_appointment_call(
            appointment_reservation_key(appointment_id),
            "confirm",
            || self.backend.confirm_appointment(appointment_id),
        )
        .await
    }

    /// Reserve `key`, run the backend call once, then release the key and
    /// record the result. The call is never made if the reservation fails.
    async fn reserved_appointment_call<F, Fut>(&self, key: String, verb: &str, call: F) -> Result<Appointment>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Appointment>>,
    {
        self.state.dispatch(Action::AppointmentRequested(key.clone())).await?;

        let result = call().await;
        let settled = match &result {
            Ok(appointment) => Ok(appointment.clone()),
            Err(e) => {
                warn!(key = %key, error = %e, "Appointment {} failed", verb);
                Err(format!("Could not {verb} appointment: {e}"))
            }
        };
        self.state
            .dispatch(Action::AppointmentSettled { key, result: settled })
            .await?;
        result
    }
}
