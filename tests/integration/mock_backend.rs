//! Mock marketplace backend for integration testing.
//!
//! Holds sessions, auctions, bids and appointments in memory and applies
//! bid decisions the way the real backend does. Every operation can be
//! forced to fail, and accepts or appointment requests can be held open
//! to exercise in-flight behaviour.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use amacar::backend::MarketplaceBackend;
use amacar::types::*;

pub struct MockBackend {
    sessions: Mutex<Vec<BiddingSession>>,
    auctions: Mutex<Vec<LiveAuction>>,
    bids: Mutex<HashMap<String, Vec<Bid>>>,
    appointments: Mutex<Vec<Appointment>>,
    /// If set, all operations will return this error.
    force_error: Mutex<Option<String>>,
    /// When set, accepts wait for a permit before answering.
    accept_gate: Mutex<Option<Arc<Semaphore>>>,
    /// When set, appointment requests wait for a permit before answering.
    appointment_gate: Mutex<Option<Arc<Semaphore>>>,
    pub accept_calls: AtomicUsize,
    pub reject_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

pub fn criteria(make: &str, model: &str, base_price: Decimal) -> VehicleCriteria {
    VehicleCriteria {
        make: make.into(),
        model: model.into(),
        year: 2023,
        base_price,
        zip_code: "98101".into(),
    }
}

pub fn bid(auction_id: &str, id: &str, amount: Decimal) -> Bid {
    Bid {
        id: id.into(),
        auction_id: auction_id.into(),
        bidder_id: format!("dealer-{id}"),
        bidder_name: format!("Dealer {id}"),
        bidder_contact: DealerContact {
            email: Some(format!("{id}@dealers.test")),
            phone: Some("2065550100".into()),
        },
        amount,
        status: BidStatus::Pending,
        placed_at: Utc::now(),
    }
}

impl MockBackend {
    /// One live auction (`A-1`, three pending bids) and one reverse-bidding
    /// session (`S-1`, two offers).
    pub fn new() -> Self {
        let now = Utc::now();
        let mut session = BiddingSession::new(
            "S-1",
            criteria("Subaru", "Forester", dec!(34000)),
            now,
            Some(now + Duration::hours(2)),
        );
        session
            .upsert_offer(DealerOffer::new("D-1", "Eastside Subaru", dec!(33200), dec!(34000), now))
            .unwrap();
        session
            .upsert_offer(DealerOffer::new("D-2", "Lake City Subaru", dec!(32900), dec!(34000), now))
            .unwrap();

        let mut bids = HashMap::new();
        bids.insert(
            "A-1".to_string(),
            vec![
                bid("A-1", "B-1", dec!(18000)),
                bid("A-1", "B-2", dec!(19250)),
                bid("A-1", "B-3", dec!(18900)),
            ],
        );

        Self {
            sessions: Mutex::new(vec![session]),
            auctions: Mutex::new(vec![LiveAuction {
                id: "A-1".into(),
                vehicle: criteria("Toyota", "Corolla", dec!(21000)),
                ends_at: Some(now + Duration::hours(5)),
                highest_bid: Some(dec!(19250)),
                bid_count: 3,
            }]),
            bids: Mutex::new(bids),
            appointments: Mutex::new(Vec::new()),
            force_error: Mutex::new(None),
            accept_gate: Mutex::new(None),
            appointment_gate: Mutex::new(None),
            accept_calls: AtomicUsize::new(0),
            reject_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Hold accepts until the returned semaphore gets a permit.
    pub fn gate_accepts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.accept_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold appointment requests until the returned semaphore gets a permit.
    pub fn gate_appointments(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.appointment_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn push_bid(&self, bid: Bid) {
        self.bids
            .lock()
            .unwrap()
            .entry(bid.auction_id.clone())
            .or_default()
            .push(bid);
    }

    pub fn set_session_offer(&self, session_id: &str, offer: DealerOffer) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.iter_mut().find(|s| s.id == session_id) {
            s.upsert_offer(offer).unwrap();
        }
    }

    /// Store an offer as-is, skipping the checks a session applies.
    pub fn push_raw_offer(&self, session_id: &str, offer: DealerOffer) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.iter_mut().find(|s| s.id == session_id) {
            s.offers.push(offer);
        }
    }

    pub fn server_bid_status(&self, auction_id: &str, bid_id: &str) -> Option<BidStatus> {
        self.bids
            .lock()
            .unwrap()
            .get(auction_id)
            .and_then(|b| b.iter().find(|b| b.id == bid_id))
            .map(|b| b.status)
    }

    fn check_error(&self) -> Result<()> {
        if let Some(ref msg) = *self.force_error.lock().unwrap() {
            return Err(anyhow!("{}", msg));
        }
        Ok(())
    }

    fn decide(&self, auction_id: &str, bid_id: &str, status: BidStatus) -> Result<()> {
        let mut all = self.bids.lock().unwrap();
        let bids = all
            .get_mut(auction_id)
            .ok_or_else(|| anyhow!("Auction {auction_id} not found"))?;
        if status == BidStatus::Accepted && bids.iter().any(|b| b.status == BidStatus::Accepted) {
            bail!("Auction already has an accepted bid");
        }
        let bid = bids
            .iter_mut()
            .find(|b| b.id == bid_id)
            .ok_or_else(|| anyhow!("Bid {bid_id} not found"))?;
        if bid.status != BidStatus::Pending {
            bail!("Bid already processed");
        }
        bid.status = status;
        Ok(())
    }
}

#[async_trait]
impl MarketplaceBackend for MockBackend {
    async fn search_vehicles(&self, filters: &SearchFilters) -> Result<Page<Vehicle>> {
        self.check_error()?;
        let items: Vec<Vehicle> = self
            .auctions
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                filters
                    .make
                    .as_deref()
                    .map(|m| a.vehicle.make.eq_ignore_ascii_case(m))
                    .unwrap_or(true)
            })
            .map(|a| Vehicle {
                id: a.id.clone(),
                make: a.vehicle.make.clone(),
                model: a.vehicle.model.clone(),
                year: a.vehicle.year,
                price: a.vehicle.base_price,
                mileage: None,
                zip_code: Some(a.vehicle.zip_code.clone()),
                distance_miles: None,
                image_url: None,
                dealer_name: None,
            })
            .collect();
        let total = items.len() as u64;
        Ok(Page {
            items,
            pagination: Some(Pagination {
                current_page: 1,
                per_page: 20,
                total_items: total,
                total_pages: 1,
                has_next: false,
                has_prev: false,
            }),
        })
    }

    async fn fetch_live_auctions(&self) -> Result<Vec<LiveAuction>> {
        self.check_error()?;
        Ok(self.auctions.lock().unwrap().clone())
    }

    async fn fetch_auction_bids(&self, auction_id: &str) -> Result<Vec<Bid>> {
        self.check_error()?;
        Ok(self
            .bids
            .lock()
            .unwrap()
            .get(auction_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn accept_bid(&self, auction_id: &str, bid_id: &str) -> Result<()> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.accept_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        self.check_error()?;
        self.decide(auction_id, bid_id, BidStatus::Accepted)
    }

    async fn reject_bid(&self, auction_id: &str, bid_id: &str) -> Result<()> {
        self.reject_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;
        self.decide(auction_id, bid_id, BidStatus::Rejected)
    }

    async fn create_appointment(&self, request: &AppointmentRequest) -> Result<Appointment> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.appointment_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        self.check_error()?;
        let mut appointments = self.appointments.lock().unwrap();
        let appointment = Appointment {
            id: format!("AP-{}", appointments.len() + 1),
            dealer_id: request.dealer_id.clone(),
            dealer_name: request.dealer_name.clone(),
            vehicle_description: request.vehicle_description.clone(),
            amount: request.accepted_amount,
            scheduled_at: request.preferred_at,
            status: AppointmentStatus::Pending,
        };
        appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn cancel_appointment(&self, appointment_id: &str) -> Result<Appointment> {
        self.set_appointment_status(appointment_id, AppointmentStatus::Cancelled)
    }

    async fn confirm_appointment(&self, appointment_id: &str) -> Result<Appointment> {
        self.set_appointment_status(appointment_id, AppointmentStatus::Confirmed)
    }

    async fn list_dealer_sessions(&self) -> Result<Vec<BiddingSession>> {
        self.check_error()?;
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn fetch_session_offers(&self, session_id: &str) -> Result<Vec<DealerOffer>> {
        self.check_error()?;
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.offers.clone())
            .ok_or_else(|| anyhow!("Session {session_id} not found"))
    }
}

impl MockBackend {
    fn set_appointment_status(&self, id: &str, status: AppointmentStatus) -> Result<Appointment> {
        self.check_error()?;
        let mut appointments = self.appointments.lock().unwrap();
        let appointment = appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("Appointment {id} not found"))?;
        appointment.status = status;
        Ok(appointment.clone())
    }
}
