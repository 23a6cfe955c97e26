//! Bid accept/reject transitions for live auctions.
//!
//! A `BidBook` owns one auction's bids and enforces:
//! - at most one accepted bid per auction,
//! - terminal bids never change,
//! - at most one in-flight action per bid, and at most one in-flight
//!   accept per auction.
//!
//! An action is two-phase: `begin` reserves the bid and hands out a
//! ticket before the backend call; `complete` applies or releases it
//! once the response (success or failure) arrives.

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::leaderboard::{rank_bids, Ranked};
use crate::types::{Bid, BidStatus};

// ---------------------------------------------------------------------------
// Actions + errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BidAction {
    Accept,
    Reject,
}

impl BidAction {
    fn target_status(&self) -> BidStatus {
        match self {
            BidAction::Accept => BidStatus::Accepted,
            BidAction::Reject => BidStatus::Rejected,
        }
    }
}

impl fmt::Display for BidAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidAction::Accept => write!(f, "accept"),
            BidAction::Reject => write!(f, "reject"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BidActionError {
    #[error("Bid not found: {0}")]
    BidNotFound(String),

    #[error("Bid {bid_id} already resolved ({status})")]
    AlreadyResolved { bid_id: String, status: BidStatus },

    #[error("An action is already in flight for bid {0}")]
    ActionInFlight(String),

    #[error("Auction {auction_id} already has an accept in flight (bid {bid_id})")]
    AcceptInFlight { auction_id: String, bid_id: String },

    #[error("Auction {auction_id} already accepted bid {winner}")]
    AlreadyAccepted { auction_id: String, winner: String },

    #[error("Bids for auction {0} are not loaded")]
    AuctionNotLoaded(String),

    #[error("Stale ticket for bid {0}")]
    StaleTicket(String),
}

/// Proof that an action was reserved. Consumed by `BidBook::complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTicket {
    pub auction_id: String,
    pub bid_id: String,
    pub action: BidAction,
}

// ---------------------------------------------------------------------------
// Bid book
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BidBook {
    pub auction_id: String,
    bids: Vec<Bid>,
    in_flight: HashMap<String, BidAction>,
}

impl BidBook {
    pub fn new(auction_id: impl Into<String>, bids: Vec<Bid>) -> Self {
        let mut book = Self {
            auction_id: auction_id.into(),
            bids: Vec::new(),
            in_flight: HashMap::new(),
        };
        book.replace_bids(bids);
        book
    }

    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    pub fn bid(&self, bid_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.id == bid_id)
    }

    pub fn accepted(&self) -> Option<&Bid> {
        self.bids.iter().find(|b| b.status == BidStatus::Accepted)
    }

    pub fn is_in_flight(&self, bid_id: &str) -> bool {
        self.in_flight.contains_key(bid_id)
    }

    pub fn ranked(&self) -> Vec<Ranked<Bid>> {
        rank_bids(&self.bids)
    }

    /// Replace the bid set with a fresh backend snapshot.
    ///
    /// A bid resolved locally keeps its status whatever the server sends.
    /// A locally accepted bid stays the winner; any other accepted bid in
    /// the snapshot is marked expired, as is every accepted bid after the
    /// first when there is no local winner. In-flight reservations survive
    /// the refresh.
    pub fn replace_bids(&mut self, incoming: Vec<Bid>) {
        let mut merged: Vec<Bid> = incoming
            .into_iter()
            .map(|mut bid| {
                if let Some(local) = self.bid(&bid.id) {
                    if local.status.is_terminal() && local.status != bid.status {
                        if bid.status.is_terminal() {
                            warn!(
                                auction_id = %self.auction_id,
                                bid_id = %bid.id,
                                local = %local.status,
                                server = %bid.status,
                                "Server disagrees with a resolved bid, keeping local status"
                            );
                        }
                        bid.status = local.status;
                    }
                }
                bid
            })
            .collect();

        let local_winner = self
            .accepted()
            .map(|b| b.id.clone())
            .filter(|id| merged.iter().any(|b| b.id == *id));
        let winner = local_winner.or_else(|| {
            merged
                .iter()
                .find(|b| b.status == BidStatus::Accepted)
                .map(|b| b.id.clone())
        });

        for bid in merged.iter_mut() {
            if bid.status == BidStatus::Accepted && winner.as_deref() != Some(bid.id.as_str()) {
                warn!(
                    auction_id = %self.auction_id,
                    winner = ?winner,
                    bid_id = %bid.id,
                    "Snapshot carries a second accepted bid, expiring it"
                );
                bid.status = BidStatus::Expired;
            }
        }

        self.bids = merged;
    }

    /// Reserve `bid_id` for `action`.
    pub fn begin(&mut self, bid_id: &str, action: BidAction) -> Result<ActionTicket, BidActionError> {
        let bid = self
            .bid(bid_id)
            .ok_or_else(|| BidActionError::BidNotFound(bid_id.to_string()))?;

        if bid.status.is_terminal() {
            return Err(BidActionError::AlreadyResolved {
                bid_id: bid_id.to_string(),
                status: bid.status,
            });
        }
        if self.in_flight.contains_key(bid_id) {
            return Err(BidActionError::ActionInFlight(bid_id.to_string()));
        }
        if action == BidAction::Accept {
            if let Some(winner) = self.accepted() {
                return Err(BidActionError::AlreadyAccepted {
                    auction_id: self.auction_id.clone(),
                    winner: winner.id.clone(),
                });
            }
            if let Some((other, _)) = self
                .in_flight
                .iter()
                .find(|(_, a)| **a == BidAction::Accept)
            {
                return Err(BidActionError::AcceptInFlight {
                    auction_id: self.auction_id.clone(),
                    bid_id: other.clone(),
                });
            }
        }

        self.in_flight.insert(bid_id.to_string(), action);
        debug!(auction_id = %self.auction_id, bid_id, %action, "Bid action reserved");

        Ok(ActionTicket {
            auction_id: self.auction_id.clone(),
            bid_id: bid_id.to_string(),
            action,
        })
    }

    /// Finish a reserved action. On success the bid takes its terminal
    /// status; on failure the bid is left as it was so the user can retry.
    ///
    /// A valid ticket always releases its reservation. If the result can
    /// no longer be applied (a resync brought in another winner, or the
    /// bid left the snapshot) the conflict comes back as
    /// `Settled::Conflict`; only a stale ticket is an `Err`.
    pub fn complete(&mut self, ticket: &ActionTicket, succeeded: bool) -> Result<Settled, BidActionError> {
        match self.in_flight.get(&ticket.bid_id) {
            Some(action) if *action == ticket.action => {}
            _ => return Err(BidActionError::StaleTicket(ticket.bid_id.clone())),
        }
        self.in_flight.remove(&ticket.bid_id);

        match self.apply(ticket, succeeded) {
            Ok(bid) => Ok(Settled::Resolved(bid)),
            Err(conflict) => {
                warn!(
                    auction_id = %self.auction_id,
                    bid_id = %ticket.bid_id,
                    error = %conflict,
                    "Bid action settled against a changed book"
                );
                Ok(Settled::Conflict(conflict))
            }
        }
    }

    fn apply(&mut self, ticket: &ActionTicket, succeeded: bool) -> Result<Bid, BidActionError> {
        if succeeded && ticket.action == BidAction::Accept {
            if let Some(winner) = self.accepted() {
                if winner.id != ticket.bid_id {
                    return Err(BidActionError::AlreadyAccepted {
                        auction_id: self.auction_id.clone(),
                        winner: winner.id.clone(),
                    });
                }
            }
        }
        let bid = self
            .bids
            .iter_mut()
            .find(|b| b.id == ticket.bid_id)
            .ok_or_else(|| BidActionError::BidNotFound(ticket.bid_id.clone()))?;
        if succeeded {
            if bid.status.is_terminal() && bid.status != ticket.action.target_status() {
                return Err(BidActionError::AlreadyResolved {
                    bid_id: bid.id.clone(),
                    status: bid.status,
                });
            }
            bid.status = ticket.action.target_status();
        }
        Ok(bid.clone())
    }
}

/// How a reserved action ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    /// The bid as it now stands.
    Resolved(Bid),
    /// The reservation was released but the result could not be applied.
    Conflict(BidActionError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
