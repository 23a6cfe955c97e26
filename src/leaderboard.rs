//! Leaderboard ranking.
//!
//! Orders a snapshot of offers (reverse bidding) or bids (live auction)
//! by best price and assigns contiguous 1-based ranks. Ranking is a pure
//! function of the snapshot: callers re-rank the whole set after every
//! mutation instead of patching ranks in place.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Bid, BidStatus, BiddingSession, DealerOffer};

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Which direction "best" points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Buy side: dealers bid down, lowest price wins.
    ReverseBidding,
    /// Sell side: dealers bid up, highest amount wins.
    LiveAuction,
}

/// Anything with a comparable price.
pub trait Priced {
    fn price(&self) -> Decimal;
}

impl Priced for DealerOffer {
    fn price(&self) -> Decimal {
        self.current_offer
    }
}

impl Priced for Bid {
    fn price(&self) -> Decimal {
        self.amount
    }
}

/// An entry with its computed rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked<T> {
    pub rank: u32,
    pub entry: T,
}

/// Rank a snapshot. Equal prices keep their input order.
pub fn rank<T: Priced + Clone>(items: &[T], mode: RankingMode) -> Vec<Ranked<T>> {
    let mut sorted: Vec<&T> = items.iter().collect();
    // `sort_by` is stable, which is what keeps ties in first-seen order.
    match mode {
        RankingMode::ReverseBidding => sorted.sort_by(|a, b| a.price().cmp(&b.price())),
        RankingMode::LiveAuction => sorted.sort_by(|a, b| b.price().cmp(&a.price())),
    }

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, item)| Ranked {
            rank: i as u32 + 1,
            entry: item.clone(),
        })
        .collect()
}

/// The best entry under `mode`, first-seen on ties.
pub fn best<T: Priced>(items: &[T], mode: RankingMode) -> Option<&T> {
    items.iter().fold(None, |best: Option<&T>, item| match best {
        None => Some(item),
        Some(current) => {
            let better = match mode {
                RankingMode::ReverseBidding => item.price() < current.price(),
                RankingMode::LiveAuction => item.price() > current.price(),
            };
            if better {
                Some(item)
            } else {
                Some(current)
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Session leaderboard
// ---------------------------------------------------------------------------

/// One row of a reverse-bidding leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub dealer_id: String,
    pub dealer_name: String,
    pub current_offer: Decimal,
    pub savings: Decimal,
    /// Savings as a percentage of the original price, 2 dp.
    pub savings_pct: Decimal,
    pub is_accepted: bool,
}

/// Ranked view of a session's current offers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLeaderboard {
    pub session_id: String,
    pub entries: Vec<LeaderboardEntry>,
}

impl SessionLeaderboard {
    pub fn for_session(session: &BiddingSession) -> Self {
        let accepted = session.accepted_offer.as_deref();
        let entries = rank(&session.offers, RankingMode::ReverseBidding)
            .into_iter()
            .map(|Ranked { rank, entry }| {
                let savings = entry.savings();
                LeaderboardEntry {
                    rank,
                    is_accepted: accepted == Some(entry.dealer_id.as_str()),
                    savings_pct: savings_pct(savings, entry.original_price),
                    savings,
                    current_offer: entry.current_offer,
                    dealer_name: entry.dealer_name,
                    dealer_id: entry.dealer_id,
                }
            })
            .collect();

        Self {
            session_id: session.id.clone(),
            entries,
        }
    }

    pub fn leader(&self) -> Option<&LeaderboardEntry> {
        self.entries.first()
    }

    pub fn rank_of(&self, dealer_id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.dealer_id == dealer_id)
            .map(|e| e.rank)
    }
}

fn savings_pct(savings: Decimal, original: Decimal) -> Decimal {
    if original.is_zero() {
        return Decimal::ZERO;
    }
    (savings / original * Decimal::ONE_HUNDRED).round_dp(2)
}

// ---------------------------------------------------------------------------
// Auction ranking
// ---------------------------------------------------------------------------

/// Rank an auction's bids, highest first. Rejected and expired bids are
/// dropped; they can no longer win.
pub fn rank_bids(bids: &[Bid]) -> Vec<Ranked<Bid>> {
    let live: Vec<Bid> = bids
        .iter()
        .filter(|b| matches!(b.status, BidStatus::Pending | BidStatus::Accepted))
        .cloned()
        .collect();
    rank(&live, RankingMode::LiveAuction)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
