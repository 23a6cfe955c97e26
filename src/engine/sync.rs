//! Backend sync.
//!
//! Every fetch either lands as a `*Loaded` action or as `FetchFailed`.
//! A failure never clears what was loaded before.

use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::Engine;
use crate::state::{Action, Notification, Resource, StateError};
use crate::types::SearchFilters;

/// Summary of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sessions: usize,
    pub auctions: usize,
    pub bid_books: usize,
    pub failures: Vec<Resource>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Engine {
    /// Refresh sessions, live auctions and every auction's bids.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let (sessions, auctions) = futures::join!(self.sync_sessions(), self.sync_auctions());
        match sessions? {
            Some(n) => report.sessions = n,
            None => report.failures.push(Resource::Sessions),
        }
        let auction_ids = match auctions? {
            Some(ids) => {
                report.auctions = ids.len();
                ids
            }
            None => {
                report.failures.push(Resource::Auctions);
                // Keep refreshing the bids we already track.
                self.state.snapshot().bid_books.keys().cloned().collect()
            }
        };

        let results = join_all(auction_ids.iter().map(|id| self.sync_bids(id))).await;
        for (id, result) in auction_ids.into_iter().zip(results) {
            if result? {
                report.bid_books += 1;
            } else {
                report.failures.push(Resource::Bids(id));
            }
        }

        if report.is_clean() {
            debug!(
                sessions = report.sessions,
                auctions = report.auctions,
                "Sync complete"
            );
        } else {
            warn!(failures = report.failures.len(), "Sync finished with failures");
        }
        Ok(report)
    }

    /// `Ok(None)` means the fetch failed and was recorded in state.
    pub async fn sync_sessions(&self) -> Result<Option<usize>> {
        match self.backend.list_dealer_sessions().await {
            Ok(sessions) => {
                let n = sessions.len();
                self.state.dispatch(Action::SessionsLoaded(sessions)).await?;
                Ok(Some(n))
            }
            Err(e) => {
                self.record_failure(Resource::Sessions, format!("Could not load sessions: {e}"))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Returns the ids of the auctions now loaded.
    pub async fn sync_auctions(&self) -> Result<Option<Vec<String>>> {
        match self.backend.fetch_live_auctions().await {
            Ok(auctions) => {
                let ids = auctions.iter().map(|a| a.id.clone()).collect();
                self.state.dispatch(Action::AuctionsLoaded(auctions)).await?;
                Ok(Some(ids))
            }
            Err(e) => {
                self.record_failure(Resource::Auctions, format!("Could not load auctions: {e}"))
                    .await?;
                Ok(None)
            }
        }
    }

    pub async fn sync_bids(&self, auction_id: &str) -> Result<bool> {
        match self.backend.fetch_auction_bids(auction_id).await {
            Ok(bids) => {
                self.state
                    .dispatch(Action::BidsLoaded {
                        auction_id: auction_id.to_string(),
                        bids,
                    })
                    .await?;
                Ok(true)
            }
            Err(e) => {
                self.record_failure(
                    Resource::Bids(auction_id.to_string()),
                    format!("Could not load bids: {e}"),
                )
                .await?;
                Ok(false)
            }
        }
    }

    /// Pull one session's offers and apply them as a single batch.
    ///
    /// A batch with an invalid offer is dropped whole and reported; the
    /// leaderboard keeps its previous state.
    pub async fn refresh_offers(&self, session_id: &str) -> Result<bool> {
        let offers = match self.backend.fetch_session_offers(session_id).await {
            Ok(offers) => offers,
            Err(e) => {
                self.record_failure(Resource::Sessions, format!("Could not load offers: {e}"))
                    .await?;
                return Ok(false);
            }
        };

        let count = offers.len();
        match self
            .state
            .dispatch(Action::OffersReceived {
                session_id: session_id.to_string(),
                offers,
            })
            .await
        {
            Ok(_) => {
                debug!(session_id, count, "Offers refreshed");
                Ok(true)
            }
            Err(StateError::Closed) => Err(StateError::Closed.into()),
            Err(e) => {
                warn!(session_id, error = %e, "Offer batch rejected");
                self.state
                    .dispatch(Action::Notify(Notification::error(format!(
                        "Ignored offer update: {e}"
                    ))))
                    .await?;
                Ok(false)
            }
        }
    }

    /// Run a vehicle search. Previous results stay visible on failure.
    pub async fn search(&self, filters: SearchFilters) -> Result<bool> {
        self.state.dispatch(Action::SearchStarted(filters.clone())).await?;
        match self.backend.search_vehicles(&filters).await {
            Ok(page) => {
                info!(results = page.items.len(), "Search complete");
                self.state.dispatch(Action::SearchLoaded(page)).await?;
                Ok(true)
            }
            Err(e) => {
                self.record_failure(Resource::Search, format!("Search failed: {e}"))
                    .await?;
                Ok(false)
            }
        }
    }

    async fn record_failure(&self, resource: Resource, message: String) -> Result<()> {
        self.state
            .dispatch(Action::FetchFailed { resource, message })
            .await?;
        Ok(())
    }
}
