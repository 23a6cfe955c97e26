//! Client workflows.
//!
//! `Engine` ties the backend to the state service: it fetches, dispatches
//! the results as actions, and drives the multi-step flows (bid accept
//! with appointment handoff, offer acceptance, scheduling). The listing
//! assistant wraps the vision model for the seller side.

pub mod bid_actions;
pub mod listing;
pub mod sync;

use std::sync::Arc;

use crate::backend::MarketplaceBackend;
use crate::state::StateHandle;

pub use bid_actions::BidResolution;
pub use listing::{ListingAssistant, ListingDraft, UploadProgress};
pub use sync::SyncReport;

pub struct Engine {
    backend: Arc<dyn MarketplaceBackend>,
    state: StateHandle,
}

impl Engine {
    pub fn new(backend: Arc<dyn MarketplaceBackend>, state: StateHandle) -> Self {
        Self { backend, state }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }
}
