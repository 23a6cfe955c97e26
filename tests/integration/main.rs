//! Integration tests: engine workflows against in-memory backend and
//! vision doubles.

mod bid_flow;
mod listing_flow;
mod mock_backend;
mod mock_vision;
mod sync_flow;
