//! AMACAR — vehicle marketplace client core
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod ai;
pub mod backend;
pub mod bidding;
pub mod clock;
pub mod config;
pub mod engine;
pub mod expiry;
pub mod leaderboard;
pub mod state;
pub mod storage;
pub mod types;
pub mod validation;
pub mod views;
