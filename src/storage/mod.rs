//! Persistence layer.
//!
//! Saves the durable slice of `AppState` (sessions, auctions,
//! appointments) to a JSON file and restores it on startup. Derived data
//! and transient UI state are rebuilt, not stored.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::state::AppState;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "amacar_state.json";

/// Save state to a JSON file. Writes to a sibling temp file and renames
/// it over the target so a crash mid-write leaves the old file intact.
pub fn save_state(state: &AppState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state).context("Failed to serialise app state")?;

    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json).context(format!("Failed to write state to {tmp}"))?;
    std::fs::rename(&tmp, path).context(format!("Failed to move state into {path}"))?;

    debug!(
        path,
        sessions = state.sessions.len(),
        appointments = state.appointments.len(),
        "State saved"
    );
    Ok(())
}

/// Load state from a JSON file, with leaderboards rebuilt.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<AppState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read state from {path}"))?;

    let state: AppState =
        serde_json::from_str(&json).context(format!("Failed to parse state from {path}"))?;
    let state = state.restored();

    info!(
        path,
        sessions = state.sessions.len(),
        auctions = state.auctions.len(),
        appointments = state.appointments.len(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
