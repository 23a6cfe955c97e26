//! Time-remaining classification for sessions and auctions.
//!
//! State is derived, never stored: every clock tick recomputes it from a
//! fixed `expires_at` and the sampled `now`. A missing or malformed
//! expiry degrades to `Unknown` ("N/A") instead of failing.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryThresholds {
    pub low_time: Duration,
    pub critical_time: Duration,
}

impl ExpiryThresholds {
    pub fn new(low_time: Duration, critical_time: Duration) -> Self {
        Self {
            low_time,
            critical_time,
        }
    }
}

impl Default for ExpiryThresholds {
    fn default() -> Self {
        Self {
            low_time: Duration::hours(1),
            critical_time: Duration::minutes(15),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Discrete time label. Ordered: a fixed expiry only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeState {
    Active,
    LowTime,
    CriticalTime,
    Expired,
    /// Expiry could not be determined.
    Unknown,
}

impl fmt::Display for TimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeState::Active => "active",
            TimeState::LowTime => "low-time",
            TimeState::CriticalTime => "critical-time",
            TimeState::Expired => "expired",
            TimeState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Remaining time plus its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRemaining {
    /// Floored at zero. `None` when the expiry is unknown.
    pub remaining: Option<Duration>,
    pub state: TimeState,
}

impl TimeRemaining {
    pub fn unknown() -> Self {
        Self {
            remaining: None,
            state: TimeState::Unknown,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.state == TimeState::Expired
    }

    /// Human-readable countdown.
    pub fn display(&self) -> String {
        match self.remaining {
            None => "N/A".to_string(),
            Some(d) => format_remaining(d),
        }
    }
}

/// Classify `expires_at` against `now`.
pub fn classify(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &ExpiryThresholds,
) -> TimeRemaining {
    let Some(expires_at) = expires_at else {
        return TimeRemaining::unknown();
    };

    let remaining = (expires_at - now).max(Duration::zero());
    let state = if remaining <= Duration::zero() {
        TimeState::Expired
    } else if remaining < thresholds.critical_time {
        TimeState::CriticalTime
    } else if remaining < thresholds.low_time {
        TimeState::LowTime
    } else {
        TimeState::Active
    };

    TimeRemaining {
        remaining: Some(remaining),
        state,
    }
}

/// Parse an expiry as delivered by the backend: RFC 3339 or epoch millis.
pub fn parse_expires_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

/// `"2d 4h"` for a day or more, `"HH:MM:SS"` below that, `"Expired"` at zero.
/// A sub-second remainder still shows as `"00:00:00"`.
pub fn format_remaining(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return "Expired".to_string();
    }
    let total = remaining.num_seconds();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
