//! Evaluation window arithmetic.
//!
//! A pass covers the interval `[past, now]`. A start or stop instant only
//! needs to land anywhere inside the most recent interval to fire, so the
//! control loop can run once per period instead of on exact seconds.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-window containment with wraparound.
pub struct TimeWindow;

impl TimeWindow {
    /// True if `point` lies in `[past, now]`. When `past > now` the window
    /// wraps a period boundary and `point` matches if it is at or after
    /// `past` or at or before `now`.
    pub fn contains(past: DateTime<Utc>, now: DateTime<Utc>, point: DateTime<Utc>) -> bool {
        if past <= now {
            past <= point && point <= now
        } else {
            point >= past || point <= now
        }
    }
}

// ---------------------------------------------------------------------------
// EvaluationWindow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationWindow {
    pub past: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl EvaluationWindow {
    pub fn new(past: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self { past, now }
    }

    /// Window of `minutes_delta` minutes ending at `now` rounded down to the minute.
    pub fn ending_at(now: DateTime<Utc>, minutes_delta: u32) -> Self {
        let rounded = now
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(now);
        Self {
            past: rounded - Duration::minutes(i64::from(minutes_delta)),
            now: rounded,
        }
    }

    pub fn contains(&self, point: DateTime<Utc>) -> bool {
        TimeWindow::contains(self.past, self.now, point)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
