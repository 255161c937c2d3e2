//! Per-session blink tracking over a wall-clock window.
//!
//! Each eye is a two-state machine. `Open -> Closed` only records the time of
//! the change; `Closed -> Open` is the blink and bumps that eye's counter.
//! Counters restart whenever more than the window length has elapsed since the
//! window began, so the reported rate is a rolling approximation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default blink counting window.
pub const BLINK_WINDOW_MS: i64 = 60_000;

/// State of a single eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeState {
    Open,
    Closed,
}

impl EyeState {
    pub fn from_open(open: bool) -> Self {
        if open {
            EyeState::Open
        } else {
            EyeState::Closed
        }
    }
}

/// Tracking state for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeTrack {
    pub state: EyeState,
    pub last_change: Option<DateTime<Utc>>,
    pub blinks: u32,
}

impl EyeTrack {
    fn new() -> Self {
        Self {
            state: EyeState::Open,
            last_change: None,
            blinks: 0,
        }
    }

    /// Apply one observation; returns true if it completed a blink.
    fn observe(&mut self, open: bool, now: DateTime<Utc>) -> bool {
        match (self.state, EyeState::from_open(open)) {
            (EyeState::Open, EyeState::Closed) => {
                self.state = EyeState::Closed;
                self.last_change = Some(now);
                false
            }
            (EyeState::Closed, EyeState::Open) => {
                self.state = EyeState::Open;
                self.last_change = Some(now);
                self.blinks += 1;
                true
            }
            _ => false,
        }
    }
}

/// Blink counters for both eyes within the current window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkTracker {
    pub left: EyeTrack,
    pub right: EyeTrack,
    pub window_start: DateTime<Utc>,
    #[serde(skip, default = "default_window")]
    window: Duration,
}

fn default_window() -> Duration {
    Duration::milliseconds(BLINK_WINDOW_MS)
}

impl BlinkTracker {
    /// Start tracking with both eyes open and the window beginning at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_window(now, default_window())
    }

    pub fn with_window(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            left: EyeTrack::new(),
            right: EyeTrack::new(),
            window_start: now,
            window,
        }
    }

    /// Feed one sample of per-eye open flags.
    ///
    /// An expired window is reset before the sample is applied, so a blink
    /// that lands on the resetting sample counts toward the new window.
    pub fn update(&mut self, left_open: bool, right_open: bool, now: DateTime<Utc>) {
        if now - self.window_start > self.window {
            self.left.blinks = 0;
            self.right.blinks = 0;
            self.window_start = now;
        }

        self.left.observe(left_open, now);
        self.right.observe(right_open, now);
    }

    /// Mean of both eyes' blink counts in the current window.
    pub fn blink_rate(&self) -> f64 {
        (self.left.blinks + self.right.blinks) as f64 / 2.0
    }
}
