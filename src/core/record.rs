//! Feature records and the batch envelope sent to the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sampled observation derived from a single frame's landmarks.
///
/// Records are immutable once built; the uploader owns them until they are
/// delivered or evicted from its buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Capture time
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    /// Radians, signed
    pub head_pitch: f64,
    /// Radians, signed
    pub head_yaw: f64,
    /// 0 = fully closed, 1 = fully open
    pub eye_open_left: f64,
    pub eye_open_right: f64,
    /// Approximate blinks per minute over the tracker's current window
    pub blink_rate: f64,
    /// 1 = looking at the centre
    pub gaze_attention: f64,
    /// Free-form diagnostics (landmark count, capture id, ...)
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl FeatureRecord {
    /// Mean of both eyes' openness.
    pub fn eye_open_mean(&self) -> f64 {
        (self.eye_open_left + self.eye_open_right) / 2.0
    }
}

/// Wire payload for `POST /api/engagement/predict_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementBatch {
    pub user_id: Option<String>,
    /// Target session; the service falls back to the latest open session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    /// Chronological records, never empty when sent
    pub items: Vec<FeatureRecord>,
}

impl EngagementBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
