//! Scoring seams.
//!
//! Two functions turn raw signal into scores, and both are pluggable:
//!
//! - [`EngagementScorer`] maps one [`FeatureRecord`] to an engagement score in
//!   `[0, 1]`. The service uses it when ingesting uploaded batches.
//! - [`AttentionScoring`] maps session-level inputs (mean score, volatility,
//!   focus-time percentage) to the 0-100 attention score.

use crate::core::record::FeatureRecord;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;

/// Session-level inputs to the attention score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttentionInputs {
    /// Mean of the defined scores, `[0, 1]`
    pub mean: f64,
    /// Sample standard deviation of the scores
    pub volatility: f64,
    /// Share of samples above the focus threshold, `[0, 100]`
    pub focus_time_percentage: f64,
}

/// Maps [`AttentionInputs`] to a 0-100 attention score.
///
/// Results above 100 are clamped by the caller. Any
/// `Fn(&AttentionInputs) -> u32` closure can be used directly.
pub trait AttentionScoring: Send + Sync {
    fn attention_score(&self, inputs: &AttentionInputs) -> u32;
}

impl<F> AttentionScoring for F
where
    F: Fn(&AttentionInputs) -> u32 + Send + Sync,
{
    fn attention_score(&self, inputs: &AttentionInputs) -> u32 {
        self(inputs)
    }
}

/// Default attention score: the mean score mapped onto four bands.
///
/// | mean        | score |
/// |-------------|-------|
/// | >= 0.8      | 100   |
/// | [0.6, 0.8)  | 75    |
/// | [0.4, 0.6)  | 50    |
/// | < 0.4       | 25    |
///
/// Volatility and focus time are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandedMeanScoring;

impl AttentionScoring for BandedMeanScoring {
    fn attention_score(&self, inputs: &AttentionInputs) -> u32 {
        match inputs.mean {
            m if m >= 0.8 => 100,
            m if m >= 0.6 => 75,
            m if m >= 0.4 => 50,
            _ => 25,
        }
    }
}

/// Qualitative label for an attention score.
pub fn attention_label(score: u32) -> &'static str {
    match score {
        s if s >= 80 => "Excellent",
        s if s >= 60 => "Good",
        s if s >= 40 => "Fair",
        _ => "Poor",
    }
}

/// Maps one feature record to an engagement score in `[0, 1]`.
pub trait EngagementScorer: Send + Sync {
    fn score(&self, record: &FeatureRecord) -> f64;
}

/// Weighted blend of gaze attention, mean eye openness and head yaw.
///
/// The yaw term is `1 - |yaw| / yaw_limit`, floored at 0. Pitch is not used:
/// the landmark heuristic has no stable neutral value for it. Weights are
/// normalised by their sum, so they need not add up to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicScorer {
    pub gaze_weight: f64,
    pub eye_weight: f64,
    pub pose_weight: f64,
    /// Yaw (radians) at which the pose term reaches 0
    pub yaw_limit: f64,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self {
            gaze_weight: 0.5,
            eye_weight: 0.3,
            pose_weight: 0.2,
            yaw_limit: FRAC_PI_4,
        }
    }
}

impl HeuristicScorer {
    fn pose_term(&self, yaw: f64) -> f64 {
        if !yaw.is_finite() || self.yaw_limit <= 0.0 {
            return 0.0;
        }
        (1.0 - yaw.abs() / self.yaw_limit).max(0.0)
    }
}

impl EngagementScorer for HeuristicScorer {
    fn score(&self, record: &FeatureRecord) -> f64 {
        let total = self.gaze_weight + self.eye_weight + self.pose_weight;
        if total <= 0.0 {
            return 0.0;
        }

        let blended = self.gaze_weight * record.gaze_attention.clamp(0.0, 1.0)
            + self.eye_weight * record.eye_open_mean().clamp(0.0, 1.0)
            + self.pose_weight * self.pose_term(record.head_yaw);

        let score = blended / total;
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
