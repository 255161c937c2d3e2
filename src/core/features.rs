//! Feature extraction from one frame's facial landmarks.
//!
//! Every extractor degrades to a fixed fallback when the landmarks it needs
//! are missing. Extraction never fails, so a bad frame cannot stall sampling.
//!
//! Landmark indices follow the 468/478-point face mesh layout.

use crate::landmarks::geometry::{angle_between, centroid, distance_2d, midpoint, vector, EPSILON};
use crate::landmarks::types::{Landmarks, Point3};
use serde::{Deserialize, Serialize};

/// Landmark indices for one eye's openness measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub upper_lid: usize,
    pub lower_lid: usize,
    pub inner_corner: usize,
    pub outer_corner: usize,
}

/// Tunable constants for the extractors.
///
/// These are empirical values tied to the face-mesh index layout; retune them
/// when switching detector families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Landmarks averaged into the left eye centre for head pose
    pub left_eye_group: Vec<usize>,
    /// Landmarks averaged into the right eye centre for head pose
    pub right_eye_group: Vec<usize>,
    pub nose_tip: usize,
    pub left_eye: EyeLandmarks,
    pub right_eye: EyeLandmarks,
    /// Outer eye corners used as the gaze reference
    pub gaze_left_corner: usize,
    pub gaze_right_corner: usize,
    /// Lid/corner ratio mapped to openness 0
    pub openness_closed_ratio: f64,
    /// Lid/corner ratio mapped to openness 1
    pub openness_open_ratio: f64,
    /// Openness reported when eye landmarks are missing
    pub openness_fallback: f64,
    /// Gaze attention reported when gaze landmarks are missing
    pub gaze_fallback: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            left_eye_group: vec![33, 133, 160, 158, 153],
            right_eye_group: vec![362, 263, 387, 385, 380],
            nose_tip: 1,
            left_eye: EyeLandmarks {
                upper_lid: 159,
                lower_lid: 145,
                inner_corner: 33,
                outer_corner: 133,
            },
            right_eye: EyeLandmarks {
                upper_lid: 386,
                lower_lid: 374,
                inner_corner: 362,
                outer_corner: 263,
            },
            gaze_left_corner: 33,
            gaze_right_corner: 263,
            openness_closed_ratio: 0.02,
            openness_open_ratio: 0.35,
            // Assume open on tracking loss so it does not read as a blink.
            openness_fallback: 0.9,
            gaze_fallback: 0.5,
        }
    }
}

/// Which eye to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

/// Head orientation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub pitch: f64,
    pub yaw: f64,
}

/// Numeric features of one frame, before blink tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFeatures {
    pub head_pose: HeadPose,
    pub eye_open_left: f64,
    pub eye_open_right: f64,
    pub gaze_attention: f64,
}

/// Stateless extractor for per-frame features.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Compute every per-frame feature.
    pub fn extract(&self, landmarks: &Landmarks) -> FrameFeatures {
        FrameFeatures {
            head_pose: self.head_pose(landmarks),
            eye_open_left: self.eye_openness(landmarks, Eye::Left),
            eye_open_right: self.eye_openness(landmarks, Eye::Right),
            gaze_attention: self.gaze_attention(landmarks),
        }
    }

    /// Heuristic head pose from eye centres and the nose tip.
    ///
    /// Yaw is the angle of the eye-to-eye vector against the horizontal axis,
    /// signed by which side of the eye midpoint the nose falls on. Pitch is
    /// `atan2` of the vertical and depth components of nose -> eye midpoint.
    /// Returns the zero pose if any landmark group is missing.
    pub fn head_pose(&self, landmarks: &Landmarks) -> HeadPose {
        let left = centroid(landmarks.select(&self.config.left_eye_group));
        let right = centroid(landmarks.select(&self.config.right_eye_group));
        let nose = landmarks.get(self.config.nose_tip);

        let (Some(left), Some(right), Some(nose)) = (left, right, nose) else {
            return HeadPose::default();
        };

        let eye_axis = vector(left, right);
        let mid = midpoint(left, right);
        let nose_to_mid = vector(nose, mid);

        let horizontal = Point3::new(1.0, 0.0, 0.0);
        let yaw_magnitude = angle_between(eye_axis, horizontal);
        let yaw_sign = if nose.x - mid.x < 0.0 { -1.0 } else { 1.0 };

        let depth = if nose_to_mid.z == 0.0 {
            EPSILON
        } else {
            nose_to_mid.z
        };

        HeadPose {
            pitch: nose_to_mid.y.atan2(depth),
            yaw: yaw_sign * yaw_magnitude,
        }
    }

    /// Eye openness in `[0, 1]` from the lid-gap / eye-width ratio.
    pub fn eye_openness(&self, landmarks: &Landmarks, eye: Eye) -> f64 {
        let idx = match eye {
            Eye::Left => self.config.left_eye,
            Eye::Right => self.config.right_eye,
        };

        let Some([upper, lower, inner, outer]) =
            landmarks.get_all([idx.upper_lid, idx.lower_lid, idx.inner_corner, idx.outer_corner])
        else {
            return self.config.openness_fallback;
        };

        let vertical = distance_2d(upper, lower);
        let mut horizontal = distance_2d(inner, outer);
        if horizontal == 0.0 {
            horizontal = EPSILON;
        }

        self.scale_openness(vertical / horizontal)
    }

    /// Map a raw aspect ratio onto `[0, 1]` using the configured range.
    pub fn scale_openness(&self, ratio: f64) -> f64 {
        let closed = self.config.openness_closed_ratio;
        let open = self.config.openness_open_ratio;
        ((ratio - closed) / (open - closed)).clamp(0.0, 1.0)
    }

    /// Attention proxy from the nose's horizontal offset to the eye midpoint.
    pub fn gaze_attention(&self, landmarks: &Landmarks) -> f64 {
        let Some([left, right, nose]) = landmarks.get_all([
            self.config.gaze_left_corner,
            self.config.gaze_right_corner,
            self.config.nose_tip,
        ]) else {
            return self.config.gaze_fallback;
        };

        let mid = midpoint(left, right);
        let offset = (nose.x - mid.x).abs();
        let mut eye_distance = distance_2d(left, right);
        if eye_distance == 0.0 {
            eye_distance = EPSILON;
        }

        let deviation = (offset / eye_distance).min(1.0);
        (1.0 - deviation).max(0.0)
    }
}
