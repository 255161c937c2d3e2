//! Facial landmark input: canonical point types, vector math, and frame sources.
//!
//! Only landmark coordinates leave this module. Video frames are consumed by
//! the detector behind [`FrameSource`] and never stored.

pub mod geometry;
pub mod source;
pub mod types;

pub use source::{CameraGuard, FrameSource, RecordedFrame, ReplaySource, SourceError};
pub use types::{DetectedFace, Landmarks, Point3};
