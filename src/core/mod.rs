//! Core functionality for the engagement agent.
//!
//! This module contains:
//! - Per-frame feature extraction and blink tracking
//! - The capture loop and the batch uploader it feeds
//! - Scoring, session storage and session analytics for the service side

pub mod analytics;
pub mod blink;
pub mod capture;
pub mod features;
pub mod record;
pub mod scoring;
pub mod sessions;
pub mod uploader;

// Re-export commonly used types
pub use analytics::{
    stability_label, summary_report, AnalyticsConfig, ComprehensiveAnalytics, ScorePoint,
    SessionAggregator, SessionAnalytics, StabilityLabel,
};
pub use blink::BlinkTracker;
pub use capture::{CaptureLoop, CaptureOutcome, CaptureSettings, SampleOutcome, StopReason};
pub use features::{ExtractorConfig, FeatureExtractor, FrameFeatures, HeadPose};
pub use record::{EngagementBatch, FeatureRecord};
pub use scoring::{
    attention_label, AttentionInputs, AttentionScoring, BandedMeanScoring, EngagementScorer,
    HeuristicScorer,
};
pub use sessions::{Session, SessionError, SessionId, SessionStore};
pub use uploader::{BatchSink, BatchUploader, FlushOutcome, SinkError, MAX_BUFFERED_RECORDS};
