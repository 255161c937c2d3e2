//! Engagement Agent - privacy-first webcam engagement estimation.
//!
//! This library turns facial landmarks into per-frame engagement features,
//! uploads them in batches, and aggregates scored sessions into analytics
//! and reports.
//!
//! # Privacy Guarantees
//!
//! - **No video**: Frames are consumed by the detector and never stored
//! - **Landmarks only**: Only numeric features derived from landmarks are sent
//! - **Bounded buffering**: At most a fixed number of records wait for upload
//! - **Transparency**: All capture activity is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Engagement Agent                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ FrameSource │──▶│  Features   │──▶│  Uploader   │──┐    │
//! │  │ (landmarks) │   │ (+ blinks)  │   │  (batches)  │  │    │
//! │  └─────────────┘   └─────────────┘   └─────────────┘  │    │
//! │         │                                             ▼    │
//! │  ┌─────────────┐                     ┌─────────────────┐   │
//! │  │Transparency │                     │ Session service │   │
//! │  │    Log      │                     │ score+analytics │   │
//! │  └─────────────┘                     └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use engagement_agent::core::{ScorePoint, SessionAggregator};
//!
//! let points: Vec<ScorePoint> = Vec::new();
//! let analytics = SessionAggregator::default().advanced(&points);
//! println!("Volatility: {}", analytics.volatility);
//! ```

pub mod config;
pub mod core;
pub mod landmarks;
pub mod transparency;

#[cfg(feature = "gateway")]
pub mod gateway;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, GatewaySettings};
pub use core::{
    AnalyticsConfig, CaptureLoop, CaptureSettings, EngagementBatch, FeatureExtractor,
    FeatureRecord, ScorePoint, SessionAggregator, SessionStore,
};
pub use landmarks::{DetectedFace, FrameSource, ReplaySource, SourceError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{GatewayClient, GatewayConfig, GatewayError, SeriesCursor};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║             ENGAGEMENT AGENT - PRIVACY DECLARATION               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent estimates engagement from your webcam.               ║
║                                                                  ║
║  ✓ WHAT WE SEND:                                                 ║
║    • Head orientation (pitch and yaw angles)                     ║
║    • How open each eye is, and an approximate blink rate         ║
║    • How centred your gaze is                                    ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • Video frames or still images                                ║
║    • Raw facial landmark coordinates                             ║
║    • Audio                                                       ║
║    • Any screen content                                          ║
║                                                                  ║
║  Frames are read by the detector and discarded immediately.      ║
║  The camera is released as soon as capture stops.                ║
║                                                                  ║
║  You can view capture statistics anytime with:                   ║
║    engagement-agent status                                       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
