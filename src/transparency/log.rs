//! Capture transparency log.
//!
//! Counts what the capture pipeline did (frames looked at, records produced,
//! batches delivered or lost) without storing any of the data itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Events tracked by the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Frames that went through the detector
    FramesSampled,
    /// Ticks skipped because the camera or model was not ready
    TicksSkipped,
    /// Detector ran but found no face
    FramesWithoutFace,
    /// A face was found but its landmark layout was not recognised
    UnrecognisedLandmarks,
    /// Feature records appended to the upload buffer
    RecordsBuffered,
    BatchesSent,
    BatchesFailed,
    /// Records evicted because the buffer hit its cap
    RecordsDropped,
}

impl Counter {
    const ALL: [Counter; 8] = [
        Counter::FramesSampled,
        Counter::TicksSkipped,
        Counter::FramesWithoutFace,
        Counter::UnrecognisedLandmarks,
        Counter::RecordsBuffered,
        Counter::BatchesSent,
        Counter::BatchesFailed,
        Counter::RecordsDropped,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Lock-free counters for the current capture session.
#[derive(Debug)]
pub struct TransparencyLog {
    counters: [AtomicU64; 8],
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that resumes from and saves to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record(&self, counter: Counter) {
        self.record_many(counter, 1);
    }

    pub fn record_many(&self, counter: Counter, count: u64) {
        self.counters[counter.index()].fetch_add(count, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            frames_sampled: self.get(Counter::FramesSampled),
            ticks_skipped: self.get(Counter::TicksSkipped),
            frames_without_face: self.get(Counter::FramesWithoutFace),
            unrecognised_landmarks: self.get(Counter::UnrecognisedLandmarks),
            records_buffered: self.get(Counter::RecordsBuffered),
            batches_sent: self.get(Counter::BatchesSent),
            batches_failed: self.get(Counter::BatchesFailed),
            records_dropped: self.get(Counter::RecordsDropped),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Capture Statistics:\n\
             - Frames sampled: {}\n\
             - Ticks skipped (not ready): {}\n\
             - Frames without a face: {}\n\
             - Feature records buffered: {}\n\
             - Batches sent: {} (failed: {})\n\
             - Records dropped on overflow: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No video frames stored or transmitted\n\
             - Only landmark-derived features leave the device",
            stats.frames_sampled,
            stats.ticks_skipped,
            stats.frames_without_face,
            stats.records_buffered,
            stats.batches_sent,
            stats.batches_failed,
            stats.records_dropped,
            stats.session_duration_secs
        )
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = PersistedStats {
                stats: self.stats(),
                last_updated: Utc::now(),
            };
            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let persisted: PersistedStats =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;
        let s = persisted.stats;

        for (counter, value) in Counter::ALL.into_iter().zip([
            s.frames_sampled,
            s.ticks_skipped,
            s.frames_without_face,
            s.unrecognised_landmarks,
            s.records_buffered,
            s.batches_sent,
            s.batches_failed,
            s.records_dropped,
        ]) {
            self.counters[counter.index()].store(value, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub frames_sampled: u64,
    pub ticks_skipped: u64,
    pub frames_without_face: u64,
    pub unrecognised_landmarks: u64,
    pub records_buffered: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub records_dropped: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(flatten)]
    stats: TransparencyStats,
    last_updated: DateTime<Utc>,
}

pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
