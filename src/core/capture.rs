//! The capture loop: camera -> landmarks -> features -> upload buffer.
//!
//! Everything runs on one task. Sampling, the size-triggered flush and the
//! timer flush are branches of a single `select!`, so two extraction passes
//! never overlap. Sends run as spawned tasks so a slow network call does not
//! hold up sampling.

use crate::core::blink::BlinkTracker;
use crate::core::features::FeatureExtractor;
use crate::core::record::FeatureRecord;
use crate::core::uploader::{BatchSink, BatchUploader, FlushOutcome};
use crate::landmarks::source::{CameraGuard, FrameSource, SourceError};
use crate::transparency::{Counter, SharedTransparencyLog};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Lower bound on the sampling period, whatever rate is requested.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Capture tuning.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Requested frames per second
    pub sample_fps: f64,
    /// Timer flush period
    pub batch_interval: Duration,
    /// Buffer length that triggers an immediate flush
    pub batch_size: usize,
    /// Openness below this counts as a closed eye
    pub eye_closed_threshold: f64,
    pub user_id: Option<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_fps: 2.0,
            batch_interval: Duration::from_millis(5000),
            batch_size: 10,
            eye_closed_threshold: 0.15,
            user_id: None,
        }
    }
}

impl CaptureSettings {
    /// Sampling period derived from `sample_fps`, never below 200 ms.
    ///
    /// A non-positive or non-finite rate falls back to one frame per second.
    pub fn sample_interval(&self) -> Duration {
        if !(self.sample_fps.is_finite() && self.sample_fps > 0.0) {
            return Duration::from_secs(1);
        }
        let ms = (1000.0 / self.sample_fps).round() as u64;
        Duration::from_millis(ms).max(MIN_SAMPLE_INTERVAL)
    }
}

/// What a single sampling tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Camera or model not ready; nothing queued
    Skipped,
    NoFace,
    /// A face was found but no landmark layout could be read
    Unrecognised,
    Recorded(FeatureRecord),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    SourceExhausted,
}

/// Summary returned when capture ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub stop_reason: StopReason,
    /// Records delivered by the teardown flush, `None` if nothing went out
    pub final_flush: Option<usize>,
    /// Records still buffered at teardown that the final send failed to deliver
    pub discarded: usize,
}

/// Owns the sampling clock and the upload buffer for one capture session.
pub struct CaptureLoop<S> {
    settings: CaptureSettings,
    extractor: FeatureExtractor,
    uploader: BatchUploader<S>,
    log: SharedTransparencyLog,
    capture_id: Uuid,
}

impl<S: BatchSink> CaptureLoop<S> {
    pub fn new(
        settings: CaptureSettings,
        extractor: FeatureExtractor,
        uploader: BatchUploader<S>,
        log: SharedTransparencyLog,
    ) -> Self {
        Self {
            settings,
            extractor,
            uploader,
            log,
            capture_id: Uuid::new_v4(),
        }
    }

    pub fn capture_id(&self) -> Uuid {
        self.capture_id
    }

    pub fn uploader(&self) -> &BatchUploader<S> {
        &self.uploader
    }

    /// Run until `shutdown` resolves or the source runs dry.
    ///
    /// The camera is released and both timers are stopped before the final
    /// best-effort flush, so no tick can fire after teardown begins.
    pub async fn run<F, Sd>(&self, source: F, shutdown: Sd) -> Result<CaptureOutcome, SourceError>
    where
        F: FrameSource,
        Sd: Future<Output = ()>,
    {
        let mut camera = CameraGuard::open(source).map_err(|e| {
            tracing::warn!("Camera init failed: {e}");
            e
        })?;

        let sample_every = self.settings.sample_interval();
        let start = Instant::now();
        let mut sampler = interval_at(start + sample_every, sample_every);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut flusher = interval_at(
            start + self.settings.batch_interval,
            self.settings.batch_interval,
        );
        flusher.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            capture_id = %self.capture_id,
            sample_ms = sample_every.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "Capture started"
        );

        let mut tracker = BlinkTracker::new(Utc::now());
        let mut in_flight: JoinSet<FlushOutcome> = JoinSet::new();
        tokio::pin!(shutdown);

        let stop_reason = loop {
            tokio::select! {
                _ = &mut shutdown => break StopReason::Shutdown,
                _ = sampler.tick() => {
                    camera.advance();
                    if camera.is_exhausted() {
                        break StopReason::SourceExhausted;
                    }
                    let outcome = self.sample(&mut *camera, &mut tracker, Utc::now());
                    if let SampleOutcome::Recorded(record) = outcome {
                        self.buffer(record, &mut in_flight);
                    }
                }
                _ = flusher.tick() => {
                    if let Some(batch) = self.uploader.take_batch() {
                        let uploader = self.uploader.clone();
                        in_flight.spawn(async move { uploader.deliver(batch).await });
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Ok(outcome) = joined {
                        self.account(outcome);
                    }
                }
            }
        };

        drop(camera);
        drop(sampler);
        drop(flusher);

        while let Some(joined) = in_flight.join_next().await {
            if let Ok(outcome) = joined {
                self.account(outcome);
            }
        }

        let (final_flush, discarded) = match self.uploader.flush_final().await {
            Ok(0) => (None, 0),
            Ok(sent) => {
                self.log.record(Counter::BatchesSent);
                (Some(sent), 0)
            }
            Err(discarded) => {
                self.log.record(Counter::BatchesFailed);
                self.log
                    .record_many(Counter::RecordsDropped, discarded as u64);
                (None, discarded)
            }
        };

        tracing::info!(capture_id = %self.capture_id, ?stop_reason, "Capture stopped");
        Ok(CaptureOutcome {
            stop_reason,
            final_flush,
            discarded,
        })
    }

    /// Process the source's current frame. Never fails: every problem becomes
    /// a non-recording outcome.
    pub fn sample<F: FrameSource + ?Sized>(
        &self,
        source: &mut F,
        tracker: &mut BlinkTracker,
        now: DateTime<Utc>,
    ) -> SampleOutcome {
        if !source.is_ready() {
            self.log.record(Counter::TicksSkipped);
            return SampleOutcome::Skipped;
        }

        let faces = match source.detect() {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!("Frame processing failed: {e}");
                self.log.record(Counter::TicksSkipped);
                return SampleOutcome::Skipped;
            }
        };
        self.log.record(Counter::FramesSampled);

        let Some(face) = faces.first() else {
            self.log.record(Counter::FramesWithoutFace);
            return SampleOutcome::NoFace;
        };
        let Some(landmarks) = face.landmarks() else {
            self.log.record(Counter::UnrecognisedLandmarks);
            return SampleOutcome::Unrecognised;
        };

        let features = self.extractor.extract(&landmarks);
        let threshold = self.settings.eye_closed_threshold;
        tracker.update(
            features.eye_open_left >= threshold,
            features.eye_open_right >= threshold,
            now,
        );

        SampleOutcome::Recorded(FeatureRecord {
            timestamp: now,
            user_id: self.settings.user_id.clone(),
            head_pitch: features.head_pose.pitch,
            head_yaw: features.head_pose.yaw,
            eye_open_left: features.eye_open_left,
            eye_open_right: features.eye_open_right,
            blink_rate: tracker.blink_rate(),
            gaze_attention: features.gaze_attention,
            extra: serde_json::json!({
                "raw_landmarks_count": landmarks.len(),
                "capture_id": self.capture_id,
            }),
        })
    }

    /// Append a record and fire a send if the size trigger is reached.
    fn buffer(&self, record: FeatureRecord, in_flight: &mut JoinSet<FlushOutcome>) {
        let pushed = self.uploader.push(record);
        self.log.record(Counter::RecordsBuffered);
        self.log
            .record_many(Counter::RecordsDropped, pushed.dropped as u64);

        if pushed.len >= self.settings.batch_size {
            if let Some(batch) = self.uploader.take_batch() {
                let uploader = self.uploader.clone();
                in_flight.spawn(async move { uploader.deliver(batch).await });
            }
        }
    }

    fn account(&self, outcome: FlushOutcome) {
        match outcome {
            FlushOutcome::Empty => {}
            FlushOutcome::Sent(_) => self.log.record(Counter::BatchesSent),
            FlushOutcome::Requeued { dropped, .. } => {
                self.log.record(Counter::BatchesFailed);
                self.log.record_many(Counter::RecordsDropped, dropped as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::tests::frontal_face;
    use crate::core::uploader::tests::MockSink;
    use crate::core::uploader::MAX_BUFFERED_RECORDS;
    use crate::landmarks::source::{RecordedFrame, ReplaySource};
    use crate::landmarks::types::DetectedFace;
    use crate::transparency::create_shared_log;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn open_face() -> RecordedFrame {
        Some(vec![DetectedFace::from_points(frontal_face(0.06).points())])
    }

    fn closed_face() -> RecordedFrame {
        Some(vec![DetectedFace::from_points(frontal_face(0.001).points())])
    }

    fn capture(sink: MockSink, settings: CaptureSettings) -> CaptureLoop<MockSink> {
        let uploader = BatchUploader::new(sink, MAX_BUFFERED_RECORDS)
            .with_user_id(settings.user_id.clone());
        CaptureLoop::new(
            settings,
            FeatureExtractor::default(),
            uploader,
            create_shared_log(),
        )
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_sample_interval_clamped() {
        let mut settings = CaptureSettings::default();
        assert_eq!(settings.sample_interval(), Duration::from_millis(500));
        settings.sample_fps = 30.0;
        assert_eq!(settings.sample_interval(), MIN_SAMPLE_INTERVAL);
        settings.sample_fps = 3.0;
        assert_eq!(settings.sample_interval(), Duration::from_millis(333));
        settings.sample_fps = 0.0;
        assert_eq!(settings.sample_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_sample_outcomes() {
        let cap = capture(MockSink::default(), CaptureSettings::default());
        let mut tracker = BlinkTracker::new(at(0));
        let unknown: DetectedFace =
            serde_json::from_value(json!({ "scaledMesh": [1, 2, 3] })).unwrap();
        let mut source =
            ReplaySource::from_frames(vec![None, Some(vec![]), Some(vec![unknown]), open_face()]);
        source.open().unwrap();

        let mut outcomes = Vec::new();
        for i in 0..4 {
            source.advance();
            outcomes.push(cap.sample(&mut source, &mut tracker, at(i * 500)));
        }

        assert_eq!(outcomes[0], SampleOutcome::Skipped);
        assert_eq!(outcomes[1], SampleOutcome::NoFace);
        assert_eq!(outcomes[2], SampleOutcome::Unrecognised);
        let SampleOutcome::Recorded(record) = &outcomes[3] else {
            panic!("expected a record");
        };
        assert_eq!(record.timestamp, at(1500));
        assert_eq!(record.extra["raw_landmarks_count"], 478);
        assert_eq!(record.blink_rate, 0.0);

        let stats = cap.log.stats();
        assert_eq!(stats.ticks_skipped, 1);
        assert_eq!(stats.frames_sampled, 3);
        assert_eq!(stats.frames_without_face, 1);
        assert_eq!(stats.unrecognised_landmarks, 1);
    }

    #[test]
    fn test_only_first_face_is_used() {
        let cap = capture(MockSink::default(), CaptureSettings::default());
        let mut tracker = BlinkTracker::new(at(0));
        let garbage: DetectedFace = serde_json::from_value(json!({ "keypoints": [] })).unwrap();
        let mut faces = open_face().unwrap();
        faces.push(garbage);
        let mut source = ReplaySource::from_frames(vec![Some(faces)]);
        source.open().unwrap();
        source.advance();
        assert!(matches!(
            cap.sample(&mut source, &mut tracker, at(0)),
            SampleOutcome::Recorded(_)
        ));
    }

    #[test]
    fn test_blinks_flow_into_records() {
        let cap = capture(MockSink::default(), CaptureSettings::default());
        let mut tracker = BlinkTracker::new(at(0));
        let mut source = ReplaySource::from_frames(vec![
            open_face(),
            closed_face(),
            closed_face(),
            open_face(),
        ]);
        source.open().unwrap();

        let mut last = None;
        for i in 0..4 {
            source.advance();
            last = Some(cap.sample(&mut source, &mut tracker, at(i * 500)));
        }
        let Some(SampleOutcome::Recorded(record)) = last else {
            panic!("expected a record");
        };
        // Both eyes blinked once.
        assert_eq!(record.blink_rate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_and_timer_flushes_deliver_everything() {
        let settings = CaptureSettings {
            user_id: Some("student-1".to_string()),
            ..CaptureSettings::default()
        };
        let cap = capture(MockSink::default(), settings);
        let frames: Vec<RecordedFrame> = (0..25).map(|_| open_face()).collect();

        let outcome = cap
            .run(ReplaySource::from_frames(frames), std::future::pending())
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::SourceExhausted);

        let sink = cap.uploader().sink();
        assert_eq!(sink.delivered(), 25);
        let received = sink.received.lock().unwrap();
        assert!(received.iter().all(|b| !b.is_empty() && b.len() <= 10));
        assert!(received
            .iter()
            .all(|b| b.user_id.as_deref() == Some("student-1")));

        let timestamps: Vec<_> = received
            .iter()
            .flat_map(|b| b.items.iter().map(|r| r.timestamp))
            .collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(cap.uploader().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_trigger_fires_on_batch_size() {
        let settings = CaptureSettings {
            batch_size: 3,
            batch_interval: Duration::from_secs(3600),
            ..CaptureSettings::default()
        };
        let cap = capture(MockSink::default(), settings);
        let frames: Vec<RecordedFrame> = (0..7).map(|_| open_face()).collect();
        cap.run(ReplaySource::from_frames(frames), std::future::pending())
            .await
            .unwrap();

        let sizes: Vec<usize> = cap
            .uploader()
            .sink()
            .received
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.len())
            .collect();
        // Two size-triggered batches, then the teardown flush picks up the rest.
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_backend_keeps_buffer_bounded() {
        let settings = CaptureSettings {
            sample_fps: 5.0,
            ..CaptureSettings::default()
        };
        let cap = capture(MockSink::failing(), settings);
        let frames: Vec<RecordedFrame> = (0..700).map(|_| open_face()).collect();
        let outcome = cap
            .run(ReplaySource::from_frames(frames), std::future::pending())
            .await
            .unwrap();

        assert_eq!(outcome.final_flush, None);
        assert!(outcome.discarded > 0 && outcome.discarded <= MAX_BUFFERED_RECORDS);
        assert!(cap.uploader().is_empty());
        let stats = cap.log.stats();
        assert_eq!(stats.records_buffered, 700);
        // Nothing was delivered, so every record is accounted for as dropped.
        assert_eq!(stats.records_dropped, 700);
        assert!(stats.batches_failed > 0);
        assert!(cap.uploader().sink().calls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_and_flushes() {
        let cap = capture(MockSink::default(), CaptureSettings::default());
        let frames: Vec<RecordedFrame> = (0..1000).map(|_| open_face()).collect();
        let shutdown = tokio::time::sleep(Duration::from_millis(2_100));

        let outcome = cap
            .run(ReplaySource::from_frames(frames), shutdown)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Shutdown);
        // Ticks at 0.5, 1.0, 1.5 and 2.0 s.
        assert_eq!(outcome.final_flush, Some(4));
        assert_eq!(outcome.discarded, 0);
        assert_eq!(cap.uploader().sink().delivered(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_flushes_below_batch_size() {
        let settings = CaptureSettings {
            batch_size: 1000,
            batch_interval: Duration::from_millis(1_100),
            ..CaptureSettings::default()
        };
        let cap = capture(MockSink::default(), settings);
        let frames: Vec<RecordedFrame> = (0..1000).map(|_| open_face()).collect();
        let shutdown = tokio::time::sleep(Duration::from_millis(3_400));

        let outcome = cap
            .run(ReplaySource::from_frames(frames), shutdown)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Shutdown);
        // Samples every 0.5 s, flushes at 1.1, 2.2 and 3.3 s: nothing is left
        // for teardown.
        assert_eq!(outcome.final_flush, None);
        assert_eq!(outcome.discarded, 0);

        let sink = cap.uploader().sink();
        let sizes: Vec<usize> = sink.received.lock().unwrap().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 2]);
        assert_eq!(sink.delivered(), 6);
        assert_eq!(cap.log.stats().batches_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_final_flush_is_counted() {
        let cap = capture(MockSink::failing(), CaptureSettings::default());
        let frames: Vec<RecordedFrame> = (0..3).map(|_| open_face()).collect();

        let outcome = cap
            .run(ReplaySource::from_frames(frames), std::future::pending())
            .await
            .unwrap();
        assert_eq!(outcome.final_flush, None);
        assert_eq!(outcome.discarded, 3);

        let stats = cap.log.stats();
        assert_eq!(stats.records_dropped, 3);
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.batches_sent, 0);
    }

    #[tokio::test]
    async fn test_camera_failure_is_reported() {
        let cap = capture(MockSink::default(), CaptureSettings::default());
        let result = cap
            .run(
                ReplaySource::from_jsonl("/nonexistent/frames.jsonl"),
                std::future::pending(),
            )
            .await;
        assert!(matches!(result, Err(SourceError::Open(_))));
    }
}
