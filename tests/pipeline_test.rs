//! End-to-end tests: recorded landmarks -> capture loop -> scoring -> session analytics

use chrono::Utc;
use engagement_agent::core::{
    BatchSink, BatchUploader, CaptureLoop, CaptureSettings, EngagementBatch, ExtractorConfig,
    FeatureExtractor, HeuristicScorer, SessionAggregator, SessionStore, SinkError, StopReason,
};
use engagement_agent::landmarks::{RecordedFrame, ReplaySource};
use engagement_agent::transparency::create_shared_log;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sink that scores batches straight into an in-process session store.
struct StoreSink {
    store: Arc<Mutex<SessionStore>>,
    scorer: HeuristicScorer,
}

impl BatchSink for StoreSink {
    async fn send_batch(&self, batch: &EngagementBatch) -> Result<(), SinkError> {
        let mut store = self.store.lock().unwrap();
        store
            .ingest(batch.session_id, &batch.items, &self.scorer)
            .map(|_| ())
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// 478-point face in the `[x, y, z]` layout, eyes level.
fn face(nose_x: f64, lid_gap: f64) -> serde_json::Value {
    let cfg = ExtractorConfig::default();
    let mut points = vec![[0.0_f64; 3]; 478];

    for &i in &cfg.left_eye_group {
        points[i] = [0.35, 0.4, 0.0];
    }
    for &i in &cfg.right_eye_group {
        points[i] = [0.65, 0.4, 0.0];
    }
    for (eye, cx) in [(cfg.left_eye, 0.35), (cfg.right_eye, 0.65)] {
        points[eye.inner_corner] = [cx - 0.05, 0.4, 0.0];
        points[eye.outer_corner] = [cx + 0.05, 0.4, 0.0];
        points[eye.upper_lid] = [cx, 0.4 - lid_gap / 2.0, 0.0];
        points[eye.lower_lid] = [cx, 0.4 + lid_gap / 2.0, 0.0];
    }
    points[cfg.nose_tip] = [nose_x, 0.55, -0.05];

    serde_json::json!([{ "scaledMesh": points }])
}

fn engaged() -> serde_json::Value {
    face(0.5, 0.06)
}

/// Looking far off to the side with eyes shut.
fn distracted() -> serde_json::Value {
    face(0.9, 0.001)
}

#[tokio::test(start_paused = true)]
async fn test_replay_is_scored_into_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();

    writeln!(file, "null").unwrap();
    writeln!(file, "[]").unwrap();
    writeln!(file, "{}", serde_json::json!([{ "keypoints": [] }])).unwrap();
    for _ in 0..2 {
        for _ in 0..6 {
            writeln!(file, "{}", engaged()).unwrap();
        }
        for _ in 0..4 {
            writeln!(file, "{}", distracted()).unwrap();
        }
    }
    drop(file);

    let store = Arc::new(Mutex::new(SessionStore::new()));
    let session = store.lock().unwrap().create("Reading", None, Utc::now());

    let settings = CaptureSettings {
        sample_fps: 5.0,
        batch_size: 100,
        batch_interval: Duration::from_secs(3600),
        user_id: Some("student-9".to_string()),
        ..CaptureSettings::default()
    };
    let sink = StoreSink {
        store: Arc::clone(&store),
        scorer: HeuristicScorer::default(),
    };
    let uploader = BatchUploader::new(sink, 500)
        .with_user_id(settings.user_id.clone())
        .with_session_id(Some(session.id));
    let log = create_shared_log();
    let capture = CaptureLoop::new(
        settings,
        FeatureExtractor::default(),
        uploader,
        log.clone(),
    );

    let outcome = capture
        .run(ReplaySource::from_jsonl(&path), std::future::pending())
        .await
        .unwrap();
    assert_eq!(outcome.stop_reason, StopReason::SourceExhausted);
    assert_eq!(outcome.final_flush, Some(20));
    assert_eq!(outcome.discarded, 0);

    let stats = log.stats();
    assert_eq!(stats.ticks_skipped, 1);
    assert_eq!(stats.frames_without_face, 1);
    assert_eq!(stats.unrecognised_landmarks, 1);
    assert_eq!(stats.frames_sampled, 22);
    assert_eq!(stats.records_buffered, 20);
    assert_eq!(stats.records_dropped, 0);

    let mut store = store.lock().unwrap();
    store
        .end(session.id, Utc::now() + chrono::Duration::seconds(1))
        .unwrap();
    let series = store.series(session.id).unwrap();
    assert_eq!(series.len(), 20);

    let scores: Vec<f64> = series.iter().filter_map(|p| p.score).collect();
    assert!((scores[0] - 1.0).abs() < 1e-9);
    assert!((scores[6] - 0.2).abs() < 1e-9);

    let analytics = SessionAggregator::default().advanced(&series);
    assert_eq!(analytics.attention_score, 75);
    assert_eq!(analytics.focus_time_percentage, 60.0);
    assert_eq!(analytics.distraction_spikes.len(), 2);
    assert!(analytics
        .distraction_spikes
        .iter()
        .all(|s| (s.drop - 0.8).abs() < 1e-9));

    let report = store.report(session.id, &SessionAggregator::default()).unwrap();
    assert_eq!(report.analytics.summary.total_points, 20);
    assert_eq!(report.analytics.critical_moments.total_spikes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_records_outside_session_are_rejected() {
    let store = Arc::new(Mutex::new(SessionStore::new()));
    let session = store.lock().unwrap().create("Late", None, Utc::now());
    store.lock().unwrap().end(session.id, Utc::now()).unwrap();

    let sink = StoreSink {
        store: Arc::clone(&store),
        scorer: HeuristicScorer::default(),
    };
    let uploader = BatchUploader::new(sink, 500).with_session_id(Some(session.id));
    let log = create_shared_log();
    let capture = CaptureLoop::new(
        CaptureSettings::default(),
        FeatureExtractor::default(),
        uploader,
        log.clone(),
    );

    let frames: Vec<RecordedFrame> = (0..3)
        .map(|_| serde_json::from_value(engaged()).unwrap())
        .collect();
    let outcome = capture
        .run(ReplaySource::from_frames(frames), std::future::pending())
        .await
        .unwrap();

    // The backend refuses the ended session, so nothing is delivered.
    assert_eq!(outcome.final_flush, None);
    assert_eq!(outcome.discarded, 3);
    assert_eq!(log.stats().records_buffered, 3);
    assert_eq!(log.stats().records_dropped, 3);
    assert!(store.lock().unwrap().series(session.id).unwrap().is_empty());
}
