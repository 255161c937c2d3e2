//! Frame sources: the seam between the capture loop and a camera + detector.
//!
//! A real deployment wraps a webcam and a face-landmark model behind
//! [`FrameSource`]. This crate ships [`ReplaySource`], which replays recorded
//! detector output and is what the CLI and tests drive.

use crate::landmarks::types::DetectedFace;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Errors raised while acquiring or reading a frame source.
#[derive(Debug)]
pub enum SourceError {
    /// The device (or recording) could not be opened
    Open(String),
    /// A recorded frame could not be parsed
    Parse { line: usize, message: String },
    /// Detection was requested on a closed source
    Closed,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open(e) => write!(f, "Could not open frame source: {e}"),
            SourceError::Parse { line, message } => {
                write!(f, "Invalid frame on line {line}: {message}")
            }
            SourceError::Closed => write!(f, "Frame source is closed"),
        }
    }
}

impl std::error::Error for SourceError {}

/// A camera paired with a landmark detector.
pub trait FrameSource {
    /// Acquire the underlying device.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Move to the next frame. Called once per sampling tick.
    fn advance(&mut self) {}

    /// Whether the current frame can be run through the detector.
    fn is_ready(&self) -> bool;

    /// Run detection on the current frame and return every face found.
    fn detect(&mut self) -> Result<Vec<DetectedFace>, SourceError>;

    /// Release the device. Must be idempotent.
    fn close(&mut self);

    /// True once a finite source has nothing left to produce.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Owns an opened source and closes it on every exit path.
pub struct CameraGuard<S: FrameSource> {
    source: S,
}

impl<S: FrameSource> CameraGuard<S> {
    /// Open `source`; the returned guard closes it when dropped.
    pub fn open(mut source: S) -> Result<Self, SourceError> {
        source.open()?;
        Ok(Self { source })
    }
}

impl<S: FrameSource> Deref for CameraGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.source
    }
}

impl<S: FrameSource> DerefMut for CameraGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: FrameSource> Drop for CameraGuard<S> {
    fn drop(&mut self) {
        self.source.close();
    }
}

/// One recorded frame: `None` when the video was not ready yet.
pub type RecordedFrame = Option<Vec<DetectedFace>>;

/// Replays detector output recorded as JSON Lines.
///
/// Each line is either `null` (video not ready on that tick) or an array of
/// faces in any layout [`DetectedFace`] accepts. Each tick consumes one line.
pub struct ReplaySource {
    path: Option<PathBuf>,
    pending: VecDeque<RecordedFrame>,
    current: Option<RecordedFrame>,
    open: bool,
}

impl ReplaySource {
    /// Replay a JSONL recording; the file is read when the source is opened.
    pub fn from_jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            pending: VecDeque::new(),
            current: None,
            open: false,
        }
    }

    /// Replay frames held in memory.
    pub fn from_frames(frames: impl IntoIterator<Item = RecordedFrame>) -> Self {
        Self {
            path: None,
            pending: frames.into_iter().collect(),
            current: None,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Frames not yet consumed.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn load(path: &Path) -> Result<VecDeque<RecordedFrame>, SourceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Open(format!("{}: {e}", path.display())))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<RecordedFrame>(line).map_err(|e| SourceError::Parse {
                    line: i + 1,
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

impl FrameSource for ReplaySource {
    fn open(&mut self) -> Result<(), SourceError> {
        if let Some(path) = &self.path {
            self.pending = Self::load(path)?;
        }
        self.open = true;
        Ok(())
    }

    fn advance(&mut self) {
        if self.open {
            self.current = self.pending.pop_front();
        }
    }

    fn is_ready(&self) -> bool {
        self.open && matches!(self.current, Some(Some(_)))
    }

    fn detect(&mut self) -> Result<Vec<DetectedFace>, SourceError> {
        if !self.open {
            return Err(SourceError::Closed);
        }
        Ok(self.current.take().flatten().unwrap_or_default())
    }

    fn close(&mut self) {
        self.open = false;
        self.current = None;
    }

    fn is_exhausted(&self) -> bool {
        self.open && self.pending.is_empty() && self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::types::Point3;
    use std::io::Write;

    fn face() -> DetectedFace {
        DetectedFace::from_points(&[Point3::new(0.5, 0.5, 0.0)])
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let guard =
            CameraGuard::open(ReplaySource::from_frames(vec![Some(vec![face()])])).unwrap();
        assert!(guard.is_open());

        struct Probe<'a>(&'a mut bool);
        impl FrameSource for Probe<'_> {
            fn open(&mut self) -> Result<(), SourceError> {
                Ok(())
            }
            fn is_ready(&self) -> bool {
                false
            }
            fn detect(&mut self) -> Result<Vec<DetectedFace>, SourceError> {
                Ok(Vec::new())
            }
            fn close(&mut self) {
                *self.0 = true;
            }
        }

        let mut released = false;
        drop(CameraGuard::open(Probe(&mut released)).unwrap());
        assert!(released);
    }

    #[test]
    fn test_not_ready_frames_are_consumed() {
        let mut source = ReplaySource::from_frames(vec![None, Some(vec![face()])]);
        source.open().unwrap();

        source.advance();
        assert!(!source.is_ready());

        source.advance();
        assert!(source.is_ready());
        assert_eq!(source.detect().unwrap().len(), 1);
        assert!(source.is_exhausted());
    }

    #[test]
    fn test_detect_on_closed_source() {
        let mut source = ReplaySource::from_frames(vec![Some(vec![face()])]);
        assert!(matches!(source.detect(), Err(SourceError::Closed)));
    }

    #[test]
    fn test_load_jsonl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "null").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"[{{"scaledMesh": [[0.1, 0.2, 0.3]]}}]"#).unwrap();
        writeln!(file, "[]").unwrap();

        let mut source = ReplaySource::from_jsonl(file.path());
        source.open().unwrap();
        assert_eq!(source.remaining(), 3);
    }

    #[test]
    fn test_load_reports_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[]").unwrap();
        writeln!(file, "{{not json").unwrap();

        let mut source = ReplaySource::from_jsonl(file.path());
        match source.open() {
            Err(SourceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_recording_fails_to_open() {
        let mut source = ReplaySource::from_jsonl("/nonexistent/recording.jsonl");
        assert!(matches!(source.open(), Err(SourceError::Open(_))));
    }
}
