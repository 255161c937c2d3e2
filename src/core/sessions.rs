//! In-memory engagement sessions and their score series.
//!
//! A session accepts points while it is open. Every point must fall inside the
//! session's `[started_at, ended_at)` range; anything outside is rejected at
//! ingest and filtered out again when the series is read.

use crate::core::analytics::{ComprehensiveAnalytics, ScorePoint, SessionAggregator};
use crate::core::record::FeatureRecord;
use crate::core::scoring::EngagementScorer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type SessionId = u64;

/// An engagement session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub subject: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Whether `timestamp` falls within `[started_at, ended_at)`.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.started_at && self.ended_at.map_or(true, |end| timestamp < end)
    }

    /// Seconds from start to end, or to `now` while the session is open.
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).num_seconds().max(0)
    }
}

/// Session store errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    NotFound(SessionId),
    /// The session no longer accepts points or polling
    Ended(SessionId),
    /// The session is still open
    NotEnded(SessionId),
    /// No session id was given and no session is open
    NoActiveSession,
    OutOfRange {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
    InvalidScore(f64),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotFound(id) => write!(f, "Session {id} not found"),
            SessionError::Ended(id) => write!(f, "Session {id} has ended"),
            SessionError::NotEnded(id) => write!(f, "Session {id} must be ended first"),
            SessionError::NoActiveSession => write!(f, "No active session"),
            SessionError::OutOfRange {
                session_id,
                timestamp,
            } => write!(
                f,
                "Timestamp {} is outside session {session_id}",
                timestamp.to_rfc3339()
            ),
            SessionError::InvalidScore(score) => {
                write!(f, "Score {score} is outside [0, 1]")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Result of ingesting a batch of feature records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub session_id: SessionId,
    pub accepted: usize,
    /// Records timestamped outside the session
    pub rejected: usize,
}

/// Basic statistics served by the `analytics` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAnalytics {
    pub session_id: SessionId,
    pub avg_score: f64,
    pub max_score: f64,
    pub min_score: f64,
    pub total_points: usize,
    pub duration_seconds: i64,
}

/// Report for an ended session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub title: String,
    pub subject: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub analytics: ComprehensiveAnalytics,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: BTreeMap<SessionId, Session>,
    points: HashMap<SessionId, Vec<ScorePoint>>,
    next_id: SessionId,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        title: impl Into<String>,
        subject: Option<String>,
        now: DateTime<Utc>,
    ) -> Session {
        self.next_id += 1;
        let session = Session {
            id: self.next_id,
            title: title.into(),
            subject,
            started_at: now,
            ended_at: None,
        };
        self.sessions.insert(session.id, session.clone());
        self.points.insert(session.id, Vec::new());
        tracing::info!(session_id = session.id, "Session started");
        session
    }

    pub fn get(&self, id: SessionId) -> Result<&Session, SessionError> {
        self.sessions.get(&id).ok_or(SessionError::NotFound(id))
    }

    /// End a session. Ending an already ended session is a no-op.
    pub fn end(&mut self, id: SessionId, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound(id))?;
        if session.ended_at.is_none() {
            session.ended_at = Some(now.max(session.started_at));
            tracing::info!(session_id = id, "Session ended");
        }
        Ok(session.clone())
    }

    /// Most recently started session that is still open.
    pub fn latest_active(&self) -> Option<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.is_active())
            .max_by_key(|s| (s.started_at, s.id))
            .map(|s| s.id)
    }

    /// Add one scored point to an open session.
    pub fn add_point(
        &mut self,
        id: SessionId,
        score: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<ScorePoint, SessionError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(SessionError::InvalidScore(score));
        }
        let session = self.open_session(id)?;
        if !session.contains(timestamp) {
            return Err(SessionError::OutOfRange {
                session_id: id,
                timestamp,
            });
        }

        let point = ScorePoint::new(timestamp, score);
        self.insert_point(id, point.clone());
        Ok(point)
    }

    /// Score and store uploaded records.
    ///
    /// Without a session id the latest open session is used. Records outside
    /// the session's range are counted as rejected and dropped.
    pub fn ingest<E: EngagementScorer + ?Sized>(
        &mut self,
        session_id: Option<SessionId>,
        records: &[FeatureRecord],
        scorer: &E,
    ) -> Result<IngestSummary, SessionError> {
        let id = match session_id {
            Some(id) => id,
            None => self.latest_active().ok_or(SessionError::NoActiveSession)?,
        };
        let session = self.open_session(id)?.clone();

        let mut summary = IngestSummary {
            session_id: id,
            accepted: 0,
            rejected: 0,
        };
        for record in records {
            if !session.contains(record.timestamp) {
                summary.rejected += 1;
                continue;
            }
            let score = scorer.score(record);
            self.insert_point(id, ScorePoint::new(record.timestamp, score));
            summary.accepted += 1;
        }

        if summary.rejected > 0 {
            tracing::debug!(
                session_id = id,
                rejected = summary.rejected,
                "Dropped records outside the session range"
            );
        }
        Ok(summary)
    }

    /// Full series in timestamp order.
    pub fn series(&self, id: SessionId) -> Result<Vec<ScorePoint>, SessionError> {
        let session = self.get(id)?;
        Ok(self
            .points
            .get(&id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| session.contains(p.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Points strictly after `since` (all points when `None`).
    ///
    /// Polling stops once the session has ended.
    pub fn updates_since(
        &self,
        id: SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ScorePoint>, SessionError> {
        let series = self.series(id)?;
        if !self.get(id)?.is_active() {
            return Err(SessionError::Ended(id));
        }
        Ok(match since {
            Some(since) => series.into_iter().filter(|p| p.timestamp > since).collect(),
            None => series,
        })
    }

    /// Average, range and count of the session's scores, rounded to three
    /// decimals.
    pub fn basic_analytics(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<BasicAnalytics, SessionError> {
        let session = self.get(id)?;
        let scores: Vec<f64> = self.series(id)?.iter().filter_map(|p| p.score).collect();
        let duration_seconds = session.duration_seconds(now);

        if scores.is_empty() {
            return Ok(BasicAnalytics {
                session_id: id,
                avg_score: 0.0,
                max_score: 0.0,
                min_score: 0.0,
                total_points: 0,
                duration_seconds,
            });
        }

        let sum: f64 = scores.iter().sum();
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let round3 = |v: f64| (v * 1000.0).round() / 1000.0;

        Ok(BasicAnalytics {
            session_id: id,
            avg_score: round3(sum / scores.len() as f64),
            max_score: round3(max),
            min_score: round3(min),
            total_points: scores.len(),
            duration_seconds,
        })
    }

    /// The session, if it has ended; reports are only built for ended sessions.
    pub fn ended(&self, id: SessionId) -> Result<&Session, SessionError> {
        let session = self.get(id)?;
        if session.is_active() {
            return Err(SessionError::NotEnded(id));
        }
        Ok(session)
    }

    /// Comprehensive report for an ended session.
    pub fn report(
        &self,
        id: SessionId,
        aggregator: &SessionAggregator,
    ) -> Result<SessionReport, SessionError> {
        let session = self.ended(id)?;
        let ended_at = session.ended_at.ok_or(SessionError::NotEnded(id))?;
        let analytics = aggregator.comprehensive(&self.series(id)?);

        Ok(SessionReport {
            session_id: id,
            title: session.title.clone(),
            subject: session.subject.clone(),
            started_at: session.started_at,
            ended_at,
            generated_at: analytics.computed_at,
            analytics,
        })
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    fn open_session(&self, id: SessionId) -> Result<&Session, SessionError> {
        let session = self.get(id)?;
        if !session.is_active() {
            return Err(SessionError::Ended(id));
        }
        Ok(session)
    }

    fn insert_point(&mut self, id: SessionId, point: ScorePoint) {
        let points = self.points.entry(id).or_default();
        let at = points.partition_point(|p| p.timestamp <= point.timestamp);
        points.insert(at, point);
    }
}
