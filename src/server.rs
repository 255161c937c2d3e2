//! HTTP aggregation service for engagement sessions.
//!
//! This module provides an HTTP server that:
//! - Creates and ends sessions
//! - Scores uploaded feature batches via POST /api/engagement/predict_batch
//! - Serves score series, incremental updates, analytics and reports
//!
//! # Architecture
//!
//! ```text
//! capture loop ──→ POST predict_batch ──→ [Scorer] ──→ SessionStore
//!                                                          ↓
//!                       dashboard ←── series / analytics / report
//! ```

use crate::core::analytics::{
    summary_report, AnalyticsConfig, ScorePoint, SessionAggregator, SessionAnalytics,
};
use crate::core::record::EngagementBatch;
use crate::core::scoring::{EngagementScorer, HeuristicScorer};
use crate::core::sessions::{
    BasicAnalytics, IngestSummary, Session, SessionError, SessionId, SessionReport, SessionStore,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Thresholds used for advanced analytics and reports
    pub analytics: AnalyticsConfig,
    /// Turns uploaded feature records into scores
    pub scorer: Arc<dyn EngagementScorer>,
}

impl ServerConfig {
    /// Create a new server configuration with default analytics and scoring
    pub fn new(port: u16) -> Self {
        Self {
            port,
            analytics: AnalyticsConfig::default(),
            scorer: Arc::new(HeuristicScorer::default()),
        }
    }

    pub fn with_analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_scorer(mut self, scorer: impl EngagementScorer + 'static) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("analytics", &self.analytics)
            .finish_non_exhaustive()
    }
}

/// Shared server state
pub struct ServerState {
    store: RwLock<SessionStore>,
    scorer: Arc<dyn EngagementScorer>,
    aggregator: SessionAggregator,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            store: RwLock::new(SessionStore::new()),
            scorer: Arc::clone(&config.scorer),
            aggregator: SessionAggregator::new(config.analytics.clone()),
        }
    }
}

/// Body of `POST /sessions`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSession {
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
}

/// Body of `POST /sessions/:id/points`
#[derive(Debug, Clone, Deserialize)]
pub struct NewPoint {
    pub score: f64,
    /// Defaults to the time the request is handled
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatesQuery {
    pub since: Option<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

impl From<SessionError> for (StatusCode, Json<ErrorResponse>) {
    fn from(e: SessionError) -> Self {
        let (status, code) = match e {
            SessionError::NotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            SessionError::Ended(_) => (StatusCode::FORBIDDEN, "SESSION_ENDED"),
            SessionError::NotEnded(_) => (StatusCode::BAD_REQUEST, "SESSION_NOT_ENDED"),
            SessionError::NoActiveSession => (StatusCode::NOT_FOUND, "NO_ACTIVE_SESSION"),
            SessionError::OutOfRange { .. } => (StatusCode::BAD_REQUEST, "OUT_OF_RANGE"),
            SessionError::InvalidScore(_) => (StatusCode::BAD_REQUEST, "INVALID_SCORE"),
        };
        api_error(status, code, e.to_string())
    }
}

/// Parse a `since` value: RFC 3339, or a naive ISO timestamp read as UTC.
fn parse_since(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/engagement/sessions
async fn create_session(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<CreateSession>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_SESSION",
            "Session title must not be empty",
        ));
    }
    let session = state
        .store
        .write()
        .await
        .create(body.title, body.subject, Utc::now());
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /api/engagement/sessions/:id/end
async fn end_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<Session>, ApiError> {
    let session = state.store.write().await.end(id, Utc::now())?;
    Ok(Json(session))
}

/// POST /api/engagement/sessions/:id/points
async fn add_point(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
    Json(body): Json<NewPoint>,
) -> Result<(StatusCode, Json<ScorePoint>), ApiError> {
    let timestamp = body.timestamp.unwrap_or_else(Utc::now);
    let point = state
        .store
        .write()
        .await
        .add_point(id, body.score, timestamp)?;
    Ok((StatusCode::CREATED, Json(point)))
}

/// POST /api/engagement/predict_batch
///
/// Scores every record and appends it to the batch's session, or to the most
/// recently started open session when the batch names none.
async fn predict_batch(
    State(state): State<Arc<ServerState>>,
    Json(batch): Json<EngagementBatch>,
) -> Result<Json<IngestSummary>, ApiError> {
    if batch.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "EMPTY_BATCH",
            "Batch contains no records",
        ));
    }

    let summary = state
        .store
        .write()
        .await
        .ingest(batch.session_id, &batch.items, state.scorer.as_ref())?;

    tracing::debug!(
        session_id = summary.session_id,
        accepted = summary.accepted,
        rejected = summary.rejected,
        "Batch ingested"
    );
    Ok(Json(summary))
}

/// GET /api/engagement/sessions/:id/series
async fn series(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<ScorePoint>>, ApiError> {
    Ok(Json(state.store.read().await.series(id)?))
}

/// GET /api/engagement/sessions/:id/series/updates?since=
async fn series_updates(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
    Query(query): Query<UpdatesQuery>,
) -> Result<Json<Vec<ScorePoint>>, ApiError> {
    let store = state.store.read().await;
    if !store.get(id)?.is_active() {
        return Err(SessionError::Ended(id).into());
    }

    let since = match query.since.as_deref() {
        Some(raw) => Some(parse_since(raw).ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_SINCE",
                format!("Invalid 'since' timestamp: {raw}"),
            )
        })?),
        None => None,
    };

    Ok(Json(store.updates_since(id, since)?))
}

/// GET /api/engagement/sessions/:id/analytics
async fn basic_analytics(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<BasicAnalytics>, ApiError> {
    Ok(Json(state.store.read().await.basic_analytics(id, Utc::now())?))
}

/// GET /api/engagement/sessions/:id/advanced-analytics
async fn advanced_analytics(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionAnalytics>, ApiError> {
    let points = state.store.read().await.series(id)?;
    Ok(Json(state.aggregator.advanced(&points)))
}

/// GET /api/engagement/sessions/:id/report
async fn report(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionReport>, ApiError> {
    Ok(Json(state.store.read().await.report(id, &state.aggregator)?))
}

/// GET /api/engagement/sessions/:id/report/text
async fn report_text(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SessionId>,
) -> Result<String, ApiError> {
    let report = state.store.read().await.report(id, &state.aggregator)?;
    let mut text = format!("Session: {}\n", report.title);
    if let Some(subject) = &report.subject {
        text.push_str(&format!("Subject: {subject}\n"));
    }
    text.push_str(&format!(
        "Started: {}\nEnded: {}\n\n",
        report.started_at.to_rfc3339(),
        report.ended_at.to_rfc3339()
    ));
    text.push_str(&summary_report(&report.analytics));
    Ok(text)
}

/// Build the router over `state`.
pub fn router(state: Arc<ServerState>) -> Router {
    let api = Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id/end", post(end_session))
        .route("/sessions/:id/points", post(add_point))
        .route("/sessions/:id/series", get(series))
        .route("/sessions/:id/series/updates", get(series_updates))
        .route("/sessions/:id/analytics", get(basic_analytics))
        .route("/sessions/:id/advanced-analytics", get(advanced_analytics))
        .route("/sessions/:id/report", get(report))
        .route("/sessions/:id/report/text", get(report_text))
        .route("/predict_batch", post(predict_batch));

    Router::new()
        .route("/health", get(health))
        .nest("/api/engagement", api)
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://localhost:3000"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    HeaderValue::from_static("http://127.0.0.1:3000"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Engagement service listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
