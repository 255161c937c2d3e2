//! HTTP client for the engagement backend.
//!
//! Posts feature batches and reads back session series, analytics and reports.
//! A bearer token is attached when one is configured; without one, requests
//! are still sent and the backend decides whether to accept them.

use crate::config::GatewaySettings;
use crate::core::analytics::{ScorePoint, SessionAnalytics};
use crate::core::record::EngagementBatch;
use crate::core::sessions::{BasicAnalytics, Session, SessionId, SessionReport};
use crate::core::uploader::{BatchSink, SinkError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Backend root without a trailing slash
    pub base_url: String,
    /// Bearer token, if any
    pub token: Option<String>,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, token }
    }

    /// Build from config-file settings, reading the token file if one is set.
    ///
    /// An unreadable token file is logged and the client runs without a token.
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        let token = settings
            .token_path
            .as_deref()
            .and_then(|path| match read_token(path) {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!("Continuing without a bearer token: {e}");
                    None
                }
            });
        Self::new(settings.base_url.clone(), token)
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/engagement{path}", self.base_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    pub fn predict_batch_url(&self) -> String {
        self.api("/predict_batch")
    }

    pub fn sessions_url(&self) -> String {
        self.api("/sessions")
    }

    pub fn session_url(&self, id: SessionId, tail: &str) -> String {
        self.api(&format!("/sessions/{id}{tail}"))
    }
}

/// Read a bearer token from a file. An empty file means no token.
pub fn read_token(path: &Path) -> Result<Option<String>, GatewayError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!("Failed to read token from {path:?}: {e}"))
    })?;
    let token = raw.trim();
    Ok((!token.is_empty()).then(|| token.to_string()))
}

/// Gateway client error types.
#[derive(Debug)]
pub enum GatewayError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "Gateway config error: {msg}"),
            GatewayError::Network(msg) => write!(f, "Gateway network error: {msg}"),
            GatewayError::Server { status, message } => {
                write!(f, "Gateway server error ({status}): {message}")
            }
            GatewayError::Serialization(msg) => write!(f, "Gateway serialization error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Acknowledgement returned by `predict_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAck {
    pub session_id: SessionId,
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Serialize)]
struct NewSession<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewPoint {
    score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

/// Async client for the engagement backend.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Test connection to the backend.
    pub async fn health(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }

    /// `POST /api/engagement/predict_batch`, decoding this crate's service
    /// acknowledgement. The capture path uses [`BatchSink::send_batch`], which
    /// only needs a 2xx.
    pub async fn post_batch(&self, batch: &EngagementBatch) -> Result<BatchAck, GatewayError> {
        if batch.is_empty() {
            return Err(GatewayError::Config("No records to send".to_string()));
        }
        let request = self.client.post(self.config.predict_batch_url()).json(batch);
        self.send_json(request).await
    }

    pub async fn create_session(
        &self,
        title: &str,
        subject: Option<&str>,
    ) -> Result<Session, GatewayError> {
        let request = self
            .client
            .post(self.config.sessions_url())
            .json(&NewSession { title, subject });
        self.send_json(request).await
    }

    pub async fn end_session(&self, id: SessionId) -> Result<Session, GatewayError> {
        let request = self.client.post(self.config.session_url(id, "/end"));
        self.send_json(request).await
    }

    pub async fn add_point(
        &self,
        id: SessionId,
        score: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<ScorePoint, GatewayError> {
        let request = self
            .client
            .post(self.config.session_url(id, "/points"))
            .json(&NewPoint { score, timestamp });
        self.send_json(request).await
    }

    /// Full ordered series of a session.
    pub async fn series(&self, id: SessionId) -> Result<Vec<ScorePoint>, GatewayError> {
        self.get_json(&self.config.session_url(id, "/series")).await
    }

    /// Points strictly after `since`.
    pub async fn series_updates(
        &self,
        id: SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ScorePoint>, GatewayError> {
        let mut request = self
            .client
            .get(self.config.session_url(id, "/series/updates"));
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        self.send_json(request).await
    }

    pub async fn basic_analytics(&self, id: SessionId) -> Result<BasicAnalytics, GatewayError> {
        self.get_json(&self.config.session_url(id, "/analytics")).await
    }

    pub async fn advanced_analytics(
        &self,
        id: SessionId,
    ) -> Result<SessionAnalytics, GatewayError> {
        self.get_json(&self.config.session_url(id, "/advanced-analytics"))
            .await
    }

    pub async fn report(&self, id: SessionId) -> Result<SessionReport, GatewayError> {
        self.get_json(&self.config.session_url(id, "/report")).await
    }

    pub async fn report_text(&self, id: SessionId) -> Result<String, GatewayError> {
        let request = self.client.get(self.config.session_url(id, "/report/text"));
        let response = self.send(request).await?;
        response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))
    }

    /// Rendered PDF report bytes, for backends that render one.
    pub async fn report_pdf(&self, id: SessionId) -> Result<Vec<u8>, GatewayError> {
        let request = self.client.get(self.config.session_url(id, "/report/pdf"));
        let response = self.send(request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GatewayError> {
        self.send_json(self.client.get(url)).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let request = match self.config.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

/// Any 2xx counts as delivered; the response body is not read.
impl BatchSink for GatewayClient {
    async fn send_batch(&self, batch: &EngagementBatch) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Err(SinkError("No records to send".to_string()));
        }
        let request = self.client.post(self.config.predict_batch_url()).json(batch);
        self.send(request)
            .await
            .map(|_| ())
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// Incremental reader over `series/updates`.
///
/// Remembers the newest timestamp seen so each poll only returns new points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCursor {
    session_id: SessionId,
    last_seen: Option<DateTime<Utc>>,
}

impl SeriesCursor {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            last_seen: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Fetch points newer than the last poll.
    pub async fn poll(&mut self, client: &GatewayClient) -> Result<Vec<ScorePoint>, GatewayError> {
        let points = client
            .series_updates(self.session_id, self.last_seen)
            .await?;
        self.advance(&points);
        Ok(points)
    }

    /// Move past every point in `points`.
    pub fn advance(&mut self, points: &[ScorePoint]) {
        if let Some(newest) = points.iter().map(|p| p.timestamp).max() {
            self.last_seen = Some(self.last_seen.map_or(newest, |seen| seen.max(newest)));
        }
    }
}
