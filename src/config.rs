//! Configuration for the engagement agent.

use crate::core::analytics::AnalyticsConfig;
use crate::core::capture::CaptureSettings;
use crate::core::features::ExtractorConfig;
use crate::core::uploader::MAX_BUFFERED_RECORDS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the engagement agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Requested sampling rate; the capture loop never samples faster than 5 Hz
    pub sample_fps: f64,

    /// Timer flush period
    #[serde(with = "duration_serde")]
    pub batch_interval: Duration,

    /// Buffered record count that triggers an immediate flush
    pub batch_size: usize,

    /// Cap on records kept while the backend is unreachable
    pub max_buffered: usize,

    /// Eye openness below this counts as closed for blink tracking
    pub eye_closed_threshold: f64,

    pub user_id: Option<String>,

    /// Backend session the batches are tagged with
    pub session_id: Option<u64>,

    pub gateway: GatewaySettings,

    pub extractor: ExtractorConfig,

    pub analytics: AnalyticsConfig,

    /// Path for storing the transparency log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("engagement-agent");

        Self {
            sample_fps: 2.0,
            batch_interval: Duration::from_secs(5),
            batch_size: 10,
            max_buffered: MAX_BUFFERED_RECORDS,
            eye_closed_threshold: 0.15,
            user_id: None,
            session_id: None,
            gateway: GatewaySettings::default(),
            extractor: ExtractorConfig::default(),
            analytics: AnalyticsConfig::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("engagement-agent")
            .join("config.json")
    }

    /// Location of the persisted transparency counters.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency_log.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Settings for one capture run.
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            sample_fps: self.sample_fps,
            batch_interval: self.batch_interval,
            batch_size: self.batch_size.max(1),
            eye_closed_threshold: self.eye_closed_threshold,
            user_id: self.user_id.clone(),
        }
    }
}

/// Where batches are posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Backend root, e.g. `http://127.0.0.1:8000`
    pub base_url: String,
    /// File holding a bearer token; requests go out without one if unset
    pub token_path: Option<PathBuf>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            token_path: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sample_fps, 2.0);
        assert_eq!(config.batch_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_buffered, 500);
        assert_eq!(config.eye_closed_threshold, 0.15);
        assert_eq!(config.gateway.base_url, "http://127.0.0.1:8000");
        assert!(config.gateway.token_path.is_none());
        assert_eq!(config.analytics.min_sustained_secs, 60);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.sample_fps = 4.0;
        config.batch_interval = Duration::from_secs(12);
        config.user_id = Some("student-3".to_string());
        config.save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["batch_interval"], 12);

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"batch_size": 3, "gateway": {"token_path": "/tmp/t"}}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.sample_fps, 2.0);
        assert_eq!(config.gateway.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.gateway.token_path, Some(PathBuf::from("/tmp/t")));
    }

    #[test]
    fn test_missing_file_gives_defaults_and_bad_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(missing, Config::default());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            Config::load_from(&bad),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_capture_settings() {
        let config = Config {
            batch_size: 0,
            user_id: Some("u".to_string()),
            ..Config::default()
        };
        let settings = config.capture_settings();
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.batch_interval, Duration::from_secs(5));
        assert_eq!(settings.user_id.as_deref(), Some("u"));
    }
}
