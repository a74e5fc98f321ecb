//! Application configuration
//!
//! Loaded from an optional JSON file, then overridden from the environment.

use crate::capture::CameraConstraints;
use crate::recorder::encoder::DEFAULT_MEDIA_TYPES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const API_URL_ENV: &str = "DANCE_PRACTICE_API_URL";
pub const MEDIA_URL_ENV: &str = "DANCE_PRACTICE_MEDIA_URL";

const MAX_COUNTDOWN_SECONDS: u32 = 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for a practice run and the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Base URL of the analysis API, e.g. `http://localhost:8128/api`
    pub api_base_url: String,

    /// Base URL that serves reference media
    pub media_base_url: String,

    pub countdown_seconds: u32,

    pub camera: CameraConstraints,

    /// Encoder output types, most preferred first
    pub media_types: Vec<String>,

    pub recording_timeslice_ms: u64,

    /// Pose difference threshold sent with compare requests
    pub comparison_threshold: f64,

    pub list_cache_ttl_ms: u64,

    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8128/api".to_string(),
            media_base_url: "http://localhost:8128".to_string(),
            countdown_seconds: 3,
            camera: CameraConstraints::default(),
            media_types: DEFAULT_MEDIA_TYPES.iter().map(|s| s.to_string()).collect(),
            recording_timeslice_ms: 1000,
            comparison_threshold: 0.3,
            list_cache_ttl_ms: 5000,
            request_timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Read the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Override base URLs from the environment
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            tracing::debug!("{} overrides api base url", API_URL_ENV);
            self.api_base_url = url;
        }
        if let Ok(url) = std::env::var(MEDIA_URL_ENV) {
            tracing::debug!("{} overrides media base url", MEDIA_URL_ENV);
            self.media_base_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(invalid("apiBaseUrl", "must not be empty"));
        }
        if self.media_base_url.trim().is_empty() {
            return Err(invalid("mediaBaseUrl", "must not be empty"));
        }
        if self.media_types.is_empty() {
            return Err(invalid("mediaTypes", "at least one media type is required"));
        }
        if self.countdown_seconds == 0 || self.countdown_seconds > MAX_COUNTDOWN_SECONDS {
            return Err(invalid(
                "countdownSeconds",
                format!("must be between 1 and {MAX_COUNTDOWN_SECONDS}"),
            ));
        }
        if !(self.comparison_threshold.is_finite() && self.comparison_threshold > 0.0) {
            return Err(invalid("comparisonThreshold", "must be a positive number"));
        }
        Ok(())
    }

    pub fn recording_timeslice(&self) -> Duration {
        Duration::from_millis(self.recording_timeslice_ms)
    }

    pub fn list_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.list_cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
