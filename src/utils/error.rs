//! Error types and handling
//!
//! Common error types used across the application.

use crate::api::ApiError;
use crate::capture::CaptureError;
use crate::comparison::TimelineError;
use crate::config::ConfigError;
use crate::playback::PlaybackError;
use crate::recorder::RecordingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No supported recording format (tried {0:?})")]
    UnsupportedFormat(Vec<String>),

    #[error("Encoder not initialized")]
    EncoderNotInitialized,

    #[error("Remote request failed: {0}")]
    RemoteRequestFailed(#[from] ApiError),

    #[error("Recording error: {0}")]
    Recording(RecordingError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Invalid timeline: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Practice was reset")]
    Cancelled,

    #[error("No recording to analyze")]
    NoRecording,

    #[error("Recording has not been analyzed yet")]
    NotAnalyzed,
}

impl From<CaptureError> for AppError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::PermissionDenied(msg) => AppError::PermissionDenied(msg),
            CaptureError::DeviceUnavailable(msg) => AppError::DeviceUnavailable(msg),
        }
    }
}

impl From<RecordingError> for AppError {
    fn from(error: RecordingError) -> Self {
        match error {
            RecordingError::UnsupportedFormat(tried) => AppError::UnsupportedFormat(tried),
            RecordingError::EncoderNotInitialized => AppError::EncoderNotInitialized,
            other => AppError::Recording(other),
        }
    }
}

impl AppError {
    /// Stable code shown to the view layer
    pub fn code(&self) -> &'static str {
        match self {
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
            AppError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            AppError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            AppError::EncoderNotInitialized => "ENCODER_NOT_INITIALIZED",
            AppError::RemoteRequestFailed(_) => "REMOTE_REQUEST_FAILED",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Playback(_) => "PLAYBACK_ERROR",
            AppError::Timeline(_) => "INVALID_TIMELINE",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Cancelled => "CANCELLED",
            AppError::NoRecording => "NO_RECORDING",
            AppError::NotAnalyzed => "NOT_ANALYZED",
        }
    }

    /// Only remote failures can be fixed by re-issuing the same requests
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RemoteRequestFailed(_))
    }

    /// Actionable text for the user
    pub fn user_message(&self) -> String {
        match self {
            AppError::PermissionDenied(_) => {
                "Camera access was refused. Allow camera access and try again.".to_string()
            }
            AppError::DeviceUnavailable(_) => {
                "No usable camera was found. Connect a camera and try again.".to_string()
            }
            AppError::UnsupportedFormat(_) => {
                "This system cannot encode any supported video format.".to_string()
            }
            AppError::RemoteRequestFailed(e) => format!("The analysis service failed: {e}"),
            other => other.to_string(),
        }
    }
}

/// Error response for the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.user_message(),
            retryable: error.is_retryable(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
