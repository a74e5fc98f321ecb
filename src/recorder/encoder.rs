//! Encoder session trait
//!
//! Defines the interface for encoders that turn a cloned camera stream into
//! ordered chunks of container data.

use crate::capture::CameraStream;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Output types tried in order when no list is configured
pub const DEFAULT_MEDIA_TYPES: &[&str] = &[
    "video/webm",
    "video/webm;codecs=vp8",
    "video/webm;codecs=vp9",
    "video/mp4",
    "video/ogg;codecs=theora",
];

/// Errors that can occur during recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("No active camera stream")]
    NoActiveStream,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Countdown already running")]
    CountdownAlreadyRunning,

    #[error("No supported media type among {0:?}")]
    UnsupportedFormat(Vec<String>),

    #[error("Encoder not initialized")]
    EncoderNotInitialized,

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Encoded chunks in emission order
pub type ChunkReceiver = mpsc::UnboundedReceiver<Vec<u8>>;
pub type ChunkSender = mpsc::UnboundedSender<Vec<u8>>;

/// State reported by the encoder itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// An encoder bound to one cloned stream at a time
///
/// `stop` must flush everything buffered before it was called and then close
/// the chunk channel returned by `start`.
#[async_trait]
pub trait EncoderSession: Send + Sync {
    /// Encoder identifier for logs
    fn name(&self) -> &str;

    /// Whether this runtime can produce the given media type
    fn is_type_supported(&self, media_type: &str) -> bool;

    fn state(&self) -> EncoderState;

    /// Begin consuming the stream, emitting a chunk at least every `timeslice`
    async fn start(
        &mut self,
        stream: &CameraStream,
        media_type: &str,
        timeslice: Duration,
    ) -> RecordingResult<ChunkReceiver>;

    async fn pause(&mut self) -> RecordingResult<()>;

    async fn resume(&mut self) -> RecordingResult<()>;

    /// Final flush. The chunk channel closes once everything is delivered.
    async fn stop(&mut self) -> RecordingResult<()>;

    /// Drop buffered output and halt immediately
    fn abort(&mut self);
}

/// Pick the first media type in priority order the encoder supports
pub fn select_media_type<S: AsRef<str>>(
    priority: &[S],
    encoder: &dyn EncoderSession,
) -> RecordingResult<String> {
    for candidate in priority {
        let candidate = candidate.as_ref();
        if encoder.is_type_supported(candidate) {
            return Ok(candidate.to_string());
        }
        tracing::debug!("{} does not support {}", encoder.name(), candidate);
    }
    Err(RecordingError::UnsupportedFormat(
        priority.iter().map(|s| s.as_ref().to_string()).collect(),
    ))
}

/// File extension of the container behind a media type
pub fn container_extension(media_type: &str) -> &'static str {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "video/mp4" => "mp4",
        "video/ogg" => "ogg",
        _ => "webm",
    }
}
