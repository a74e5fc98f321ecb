//! Recording controller
//!
//! Owns one encoder session bound to an independent duplicate of the camera
//! stream, so the preview and the recording never stop each other.

use super::asset::VideoAsset;
use super::encoder::{
    select_media_type, ChunkReceiver, EncoderSession, EncoderState, RecordingError,
    RecordingResult,
};
use super::state::{RecordingSegment, RecordingState};
use crate::capture::CameraStream;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    /// Recording started with the negotiated media type
    Started { media_type: String },
    Paused,
    Resumed,
    /// Output finalized
    Stopped { size: usize, duration_ms: f64 },
    /// Session torn down without output
    Discarded,
    Error(String),
}

pub struct RecordingController {
    /// Current recording state
    state: Arc<RwLock<RecordingState>>,

    encoder: Box<dyn EncoderSession>,

    /// Output types, most preferred first
    media_types: Vec<String>,

    timeslice: Duration,

    /// Duplicate of the camera stream owned by the encoder session
    clone: Option<CameraStream>,

    chunks_rx: Option<ChunkReceiver>,

    media_type: Option<String>,

    /// One segment per pause/resume cycle
    segments: Vec<RecordingSegment>,

    start_time: Option<Instant>,

    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingController {
    pub fn new(encoder: Box<dyn EncoderSession>, media_types: Vec<String>, timeslice: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            encoder,
            media_types,
            timeslice,
            clone: None,
            chunks_rx: None,
            media_type: None,
            segments: Vec::new(),
            start_time: None,
            event_tx,
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Media type negotiated for the current session
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// The encoder's own stream, while a session exists
    pub fn recording_stream(&self) -> Option<&CameraStream> {
        self.clone.as_ref()
    }

    pub fn segments(&self) -> &[RecordingSegment] {
        &self.segments
    }

    /// Recorded time so far, excluding pauses
    pub fn duration_ms(&self) -> f64 {
        let now = self.process_time_ms();
        self.segments
            .iter()
            .map(|s| {
                if s.is_open() {
                    now - s.process_time_start_ms
                } else {
                    s.duration_ms
                }
            })
            .sum()
    }

    fn process_time_ms(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    fn set_state(&self, state: RecordingState) {
        *self.state.write() = state;
    }

    /// Start recording a duplicate of `stream`
    pub async fn start(&mut self, stream: Option<&CameraStream>) -> RecordingResult<()> {
        let stream = match stream {
            Some(s) if s.is_live() => s,
            _ => return Err(RecordingError::NoActiveStream),
        };

        let current_state = self.state();
        if current_state != RecordingState::Idle {
            tracing::warn!("Start rejected while {:?}", current_state);
            return Err(RecordingError::AlreadyRecording);
        }

        let media_type = select_media_type(self.media_types.as_slice(), self.encoder.as_ref())?;
        let clone = stream.duplicate();
        tracing::info!(
            "Starting {} recording on stream {} (clone {})",
            media_type,
            stream.id(),
            clone.id()
        );

        let chunks_rx = match self.encoder.start(&clone, &media_type, self.timeslice).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!("Encoder {} failed to start: {}", self.encoder.name(), e);
                clone.stop();
                return Err(e);
            }
        };

        self.clone = Some(clone);
        self.chunks_rx = Some(chunks_rx);
        self.media_type = Some(media_type.clone());
        self.start_time = Some(Instant::now());
        self.segments.clear();
        self.segments.push(RecordingSegment::new(0, 0.0));

        self.set_state(RecordingState::Recording);
        let _ = self.event_tx.send(RecordingEvent::Started { media_type });
        Ok(())
    }

    /// Pause recording. A no-op unless recording.
    pub async fn pause(&mut self) -> RecordingResult<()> {
        match self.state() {
            RecordingState::Recording => {}
            RecordingState::Idle | RecordingState::Stopped => {
                tracing::warn!("Pause requested without an encoder session");
                return Err(RecordingError::EncoderNotInitialized);
            }
            other => {
                tracing::debug!("Pause ignored while {:?}", other);
                return Ok(());
            }
        }

        self.encoder.pause().await?;
        let end_time = self.process_time_ms();
        if let Some(segment) = self.segments.last_mut() {
            segment.end(end_time);
        }

        self.set_state(RecordingState::Paused);
        let _ = self.event_tx.send(RecordingEvent::Paused);
        tracing::info!("Recording paused");
        Ok(())
    }

    /// Resume recording. A no-op unless paused.
    pub async fn resume(&mut self) -> RecordingResult<()> {
        match self.state() {
            RecordingState::Paused => {}
            RecordingState::Idle | RecordingState::Stopped => {
                tracing::warn!("Resume requested without an encoder session");
                return Err(RecordingError::EncoderNotInitialized);
            }
            other => {
                tracing::debug!("Resume ignored while {:?}", other);
                return Ok(());
            }
        }

        self.encoder.resume().await?;
        let index = self.segments.len();
        self.segments.push(RecordingSegment::new(index, self.process_time_ms()));

        self.set_state(RecordingState::Recording);
        let _ = self.event_tx.send(RecordingEvent::Resumed);
        tracing::info!("Recording resumed (segment {})", index);
        Ok(())
    }

    /// Finalize the encoder and build the recorded asset
    pub async fn stop(&mut self) -> RecordingResult<VideoAsset> {
        let current_state = self.state();
        if !matches!(current_state, RecordingState::Recording | RecordingState::Paused) {
            tracing::warn!("Stop requested while {:?}", current_state);
            return Err(RecordingError::EncoderNotInitialized);
        }

        let end_time = self.process_time_ms();
        if let Some(segment) = self.segments.last_mut() {
            segment.end(end_time);
        }
        self.set_state(RecordingState::Finalizing);
        tracing::info!("Finalizing recording");

        if let Err(e) = self.encoder.stop().await {
            tracing::error!("Encoder {} failed to finalize: {}", self.encoder.name(), e);
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            self.cleanup();
            return Err(e);
        }

        // The encoder closes the channel after its final flush
        let mut chunks = Vec::new();
        if let Some(mut rx) = self.chunks_rx.take() {
            while let Some(chunk) = rx.recv().await {
                chunks.push(chunk);
            }
        }

        if let Some(clone) = self.clone.take() {
            clone.stop();
        }

        let duration_ms: f64 = self.segments.iter().map(|s| s.duration_ms).sum();
        let media_type = self.media_type.clone().unwrap_or_default();
        let asset = VideoAsset::from_chunks(chunks, media_type, duration_ms);
        if asset.is_empty() {
            tracing::warn!("Recording finished without any encoded data");
        }

        self.set_state(RecordingState::Stopped);
        let _ = self.event_tx.send(RecordingEvent::Stopped {
            size: asset.size(),
            duration_ms,
        });
        tracing::info!(
            "Recording stopped: {} bytes, {:.0}ms over {} segments",
            asset.size(),
            duration_ms,
            self.segments.len()
        );
        Ok(asset)
    }

    /// Return to `Idle` from any state, discarding buffered output
    pub fn cleanup(&mut self) {
        let previous = self.state();

        if self.encoder.state() != EncoderState::Inactive {
            tracing::debug!("Aborting active encoder {}", self.encoder.name());
            self.encoder.abort();
        }
        self.chunks_rx.take();
        if let Some(clone) = self.clone.take() {
            clone.stop();
        }
        self.media_type = None;
        self.segments.clear();
        self.start_time = None;
        self.set_state(RecordingState::Idle);

        if previous.is_active() {
            let _ = self.event_tx.send(RecordingEvent::Discarded);
            tracing::info!("Recording discarded from {:?}", previous);
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.cleanup();
    }
}
