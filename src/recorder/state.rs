//! Recording state management
//!
//! Defines the practice state machine and segment tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current state of a practice recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingState {
    /// Nothing in progress
    #[default]
    Idle,
    /// Waiting for the camera preview to render
    AwaitingCamera,
    /// Countdown before recording
    Countdown,
    /// Currently recording
    Recording,
    /// Recording is paused
    Paused,
    /// Encoder is flushing its final output
    Finalizing,
    /// Output is ready, cleanup pending
    Stopped,
}

impl RecordingState {
    /// An encoder session exists in these states
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused | Self::Finalizing)
    }
}

/// One uninterrupted stretch of recording
///
/// A new segment is created each time recording is resumed after a pause.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSegment {
    /// Segment index (0, 1, 2, ...)
    pub index: usize,

    /// Duration of this segment in milliseconds
    pub duration_ms: f64,

    /// Time since recording start when the segment began
    pub process_time_start_ms: f64,

    pub process_time_end_ms: f64,

    /// Wall clock start
    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,
}

impl RecordingSegment {
    /// Create a new segment starting now
    pub fn new(index: usize, process_time_ms: f64) -> Self {
        Self {
            index,
            duration_ms: 0.0,
            process_time_start_ms: process_time_ms,
            process_time_end_ms: process_time_ms,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// End the segment. Ending twice keeps the first end.
    pub fn end(&mut self, process_time_ms: f64) {
        if self.ended_at.is_some() {
            return;
        }
        self.process_time_end_ms = process_time_ms;
        self.duration_ms = self.process_time_end_ms - self.process_time_start_ms;
        self.ended_at = Some(Utc::now());
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_end_is_sticky() {
        let mut segment = RecordingSegment::new(0, 100.0);
        assert!(segment.is_open());
        segment.end(350.0);
        segment.end(900.0);
        assert_eq!(segment.duration_ms, 250.0);
        assert!(!segment.is_open());
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let json = serde_json::to_string(&RecordingState::AwaitingCamera).unwrap();
        assert_eq!(json, "\"awaitingCamera\"");
        assert!(RecordingState::Finalizing.is_active());
        assert!(!RecordingState::Stopped.is_active());
    }
}
