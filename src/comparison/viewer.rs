//! Side-by-side comparison playback over a timeline

use super::timeline::{FrameMarker, Timeline, TimelineStats};
use super::types::FrameComparisonRecord;
use crate::playback::{PlaybackError, PlaybackSynchronizer, VideoElement};
use std::sync::Arc;

/// Speed presets offered by the comparison view
pub const PLAYBACK_SPEEDS: [f64; 4] = [0.5, 1.0, 1.5, 2.0];

/// Reference and user videos driven together over a comparison timeline.
/// The reference leads; the user video follows it.
pub struct ComparisonTimeline {
    timeline: Timeline,
    sync: PlaybackSynchronizer,
    current: usize,
    playing: bool,
    speed: f64,
}

impl ComparisonTimeline {
    pub fn new(timeline: Timeline, reference: Arc<dyn VideoElement>, user: Arc<dyn VideoElement>) -> Self {
        let mut sync = PlaybackSynchronizer::new(reference, vec![user]);
        sync.start_mirroring();
        tracing::info!(
            "Comparison opened: {} frames, threshold {}",
            timeline.len(),
            timeline.threshold()
        );
        Self {
            timeline,
            sync,
            current: 0,
            playing: false,
            speed: 1.0,
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Position of the selected record
    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn current_record(&self) -> Option<&FrameComparisonRecord> {
        self.timeline.get(self.current)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn stats(&self) -> TimelineStats {
        self.timeline.stats()
    }

    pub fn markers(&self) -> Vec<FrameMarker> {
        self.timeline.markers(Some(self.current))
    }

    /// Seek both videos to a record's timestamp. Unknown positions are ignored.
    pub fn jump_to_frame(&mut self, position: usize) -> bool {
        let Some(record) = self.timeline.get(position) else {
            tracing::debug!("Ignoring jump to missing frame {}", position);
            return false;
        };
        self.sync.seek_all(record.timestamp);
        self.current = position;
        true
    }

    /// Play or pause both videos. Returns whether they are now playing.
    pub async fn toggle_play(&mut self) -> Result<bool, PlaybackError> {
        if self.playing {
            self.sync.pause_all();
            self.playing = false;
        } else {
            if let Err(e) = self.sync.play_all().await {
                self.sync.pause_all();
                return Err(e);
            }
            self.playing = true;
        }
        Ok(self.playing)
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlaybackError> {
        self.sync.set_speed(speed)?;
        self.speed = speed;
        Ok(())
    }
}
