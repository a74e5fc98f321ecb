//! Video element abstraction

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("Playback rejected: {0}")]
    PlayRejected(String),

    #[error("Invalid playback rate: {0}")]
    InvalidRate(f64),
}

/// Events a video element reports to its listeners
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Play,
    Pause,
    /// Reached the end of the media
    Ended,
    /// A position jump completed at the given time (seconds)
    Seeked(f64),
    /// Periodic position report while playing (seconds)
    TimeUpdate(f64),
    RateChange(f64),
}

/// A player whose position and rate can be driven from outside
///
/// Positions are in seconds. State-changing calls take `&self` because the
/// same element is shared by the synchronizer, its mirroring task and the view.
#[async_trait]
pub trait VideoElement: Send + Sync {
    fn id(&self) -> &str;

    /// Media source the element plays
    fn source(&self) -> &str;

    fn current_time(&self) -> f64;

    fn duration(&self) -> f64;

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Jump to `position`, clamped to the media
    fn seek(&self, position: f64);

    async fn play(&self) -> Result<(), PlaybackError>;

    fn pause(&self);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&self, rate: f64);

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent>;
}
