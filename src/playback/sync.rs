//! Playback synchronization
//!
//! Couples recording lifecycle to the reference video and keeps follower
//! videos at the leader's position.

use super::traits::{PlaybackError, PlaybackEvent, VideoElement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// What ended a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopTrigger {
    /// Reference video played to the end
    Ended,
    /// Reference video was paused by the user
    Paused,
    /// Reference video was jumped while paused
    Seeked,
    /// Explicit stop request
    Manual,
    /// The reference video went away
    SourceClosed,
}

/// Snap every follower whose position differs from `position`.
/// Returns how many were moved.
pub fn snap_to(followers: &[Arc<dyn VideoElement>], position: f64) -> usize {
    let mut moved = 0;
    for follower in followers {
        if follower.current_time() != position {
            follower.seek(position);
            moved += 1;
        }
    }
    moved
}

/// One-shot watch over the reference video's terminal events
///
/// Consumed by [`LifecycleWatch::wait`], so it can trigger at most one stop.
pub struct LifecycleWatch {
    element: Arc<dyn VideoElement>,
    events: broadcast::Receiver<PlaybackEvent>,
    expected_pauses: usize,
    /// Play state as of the last processed event
    playing: bool,
}

impl LifecycleWatch {
    pub fn new(element: Arc<dyn VideoElement>) -> Self {
        let events = element.subscribe();
        let playing = !element.is_paused();
        Self {
            element,
            events,
            expected_pauses: 0,
            playing,
        }
    }

    /// Announce a pause we issue ourselves so it does not count as a trigger.
    /// Pausing a paused element emits nothing, so nothing is expected then.
    pub fn expect_pause(&mut self) {
        if self.element.is_paused() {
            return;
        }
        self.expected_pauses += 1;
    }

    /// Resolve on the first terminal event. Safe to cancel and call again.
    pub async fn next_trigger(&mut self) -> StopTrigger {
        loop {
            match self.events.recv().await {
                Ok(PlaybackEvent::Ended) => return StopTrigger::Ended,
                Ok(PlaybackEvent::Play) => {
                    self.playing = true;
                    self.expected_pauses = 0;
                }
                Ok(PlaybackEvent::Pause) => {
                    self.playing = false;
                    if self.element.is_ended() {
                        // An Ended event follows
                        continue;
                    }
                    if self.expected_pauses > 0 {
                        self.expected_pauses -= 1;
                        tracing::debug!("Ignoring self-initiated pause of {}", self.element.id());
                        continue;
                    }
                    return StopTrigger::Paused;
                }
                Ok(PlaybackEvent::Seeked(position)) => {
                    if !self.playing {
                        tracing::debug!("{} jumped to {:.2}s while paused", self.element.id(), position);
                        return StopTrigger::Seeked;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Lifecycle watch missed {} events", skipped);
                }
                Err(RecvError::Closed) => return StopTrigger::SourceClosed,
            }
        }
    }

    /// Wait for the trigger and detach
    pub async fn wait(mut self) -> StopTrigger {
        let trigger = self.next_trigger().await;
        tracing::info!("Reference {} triggered stop: {:?}", self.element.id(), trigger);
        trigger
    }
}

/// Drives a leader video and the followers kept in lockstep with it
pub struct PlaybackSynchronizer {
    leader: Arc<dyn VideoElement>,
    followers: Arc<[Arc<dyn VideoElement>]>,
    mirror: Option<JoinHandle<()>>,
}

impl PlaybackSynchronizer {
    pub fn new(leader: Arc<dyn VideoElement>, followers: Vec<Arc<dyn VideoElement>>) -> Self {
        Self {
            leader,
            followers: followers.into(),
            mirror: None,
        }
    }

    pub fn leader(&self) -> &Arc<dyn VideoElement> {
        &self.leader
    }

    pub fn followers(&self) -> &[Arc<dyn VideoElement>] {
        &self.followers
    }

    /// Bring followers to the leader's current position
    pub fn snap_followers(&self) -> usize {
        snap_to(&self.followers, self.leader.current_time())
    }

    /// Move the leader and every follower to `position`
    pub fn seek_all(&self, position: f64) {
        self.leader.seek(position);
        snap_to(&self.followers, self.leader.current_time());
    }

    /// Apply one playback rate to every video
    pub fn set_speed(&self, rate: f64) -> Result<(), PlaybackError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(PlaybackError::InvalidRate(rate));
        }
        self.leader.set_playback_rate(rate);
        for follower in self.followers.iter() {
            follower.set_playback_rate(rate);
        }
        tracing::debug!("Playback speed set to {}x", rate);
        Ok(())
    }

    pub async fn play_all(&self) -> Result<(), PlaybackError> {
        self.leader.play().await?;
        for follower in self.followers.iter() {
            follower.play().await?;
        }
        Ok(())
    }

    pub fn pause_all(&self) {
        self.leader.pause();
        for follower in self.followers.iter() {
            follower.pause();
        }
    }

    /// Rewind the leader and play it
    pub async fn play_from_start(&self) -> Result<(), PlaybackError> {
        self.leader.seek(0.0);
        self.leader.play().await
    }

    /// Follow the leader's reported position until stopped.
    /// Follower movements are never reflected back.
    pub fn start_mirroring(&mut self) {
        self.stop_mirroring();

        let mut events = self.leader.subscribe();
        let followers = self.followers.clone();
        self.mirror = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PlaybackEvent::TimeUpdate(position)) | Ok(PlaybackEvent::Seeked(position)) => {
                        snap_to(&followers, position);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
        tracing::debug!("Mirroring {} to {} followers", self.leader.id(), self.followers.len());
    }

    pub fn stop_mirroring(&mut self) {
        if let Some(task) = self.mirror.take() {
            task.abort();
        }
    }

    pub fn is_mirroring(&self) -> bool {
        self.mirror.is_some()
    }

    /// Watch the leader for the events that end a recording
    pub fn watch_lifecycle(&self) -> LifecycleWatch {
        LifecycleWatch::new(self.leader.clone())
    }
}

impl Drop for PlaybackSynchronizer {
    fn drop(&mut self) {
        self.stop_mirroring();
    }
}
