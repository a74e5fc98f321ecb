//! Headless video element driven by the tokio clock
//!
//! Stands in for a real player: the position advances with time while playing,
//! `TimeUpdate` is reported on a fixed cadence and `Ended` fires at the
//! media duration.

use super::traits::{PlaybackError, PlaybackEvent, VideoElement};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default spacing of `TimeUpdate` events
pub const DEFAULT_TIME_UPDATE: Duration = Duration::from_millis(250);

const END_EPSILON: f64 = 1e-6;

#[derive(Debug)]
struct Clock {
    /// Position when `anchor` was taken
    base: f64,
    /// Set while playing
    anchor: Option<Instant>,
    rate: f64,
    ended: bool,
}

impl Clock {
    fn position(&self, duration: f64) -> f64 {
        let elapsed = self
            .anchor
            .map(|a| a.elapsed().as_secs_f64() * self.rate)
            .unwrap_or(0.0);
        (self.base + elapsed).min(duration)
    }

    fn reanchor(&mut self, duration: f64) {
        self.base = self.position(duration);
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }
}

#[derive(Debug)]
struct PlayerState {
    duration: f64,
    clock: Mutex<Clock>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlayerState {
    fn position(&self) -> f64 {
        self.clock.lock().position(self.duration)
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }
}

pub struct ClockPlayer {
    id: String,
    source: String,
    time_update: Duration,
    state: Arc<PlayerState>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    seeks: AtomicUsize,
    reject_play: AtomicBool,
}

impl ClockPlayer {
    pub fn new(id: impl Into<String>, source: impl Into<String>, duration_secs: f64) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            id: id.into(),
            source: source.into(),
            time_update: DEFAULT_TIME_UPDATE,
            state: Arc::new(PlayerState {
                duration: duration_secs.max(0.0),
                clock: Mutex::new(Clock {
                    base: 0.0,
                    anchor: None,
                    rate: 1.0,
                    ended: false,
                }),
                events,
            }),
            ticker: Mutex::new(None),
            seeks: AtomicUsize::new(0),
            reject_play: AtomicBool::new(false),
        }
    }

    pub fn with_time_update(mut self, every: Duration) -> Self {
        self.time_update = every;
        self
    }

    /// Number of seeks performed so far
    pub fn seek_count(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }

    /// Make subsequent `play` calls fail, like an autoplay block
    pub fn reject_play(&self, reject: bool) {
        self.reject_play.store(reject, Ordering::SeqCst);
    }

    fn stop_ticker(&self) {
        if let Some(task) = self.ticker.lock().take() {
            task.abort();
        }
    }

    fn spawn_ticker(&self) {
        let state = self.state.clone();
        let every = self.time_update;
        let task = tokio::spawn(async move {
            loop {
                let wait = {
                    let clock = state.clock.lock();
                    let remaining = (state.duration - clock.position(state.duration)) / clock.rate;
                    Duration::try_from_secs_f64(remaining.max(0.0))
                        .map(|r| every.min(r))
                        .unwrap_or(every)
                };
                tokio::time::sleep(wait).await;

                let position = state.position();
                if position >= state.duration - END_EPSILON {
                    {
                        let mut clock = state.clock.lock();
                        clock.base = state.duration;
                        clock.anchor = None;
                        clock.ended = true;
                    }
                    state.emit(PlaybackEvent::TimeUpdate(state.duration));
                    state.emit(PlaybackEvent::Pause);
                    state.emit(PlaybackEvent::Ended);
                    return;
                }
                state.emit(PlaybackEvent::TimeUpdate(position));
            }
        });
        if let Some(old) = self.ticker.lock().replace(task) {
            old.abort();
        }
    }
}

#[async_trait]
impl VideoElement for ClockPlayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn current_time(&self) -> f64 {
        self.state.position()
    }

    fn duration(&self) -> f64 {
        self.state.duration
    }

    fn is_paused(&self) -> bool {
        self.state.clock.lock().anchor.is_none()
    }

    fn is_ended(&self) -> bool {
        self.state.clock.lock().ended
    }

    fn seek(&self, position: f64) {
        let target = position.clamp(0.0, self.state.duration);
        {
            let mut clock = self.state.clock.lock();
            clock.base = target;
            if clock.anchor.is_some() {
                clock.anchor = Some(Instant::now());
            }
            clock.ended = false;
        }
        self.seeks.fetch_add(1, Ordering::SeqCst);
        self.state.emit(PlaybackEvent::Seeked(target));
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        if self.reject_play.load(Ordering::SeqCst) {
            return Err(PlaybackError::PlayRejected(format!("{} refused to play", self.id)));
        }
        {
            let mut clock = self.state.clock.lock();
            if clock.anchor.is_some() {
                return Ok(());
            }
            if clock.ended || clock.base >= self.state.duration {
                clock.base = 0.0;
                clock.ended = false;
            }
            clock.anchor = Some(Instant::now());
        }
        self.state.emit(PlaybackEvent::Play);
        self.spawn_ticker();
        Ok(())
    }

    fn pause(&self) {
        {
            let mut clock = self.state.clock.lock();
            if clock.anchor.is_none() {
                return;
            }
            clock.base = clock.position(self.state.duration);
            clock.anchor = None;
        }
        self.stop_ticker();
        self.state.emit(PlaybackEvent::Pause);
    }

    fn playback_rate(&self) -> f64 {
        self.state.clock.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        {
            let mut clock = self.state.clock.lock();
            clock.reanchor(self.state.duration);
            clock.rate = rate;
        }
        self.state.emit(PlaybackEvent::RateChange(rate));
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.state.events.subscribe()
    }
}

impl Drop for ClockPlayer {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_position_follows_clock_and_rate() {
        let player = ClockPlayer::new("ref", "mem://ref", 10.0);
        assert!(player.is_paused());

        player.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!((player.current_time() - 2.0).abs() < 1e-9);

        player.set_playback_rate(2.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!((player.current_time() - 4.0).abs() < 1e-9);

        player.pause();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!((player.current_time() - 4.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ends_at_duration() {
        let player = ClockPlayer::new("ref", "mem://ref", 1.0);
        let mut events = player.subscribe();
        player.play().await.unwrap();

        let mut updates = 0;
        loop {
            match events.recv().await.unwrap() {
                PlaybackEvent::TimeUpdate(_) => updates += 1,
                PlaybackEvent::Ended => break,
                _ => {}
            }
        }
        assert!(updates >= 4);
        assert!(player.is_ended());
        assert!(player.is_paused());
        assert_eq!(player.current_time(), 1.0);
    }

    #[tokio::test]
    async fn test_seek_reports_and_counts() {
        let player = ClockPlayer::new("ref", "mem://ref", 5.0);
        let mut events = player.subscribe();

        player.seek(7.0);
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Seeked(5.0));
        player.seek(-1.0);
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Seeked(0.0));
        assert_eq!(player.seek_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_play() {
        let player = ClockPlayer::new("ref", "mem://ref", 5.0);
        player.reject_play(true);
        assert!(matches!(player.play().await, Err(PlaybackError::PlayRejected(_))));
        assert!(player.is_paused());
    }
}
