//! Countdown before recording
//!
//! Ticks once per second and fires a single expiry. Starting while a countdown
//! is running is rejected with [`RecordingError::CountdownAlreadyRunning`].

use super::encoder::{RecordingError, RecordingResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_secs(1);

/// Resolves once when the countdown reaches zero. A cancelled countdown
/// resolves with an error instead.
pub type Expiry = oneshot::Receiver<()>;

pub struct CountdownController {
    remaining_tx: watch::Sender<u32>,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl CountdownController {
    pub fn new() -> Self {
        let (remaining_tx, _) = watch::channel(0);
        Self {
            remaining_tx,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        *self.remaining_tx.borrow()
    }

    /// Watch the remaining seconds
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining_tx.subscribe()
    }

    /// Begin counting down from `seconds`
    pub fn start(&mut self, seconds: u32) -> RecordingResult<Expiry> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Countdown start rejected, {}s still remaining", self.remaining());
            return Err(RecordingError::CountdownAlreadyRunning);
        }

        tracing::info!("Countdown started: {}s", seconds);
        self.remaining_tx.send_replace(seconds);

        let (expired_tx, expired_rx) = oneshot::channel();
        let remaining_tx = self.remaining_tx.clone();
        let running = self.running.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + TICK, TICK);
            let mut remaining = seconds;
            while remaining > 0 {
                ticker.tick().await;
                remaining -= 1;
                remaining_tx.send_replace(remaining);
                tracing::debug!("Countdown: {}", remaining);
            }
            running.store(false, Ordering::SeqCst);
            tracing::info!("Countdown expired");
            let _ = expired_tx.send(());
        }));

        Ok(expired_rx)
    }

    /// Stop the timer without firing expiry. Returns whether it was running.
    pub fn cancel(&mut self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if was_running {
            tracing::info!("Countdown cancelled at {}s", self.remaining());
        }
        was_running
    }
}

impl Default for CountdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CountdownController {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_three_ticks_then_single_expiry() {
        let mut countdown = CountdownController::new();
        let mut remaining = countdown.subscribe();
        let started = tokio::time::Instant::now();

        let expired = countdown.start(3).unwrap();
        let mut seen = vec![*remaining.borrow_and_update()];
        while remaining.changed().await.is_ok() {
            let value = *remaining.borrow_and_update();
            seen.push(value);
            if value == 0 {
                break;
            }
        }

        assert_eq!(seen, vec![3, 2, 1, 0]);
        expired.await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(!countdown.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_rejected() {
        let mut countdown = CountdownController::new();
        let first = countdown.start(3).unwrap();
        assert!(matches!(
            countdown.start(3),
            Err(RecordingError::CountdownAlreadyRunning)
        ));

        first.await.unwrap();
        // Inert after expiry until started again
        let again = countdown.start(1).unwrap();
        again.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_never_fires_expiry() {
        let mut countdown = CountdownController::new();
        let expired = countdown.start(3).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(countdown.cancel());
        assert!(!countdown.cancel());

        assert!(expired.await.is_err());
        assert!(!countdown.is_running());
        assert_eq!(countdown.remaining(), 2);
    }

    #[tokio::test]
    async fn test_zero_expires_immediately() {
        let mut countdown = CountdownController::new();
        countdown.start(0).unwrap().await.unwrap();
        assert_eq!(countdown.remaining(), 0);
    }
}
