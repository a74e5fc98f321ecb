//! Practice coordinator
//!
//! Orchestrates a single practice take: camera readiness gates the countdown,
//! countdown expiry starts the recording together with the reference video,
//! and the reference video's lifecycle (or a manual stop) ends it.

use super::asset::RecordingHandoff;
use super::controller::RecordingController;
use super::countdown::CountdownController;
use super::state::RecordingState;
use crate::capture::{CameraConstraints, CaptureSession, SurfaceEvent};
use crate::playback::{PlaybackSynchronizer, StopTrigger, VideoElement};
use crate::utils::{AppError, AppResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

/// Events emitted while a practice take runs
#[derive(Debug, Clone, PartialEq)]
pub enum PracticeEvent {
    /// Preview is drawing frames; the countdown starts next
    CameraReady,
    /// Seconds left before recording
    CountdownTick(u32),
    RecordingStarted { media_type: String },
    RecordingPaused,
    RecordingResumed,
    /// Recording finalized
    RecordingStopped { trigger: StopTrigger },
    /// Preview was re-bound after a stall
    PreviewRefreshed,
    /// Take aborted back to idle
    Reset,
    /// Take failed with the given error code
    Failed(String),
}

/// Commands accepted by a running take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeCommand {
    Pause,
    Resume,
    Stop,
    Reset,
}

/// Cloneable remote control for a [`PracticeCoordinator`]
#[derive(Clone)]
pub struct PracticeHandle {
    command_tx: mpsc::UnboundedSender<PracticeCommand>,
    state: Arc<RwLock<RecordingState>>,
}

impl PracticeHandle {
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    pub fn send(&self, command: PracticeCommand) -> bool {
        self.command_tx.send(command).is_ok()
    }

    pub fn pause(&self) -> bool {
        self.send(PracticeCommand::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(PracticeCommand::Resume)
    }

    pub fn stop(&self) -> bool {
        self.send(PracticeCommand::Stop)
    }

    pub fn reset(&self) -> bool {
        self.send(PracticeCommand::Reset)
    }
}

pub struct PracticeCoordinator {
    /// Reference the take is recorded against
    reference_video_id: String,

    /// Current phase of the take
    state: Arc<RwLock<RecordingState>>,

    capture: CaptureSession,

    countdown: CountdownController,

    recorder: RecordingController,

    /// Reference video as leader, no followers
    sync: PlaybackSynchronizer,

    countdown_seconds: u32,

    command_tx: mpsc::UnboundedSender<PracticeCommand>,
    command_rx: mpsc::UnboundedReceiver<PracticeCommand>,

    /// Event broadcaster
    event_tx: broadcast::Sender<PracticeEvent>,
}

impl PracticeCoordinator {
    pub fn new(
        reference_video_id: impl Into<String>,
        capture: CaptureSession,
        recorder: RecordingController,
        reference: Arc<dyn VideoElement>,
        countdown_seconds: u32,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            reference_video_id: reference_video_id.into(),
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            capture,
            countdown: CountdownController::new(),
            recorder,
            sync: PlaybackSynchronizer::new(reference, Vec::new()),
            countdown_seconds,
            command_tx,
            command_rx,
            event_tx,
        }
    }

    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    pub fn handle(&self) -> PracticeHandle {
        PracticeHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Subscribe to practice events
    pub fn subscribe(&self) -> broadcast::Receiver<PracticeEvent> {
        self.event_tx.subscribe()
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    fn reference(&self) -> &Arc<dyn VideoElement> {
        self.sync.leader()
    }

    fn set_state(&self, state: RecordingState) {
        tracing::debug!("Practice state: {:?}", state);
        *self.state.write() = state;
    }

    fn emit(&self, event: PracticeEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run one take to completion and hand the recording over.
    ///
    /// Every exit path leaves the camera released, the countdown halted and
    /// the recorder idle.
    pub async fn run(&mut self, constraints: &CameraConstraints) -> AppResult<RecordingHandoff> {
        // Commands sent before this take belong to a previous one
        while self.command_rx.try_recv().is_ok() {}

        let result = self.drive(constraints).await;
        match &result {
            Ok(handoff) => {
                tracing::info!(
                    "Practice take finished: {} ({} bytes)",
                    handoff.descriptor.filename,
                    handoff.descriptor.size
                );
            }
            Err(AppError::Cancelled) => {
                tracing::info!("Practice take reset");
                self.cleanup();
                self.emit(PracticeEvent::Reset);
            }
            Err(e) => {
                tracing::error!("Practice take failed: {}", e);
                self.cleanup();
                self.emit(PracticeEvent::Failed(e.code().to_string()));
            }
        }
        result
    }

    async fn drive(&mut self, constraints: &CameraConstraints) -> AppResult<RecordingHandoff> {
        self.set_state(RecordingState::AwaitingCamera);
        tokio::select! {
            acquired = self.capture.acquire(constraints) => acquired?,
            _ = wait_for_abort(&mut self.command_rx) => return Err(AppError::Cancelled),
        }
        self.emit(PracticeEvent::CameraReady);

        self.set_state(RecordingState::Countdown);
        self.count_down().await?;

        self.recorder.start(self.capture.stream()).await?;
        if let Some(media_type) = self.recorder.media_type() {
            self.emit(PracticeEvent::RecordingStarted {
                media_type: media_type.to_string(),
            });
        }
        self.set_state(RecordingState::Recording);

        self.sync.play_from_start().await?;
        let trigger = self.record_until_stopped().await?;

        self.set_state(RecordingState::Finalizing);
        let asset = self.recorder.stop().await?;
        if !self.reference().is_paused() {
            self.reference().pause();
        }
        self.capture.release();
        self.recorder.cleanup();
        self.set_state(RecordingState::Stopped);
        self.emit(PracticeEvent::RecordingStopped { trigger });

        Ok(RecordingHandoff::new(self.reference_video_id.clone(), asset))
    }

    async fn count_down(&mut self) -> AppResult<()> {
        let mut expiry = self.countdown.start(self.countdown_seconds)?;
        let mut remaining = self.countdown.subscribe();
        self.emit(PracticeEvent::CountdownTick(*remaining.borrow_and_update()));

        loop {
            tokio::select! {
                biased;
                changed = remaining.changed() => {
                    if changed.is_ok() {
                        let left = *remaining.borrow_and_update();
                        self.emit(PracticeEvent::CountdownTick(left));
                    }
                }
                expired = &mut expiry => {
                    return expired.map_err(|_| AppError::Cancelled);
                }
                _ = wait_for_abort(&mut self.command_rx) => {
                    self.countdown.cancel();
                    return Err(AppError::Cancelled);
                }
            }
        }
    }

    /// Record until the reference video ends, pauses, jumps while paused, or
    /// a stop command arrives. Preview stalls are repaired along the way.
    async fn record_until_stopped(&mut self) -> AppResult<StopTrigger> {
        let mut watch = self.sync.watch_lifecycle();
        let mut preview = self.capture.surface().subscribe();
        let mut preview_open = true;

        loop {
            tokio::select! {
                trigger = watch.next_trigger() => return Ok(trigger),
                command = self.command_rx.recv() => match command {
                    Some(PracticeCommand::Pause) => {
                        if self.state() != RecordingState::Recording {
                            tracing::debug!("Pause ignored in {:?}", self.state());
                            continue;
                        }
                        watch.expect_pause();
                        self.reference().pause();
                        self.recorder.pause().await?;
                        self.set_state(RecordingState::Paused);
                        self.emit(PracticeEvent::RecordingPaused);
                    }
                    Some(PracticeCommand::Resume) => {
                        if self.state() != RecordingState::Paused {
                            tracing::debug!("Resume ignored in {:?}", self.state());
                            continue;
                        }
                        self.recorder.resume().await?;
                        self.reference().play().await?;
                        self.set_state(RecordingState::Recording);
                        self.emit(PracticeEvent::RecordingResumed);
                    }
                    Some(PracticeCommand::Stop) | None => return Ok(StopTrigger::Manual),
                    Some(PracticeCommand::Reset) => return Err(AppError::Cancelled),
                },
                event = preview.recv(), if preview_open => match event {
                    Ok(SurfaceEvent::Stalled) => {
                        tracing::warn!("Preview stalled while recording, re-binding");
                        if self.capture.refresh_preview() {
                            self.emit(PracticeEvent::PreviewRefreshed);
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => preview_open = false,
                },
            }
        }
    }

    /// Halt the countdown, stop the reference, release the camera and force
    /// the recorder idle. Safe from any state and on every exit path.
    pub fn cleanup(&mut self) {
        self.countdown.cancel();
        if !self.reference().is_paused() {
            self.reference().pause();
        }
        self.capture.release();
        self.recorder.cleanup();
        if self.state() != RecordingState::Stopped {
            self.set_state(RecordingState::Idle);
        }
    }
}

impl Drop for PracticeCoordinator {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Resolve when a command aborts a take that is not recording yet.
/// Pause and resume mean nothing before recording starts.
async fn wait_for_abort(commands: &mut mpsc::UnboundedReceiver<PracticeCommand>) {
    loop {
        match commands.recv().await {
            Some(PracticeCommand::Reset) | Some(PracticeCommand::Stop) => return,
            Some(command) => tracing::debug!("{:?} ignored before recording", command),
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureEvent, DisplaySurface, VirtualCamera, VirtualCameraMode, VirtualSurface};
    use crate::playback::ClockPlayer;
    use crate::recorder::memory_encoder::{MemoryEncoder, MemoryEncoderProbe};
    use std::time::Duration;

    struct Rig {
        camera: Arc<VirtualCamera>,
        surface: Arc<VirtualSurface>,
        reference: Arc<ClockPlayer>,
        probe: MemoryEncoderProbe,
        coordinator: PracticeCoordinator,
    }

    fn rig(reference_secs: f64) -> Rig {
        rig_with(VirtualCamera::new("virtual"), reference_secs, "video/webm")
    }

    fn rig_with(camera: VirtualCamera, reference_secs: f64, preferred_type: &str) -> Rig {
        let camera = Arc::new(camera);
        let surface = Arc::new(VirtualSurface::new());
        let reference = Arc::new(ClockPlayer::new("reference", "mem://ref", reference_secs));
        let encoder = MemoryEncoder::new(["video/webm"]);
        let probe = encoder.probe();
        let recorder = RecordingController::new(
            Box::new(encoder),
            vec![preferred_type.to_string()],
            Duration::from_millis(500),
        );
        let capture = CaptureSession::new(camera.clone(), surface.clone());
        let coordinator = PracticeCoordinator::new("ref-1", capture, recorder, reference.clone(), 3);
        Rig {
            camera,
            surface,
            reference,
            probe,
            coordinator,
        }
    }

    fn drain(events: &mut broadcast::Receiver<PracticeEvent>) -> Vec<PracticeEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_end_stops_take() {
        let mut rig = rig(2.0);
        let mut events = rig.coordinator.subscribe();
        let probe = rig.probe.clone();

        let writer = tokio::spawn(async move {
            loop {
                probe.write(&[0xAB; 8]);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let handoff = rig.coordinator.run(&CameraConstraints::default()).await.unwrap();
        writer.abort();

        assert_eq!(handoff.reference_video_id, "ref-1");
        assert!(!handoff.asset.is_empty());
        assert_eq!(handoff.descriptor.media_type, "video/webm");
        assert_eq!(rig.coordinator.state(), RecordingState::Stopped);
        assert_eq!(rig.coordinator.recorder().state(), RecordingState::Idle);
        assert!(rig.coordinator.capture().stream().is_none());
        assert!(rig.reference.is_ended());
        assert_eq!(rig.camera.total_stops(), rig.camera.tracks_created());

        let seen = drain(&mut events);
        assert_eq!(seen[0], PracticeEvent::CameraReady);
        let ticks: Vec<_> = seen
            .iter()
            .filter_map(|e| match e {
                PracticeEvent::CountdownTick(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![3, 2, 1, 0]);
        assert!(seen.contains(&PracticeEvent::RecordingStarted {
            media_type: "video/webm".into()
        }));
        assert_eq!(
            seen.last(),
            Some(&PracticeEvent::RecordingStopped {
                trigger: StopTrigger::Ended
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_initiated_pause_does_not_stop() {
        let mut rig = rig(30.0);
        let handle = rig.coordinator.handle();
        let mut events = rig.coordinator.subscribe();

        let driver = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    PracticeEvent::RecordingStarted { .. } => {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        handle.pause();
                    }
                    PracticeEvent::RecordingPaused => {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        handle.resume();
                    }
                    PracticeEvent::RecordingResumed => {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        handle.stop();
                    }
                    PracticeEvent::RecordingStopped { trigger } => return trigger,
                    _ => {}
                }
            }
            StopTrigger::SourceClosed
        });

        rig.coordinator.run(&CameraConstraints::default()).await.unwrap();
        assert_eq!(driver.await.unwrap(), StopTrigger::Manual);
        assert!(rig.reference.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reference_pause_stops_take() {
        let mut rig = rig(30.0);
        let reference = rig.reference.clone();
        let mut events = rig.coordinator.subscribe();

        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if matches!(event, PracticeEvent::RecordingStarted { .. }) {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    reference.pause();
                    break;
                }
            }
        });

        rig.coordinator.run(&CameraConstraints::default()).await.unwrap();
        assert_eq!(rig.coordinator.state(), RecordingState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_countdown_returns_to_idle() {
        let mut rig = rig(30.0);
        let handle = rig.coordinator.handle();
        let mut events = rig.coordinator.subscribe();

        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if event == PracticeEvent::CountdownTick(2) {
                    handle.reset();
                    break;
                }
            }
        });

        let result = rig.coordinator.run(&CameraConstraints::default()).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(rig.coordinator.state(), RecordingState::Idle);
        assert_eq!(rig.probe.state(), crate::recorder::EncoderState::Inactive);
        assert_eq!(rig.camera.total_stops(), rig.camera.tracks_created());
        assert!(rig.reference.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_fails_take() {
        let mut rig = rig(30.0);
        rig.camera.set_mode(VirtualCameraMode::PermissionDenied);
        let mut events = rig.coordinator.subscribe();

        let result = rig.coordinator.run(&CameraConstraints::default()).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
        assert_eq!(rig.coordinator.state(), RecordingState::Idle);
        assert_eq!(
            drain(&mut events),
            vec![PracticeEvent::Failed("PERMISSION_DENIED".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_format_after_countdown_releases_camera() {
        let mut rig = rig_with(VirtualCamera::new("virtual"), 30.0, "video/mp4");
        let mut events = rig.coordinator.subscribe();

        let result = rig.coordinator.run(&CameraConstraints::default()).await;
        assert_eq!(result.err().map(|e| e.code()), Some("UNSUPPORTED_FORMAT"));
        assert_eq!(rig.coordinator.state(), RecordingState::Idle);
        assert_eq!(rig.coordinator.recorder().state(), RecordingState::Idle);
        assert!(rig.camera.tracks_created() > 0);
        assert_eq!(rig.camera.total_stops(), rig.camera.tracks_created());
        assert!(!rig.surface.is_attached());
        assert!(rig.reference.is_paused());

        let seen = drain(&mut events);
        assert_eq!(seen[0], PracticeEvent::CameraReady);
        assert!(seen.contains(&PracticeEvent::CountdownTick(0)));
        assert_eq!(seen.last(), Some(&PracticeEvent::Failed("UNSUPPORTED_FORMAT".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_camera_opens_leaves_no_track() {
        let camera = VirtualCamera::new("virtual");
        camera.hold_opens();
        let mut rig = rig_with(camera, 30.0, "video/webm");
        let handle = rig.coordinator.handle();
        let camera = rig.camera.clone();

        tokio::spawn(async move {
            while camera.open_count() == 0 {
                tokio::task::yield_now().await;
            }
            handle.reset();
        });

        let result = rig.coordinator.run(&CameraConstraints::default()).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(rig.coordinator.state(), RecordingState::Idle);

        rig.camera.release_opens();
        tokio::task::yield_now().await;
        assert_eq!(rig.camera.open_count(), 1);
        assert_eq!(rig.camera.tracks_created(), 0);
        assert_eq!(rig.camera.total_stops(), rig.camera.tracks_created());
        assert!(!rig.surface.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_stall_is_repaired_while_recording() {
        let mut rig = rig(30.0);
        let handle = rig.coordinator.handle();
        let surface = rig.surface.clone();
        let mut events = rig.coordinator.subscribe();
        let mut capture_events = rig.coordinator.capture().subscribe();

        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    PracticeEvent::RecordingStarted { .. } => {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        surface.simulate_stall();
                    }
                    PracticeEvent::PreviewRefreshed => {
                        handle.stop();
                    }
                    _ => {}
                }
            }
        });

        rig.coordinator.run(&CameraConstraints::default()).await.unwrap();
        assert!(rig.surface.attach_count() >= 2);
        assert!(matches!(capture_events.try_recv(), Ok(CaptureEvent::Ready { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_twice_is_idle() {
        let mut rig = rig(30.0);
        rig.coordinator.cleanup();
        rig.coordinator.cleanup();
        assert_eq!(rig.coordinator.state(), RecordingState::Idle);
    }
}
