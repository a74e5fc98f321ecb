//! Virtual camera and preview surface
//!
//! Scriptable stand-ins for real hardware: a camera whose permission outcome
//! can be chosen up front and whose frames are pushed by hand, and a preview
//! surface that reports readiness on demand. Used for demos and tests.

use super::stream::CameraStream;
use super::traits::{
    CameraDevice, CameraConstraints, CaptureError, CaptureResult, CapturedFrame, FrameReceiver,
    MediaTrack, PixelFormat, SurfaceEvent, TrackKind, TrackState,
};
use super::traits::DisplaySurface;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// How the virtual camera answers an open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualCameraMode {
    Available,
    PermissionDenied,
    Unavailable,
}

/// Per-track stop bookkeeping shared by a camera and all tracks it produced
#[derive(Debug, Default)]
struct TrackLedger {
    stops: Mutex<HashMap<String, usize>>,
    created: AtomicUsize,
}

impl TrackLedger {
    fn record_stop(&self, id: &str) {
        *self.stops.lock().entry(id.to_string()).or_insert(0) += 1;
    }

    fn next_index(&self) -> usize {
        self.created.fetch_add(1, Ordering::SeqCst)
    }
}

/// A camera backed by hand-fed frames
pub struct VirtualCamera {
    name: String,
    mode: Mutex<VirtualCameraMode>,
    frames: broadcast::Sender<Arc<CapturedFrame>>,
    ledger: Arc<TrackLedger>,
    opens: AtomicUsize,
    /// Opens wait while this is false
    gate: watch::Sender<bool>,
}

impl VirtualCamera {
    pub fn new(name: impl Into<String>) -> Self {
        let (frames, _) = broadcast::channel(64);
        Self {
            name: name.into(),
            mode: Mutex::new(VirtualCameraMode::Available),
            frames,
            ledger: Arc::new(TrackLedger::default()),
            opens: AtomicUsize::new(0),
            gate: watch::Sender::new(true),
        }
    }

    pub fn with_mode(self, mode: VirtualCameraMode) -> Self {
        *self.mode.lock() = mode;
        self
    }

    pub fn set_mode(&self, mode: VirtualCameraMode) {
        *self.mode.lock() = mode;
    }

    /// Keep open requests pending, like an unanswered permission prompt
    pub fn hold_opens(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_opens(&self) {
        self.gate.send_replace(true);
    }

    /// Deliver a frame to every live track. Returns the number of receivers.
    pub fn push_frame(&self, frame: CapturedFrame) -> usize {
        self.frames.send(Arc::new(frame)).unwrap_or(0)
    }

    /// Deliver a flat gray RGB frame
    pub fn push_test_pattern(&self, width: u32, height: u32, timestamp_ms: f64) -> usize {
        self.push_frame(CapturedFrame {
            data: vec![0x80; (width * height * 3) as usize],
            width,
            height,
            format: PixelFormat::Rgb24,
            timestamp_ms,
        })
    }

    /// How many times the given track has been stopped
    pub fn stop_count(&self, track_id: &str) -> usize {
        self.ledger.stops.lock().get(track_id).copied().unwrap_or(0)
    }

    /// Total stop calls across all tracks
    pub fn total_stops(&self) -> usize {
        self.ledger.stops.lock().values().sum()
    }

    /// Tracks handed out so far, duplicates included
    pub fn tracks_created(&self) -> usize {
        self.ledger.created.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for VirtualCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, constraints: &CameraConstraints) -> CaptureResult<Vec<Box<dyn MediaTrack>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        let mode = *self.mode.lock();
        match mode {
            VirtualCameraMode::PermissionDenied => Err(CaptureError::PermissionDenied(format!(
                "{} refused camera access",
                self.name
            ))),
            VirtualCameraMode::Unavailable => Err(CaptureError::DeviceUnavailable(format!(
                "{} is not connected",
                self.name
            ))),
            VirtualCameraMode::Available => {
                let index = self.ledger.next_index();
                tracing::debug!(
                    "Virtual camera {} opened at {}x{}",
                    self.name,
                    constraints.resolution.width,
                    constraints.resolution.height
                );
                let track = VirtualTrack {
                    id: format!("{}-video-{}", self.name, index),
                    ended: AtomicBool::new(false),
                    frames: self.frames.clone(),
                    ledger: self.ledger.clone(),
                };
                Ok(vec![Box::new(track)])
            }
        }
    }
}

/// A video track of a [`VirtualCamera`]
#[derive(Debug)]
pub struct VirtualTrack {
    id: String,
    ended: AtomicBool,
    frames: broadcast::Sender<Arc<CapturedFrame>>,
    ledger: Arc<TrackLedger>,
}

impl MediaTrack for VirtualTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn duplicate(&self) -> Box<dyn MediaTrack> {
        let index = self.ledger.next_index();
        Box::new(VirtualTrack {
            id: format!("{}-dup-{}", self.id, index),
            ended: AtomicBool::new(self.ended.load(Ordering::SeqCst)),
            frames: self.frames.clone(),
            ledger: self.ledger.clone(),
        })
    }

    fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
        self.ledger.record_stop(&self.id);
    }

    fn frames(&self) -> Option<FrameReceiver> {
        match self.state() {
            TrackState::Live => Some(self.frames.subscribe()),
            TrackState::Ended => None,
        }
    }
}

/// A preview surface that reports readiness immediately or when told to
pub struct VirtualSurface {
    events: broadcast::Sender<SurfaceEvent>,
    attached: Mutex<Option<Uuid>>,
    auto_render: bool,
    attach_count: AtomicUsize,
}

impl VirtualSurface {
    /// Reports `CanRender` as soon as a stream is attached
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Reports only `MetadataLoaded` on attach; call [`VirtualSurface::signal_can_render`]
    pub fn manual() -> Self {
        Self::build(false)
    }

    fn build(auto_render: bool) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            attached: Mutex::new(None),
            auto_render,
            attach_count: AtomicUsize::new(0),
        }
    }

    pub fn signal_can_render(&self) {
        let _ = self.events.send(SurfaceEvent::CanRender);
    }

    pub fn simulate_stall(&self) {
        let _ = self.events.send(SurfaceEvent::Stalled);
    }

    pub fn simulate_error(&self, message: impl Into<String>) {
        let _ = self.events.send(SurfaceEvent::Error(message.into()));
    }

    /// Stream currently bound, if any
    pub fn attached_stream(&self) -> Option<Uuid> {
        *self.attached.lock()
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }
}

impl Default for VirtualSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for VirtualSurface {
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    fn attach(&self, stream: &CameraStream) {
        *self.attached.lock() = Some(stream.id());
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(SurfaceEvent::MetadataLoaded);
        if self.auto_render {
            let _ = self.events.send(SurfaceEvent::CanRender);
        }
    }

    fn detach(&self) {
        self.attached.lock().take();
    }

    fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }
}
