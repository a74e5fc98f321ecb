//! Frame-probing preview surface
//!
//! Declares a stream renderable only after the first drawable frame arrives,
//! and reports stalls while the stream stays bound.

use super::stream::CameraStream;
use super::traits::{DisplaySurface, FrameReceiver, SurfaceEvent};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default window without frames before a bound stream counts as stalled
pub const DEFAULT_STALL_AFTER: Duration = Duration::from_millis(1500);

struct Probe {
    stream_id: Uuid,
    task: JoinHandle<()>,
}

/// Preview surface that watches the frames of the bound stream's video track
pub struct FrameProbeSurface {
    events: broadcast::Sender<SurfaceEvent>,
    stall_after: Duration,
    probe: Mutex<Option<Probe>>,
}

impl FrameProbeSurface {
    pub fn new() -> Self {
        Self::with_stall_window(DEFAULT_STALL_AFTER)
    }

    pub fn with_stall_window(stall_after: Duration) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            stall_after,
            probe: Mutex::new(None),
        }
    }

    /// Stream currently bound, if any
    pub fn bound_stream(&self) -> Option<Uuid> {
        self.probe.lock().as_ref().map(|p| p.stream_id)
    }
}

impl Default for FrameProbeSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for FrameProbeSurface {
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    fn attach(&self, stream: &CameraStream) {
        self.detach();

        let Some(frames) = stream.video_tracks().find_map(|t| t.frames()) else {
            let _ = self
                .events
                .send(SurfaceEvent::Error("stream has no live video track".to_string()));
            return;
        };

        let _ = self.events.send(SurfaceEvent::MetadataLoaded);
        let task = tokio::spawn(watch_frames(frames, self.events.clone(), self.stall_after));
        *self.probe.lock() = Some(Probe {
            stream_id: stream.id(),
            task,
        });
    }

    fn detach(&self) {
        if let Some(probe) = self.probe.lock().take() {
            probe.task.abort();
        }
    }

    fn is_attached(&self) -> bool {
        self.probe.lock().is_some()
    }
}

impl Drop for FrameProbeSurface {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn watch_frames(
    mut frames: FrameReceiver,
    events: broadcast::Sender<SurfaceEvent>,
    stall_after: Duration,
) {
    let mut rendering = false;
    let mut stalled = false;

    loop {
        match tokio::time::timeout(stall_after, frames.recv()).await {
            Ok(Ok(frame)) => {
                if !frame.is_renderable() {
                    continue;
                }
                if !rendering || stalled {
                    rendering = true;
                    stalled = false;
                    let _ = events.send(SurfaceEvent::CanRender);
                }
            }
            Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) => {
                let _ = events.send(SurfaceEvent::Error("frame source closed".to_string()));
                return;
            }
            Err(_) => {
                if rendering && !stalled {
                    stalled = true;
                    tracing::debug!("No preview frame for {:?}", stall_after);
                    let _ = events.send(SurfaceEvent::Stalled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::{CameraConstraints, CameraDevice};
    use crate::capture::virtual_camera::VirtualCamera;

    #[tokio::test(start_paused = true)]
    async fn test_can_render_waits_for_a_drawable_frame() {
        let camera = VirtualCamera::new("cam");
        let stream = CameraStream::new(camera.open(&CameraConstraints::default()).await.unwrap());
        let surface = FrameProbeSurface::with_stall_window(Duration::from_millis(200));
        let mut events = surface.subscribe();

        surface.attach(&stream);
        assert_eq!(events.recv().await.unwrap(), SurfaceEvent::MetadataLoaded);
        assert_eq!(surface.bound_stream(), Some(stream.id()));

        tokio::task::yield_now().await;
        camera.push_frame(crate::capture::traits::CapturedFrame {
            data: Vec::new(),
            width: 0,
            height: 0,
            format: crate::capture::traits::PixelFormat::Rgb24,
            timestamp_ms: 0.0,
        });
        camera.push_test_pattern(4, 4, 33.0);
        assert_eq!(events.recv().await.unwrap(), SurfaceEvent::CanRender);

        // No more frames: the bound stream stalls once
        assert_eq!(events.recv().await.unwrap(), SurfaceEvent::Stalled);

        camera.push_test_pattern(4, 4, 500.0);
        assert_eq!(events.recv().await.unwrap(), SurfaceEvent::CanRender);

        surface.detach();
        assert!(!surface.is_attached());
    }

    #[tokio::test]
    async fn test_stopped_stream_reports_error() {
        let camera = VirtualCamera::new("cam");
        let stream = CameraStream::new(camera.open(&CameraConstraints::default()).await.unwrap());
        stream.stop();

        let surface = FrameProbeSurface::new();
        let mut events = surface.subscribe();
        surface.attach(&stream);

        assert!(matches!(events.recv().await.unwrap(), SurfaceEvent::Error(_)));
        assert!(!surface.is_attached());
    }
}
