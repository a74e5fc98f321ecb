//! Capture session
//!
//! Acquires the camera, binds it to the preview surface and reports readiness
//! only once the preview can actually draw frames.

use super::stream::CameraStream;
use super::traits::{
    CameraConstraints, CameraDevice, CaptureError, CaptureResult, DisplaySurface, SurfaceEvent,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Events emitted by a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Preview is drawing frames. Fired once per successful acquisition.
    Ready { stream_id: Uuid },
    /// Camera tracks were stopped and the preview unbound
    Released { stream_id: Uuid },
}

/// Owns the live camera stream shown in the preview
pub struct CaptureSession {
    device: Arc<dyn CameraDevice>,
    surface: Arc<dyn DisplaySurface>,
    stream: Option<CameraStream>,
    ready: bool,
    event_tx: broadcast::Sender<CaptureEvent>,
}

impl CaptureSession {
    pub fn new(device: Arc<dyn CameraDevice>, surface: Arc<dyn DisplaySurface>) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            device,
            surface,
            stream: None,
            ready: false,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The stream being previewed, if acquired
    pub fn stream(&self) -> Option<&CameraStream> {
        self.stream.as_ref()
    }

    pub fn surface(&self) -> &Arc<dyn DisplaySurface> {
        &self.surface
    }

    /// Acquire the camera and wait until the preview renders frames.
    ///
    /// A session that is already ready is left untouched. Dropping the returned
    /// future mid-way leaves any partially acquired stream for [`CaptureSession::release`].
    pub async fn acquire(&mut self, constraints: &CameraConstraints) -> CaptureResult<()> {
        if self.ready && self.stream.is_some() {
            tracing::debug!("Camera already ready, ignoring acquire");
            return Ok(());
        }

        // Leftover from an acquisition that never became ready
        self.release();

        tracing::info!(
            "Acquiring camera {} ({}x{}, facing {:?}, audio {})",
            self.device.name(),
            constraints.resolution.width,
            constraints.resolution.height,
            constraints.facing,
            constraints.audio()
        );

        let tracks = self.device.open(constraints).await?;
        let stream = CameraStream::new(tracks);
        if stream.video_tracks().next().is_none() {
            // Dropping the stream stops whatever tracks it got
            return Err(CaptureError::DeviceUnavailable(
                "camera delivered no video track".to_string(),
            ));
        }

        let mut events = self.surface.subscribe();
        self.surface.attach(&stream);
        let stream_id = stream.id();
        self.stream = Some(stream);

        match wait_until_renderable(&mut events).await {
            Ok(()) => {
                self.ready = true;
                tracing::info!("Camera stream {} is rendering", stream_id);
                let _ = self.event_tx.send(CaptureEvent::Ready { stream_id });
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Camera preview failed: {}", e);
                self.release();
                Err(e)
            }
        }
    }

    /// Re-bind the preview to the current stream. Returns false when nothing is acquired.
    pub fn refresh_preview(&self) -> bool {
        match &self.stream {
            Some(stream) => {
                tracing::debug!("Re-binding preview to stream {}", stream.id());
                self.surface.detach();
                self.surface.attach(stream);
                true
            }
            None => false,
        }
    }

    /// Unbind the preview and stop every camera track. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.surface.is_attached() {
            self.surface.detach();
        }
        if let Some(stream) = self.stream.take() {
            let stopped = stream.stop();
            tracing::info!("Released camera stream {} ({} tracks stopped)", stream.id(), stopped);
            let _ = self.event_tx.send(CaptureEvent::Released {
                stream_id: stream.id(),
            });
        }
        self.ready = false;
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Wait for a genuine "can render" signal; metadata alone is not enough.
async fn wait_until_renderable(
    events: &mut broadcast::Receiver<SurfaceEvent>,
) -> CaptureResult<()> {
    loop {
        match events.recv().await {
            Ok(SurfaceEvent::CanRender) => return Ok(()),
            Ok(SurfaceEvent::MetadataLoaded) => {
                tracing::debug!("Preview metadata loaded, waiting for frames");
            }
            Ok(SurfaceEvent::Stalled) => {
                tracing::debug!("Preview stalled before first frame");
            }
            Ok(SurfaceEvent::Error(message)) => {
                return Err(CaptureError::DeviceUnavailable(message));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Missed {} preview events", skipped);
            }
            Err(RecvError::Closed) => {
                return Err(CaptureError::DeviceUnavailable(
                    "preview surface went away".to_string(),
                ));
            }
        }
    }
}
