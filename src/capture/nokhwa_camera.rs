//! Native webcam capture using nokhwa
//!
//! A capture thread decodes camera frames to RGB and broadcasts them to every
//! live track. Duplicated tracks share the thread; the device closes when the
//! last track is stopped.

use super::traits::{
    CameraConstraints, CameraDevice, CameraInfo, CaptureError, CaptureResult, CapturedFrame,
    FrameReceiver, MediaTrack, PixelFormat, Resolution, TrackKind, TrackState,
};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as NokhwaResolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

const CAPTURE_FPS: u32 = 30;

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions: vec![
                        Resolution { width: 640, height: 480 },
                        Resolution { width: 320, height: 240 },
                    ],
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// State shared by the capture thread and every track it feeds
#[derive(Debug)]
struct DeviceShared {
    live_tracks: AtomicUsize,
    running: AtomicBool,
}

/// Webcam opened through nokhwa
pub struct NokhwaCamera {
    device_id: Option<String>,
    name: String,
}

impl NokhwaCamera {
    /// `device_id` of `None` picks the first camera
    pub fn new(device_id: Option<String>) -> Self {
        let name = device_id
            .as_deref()
            .map(|id| format!("camera {id}"))
            .unwrap_or_else(|| "default camera".to_string());
        Self { device_id, name }
    }

    fn camera_index(&self) -> CameraIndex {
        match &self.device_id {
            Some(id) => match id.parse::<u32>() {
                Ok(idx) => CameraIndex::Index(idx),
                Err(_) => CameraIndex::String(id.clone()),
            },
            None => CameraIndex::Index(0),
        }
    }
}

#[async_trait]
impl CameraDevice for NokhwaCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, constraints: &CameraConstraints) -> CaptureResult<Vec<Box<dyn MediaTrack>>> {
        let (frames, _) = broadcast::channel(8);
        let shared = Arc::new(DeviceShared {
            live_tracks: AtomicUsize::new(1),
            running: AtomicBool::new(true),
        });
        let (opened_tx, opened_rx) = oneshot::channel();

        let index = self.camera_index();
        let requested = constraints.resolution;
        let thread_frames = frames.clone();
        let thread_shared = shared.clone();
        std::thread::spawn(move || {
            capture_loop(index, requested, thread_frames, thread_shared, opened_tx)
        });

        match opened_rx.await {
            Ok(Ok(())) => Ok(vec![Box::new(NativeTrack {
                id: format!("{}-video", self.name),
                ended: AtomicBool::new(false),
                frames,
                shared,
            })]),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::DeviceUnavailable(
                "camera thread exited before opening".to_string(),
            )),
        }
    }
}

fn classify_error(context: &str, error: impl std::fmt::Debug) -> CaptureError {
    let message = format!("{context}: {error:?}");
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

fn capture_loop(
    index: CameraIndex,
    requested: Resolution,
    frames: broadcast::Sender<Arc<CapturedFrame>>,
    shared: Arc<DeviceShared>,
    opened: oneshot::Sender<CaptureResult<()>>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
        NokhwaResolution::new(requested.width, requested.height),
        FrameFormat::MJPEG,
        CAPTURE_FPS,
    )));

    let mut camera = match Camera::new(index.clone(), format) {
        Ok(c) => c,
        Err(e) => {
            let _ = opened.send(Err(classify_error("failed to open camera", e)));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = opened.send(Err(classify_error("failed to open camera stream", e)));
        return;
    }

    let camera_format = camera.camera_format();
    tracing::info!(
        "Webcam {:?} opened: {}x{} @ {}fps, format={:?} (requested {}x{})",
        index,
        camera_format.resolution().width(),
        camera_format.resolution().height(),
        camera_format.frame_rate(),
        camera_format.format(),
        requested.width,
        requested.height
    );
    if !confirm_open(opened, &shared) {
        tracing::debug!("Open of {:?} was abandoned, closing camera", index);
        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Error stopping camera stream: {:?}", e);
        }
        return;
    }

    let capture_start = std::time::Instant::now();
    let mut frame_count: u64 = 0;
    while shared.running.load(Ordering::SeqCst) {
        match camera.frame() {
            Ok(buffer) => match buffer.decode_image::<RgbFormat>() {
                Ok(image) => {
                    let frame = CapturedFrame {
                        width: image.width(),
                        height: image.height(),
                        data: image.into_raw(),
                        format: PixelFormat::Rgb24,
                        timestamp_ms: capture_start.elapsed().as_secs_f64() * 1000.0,
                    };
                    let _ = frames.send(Arc::new(frame));
                    frame_count += 1;
                }
                Err(e) => tracing::debug!("Failed to decode frame: {:?}", e),
            },
            Err(e) => tracing::debug!("Failed to capture frame: {:?}", e),
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
    tracing::info!(
        "Webcam capture stopped after {} frames in {:.2}s",
        frame_count,
        capture_start.elapsed().as_secs_f64()
    );
}

/// Hand the opened device to the waiting `open` call. When that call was
/// dropped no track exists to stop the thread, so it is marked not running.
fn confirm_open(opened: oneshot::Sender<CaptureResult<()>>, shared: &DeviceShared) -> bool {
    if opened.send(Ok(())).is_ok() {
        return true;
    }
    shared.running.store(false, Ordering::SeqCst);
    shared.live_tracks.store(0, Ordering::SeqCst);
    false
}

/// A track fed by the capture thread
#[derive(Debug)]
struct NativeTrack {
    id: String,
    ended: AtomicBool,
    frames: broadcast::Sender<Arc<CapturedFrame>>,
    shared: Arc<DeviceShared>,
}

impl MediaTrack for NativeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) || !self.shared.running.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn duplicate(&self) -> Box<dyn MediaTrack> {
        let live = self.state() == TrackState::Live;
        if live {
            self.shared.live_tracks.fetch_add(1, Ordering::SeqCst);
        }
        Box::new(NativeTrack {
            id: format!("{}-dup", self.id),
            ended: AtomicBool::new(!live),
            frames: self.frames.clone(),
            shared: self.shared.clone(),
        })
    }

    fn stop(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.shared.live_tracks.fetch_sub(1, Ordering::SeqCst) == 1 {
            tracing::debug!("Last track of {} stopped, closing camera", self.id);
            self.shared.running.store(false, Ordering::SeqCst);
        }
    }

    fn frames(&self) -> Option<FrameReceiver> {
        match self.state() {
            TrackState::Live => Some(self.frames.subscribe()),
            TrackState::Ended => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> DeviceShared {
        DeviceShared {
            live_tracks: AtomicUsize::new(1),
            running: AtomicBool::new(true),
        }
    }

    #[test]
    fn test_confirm_open_keeps_running_when_awaited() {
        let shared = shared();
        let (tx, mut rx) = oneshot::channel();
        assert!(confirm_open(tx, &shared));
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
        assert!(shared.running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_abandoned_open_stops_capture() {
        let shared = shared();
        let (tx, rx) = oneshot::channel();
        drop(rx);
        assert!(!confirm_open(tx, &shared));
        assert!(!shared.running.load(Ordering::SeqCst));
        assert_eq!(shared.live_tracks.load(Ordering::SeqCst), 0);
    }
}
