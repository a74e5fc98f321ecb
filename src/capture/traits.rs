//! Capture trait definitions
//!
//! Backend-agnostic traits for camera sources and the surfaces that preview them.

use super::stream::CameraStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur while acquiring or previewing a camera
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Which way the camera should face
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the dancer
    #[default]
    User,
    /// Rear camera
    Environment,
}

/// What the practice flow asks of the camera.
///
/// Audio is never requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConstraints {
    pub resolution: Resolution,
    pub facing: FacingMode,
}

impl CameraConstraints {
    pub fn new(width: u32, height: u32, facing: FacingMode) -> Self {
        Self {
            resolution: Resolution { width, height },
            facing,
        }
    }

    /// Always false for this flow
    pub fn audio(&self) -> bool {
        false
    }
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self::new(320, 240, FacingMode::User)
    }
}

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Rgba,
    Yuyv422,
    Nv12,
    Mjpeg,
}

impl PixelFormat {
    /// FFmpeg `-pixel_format` name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Yuyv422 => "yuyv422",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Mjpeg => "mjpeg",
        }
    }
}

/// Frame data from a capture source
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw frame bytes in `format`
    pub data: Vec<u8>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Pixel layout
    pub format: PixelFormat,

    /// Timestamp in milliseconds (process time)
    pub timestamp_ms: f64,
}

impl CapturedFrame {
    /// A frame that a preview could actually draw
    pub fn is_renderable(&self) -> bool {
        self.width > 0 && self.height > 0 && !self.data.is_empty()
    }
}

/// Receiving side of a track's frame feed
pub type FrameReceiver = broadcast::Receiver<Arc<CapturedFrame>>;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Liveness of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

/// A single media track delivered by a camera device
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    fn state(&self) -> TrackState;

    /// Create an independent duplicate of this track.
    ///
    /// The duplicate shares the device input but has its own stop lifecycle:
    /// stopping either one leaves the other live.
    fn duplicate(&self) -> Box<dyn MediaTrack>;

    /// Stop delivering media. Called at most once per track by [`CameraStream`].
    fn stop(&self);

    /// Subscribe to decoded frames, if this track is still live
    fn frames(&self) -> Option<FrameReceiver>;
}

/// A camera that can be opened into a set of tracks
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Human readable device name
    fn name(&self) -> &str;

    /// Open the device with the given constraints.
    ///
    /// Suspends while the platform asks the user for permission.
    async fn open(&self, constraints: &CameraConstraints) -> CaptureResult<Vec<Box<dyn MediaTrack>>>;
}

/// Events reported by a display surface bound to a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Dimensions are known; nothing is drawable yet
    MetadataLoaded,
    /// Frames are decodable and the preview is drawing
    CanRender,
    /// Frames stopped arriving while bound
    Stalled,
    /// The surface gave up on the stream
    Error(String),
}

/// Where the live camera preview is rendered
pub trait DisplaySurface: Send + Sync {
    /// Subscribe before [`DisplaySurface::attach`] to observe every event of a binding
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;

    /// Bind the stream for preview, replacing any previous binding
    fn attach(&self, stream: &CameraStream);

    /// Unbind the current stream, if any
    fn detach(&self);

    fn is_attached(&self) -> bool;
}
