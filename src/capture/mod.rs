//! Camera capture
//!
//! Device, stream and preview abstractions plus the session that ties them
//! together.

pub mod session;
pub mod stream;
pub mod surface;
pub mod traits;
pub mod virtual_camera;

#[cfg(feature = "native-camera")]
pub mod nokhwa_camera;

pub use session::{CaptureEvent, CaptureSession};
pub use stream::{CameraStream, TrackHandle};
pub use surface::FrameProbeSurface;
pub use traits::{
    CameraConstraints, CameraDevice, CameraInfo, CaptureError, CaptureResult, CapturedFrame,
    DisplaySurface, FacingMode, MediaTrack, PixelFormat, Resolution, SurfaceEvent, TrackKind,
    TrackState,
};
pub use virtual_camera::{VirtualCamera, VirtualCameraMode, VirtualSurface};
