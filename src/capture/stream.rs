//! Camera stream ownership
//!
//! A [`CameraStream`] owns the tracks handed out by a camera device and makes
//! sure each one is stopped exactly once, whichever path tears it down.

use super::traits::{FrameReceiver, MediaTrack, TrackKind, TrackState};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// A track plus its stop guard
#[derive(Debug)]
pub struct TrackHandle {
    inner: Box<dyn MediaTrack>,
    stopped: AtomicBool,
}

impl TrackHandle {
    fn new(inner: Box<dyn MediaTrack>) -> Self {
        Self {
            inner,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind()
    }

    pub fn state(&self) -> TrackState {
        if self.is_stopped() {
            TrackState::Ended
        } else {
            self.inner.state()
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Option<FrameReceiver> {
        if self.is_stopped() {
            None
        } else {
            self.inner.frames()
        }
    }

    /// Stop the underlying track. Returns false if it was already stopped.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.stop();
        true
    }

    fn duplicate(&self) -> TrackHandle {
        TrackHandle::new(self.inner.duplicate())
    }
}

/// Ownership handle over a live camera source
#[derive(Debug)]
pub struct CameraStream {
    id: Uuid,
    tracks: Vec<TrackHandle>,
}

impl CameraStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks: tracks.into_iter().map(TrackHandle::new).collect(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[TrackHandle] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &TrackHandle> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    /// True while at least one track is live
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.state() == TrackState::Live)
    }

    /// Duplicate every track into a fresh stream with its own lifecycle
    pub fn duplicate(&self) -> CameraStream {
        let duplicate = CameraStream {
            id: Uuid::new_v4(),
            tracks: self.tracks.iter().map(TrackHandle::duplicate).collect(),
        };
        tracing::debug!(
            "Duplicated stream {} into {} ({} tracks)",
            self.id,
            duplicate.id,
            duplicate.tracks.len()
        );
        duplicate
    }

    /// Stop every track that is still running. Returns how many were stopped now.
    pub fn stop(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        let stopped = self.stop();
        if stopped > 0 {
            tracing::debug!("Stream {} dropped, stopped {} tracks", self.id, stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::virtual_camera::VirtualCamera;
    use crate::capture::traits::{CameraConstraints, CameraDevice};

    async fn open_stream(camera: &VirtualCamera) -> CameraStream {
        let tracks = camera.open(&CameraConstraints::default()).await.unwrap();
        CameraStream::new(tracks)
    }

    #[tokio::test]
    async fn test_stop_is_exactly_once() {
        let camera = VirtualCamera::new("cam");
        let stream = open_stream(&camera).await;
        let track_id = stream.tracks()[0].id().to_string();

        assert_eq!(stream.stop(), 1);
        assert_eq!(stream.stop(), 0);
        drop(stream);

        assert_eq!(camera.stop_count(&track_id), 1);
    }

    #[tokio::test]
    async fn test_drop_stops_tracks() {
        let camera = VirtualCamera::new("cam");
        let stream = open_stream(&camera).await;
        let track_id = stream.tracks()[0].id().to_string();

        drop(stream);
        assert_eq!(camera.stop_count(&track_id), 1);
    }

    #[tokio::test]
    async fn test_duplicate_has_independent_lifecycle() {
        let camera = VirtualCamera::new("cam");
        let original = open_stream(&camera).await;
        let copy = original.duplicate();

        assert_ne!(original.id(), copy.id());
        assert_ne!(original.tracks()[0].id(), copy.tracks()[0].id());

        copy.stop();
        assert!(original.is_live());
        assert!(!copy.is_live());

        let copy2 = original.duplicate();
        original.stop();
        assert!(copy2.is_live());
    }
}
