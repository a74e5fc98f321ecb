//! Recording system module
//!
//! This module implements the practice recording pipeline:
//! - EncoderSession trait for different encoder backends
//! - RecordingController bound to a duplicate of the camera stream
//! - CountdownController gating the start of a take
//! - PracticeCoordinator to orchestrate a whole take

pub mod asset;
pub mod controller;
pub mod coordinator;
pub mod countdown;
pub mod encoder;
pub mod ffmpeg;
pub mod memory_encoder;
pub mod state;

pub use asset::{AssetDescriptor, RecordingHandoff, VideoAsset};
pub use controller::{RecordingController, RecordingEvent};
pub use coordinator::{PracticeCommand, PracticeCoordinator, PracticeEvent, PracticeHandle};
pub use countdown::CountdownController;
pub use encoder::{
    select_media_type, EncoderSession, EncoderState, RecordingError, RecordingResult, DEFAULT_MEDIA_TYPES,
};
pub use ffmpeg::FfmpegEncoder;
pub use memory_encoder::{MemoryEncoder, MemoryEncoderProbe};
pub use state::{RecordingSegment, RecordingState};
