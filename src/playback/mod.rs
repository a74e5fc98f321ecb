//! Video playback
//!
//! Video element abstraction, a headless clock-driven player and the
//! synchronizer that ties recording and comparison playback together.

pub mod clock_player;
pub mod sync;
pub mod traits;

pub use clock_player::ClockPlayer;
pub use sync::{snap_to, LifecycleWatch, PlaybackSynchronizer, StopTrigger};
pub use traits::{PlaybackError, PlaybackEvent, VideoElement};
