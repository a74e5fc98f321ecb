//! Frame-level comparison results
//!
//! Records from the analysis service, the validated timeline with its
//! statistics, and synchronized playback of both videos over it.

pub mod timeline;
pub mod types;
pub mod viewer;

pub use timeline::{FrameMarker, MarkerKind, Timeline, TimelineError, TimelineStats};
pub use types::{sanitize_non_finite, FrameComparisonRecord};
pub use viewer::{ComparisonTimeline, PLAYBACK_SPEEDS};
