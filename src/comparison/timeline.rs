//! Comparison timeline and its derived statistics

use super::types::FrameComparisonRecord;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("Record {position} is out of order")]
    OutOfOrder { position: usize },
}

/// Ordered comparison records and the threshold behind `has_difference`
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    records: Vec<FrameComparisonRecord>,
    threshold: f64,
}

impl Timeline {
    /// Frame indices must ascend strictly and timestamps must not decrease
    pub fn new(records: Vec<FrameComparisonRecord>, threshold: f64) -> Result<Self, TimelineError> {
        for (position, pair) in records.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.frame_index <= prev.frame_index || next.timestamp < prev.timestamp {
                return Err(TimelineError::OutOfOrder {
                    position: position + 1,
                });
            }
        }
        Ok(Self { records, threshold })
    }

    pub fn records(&self) -> &[FrameComparisonRecord] {
        &self.records
    }

    pub fn get(&self, position: usize) -> Option<&FrameComparisonRecord> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Computed on every call from the records
    pub fn stats(&self) -> TimelineStats {
        let valid: Vec<_> = self.records.iter().filter(|r| r.has_pose_data).collect();
        let different_valid = valid.iter().filter(|r| r.has_difference).count();
        let sync_rate = if valid.is_empty() {
            0.0
        } else {
            (valid.len() - different_valid) as f64 / valid.len() as f64 * 100.0
        };

        TimelineStats {
            total_frames: self.records.len(),
            valid_frames: valid.len(),
            difference_frames: self.records.iter().filter(|r| r.has_difference).count(),
            sync_rate,
            duration: self.records.iter().map(|r| r.timestamp).fold(0.0, f64::max),
        }
    }

    /// One marker per record for drawing the timeline strip
    pub fn markers(&self, current: Option<usize>) -> Vec<FrameMarker> {
        self.records
            .iter()
            .enumerate()
            .map(|(position, record)| FrameMarker {
                position,
                frame_index: record.frame_index,
                timestamp: record.timestamp,
                kind: MarkerKind::of(record),
                is_current: current == Some(position),
            })
            .collect()
    }
}

/// Aggregates over a timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStats {
    pub total_frames: usize,
    /// Frames with pose data on both sides
    pub valid_frames: usize,
    pub difference_frames: usize,
    /// Percentage of valid frames without a difference
    pub sync_rate: f64,
    /// Largest timestamp, seconds
    pub duration: f64,
}

impl TimelineStats {
    pub fn sync_rate_label(&self) -> String {
        if self.valid_frames == 0 {
            "0%".to_string()
        } else {
            format!("{:.1}%", self.sync_rate)
        }
    }

    pub fn duration_label(&self) -> String {
        if self.total_frames == 0 {
            "0s".to_string()
        } else {
            format!("{:.1}s", self.duration)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum MarkerKind {
    /// Poses differ by the given amount
    Difference(f64),
    NoPoseData,
    InSync,
}

impl MarkerKind {
    fn of(record: &FrameComparisonRecord) -> Self {
        if !record.has_pose_data {
            MarkerKind::NoPoseData
        } else if record.has_difference {
            MarkerKind::Difference(record.difference)
        } else {
            MarkerKind::InSync
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMarker {
    pub position: usize,
    pub frame_index: u64,
    pub timestamp: f64,
    pub kind: MarkerKind,
    pub is_current: bool,
}

impl FrameMarker {
    /// Hover text for the marker
    pub fn title(&self) -> String {
        match self.kind {
            MarkerKind::NoPoseData => format!("Frame {}: no pose data", self.frame_index),
            MarkerKind::Difference(d) => format!("Frame {}: difference {:.3}", self.frame_index, d),
            MarkerKind::InSync => format!("Frame {}: in sync", self.frame_index),
        }
    }
}
