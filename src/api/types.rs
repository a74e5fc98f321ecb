//! Request and response shapes of the analysis service

use crate::comparison::FrameComparisonRecord;
use serde::{Deserialize, Deserializer, Serialize};

/// Which side of a comparison a pose video belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoRole {
    Reference,
    User,
}

impl VideoRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoRole::Reference => "reference",
            VideoRole::User => "user",
        }
    }
}

/// Result of uploading a reference video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub video_id: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub pose_data_extracted: Option<bool>,
    #[serde(default)]
    pub pose_video_generated: Option<bool>,
    #[serde(default)]
    pub pose_frames: Option<u64>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Optional details sent with a reference upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMetadata {
    pub description: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
}

/// Result of uploading a user recording against a reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVideoUpload {
    pub user_video_id: String,
    pub filename: String,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub pose_data_extracted: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub filename: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub fps: f64,
    /// Only present on compare results
    #[serde(default)]
    pub pose_frames: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub reference: VideoDetails,
    pub user: VideoDetails,
}

/// A frame whose pose difference exceeded the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseDifference {
    pub frame_idx: u64,
    pub reference_frame: u64,
    #[serde(deserialize_with = "nullable_infinite")]
    pub difference: f64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub threshold: f64,
    pub total_differences: u64,
    #[serde(default)]
    pub differences: Vec<PoseDifference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseVideoPaths {
    pub reference: String,
    pub user: String,
}

/// Result of comparing an uploaded user video with its reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub work_id: String,
    #[serde(default)]
    pub reference_video_id: Option<String>,
    #[serde(default)]
    pub user_video_id: Option<String>,
    pub video_info: VideoInfo,
    pub comparison: ComparisonSummary,
    #[serde(default)]
    pub pose_videos: Option<PoseVideoPaths>,
    #[serde(default)]
    pub report_path: Option<String>,
}

/// Frame-by-frame comparison for a work id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameComparisonResult {
    pub work_id: String,
    pub video_info: VideoInfo,
    pub frame_comparisons: Vec<FrameComparisonRecord>,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Entry of the reference video library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceVideo {
    pub video_id: String,
    pub filename: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub upload_time: Option<String>,
    #[serde(default)]
    pub has_pose_data: bool,
}

impl ReferenceVideo {
    /// Title if set, file name otherwise
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceVideoList {
    pub videos: Vec<ReferenceVideo>,
}

fn nullable_infinite<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_compare_response() {
        let json = r#"{
            "success": true,
            "work_id": "w-1",
            "video_info": {
                "reference": {"filename": "ref.mp4", "duration": 12.0, "fps": 30, "pose_frames": 60},
                "user": {"filename": "recorded_1.webm", "duration": 11.5, "fps": 30, "pose_frames": 58}
            },
            "comparison": {
                "threshold": 0.3,
                "total_differences": 1,
                "differences": [{"frame_idx": 4, "reference_frame": 20, "difference": null, "timestamp": 0.8}]
            },
            "pose_videos": {"reference": "/api/pose-video/w-1/reference", "user": "/api/pose-video/w-1/user"},
            "report_path": "reports/w-1.json"
        }"#;
        let result: ComparisonResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.work_id, "w-1");
        assert_eq!(result.video_info.reference.pose_frames, Some(60));
        assert!(result.comparison.differences[0].difference.is_infinite());
    }

    #[test]
    fn test_reference_display_name() {
        let mut video: ReferenceVideo =
            serde_json::from_str(r#"{"video_id": "v1", "filename": "salsa.mp4", "title": ""}"#).unwrap();
        assert_eq!(video.display_name(), "salsa.mp4");
        video.title = Some("Salsa basics".into());
        assert_eq!(video.display_name(), "Salsa basics");
        assert_eq!(VideoRole::User.as_str(), "user");
    }
}
