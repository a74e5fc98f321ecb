//! Remote analysis service
//!
//! Pose extraction and comparison run on a separate service. This module
//! holds its wire types, the `reqwest` client, and the `AnalysisService`
//! seam the results flow is written against.

pub mod cache;
pub mod client;
pub mod dedup;
pub mod types;

pub use cache::ListCache;
pub use client::{ApiClient, ApiError, ApiResult};
pub use dedup::RequestDeduplicator;
pub use types::*;

use crate::recorder::VideoAsset;
use async_trait::async_trait;

/// Operations the results flow needs from the analysis service
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Upload a recording to be compared against a reference video
    async fn upload_user_video(&self, asset: &VideoAsset, reference_video_id: &str) -> ApiResult<UserVideoUpload>;

    async fn compare(&self, user_video_id: &str, reference_video_id: &str, threshold: f64) -> ApiResult<ComparisonResult>;

    async fn frame_comparison(&self, work_id: &str) -> ApiResult<FrameComparisonResult>;

    async fn delete_user_video(&self, user_video_id: &str) -> ApiResult<()>;

    /// Publish a recording as a new reference video
    async fn upload_reference(&self, asset: &VideoAsset, meta: &ReferenceMetadata) -> ApiResult<UploadResult>;
}
