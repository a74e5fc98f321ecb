use crate::api::{AnalysisService, ApiError, ComparisonResult, ReferenceMetadata, UploadResult, UserVideoUpload};
use crate::comparison::Timeline;
use crate::recorder::RecordingHandoff;
use crate::utils::{AppError, AppResult, ErrorResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultsStatus {
    Ready,
    Uploading,
    Analyzing,
    Complete,
    Failed,
}

/// A finished recording on its way through upload and comparison.
///
/// Remote failures are kept as an inline, retryable `ErrorResponse`; the
/// recording itself is never touched by them.
pub struct ResultsSession {
    service: Arc<dyn AnalysisService>,
    threshold: f64,
    handoff: Option<RecordingHandoff>,
    status: ResultsStatus,
    upload: Option<UserVideoUpload>,
    comparison: Option<ComparisonResult>,
    error: Option<ErrorResponse>,
}

impl ResultsSession {
    pub fn new(service: Arc<dyn AnalysisService>, handoff: RecordingHandoff, threshold: f64) -> Self {
        tracing::info!(
            "Results for {} ({} bytes, {})",
            handoff.descriptor.filename,
            handoff.descriptor.size,
            handoff.descriptor.media_type
        );
        Self {
            service,
            threshold,
            handoff: Some(handoff),
            status: ResultsStatus::Ready,
            upload: None,
            comparison: None,
            error: None,
        }
    }

    pub fn status(&self) -> ResultsStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ErrorResponse> {
        self.error.as_ref()
    }

    pub fn handoff(&self) -> Option<&RecordingHandoff> {
        self.handoff.as_ref()
    }

    pub fn upload(&self) -> Option<&UserVideoUpload> {
        self.upload.as_ref()
    }

    pub fn comparison(&self) -> Option<&ComparisonResult> {
        self.comparison.as_ref()
    }

    /// Upload the recording against its reference, then compare the two.
    pub async fn analyze(&mut self) -> AppResult<ComparisonResult> {
        let handoff = self.handoff.as_ref().ok_or(AppError::NoRecording)?;
        self.error = None;
        self.comparison = None;

        self.status = ResultsStatus::Uploading;
        let upload = match self
            .service
            .upload_user_video(&handoff.asset, &handoff.reference_video_id)
            .await
        {
            Ok(upload) => upload,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::info!("Uploaded as {}", upload.user_video_id);
        let user_video_id = upload.user_video_id.clone();
        self.upload = Some(upload);

        self.status = ResultsStatus::Analyzing;
        let comparison = match self
            .service
            .compare(&user_video_id, &handoff.reference_video_id, self.threshold)
            .await
        {
            Ok(comparison) => comparison,
            Err(e) => return Err(self.fail(e)),
        };

        tracing::info!(
            "Comparison {} complete: {} differences",
            comparison.work_id,
            comparison.comparison.total_differences
        );
        self.status = ResultsStatus::Complete;
        self.comparison = Some(comparison.clone());
        Ok(comparison)
    }

    /// Clear the inline error and run the whole upload and compare sequence again
    pub async fn retry(&mut self) -> AppResult<ComparisonResult> {
        tracing::info!("Retrying analysis");
        self.error = None;
        self.analyze().await
    }

    /// Publish the recording as a new reference video
    pub async fn share_as_reference(&mut self, meta: &ReferenceMetadata) -> AppResult<UploadResult> {
        let handoff = self.handoff.as_ref().ok_or(AppError::NoRecording)?;
        let previous = self.status;
        self.error = None;
        self.status = ResultsStatus::Uploading;

        match self.service.upload_reference(&handoff.asset, meta).await {
            Ok(result) => {
                self.status = previous;
                Ok(result)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Throw the recording away and return to a fresh state. Deleting the
    /// uploaded copy is best effort.
    pub async fn discard(&mut self) {
        if let Some(upload) = self.upload.take() {
            if let Err(e) = self.service.delete_user_video(&upload.user_video_id).await {
                tracing::warn!("Failed to delete user video {}: {}", upload.user_video_id, e);
            }
        }
        self.handoff = None;
        self.comparison = None;
        self.error = None;
        self.status = ResultsStatus::Ready;
        tracing::info!("Recording discarded");
    }

    /// Fetch the frame-level comparison of the finished analysis
    pub async fn load_timeline(&mut self) -> AppResult<Timeline> {
        let work_id = self
            .comparison
            .as_ref()
            .map(|c| c.work_id.clone())
            .ok_or(AppError::NotAnalyzed)?;

        let result = match self.service.frame_comparison(&work_id).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e)),
        };
        Ok(Timeline::new(result.frame_comparisons, result.threshold)?)
    }

    fn fail(&mut self, error: ApiError) -> AppError {
        tracing::error!("Analysis request failed: {}", error);
        self.status = ResultsStatus::Failed;
        self.error = Some(ErrorResponse::from(AppError::RemoteRequestFailed(error.clone())));
        AppError::RemoteRequestFailed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiResult, ComparisonSummary, FrameComparisonResult, VideoDetails, VideoInfo};
    use crate::comparison::timeline::tests::record;
    use crate::recorder::VideoAsset;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockService {
        calls: Mutex<Vec<String>>,
        fail_compare: Mutex<bool>,
        fail_delete: bool,
    }

    fn info() -> VideoInfo {
        let details = |name: &str| VideoDetails {
            filename: name.into(),
            duration: 3.5,
            fps: 30.0,
            pose_frames: None,
        };
        VideoInfo {
            reference: details("ref.mp4"),
            user: details("recorded.webm"),
        }
    }

    #[async_trait]
    impl AnalysisService for MockService {
        async fn upload_user_video(&self, asset: &VideoAsset, reference_video_id: &str) -> ApiResult<UserVideoUpload> {
            self.calls.lock().push(format!("upload {}", reference_video_id));
            Ok(UserVideoUpload {
                user_video_id: "u-1".into(),
                filename: asset.file_name(),
                filepath: None,
                duration: 3.5,
                fps: 30.0,
                pose_data_extracted: true,
                message: None,
            })
        }

        async fn compare(&self, user_video_id: &str, reference_video_id: &str, threshold: f64) -> ApiResult<ComparisonResult> {
            self.calls
                .lock()
                .push(format!("compare {} {} {}", user_video_id, reference_video_id, threshold));
            if *self.fail_compare.lock() {
                return Err(ApiError::Transport("connection reset".into()));
            }
            Ok(ComparisonResult {
                work_id: "w-1".into(),
                reference_video_id: Some(reference_video_id.into()),
                user_video_id: Some(user_video_id.into()),
                video_info: info(),
                comparison: ComparisonSummary {
                    threshold,
                    total_differences: 1,
                    differences: vec![],
                },
                pose_videos: None,
                report_path: None,
            })
        }

        async fn frame_comparison(&self, work_id: &str) -> ApiResult<FrameComparisonResult> {
            self.calls.lock().push(format!("frames {}", work_id));
            Ok(FrameComparisonResult {
                work_id: work_id.into(),
                video_info: info(),
                frame_comparisons: vec![record(0, 0.0, true, false), record(1, 1.2, true, true)],
                threshold: 0.3,
            })
        }

        async fn delete_user_video(&self, user_video_id: &str) -> ApiResult<()> {
            self.calls.lock().push(format!("delete {}", user_video_id));
            if self.fail_delete {
                return Err(ApiError::Status {
                    status: 404,
                    body: "gone".into(),
                });
            }
            Ok(())
        }

        async fn upload_reference(&self, asset: &VideoAsset, meta: &ReferenceMetadata) -> ApiResult<UploadResult> {
            self.calls
                .lock()
                .push(format!("reference {}", meta.title.clone().unwrap_or_default()));
            Ok(UploadResult {
                video_id: Some("v-2".into()),
                filename: asset.file_name(),
                duration: 3.5,
                fps: 30.0,
                pose_data_extracted: Some(true),
                pose_video_generated: Some(true),
                pose_frames: Some(105),
                warning: None,
                message: None,
            })
        }
    }

    fn session(service: Arc<MockService>) -> ResultsSession {
        let asset = VideoAsset::from_chunks(vec![vec![1, 2, 3]], "video/webm", 3500.0);
        ResultsSession::new(service, RecordingHandoff::new("ref-1", asset), 0.3)
    }

    #[tokio::test]
    async fn test_analyze_uploads_then_compares() {
        let service = Arc::new(MockService::default());
        let mut results = session(service.clone());

        let comparison = results.analyze().await.unwrap();
        assert_eq!(comparison.work_id, "w-1");
        assert_eq!(results.status(), ResultsStatus::Complete);
        assert_eq!(
            *service.calls.lock(),
            vec!["upload ref-1".to_string(), "compare u-1 ref-1 0.3".to_string()]
        );

        let timeline = results.load_timeline().await.unwrap();
        assert_eq!(timeline.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_inline_and_retry_reissues_sequence() {
        let service = Arc::new(MockService::default());
        *service.fail_compare.lock() = true;
        let mut results = session(service.clone());

        let err = results.analyze().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(results.status(), ResultsStatus::Failed);
        let inline = results.error().unwrap();
        assert_eq!(inline.code, "REMOTE_REQUEST_FAILED");
        assert!(inline.retryable);
        assert!(results.handoff().is_some());

        *service.fail_compare.lock() = false;
        results.retry().await.unwrap();
        assert!(results.error().is_none());
        assert_eq!(results.status(), ResultsStatus::Complete);
        assert_eq!(service.calls.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_discard_deletes_upload_and_swallows_failure() {
        let service = Arc::new(MockService {
            fail_delete: true,
            ..MockService::default()
        });
        let mut results = session(service.clone());
        results.analyze().await.unwrap();

        results.discard().await;
        assert_eq!(results.status(), ResultsStatus::Ready);
        assert!(results.handoff().is_none());
        assert!(results.error().is_none());
        assert!(service.calls.lock().contains(&"delete u-1".to_string()));
        assert!(matches!(results.analyze().await, Err(AppError::NoRecording)));
    }

    #[tokio::test]
    async fn test_timeline_requires_comparison() {
        let mut results = session(Arc::new(MockService::default()));
        assert!(matches!(results.load_timeline().await, Err(AppError::NotAnalyzed)));
    }

    #[tokio::test]
    async fn test_share_as_reference() {
        let service = Arc::new(MockService::default());
        let mut results = session(service.clone());
        let meta = ReferenceMetadata {
            title: Some("My routine".into()),
            ..ReferenceMetadata::default()
        };
        let uploaded = results.share_as_reference(&meta).await.unwrap();
        assert_eq!(uploaded.video_id.as_deref(), Some("v-2"));
        assert_eq!(results.status(), ResultsStatus::Ready);
        assert_eq!(*service.calls.lock(), vec!["reference My routine".to_string()]);
    }
}
