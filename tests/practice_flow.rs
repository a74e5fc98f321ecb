use async_trait::async_trait;
use dance_practice::api::{
    AnalysisService, ApiResult, ComparisonResult, ComparisonSummary, FrameComparisonResult, ReferenceMetadata,
    UploadResult, UserVideoUpload, VideoDetails, VideoInfo,
};
use dance_practice::capture::{CameraConstraints, CaptureSession, VirtualCamera, VirtualSurface};
use dance_practice::comparison::{ComparisonTimeline, FrameComparisonRecord};
use dance_practice::playback::{ClockPlayer, StopTrigger, VideoElement};
use dance_practice::recorder::{
    MemoryEncoder, PracticeCoordinator, PracticeEvent, RecordingController, RecordingState, VideoAsset,
};
use dance_practice::results::{ResultsSession, ResultsStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Analysis service that accepts everything and answers with fixed data
#[derive(Default)]
struct FakeAnalysis {
    uploaded_bytes: Mutex<Option<usize>>,
}

fn info() -> VideoInfo {
    VideoInfo {
        reference: VideoDetails {
            filename: "reference.mp4".into(),
            duration: 3.0,
            fps: 30.0,
            pose_frames: Some(90),
        },
        user: VideoDetails {
            filename: "recorded.webm".into(),
            duration: 3.0,
            fps: 30.0,
            pose_frames: Some(88),
        },
    }
}

fn record(frame_index: u64, timestamp: f64, has_pose_data: bool, has_difference: bool) -> FrameComparisonRecord {
    FrameComparisonRecord {
        frame_index,
        reference_frame: frame_index,
        user_frame: frame_index,
        timestamp,
        difference: if has_pose_data { 0.1 } else { -1.0 },
        has_difference,
        has_pose_data,
        pose_quality_issue: false,
    }
}

#[async_trait]
impl AnalysisService for FakeAnalysis {
    async fn upload_user_video(&self, asset: &VideoAsset, _reference_video_id: &str) -> ApiResult<UserVideoUpload> {
        *self.uploaded_bytes.lock() = Some(asset.size());
        Ok(UserVideoUpload {
            user_video_id: "user-1".into(),
            filename: asset.file_name(),
            filepath: None,
            duration: 3.0,
            fps: 30.0,
            pose_data_extracted: true,
            message: None,
        })
    }

    async fn compare(&self, user_video_id: &str, reference_video_id: &str, threshold: f64) -> ApiResult<ComparisonResult> {
        Ok(ComparisonResult {
            work_id: "work-1".into(),
            reference_video_id: Some(reference_video_id.into()),
            user_video_id: Some(user_video_id.into()),
            video_info: info(),
            comparison: ComparisonSummary {
                threshold,
                total_differences: 2,
                differences: Vec::new(),
            },
            pose_videos: None,
            report_path: None,
        })
    }

    async fn frame_comparison(&self, work_id: &str) -> ApiResult<FrameComparisonResult> {
        // 10 records, 8 with pose data, 2 of those over threshold
        let frame_comparisons = (0..10)
            .map(|i| record(i, i as f64 * 0.3, i < 8, i == 2 || i == 5))
            .collect();
        Ok(FrameComparisonResult {
            work_id: work_id.into(),
            video_info: info(),
            frame_comparisons,
            threshold: 0.3,
        })
    }

    async fn delete_user_video(&self, _user_video_id: &str) -> ApiResult<()> {
        Ok(())
    }

    async fn upload_reference(&self, asset: &VideoAsset, _meta: &ReferenceMetadata) -> ApiResult<UploadResult> {
        Ok(UploadResult {
            video_id: Some("reference-2".into()),
            filename: asset.file_name(),
            duration: 3.0,
            fps: 30.0,
            pose_data_extracted: Some(true),
            pose_video_generated: Some(false),
            pose_frames: None,
            warning: None,
            message: None,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_practice_take_through_comparison() {
    let camera = Arc::new(VirtualCamera::new("virtual"));
    let surface = Arc::new(VirtualSurface::new());
    let reference = Arc::new(ClockPlayer::new("reference", "mem://reference", 3.0));

    let encoder = MemoryEncoder::new(["video/webm;codecs=vp8"]);
    let probe = encoder.probe();
    let recorder = RecordingController::new(
        Box::new(encoder),
        vec!["video/webm".to_string(), "video/webm;codecs=vp8".to_string()],
        Duration::from_millis(1000),
    );
    let capture = CaptureSession::new(camera.clone(), surface.clone());
    let mut coordinator = PracticeCoordinator::new("reference-1", capture, recorder, reference.clone(), 3);
    let mut events = coordinator.subscribe();

    let writer = tokio::spawn(async move {
        loop {
            probe.write(b"frame");
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
    });

    let handoff = coordinator
        .run(&CameraConstraints::default())
        .await
        .expect("take completes");
    writer.abort();

    assert_eq!(coordinator.state(), RecordingState::Stopped);
    assert_eq!(camera.total_stops(), camera.tracks_created());
    assert_eq!(handoff.descriptor.media_type, "video/webm;codecs=vp8");
    assert!(handoff.descriptor.filename.starts_with("recorded_"));
    assert!(handoff.descriptor.filename.ends_with(".webm"));
    assert!(handoff.asset.duration_ms() >= 2900.0);

    let mut stopped = None;
    while let Ok(event) = events.try_recv() {
        if let PracticeEvent::RecordingStopped { trigger } = event {
            stopped = Some(trigger);
        }
    }
    assert_eq!(stopped, Some(StopTrigger::Ended));

    let recorded_size = handoff.asset.size();
    let service = Arc::new(FakeAnalysis::default());
    let mut results = ResultsSession::new(service.clone(), handoff, 0.3);
    let comparison = results.analyze().await.unwrap();
    assert_eq!(comparison.work_id, "work-1");
    assert_eq!(results.status(), ResultsStatus::Complete);
    assert_eq!(*service.uploaded_bytes.lock(), Some(recorded_size));

    let timeline = results.load_timeline().await.unwrap();
    let stats = timeline.stats();
    assert_eq!(stats.sync_rate_label(), "75.0%");
    assert_eq!(stats.duration_label(), "2.7s");

    let reference_view = Arc::new(ClockPlayer::new("reference-view", "mem://reference", 3.0));
    let user_view = Arc::new(ClockPlayer::new("user-view", "mem://user", 3.0));
    let mut viewer = ComparisonTimeline::new(timeline, reference_view.clone(), user_view.clone());
    assert!(viewer.jump_to_frame(5));
    assert_eq!(reference_view.current_time(), 5.0 * 0.3);
    assert_eq!(user_view.current_time(), 5.0 * 0.3);
    assert!(!viewer.jump_to_frame(10));
    assert_eq!(viewer.current_frame(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_second_take_after_reset() {
    let camera = Arc::new(VirtualCamera::new("virtual"));
    let surface = Arc::new(VirtualSurface::new());
    let reference = Arc::new(ClockPlayer::new("reference", "mem://reference", 2.0));
    let recorder = RecordingController::new(
        Box::new(MemoryEncoder::new(["video/webm"])),
        vec!["video/webm".to_string()],
        Duration::from_millis(500),
    );
    let capture = CaptureSession::new(camera.clone(), surface);
    let mut coordinator = PracticeCoordinator::new("reference-1", capture, recorder, reference, 3);

    let handle = coordinator.handle();
    let mut events = coordinator.subscribe();
    let resetter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if matches!(event, PracticeEvent::RecordingStarted { .. }) {
                handle.reset();
                return;
            }
        }
    });

    assert!(coordinator.run(&CameraConstraints::default()).await.is_err());
    resetter.await.unwrap();
    assert_eq!(coordinator.state(), RecordingState::Idle);
    assert_eq!(camera.total_stops(), camera.tracks_created());

    let handoff = coordinator.run(&CameraConstraints::default()).await.unwrap();
    assert_eq!(handoff.reference_video_id, "reference-1");
    assert_eq!(camera.open_count(), 2);
    assert_eq!(camera.total_stops(), camera.tracks_created());
}
