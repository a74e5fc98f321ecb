use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dance_practice::api::{AnalysisService, ApiClient};
use dance_practice::comparison::Timeline;
use dance_practice::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dance-practice")]
#[command(about = "Practice against a reference dance video and review the comparison")]
#[command(version)]
struct Cli {
    /// JSON configuration file (defaults apply when missing)
    #[arg(short, long, default_value = "dance-practice.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List reference videos
    References,

    /// Print statistics of a finished comparison
    Stats {
        /// Work id returned by the comparison
        work_id: String,
    },

    /// Delete an uploaded user video
    DeleteUserVideo {
        /// User video id returned by the upload
        id: String,
    },

    /// Record a take against a reference video, then upload and compare it
    #[cfg(feature = "native-camera")]
    Practice {
        reference_video_id: String,

        /// Camera index (first camera when omitted)
        #[arg(long)]
        camera: Option<String>,

        /// Directory to keep a copy of the recording in
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dance_practice::init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?
        .apply_env();
    config.validate()?;
    let client = ApiClient::new(&config)?;

    match cli.command {
        Commands::References => {
            let list = client.reference_videos().await?;
            if list.videos.is_empty() {
                println!("No reference videos uploaded yet");
            }
            for video in &list.videos {
                println!(
                    "{}  {}  {:.1}s{}",
                    video.video_id,
                    video.display_name(),
                    video.duration.unwrap_or(0.0),
                    if video.has_pose_data { "" } else { "  (no pose data)" }
                );
            }
        }
        Commands::Stats { work_id } => {
            let result = client.frame_comparison(&work_id).await?;
            let timeline = Timeline::new(result.frame_comparisons, result.threshold)?;
            print_stats(&timeline);
        }
        Commands::DeleteUserVideo { id } => {
            client.delete_user_video(&id).await?;
            println!("Deleted {}", id);
        }
        #[cfg(feature = "native-camera")]
        Commands::Practice {
            reference_video_id,
            camera,
            output,
        } => practice::run(&config, client, reference_video_id, camera, output).await?,
    }

    Ok(())
}

fn print_stats(timeline: &Timeline) {
    let stats = timeline.stats();
    println!("Frames:       {}", stats.total_frames);
    println!("With pose:    {}", stats.valid_frames);
    println!("Differences:  {}", stats.difference_frames);
    println!("Sync rate:    {}", stats.sync_rate_label());
    println!("Duration:     {}", stats.duration_label());
}

#[cfg(feature = "native-camera")]
mod practice {
    use super::print_stats;
    use anyhow::{anyhow, Result};
    use dance_practice::api::ApiClient;
    use dance_practice::capture::nokhwa_camera::NokhwaCamera;
    use dance_practice::capture::{CaptureSession, FrameProbeSurface};
    use dance_practice::config::AppConfig;
    use dance_practice::playback::ClockPlayer;
    use dance_practice::recorder::{FfmpegEncoder, PracticeCoordinator, PracticeEvent, RecordingController};
    use dance_practice::results::ResultsSession;
    use std::path::PathBuf;
    use std::sync::Arc;

    pub async fn run(
        config: &AppConfig,
        client: ApiClient,
        reference_video_id: String,
        camera: Option<String>,
        output: Option<PathBuf>,
    ) -> Result<()> {
        let references = client.reference_videos().await?;
        let reference = references
            .videos
            .iter()
            .find(|v| v.video_id == reference_video_id)
            .ok_or_else(|| anyhow!("unknown reference video {}", reference_video_id))?;
        let duration = reference
            .duration
            .filter(|d| *d > 0.0)
            .ok_or_else(|| anyhow!("reference video {} has no duration", reference_video_id))?;
        println!("Practicing {} ({:.1}s)", reference.display_name(), duration);

        let player = Arc::new(ClockPlayer::new(
            "reference",
            client.reference_video_url(&reference_video_id),
            duration,
        ));
        let capture = CaptureSession::new(
            Arc::new(NokhwaCamera::new(camera)),
            Arc::new(FrameProbeSurface::new()),
        );
        let recorder = RecordingController::new(
            Box::new(FfmpegEncoder::detect().await?),
            config.media_types.clone(),
            config.recording_timeslice(),
        );
        let mut coordinator =
            PracticeCoordinator::new(reference_video_id, capture, recorder, player, config.countdown_seconds);

        let handle = coordinator.handle();
        let mut events = coordinator.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    PracticeEvent::CountdownTick(n) if n > 0 => println!("{}...", n),
                    PracticeEvent::RecordingStarted { media_type } => {
                        println!("Recording ({}), press Ctrl-C to stop", media_type)
                    }
                    PracticeEvent::RecordingStopped { trigger } => println!("Stopped ({:?})", trigger),
                    PracticeEvent::Failed(code) => println!("Failed: {}", code),
                    _ => {}
                }
            }
        });
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.stop();
            }
        });

        let handoff = coordinator.run(&config.camera).await?;
        drop(coordinator);

        if let Some(dir) = output {
            let path = handoff.asset.persist(&dir)?;
            println!("Saved {}", path.display());
        }

        let mut results = ResultsSession::new(Arc::new(client), handoff, config.comparison_threshold);
        let comparison = results.analyze().await?;
        println!(
            "Work {}: {} frames over threshold {}",
            comparison.work_id, comparison.comparison.total_differences, comparison.comparison.threshold
        );
        let timeline = results.load_timeline().await?;
        print_stats(&timeline);
        Ok(())
    }
}
