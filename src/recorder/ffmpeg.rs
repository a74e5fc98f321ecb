//! FFmpeg encoder session
//!
//! Pipes frames of the cloned video track into an `ffmpeg` child process and
//! reads the encoded container back from its stdout. The process is spawned on
//! the first drawable frame, since that frame fixes the input geometry.

use super::encoder::{
    ChunkReceiver, ChunkSender, EncoderSession, EncoderState, RecordingError, RecordingResult,
};
use crate::capture::traits::{CapturedFrame, FrameReceiver, PixelFormat};
use crate::capture::CameraStream;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const INPUT_FPS: u32 = 30;
const READ_BUFFER: usize = 64 * 1024;

/// Container muxer and video codec for a media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub muxer: &'static str,
    pub codec: &'static str,
}

/// Map a MIME type to the ffmpeg muxer/codec pair that produces it
pub fn output_format(media_type: &str) -> Option<OutputFormat> {
    let normalized: String = media_type
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let (muxer, codec) = match normalized.as_str() {
        "video/webm" | "video/webm;codecs=vp8" => ("webm", "libvpx"),
        "video/webm;codecs=vp9" => ("webm", "libvpx-vp9"),
        "video/mp4" | "video/mp4;codecs=avc1" => ("mp4", "libx264"),
        "video/ogg" | "video/ogg;codecs=theora" => ("ogg", "libtheora"),
        _ => return None,
    };
    Some(OutputFormat { muxer, codec })
}

/// Parse the encoder names out of `ffmpeg -encoders`
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            let is_flag_column = flags.len() == 6
                && flags.chars().all(|c| "VASFXBD.".contains(c))
                && name != "=";
            is_flag_column.then(|| name.to_string())
        })
        .collect()
}

fn ffmpeg_args(format: &OutputFormat, frame: &CapturedFrame) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    if frame.format == PixelFormat::Mjpeg {
        args.extend(["-f", "mjpeg"].map(String::from));
    } else {
        args.extend([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pixel_format".to_string(),
            frame.format.ffmpeg_name().to_string(),
            "-video_size".to_string(),
            format!("{}x{}", frame.width, frame.height),
        ]);
    }
    args.extend([
        "-framerate".to_string(),
        INPUT_FPS.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        format.codec.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);

    match format.codec {
        "libvpx" | "libvpx-vp9" => {
            args.extend(["-deadline", "realtime", "-cpu-used", "8", "-b:v", "1M"].map(String::from));
        }
        "libx264" => {
            args.extend(["-preset", "veryfast", "-crf", "23"].map(String::from));
            // A pipe cannot be seeked back to write the moov atom
            args.extend(["-movflags", "frag_keyframe+empty_moov+default_base_moof"].map(String::from));
        }
        _ => {}
    }

    args.extend(["-f".to_string(), format.muxer.to_string(), "-".to_string()]);
    args
}

#[derive(Debug)]
struct Shared {
    state: Mutex<EncoderState>,
    pending: Mutex<Vec<u8>>,
    tx: Mutex<Option<ChunkSender>>,
}

impl Shared {
    fn flush(&self) {
        let data = std::mem::take(&mut *self.pending.lock());
        if data.is_empty() {
            return;
        }
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(data);
        }
    }

    fn is_recording(&self) -> bool {
        *self.state.lock() == EncoderState::Recording
    }
}

struct Worker {
    task: JoinHandle<()>,
    stop_tx: oneshot::Sender<()>,
}

/// Encoder backed by an `ffmpeg` child process
pub struct FfmpegEncoder {
    available: HashSet<String>,
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl FfmpegEncoder {
    /// Query the installed ffmpeg for its encoders
    pub async fn detect() -> RecordingResult<Self> {
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| RecordingError::EncodingError(format!("FFmpeg not available: {e}")))?;

        if !output.status.success() {
            return Err(RecordingError::EncodingError(format!(
                "ffmpeg -encoders exited with {}",
                output.status
            )));
        }

        let available = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
        tracing::info!("FFmpeg reports {} encoders", available.len());
        Ok(Self::with_encoders(available))
    }

    /// Use a known encoder set instead of asking ffmpeg
    pub fn with_encoders(available: HashSet<String>) -> Self {
        Self {
            available,
            shared: Arc::new(Shared {
                state: Mutex::new(EncoderState::Inactive),
                pending: Mutex::new(Vec::new()),
                tx: Mutex::new(None),
            }),
            worker: None,
        }
    }
}

#[async_trait]
impl EncoderSession for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_type_supported(&self, media_type: &str) -> bool {
        output_format(media_type)
            .map(|f| self.available.contains(f.codec))
            .unwrap_or(false)
    }

    fn state(&self) -> EncoderState {
        *self.shared.state.lock()
    }

    async fn start(
        &mut self,
        stream: &CameraStream,
        media_type: &str,
        timeslice: Duration,
    ) -> RecordingResult<ChunkReceiver> {
        if self.state() != EncoderState::Inactive {
            return Err(RecordingError::AlreadyRecording);
        }
        let format = output_format(media_type)
            .filter(|f| self.available.contains(f.codec))
            .ok_or_else(|| RecordingError::UnsupportedFormat(vec![media_type.to_string()]))?;
        let frames = stream
            .video_tracks()
            .find_map(|t| t.frames())
            .ok_or_else(|| RecordingError::EncodingError("stream has no live video track".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.shared.tx.lock() = Some(tx);
        self.shared.pending.lock().clear();
        *self.shared.state.lock() = EncoderState::Recording;

        let task = tokio::spawn(run_pipeline(self.shared.clone(), format, frames, timeslice, stop_rx));
        self.worker = Some(Worker { task, stop_tx });

        tracing::info!("FFmpeg encoder armed: {} via {}/{}", media_type, format.muxer, format.codec);
        Ok(rx)
    }

    async fn pause(&mut self) -> RecordingResult<()> {
        let mut state = self.shared.state.lock();
        if *state == EncoderState::Inactive {
            return Err(RecordingError::EncoderNotInitialized);
        }
        *state = EncoderState::Paused;
        Ok(())
    }

    async fn resume(&mut self) -> RecordingResult<()> {
        let mut state = self.shared.state.lock();
        if *state == EncoderState::Inactive {
            return Err(RecordingError::EncoderNotInitialized);
        }
        *state = EncoderState::Recording;
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let Some(worker) = self.worker.take() else {
            return Err(RecordingError::EncoderNotInitialized);
        };

        let _ = worker.stop_tx.send(());
        let result = worker.task.await;

        self.shared.flush();
        self.shared.tx.lock().take();
        *self.shared.state.lock() = EncoderState::Inactive;

        result.map_err(|e| RecordingError::EncodingError(format!("FFmpeg pipeline failed: {e}")))
    }

    fn abort(&mut self) {
        if let Some(worker) = self.worker.take() {
            // The child is killed when the task drops it
            worker.task.abort();
        }
        self.shared.tx.lock().take();
        self.shared.pending.lock().clear();
        *self.shared.state.lock() = EncoderState::Inactive;
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.abort();
    }
}

struct Process {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: JoinHandle<()>,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl Process {
    fn spawn(shared: Arc<Shared>, format: &OutputFormat, first: &CapturedFrame) -> std::io::Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(ffmpeg_args(format, first))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stdout not captured"))?;

        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => shared.pending.lock().extend_from_slice(&buf[..n]),
                    Err(e) => {
                        tracing::warn!("Failed to read ffmpeg output: {}", e);
                        break;
                    }
                }
            }
        });

        tracing::info!(
            "Started FFmpeg encoder: {}x{} {} -> {}/{}",
            first.width,
            first.height,
            first.format.ffmpeg_name(),
            format.muxer,
            format.codec
        );

        Ok(Self {
            child,
            stdin,
            reader,
            width: first.width,
            height: first.height,
            frames_written: 0,
        })
    }

    async fn write_frame(&mut self, frame: &CapturedFrame) {
        if frame.width != self.width || frame.height != self.height {
            tracing::debug!(
                "Skipping {}x{} frame, encoder is fixed at {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            );
            return;
        }
        if let Some(stdin) = self.stdin.as_mut() {
            if let Err(e) = stdin.write_all(&frame.data).await {
                tracing::warn!("FFmpeg stopped accepting frames: {}", e);
                self.stdin = None;
            } else {
                self.frames_written += 1;
            }
        }
    }

    /// Close stdin and wait until ffmpeg has written everything
    async fn finish(mut self) {
        drop(self.stdin.take());
        if let Err(e) = (&mut self.reader).await {
            tracing::warn!("FFmpeg reader task failed: {}", e);
        }
        match self.child.wait().await {
            Ok(status) if !status.success() => {
                tracing::warn!("FFmpeg exited with status {}", status);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to wait for ffmpeg: {}", e),
        }
        tracing::info!("FFmpeg encoder finished after {} frames", self.frames_written);
    }
}

async fn run_pipeline(
    shared: Arc<Shared>,
    format: OutputFormat,
    mut frames: FrameReceiver,
    timeslice: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
    let mut process: Option<Process> = None;
    let mut source_open = true;

    async fn accept(
        shared: &Arc<Shared>,
        format: &OutputFormat,
        process: &mut Option<Process>,
        frame: &CapturedFrame,
    ) {
        if !shared.is_recording() || !frame.is_renderable() {
            return;
        }
        if process.is_none() {
            match Process::spawn(shared.clone(), format, frame) {
                Ok(p) => *process = Some(p),
                Err(e) => {
                    tracing::error!("Failed to start FFmpeg: {}", e);
                    return;
                }
            }
        }
        if let Some(p) = process.as_mut() {
            p.write_frame(frame).await;
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            frame = frames.recv(), if source_open => match frame {
                Ok(frame) => accept(&shared, &format, &mut process, &frame).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("FFmpeg encoder dropped {} frames", skipped);
                }
                Err(RecvError::Closed) => source_open = false,
            },
            _ = ticker.tick() => shared.flush(),
        }
    }

    // Frames already delivered before the stop signal
    loop {
        match frames.try_recv() {
            Ok(frame) => accept(&shared, &format, &mut process, &frame).await,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    match process {
        Some(p) => p.finish().await,
        None => tracing::warn!("FFmpeg encoder stopped before any frame arrived"),
    }
    shared.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D libvpx               libvpx VP8 (codec vp8)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_encoder_list() {
        let encoders = parse_encoder_list(ENCODERS);
        assert!(encoders.contains("libx264"));
        assert!(encoders.contains("libvpx-vp9"));
        assert!(encoders.contains("aac"));
        assert!(!encoders.contains("="));
        assert!(!encoders.contains("libtheora"));
    }

    #[test]
    fn test_output_format_mapping() {
        assert_eq!(output_format("video/webm").unwrap().codec, "libvpx");
        assert_eq!(output_format("video/webm; codecs=vp9").unwrap().codec, "libvpx-vp9");
        assert_eq!(output_format("video/mp4").unwrap().muxer, "mp4");
        assert_eq!(output_format("video/ogg;codecs=theora").unwrap().codec, "libtheora");
        assert!(output_format("video/quicktime").is_none());
    }

    #[test]
    fn test_support_depends_on_installed_codecs() {
        let encoder = FfmpegEncoder::with_encoders(parse_encoder_list(ENCODERS));
        assert!(encoder.is_type_supported("video/webm;codecs=vp9"));
        assert!(encoder.is_type_supported("video/mp4"));
        assert!(!encoder.is_type_supported("video/ogg;codecs=theora"));
    }

    #[test]
    fn test_args_for_raw_frames() {
        let frame = CapturedFrame {
            data: vec![0; 320 * 240 * 3],
            width: 320,
            height: 240,
            format: PixelFormat::Rgb24,
            timestamp_ms: 0.0,
        };
        let args = ffmpeg_args(&output_format("video/mp4").unwrap(), &frame);
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pixel_format rgb24 -video_size 320x240"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("empty_moov"));
        assert!(joined.ends_with("-f mp4 -"));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut encoder = FfmpegEncoder::with_encoders(HashSet::new());
        assert!(matches!(encoder.stop().await, Err(RecordingError::EncoderNotInitialized)));
        assert!(matches!(encoder.pause().await, Err(RecordingError::EncoderNotInitialized)));
    }
}
