//! In-memory encoder
//!
//! Buffers the raw bytes of every frame received while recording and emits
//! them as chunks on each timeslice and on the final stop flush. Frames and
//! writes that arrive while paused are dropped.

use super::encoder::{
    ChunkReceiver, ChunkSender, EncoderSession, EncoderState, RecordingError, RecordingResult,
};
use crate::capture::traits::{CapturedFrame, FrameReceiver};
use crate::capture::CameraStream;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Shared {
    state: Mutex<EncoderState>,
    pending: Mutex<Vec<u8>>,
    tx: Mutex<Option<ChunkSender>>,
    bound_tracks: Mutex<Vec<String>>,
    chunks_emitted: AtomicUsize,
}

impl Shared {
    fn append(&self, data: &[u8]) -> bool {
        if *self.state.lock() != EncoderState::Recording {
            return false;
        }
        self.pending.lock().extend_from_slice(data);
        true
    }

    fn flush(&self) {
        let data = std::mem::take(&mut *self.pending.lock());
        if data.is_empty() {
            return;
        }
        if let Some(tx) = self.tx.lock().as_ref() {
            if tx.send(data).is_ok() {
                self.chunks_emitted.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

struct Worker {
    task: JoinHandle<()>,
    stop_tx: oneshot::Sender<()>,
}

/// Encoder that keeps everything in memory
pub struct MemoryEncoder {
    supported: HashSet<String>,
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl MemoryEncoder {
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
            shared: Arc::new(Shared {
                state: Mutex::new(EncoderState::Inactive),
                pending: Mutex::new(Vec::new()),
                tx: Mutex::new(None),
                bound_tracks: Mutex::new(Vec::new()),
                chunks_emitted: AtomicUsize::new(0),
            }),
            worker: None,
        }
    }

    /// Handle for feeding and inspecting the encoder from outside
    pub fn probe(&self) -> MemoryEncoderProbe {
        MemoryEncoderProbe {
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl EncoderSession for MemoryEncoder {
    fn name(&self) -> &str {
        "memory"
    }

    fn is_type_supported(&self, media_type: &str) -> bool {
        self.supported.contains(media_type)
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
        if !self.is_type_supported(media_type) {
            return Err(RecordingError::UnsupportedFormat(vec![media_type.to_string()]));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.shared.tx.lock() = Some(tx);
        self.shared.pending.lock().clear();
        *self.shared.bound_tracks.lock() = stream.tracks().iter().map(|t| t.id().to_string()).collect();
        *self.shared.state.lock() = EncoderState::Recording;

        let frames = stream.video_tracks().find_map(|t| t.frames());
        let task = tokio::spawn(run_worker(self.shared.clone(), frames, timeslice, stop_rx));
        self.worker = Some(Worker { task, stop_tx });

        tracing::debug!("Memory encoder started ({}, {:?} slices)", media_type, timeslice);
        Ok(rx)
    }

    async fn pause(&mut self) -> RecordingResult<()> {
        let mut state = self.shared.state.lock();
        match *state {
            EncoderState::Inactive => Err(RecordingError::EncoderNotInitialized),
            _ => {
                *state = EncoderState::Paused;
                Ok(())
            }
        }
    }

    async fn resume(&mut self) -> RecordingResult<()> {
        let mut state = self.shared.state.lock();
        match *state {
            EncoderState::Inactive => Err(RecordingError::EncoderNotInitialized),
            _ => {
                *state = EncoderState::Recording;
                Ok(())
            }
        }
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let Some(worker) = self.worker.take() else {
            return Err(RecordingError::EncoderNotInitialized);
        };

        let _ = worker.stop_tx.send(());
        if let Err(e) = worker.task.await {
            tracing::warn!("Memory encoder worker failed: {}", e);
        }

        // Writes that raced the worker shutdown still belong to this recording
        self.shared.flush();
        self.shared.tx.lock().take();
        *self.shared.state.lock() = EncoderState::Inactive;
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.task.abort();
        }
        self.shared.tx.lock().take();
        self.shared.pending.lock().clear();
        *self.shared.state.lock() = EncoderState::Inactive;
    }
}

impl Drop for MemoryEncoder {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn next_frame(frames: &mut Option<FrameReceiver>) -> Arc<CapturedFrame> {
    loop {
        let Some(rx) = frames.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(frame) => return frame,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Memory encoder dropped {} frames", skipped);
            }
            Err(RecvError::Closed) => *frames = None,
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut frames: Option<FrameReceiver>,
    timeslice: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            frame = next_frame(&mut frames) => {
                shared.append(&frame.data);
            }
            _ = ticker.tick() => shared.flush(),
        }
    }

    // Frames already delivered before the stop signal
    if let Some(rx) = frames.as_mut() {
        loop {
            match rx.try_recv() {
                Ok(frame) => {
                    shared.append(&frame.data);
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
    shared.flush();
}

/// Outside view of a [`MemoryEncoder`]
#[derive(Clone)]
pub struct MemoryEncoderProbe {
    shared: Arc<Shared>,
}

impl MemoryEncoderProbe {
    /// Append encoded bytes. Ignored unless recording.
    pub fn write(&self, data: &[u8]) -> bool {
        self.shared.append(data)
    }

    /// Emit pending bytes as a chunk now
    pub fn flush(&self) {
        self.shared.flush();
    }

    pub fn state(&self) -> EncoderState {
        *self.shared.state.lock()
    }

    /// Track ids of the stream handed to `start`
    pub fn bound_tracks(&self) -> Vec<String> {
        self.shared.bound_tracks.lock().clone()
    }

    pub fn chunks_emitted(&self) -> usize {
        self.shared.chunks_emitted.load(Ordering::SeqCst)
    }
}
