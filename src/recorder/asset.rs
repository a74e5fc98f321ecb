//! Recorded video assets and the handoff to the results flow

use super::encoder::container_extension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Finished recording. Immutable once built.
#[derive(Debug, Clone)]
pub struct VideoAsset {
    id: Uuid,
    data: Arc<[u8]>,
    media_type: String,
    duration_ms: f64,
    created_at: DateTime<Utc>,
}

impl VideoAsset {
    /// Concatenate encoder chunks in emission order
    pub fn from_chunks(chunks: Vec<Vec<u8>>, media_type: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: chunks.concat().into(),
            media_type: media_type.into(),
            duration_ms,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the payload
    pub fn bytes(&self) -> Arc<[u8]> {
        self.data.clone()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn extension(&self) -> &'static str {
        container_extension(&self.media_type)
    }

    /// Process-local reference usable by an in-process player
    pub fn playback_url(&self) -> String {
        format!("blob:dance-practice/{}", self.id)
    }

    /// Name used when uploading the recording
    pub fn file_name(&self) -> String {
        format!("recorded_{}.{}", self.created_at.timestamp_millis(), self.extension())
    }

    pub fn descriptor(&self) -> AssetDescriptor {
        AssetDescriptor {
            filename: self.file_name(),
            size: self.size(),
            media_type: self.media_type.clone(),
        }
    }

    /// Write the payload into `dir` for playback by path
    pub fn persist(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, &self.data)?;
        tracing::info!("Saved recording to {} ({} bytes)", path.display(), self.size());
        Ok(path)
    }
}

/// File metadata synthesized for the recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    pub filename: String,
    pub size: usize,
    pub media_type: String,
}

/// Everything carried from a finished practice run to the results view
#[derive(Debug, Clone)]
pub struct RecordingHandoff {
    pub reference_video_id: String,
    pub asset: VideoAsset,
    pub descriptor: AssetDescriptor,
}

impl RecordingHandoff {
    pub fn new(reference_video_id: impl Into<String>, asset: VideoAsset) -> Self {
        let descriptor = asset.descriptor();
        Self {
            reference_video_id: reference_video_id.into(),
            asset,
            descriptor,
        }
    }
}
