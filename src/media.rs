//! Media source collaborator: resolves TTS media ids to audio bytes

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::MediaError;

/// Audio fetched from a media source
#[derive(Debug, Clone)]
pub struct MediaAudio {
    /// Container format, e.g. "wav"
    pub format: String,
    pub data: Bytes,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch_audio(&self, media_id: &str) -> Result<MediaAudio, MediaError>;
}

/// Media stored as files under a root directory
///
/// The media id is a path relative to the root; the format is the file extension.
pub struct FileMediaSource {
    root: PathBuf,
}

impl FileMediaSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, media_id: &str) -> Option<PathBuf> {
        let relative = Path::new(media_id);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if media_id.is_empty() || !is_plain {
            return None;
        }

        Some(self.root.join(relative))
    }
}

#[async_trait]
impl MediaSource for FileMediaSource {
    async fn fetch_audio(&self, media_id: &str) -> Result<MediaAudio, MediaError> {
        let path = self
            .resolve(media_id)
            .ok_or_else(|| MediaError::NotFound(media_id.to_string()))?;

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::NotFound(media_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        debug!("Fetched media {} ({}, {} bytes)", media_id, format, data.len());

        Ok(MediaAudio {
            format,
            data: data.into(),
        })
    }
}
