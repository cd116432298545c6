//! Streams TTS responses to the caller

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::audio::{bytes_duration, WavAudio};
use crate::error::{FormatError, TransportError, TtsError};
use crate::media::{MediaAudio, MediaSource};
use crate::rtp::AudioTransport;

/// Fetches TTS media, validates it and plays it over a transport in real time
pub struct TtsStreamer {
    media: Arc<dyn MediaSource>,
    extra_timeout: Duration,
}

impl TtsStreamer {
    pub fn new(media: Arc<dyn MediaSource>, extra_timeout: Duration) -> Self {
        Self {
            media,
            extra_timeout,
        }
    }

    /// Play `media_id`; returns the duration of the audio sent
    ///
    /// Playback must finish within the audio duration plus the extra timeout.
    pub async fn stream(
        &self,
        media_id: &str,
        transport: &dyn AudioTransport,
    ) -> Result<Duration, TtsError> {
        let audio = self.media.fetch_audio(media_id).await?;
        let wav = Self::decode(audio)?;

        let duration = wav.duration();
        let budget = duration + self.extra_timeout;
        debug!(
            "Sending {} byte(s) of TTS audio ({:?}, budget {:?})",
            wav.pcm.len(),
            duration,
            budget
        );

        match tokio::time::timeout(budget, send_paced(&wav.pcm, transport)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("TTS timeout");
                return Err(TtsError::Timeout(budget));
            }
        }

        Ok(duration)
    }

    /// Validate container and PCM format, returning the raw PCM
    pub fn decode(audio: MediaAudio) -> Result<WavAudio, FormatError> {
        if audio.format != "wav" {
            return Err(FormatError::Container(audio.format));
        }

        WavAudio::parse(&audio.data)
    }
}

/// Send PCM chunk by chunk, each at its playback time
async fn send_paced(pcm: &[u8], transport: &dyn AudioTransport) -> Result<(), TransportError> {
    // Keep chunks sample aligned
    let chunk_bytes = (transport.chunk_bytes().max(2) / 2) * 2;
    let start = Instant::now();
    let mut offset = 0;

    for chunk in pcm.chunks(chunk_bytes) {
        tokio::time::sleep_until(start + bytes_duration(offset)).await;
        transport.send_chunk(chunk).await?;
        offset += chunk.len();
    }

    Ok(())
}
