use std::time::Duration;

use crate::audio::ToneSet;
use crate::vad::VadConfig;

/// Configuration for a call session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest wait for the next inbound audio chunk before the call is dropped
    pub chunk_timeout: Duration,

    /// Allowed overrun of TTS playback beyond the audio duration
    pub tts_extra_timeout: Duration,

    /// Utterance segmentation
    pub vad: VadConfig,

    /// Feedback tones to play
    pub tones: ToneSet,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_timeout: Duration::from_secs(2),
            tts_extra_timeout: Duration::from_secs(1),
            vad: VadConfig::default(),
            tones: ToneSet::feedback(),
        }
    }
}
