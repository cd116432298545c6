use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::audio::AudioChunk;

/// How long the caller may pause before a command is considered finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadSensitivity {
    #[default]
    Default,
    Relaxed,
    Aggressive,
}

impl VadSensitivity {
    pub fn silence_end(self) -> Duration {
        match self {
            VadSensitivity::Default => Duration::from_millis(700),
            VadSensitivity::Relaxed => Duration::from_millis(1250),
            VadSensitivity::Aggressive => Duration::from_millis(250),
        }
    }
}

/// Voice activity detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Samples with a magnitude above this count as voiced
    pub amplitude_threshold: i16,

    /// Fraction of voiced samples needed to classify a chunk as speech
    pub speech_ratio: f32,

    /// Trailing silence that ends an utterance (None = from sensitivity)
    pub silence_end: Option<Duration>,

    pub sensitivity: VadSensitivity,

    /// Hard cap on utterance length
    pub max_utterance: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 300,
            speech_ratio: 0.1,
            silence_end: None,
            sensitivity: VadSensitivity::Default,
            max_utterance: Duration::from_secs(15),
        }
    }
}

impl VadConfig {
    pub fn silence_end(&self) -> Duration {
        self.silence_end
            .unwrap_or_else(|| self.sensitivity.silence_end())
    }
}

/// Classification of a single chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Speech,
    Silence,
}

/// What the segmenter did with a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStep {
    /// Silence before speech; not forwarded
    Dropped,
    /// First chunk of an utterance
    Started,
    /// Chunk inside an utterance
    Continued,
    /// Last chunk of an utterance; the sequence ends after it
    Ended,
}

impl SegmentStep {
    pub fn forwards(self) -> bool {
        !matches!(self, SegmentStep::Dropped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmenterState {
    WaitingForSpeech,
    InUtterance { elapsed: Duration, silence: Duration },
}

/// Splits a continuous chunk stream into utterances
#[derive(Debug)]
pub struct VoiceSegmenter {
    config: VadConfig,
    state: SegmenterState,
}

impl VoiceSegmenter {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: SegmenterState::WaitingForSpeech,
        }
    }

    /// Energy-threshold classification; same chunk always yields the same result
    pub fn classify(&self, chunk: &AudioChunk) -> Activity {
        let total = chunk.sample_count();
        if total == 0 {
            return Activity::Silence;
        }

        let threshold = self.config.amplitude_threshold.unsigned_abs();
        let voiced = chunk
            .samples()
            .filter(|s| s.unsigned_abs() > threshold)
            .count();

        if voiced as f32 / total as f32 >= self.config.speech_ratio {
            Activity::Speech
        } else {
            Activity::Silence
        }
    }

    pub fn in_utterance(&self) -> bool {
        matches!(self.state, SegmenterState::InUtterance { .. })
    }

    /// Feed the next chunk
    pub fn process(&mut self, chunk: &AudioChunk) -> SegmentStep {
        let activity = self.classify(chunk);
        let duration = chunk.duration();

        match self.state {
            SegmenterState::WaitingForSpeech => match activity {
                Activity::Silence => SegmentStep::Dropped,
                Activity::Speech => {
                    debug!("Speech started");
                    self.state = SegmenterState::InUtterance {
                        elapsed: duration,
                        silence: Duration::ZERO,
                    };
                    if duration >= self.config.max_utterance {
                        self.reset();
                        return SegmentStep::Ended;
                    }
                    SegmentStep::Started
                }
            },
            SegmenterState::InUtterance { elapsed, silence } => {
                let elapsed = elapsed + duration;
                let silence = match activity {
                    Activity::Speech => Duration::ZERO,
                    Activity::Silence => silence + duration,
                };

                if silence >= self.config.silence_end() {
                    debug!("Speech ended after {:?} of silence", silence);
                    self.reset();
                    SegmentStep::Ended
                } else if elapsed >= self.config.max_utterance {
                    debug!("Utterance hit the {:?} cap", self.config.max_utterance);
                    self.reset();
                    SegmentStep::Ended
                } else {
                    self.state = SegmenterState::InUtterance { elapsed, silence };
                    SegmentStep::Continued
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = SegmenterState::WaitingForSpeech;
    }
}
