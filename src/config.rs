use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::ToneSet;
use crate::rtp::RtpConfig;
use crate::session::SessionConfig;
use crate::vad::{VadConfig, VadSensitivity};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub rtp: RtpConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub vad: VadSettings,
    #[serde(default)]
    pub tones: ToneSettings,
    pub pipeline: PipelineConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub chunk_timeout_ms: u64,
    pub tts_extra_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chunk_timeout_ms: 2000,
            tts_extra_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    pub sensitivity: VadSensitivity,
    pub amplitude_threshold: i16,
    pub speech_ratio: f32,
    /// Overrides the sensitivity preset
    pub silence_end_ms: Option<u64>,
    pub max_utterance_secs: u64,
}

impl Default for VadSettings {
    fn default() -> Self {
        let vad = VadConfig::default();
        Self {
            sensitivity: vad.sensitivity,
            amplitude_threshold: vad.amplitude_threshold,
            speech_ratio: vad.speech_ratio,
            silence_end_ms: None,
            max_utterance_secs: vad.max_utterance.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    /// Directory of `<tone>.pcm` files; generated beeps when unset
    pub dir: Option<String>,
    pub enabled: Vec<String>,
    pub loop_delay_ms: u64,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            dir: None,
            enabled: vec!["ack".to_string(), "processing".to_string(), "error".to_string()],
            loop_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    pub nats_url: String,
    pub event_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct MediaConfig {
    pub root: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Caller IPs allowed to use the assistant; `*` allows everyone
    pub allowed_callers: Vec<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VOIP_ASSIST").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_timeout: Duration::from_millis(self.session.chunk_timeout_ms),
            tts_extra_timeout: Duration::from_millis(self.session.tts_extra_timeout_ms),
            vad: self.vad_config(),
            tones: ToneSet::from_names(&self.tones.enabled),
        }
    }

    pub fn vad_config(&self) -> VadConfig {
        VadConfig {
            amplitude_threshold: self.vad.amplitude_threshold,
            speech_ratio: self.vad.speech_ratio,
            silence_end: self.vad.silence_end_ms.map(Duration::from_millis),
            sensitivity: self.vad.sensitivity,
            max_utterance: Duration::from_secs(self.vad.max_utterance_secs),
        }
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.event_timeout_secs)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.tones.loop_delay_ms)
    }
}
