pub mod audio;
pub mod call;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod rtp;
pub mod session;
pub mod tts;
pub mod vad;

pub use audio::{AudioChunk, Tone, ToneBank, ToneSet, WavAudio};
pub use call::{make_handler, AllowList, CallAdmission, CallHandler, CallInfo, Services};
pub use config::Config;
pub use error::{FormatError, MediaError, TransportError, TtsError};
pub use media::{FileMediaSource, MediaAudio, MediaSource};
pub use pipeline::{NatsPipeline, Pipeline, PipelineEvent, PipelineEventKind, PipelineRequest};
pub use rtp::{AudioTransport, ChunkHandler, RtpConfig, RtpTransport};
pub use session::{CallSession, CallState, SessionConfig, SessionStats};
pub use tts::TtsStreamer;
pub use vad::{VadConfig, VadSensitivity, VoiceSegmenter};
