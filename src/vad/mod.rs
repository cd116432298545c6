//! Energy-based voice activity detection and utterance segmentation

mod segmenter;

pub use segmenter::{Activity, SegmentStep, VadConfig, VadSensitivity, VoiceSegmenter};
