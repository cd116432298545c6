pub mod chunk;
pub mod tones;
pub mod wav;

pub use chunk::{
    bytes_duration, AudioChunk, BYTES_PER_SECOND, CHANNELS, FRAME_BYTES, FRAME_MS, SAMPLE_RATE,
    SAMPLE_WIDTH,
};
pub use tones::{Tone, ToneBank, ToneSet};
pub use wav::{encode_wav, WavAudio};
