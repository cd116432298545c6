use bytes::Bytes;
use std::time::Duration;

/// Sample rate of all call audio (Hz)
pub const SAMPLE_RATE: u32 = 16000;
/// Bytes per sample (16-bit signed PCM)
pub const SAMPLE_WIDTH: u16 = 2;
/// Call audio is mono
pub const CHANNELS: u16 = 1;
/// One second of call audio in bytes
pub const BYTES_PER_SECOND: usize = SAMPLE_RATE as usize * SAMPLE_WIDTH as usize * CHANNELS as usize;

/// Duration of one RTP frame
pub const FRAME_MS: u64 = 20;
/// Size of one RTP frame payload in bytes (320 samples)
pub const FRAME_BYTES: usize = BYTES_PER_SECOND * FRAME_MS as usize / 1000;

/// Duration of `len` bytes of call audio
pub fn bytes_duration(len: usize) -> Duration {
    Duration::from_micros(len as u64 * 1_000_000 / BYTES_PER_SECOND as u64)
}

/// A chunk of raw call audio (16-bit signed little-endian PCM, 16kHz mono)
///
/// Chunks are immutable once produced; cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    data: Bytes,
}

impl AudioChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Silent chunk lasting `duration`
    pub fn silence(duration: Duration) -> Self {
        let len = duration.as_millis() as usize * BYTES_PER_SECOND / 1000;
        Self::new(vec![0u8; len])
    }

    /// Chunk built from i16 samples
    pub fn from_samples(samples: &[i16]) -> Self {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over samples. A trailing odd byte is ignored.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / SAMPLE_WIDTH as usize
    }

    pub fn duration(&self) -> Duration {
        bytes_duration(self.data.len())
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for AudioChunk {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}
