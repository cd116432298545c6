use hound::WavReader;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

use super::chunk::{bytes_duration, CHANNELS, SAMPLE_RATE, SAMPLE_WIDTH};
use crate::error::FormatError;

/// PCM audio extracted from a WAV container, validated for call playback
pub struct WavAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Raw PCM payload (16-bit little-endian), header stripped
    pub pcm: Vec<u8>,
}

impl WavAudio {
    /// Parse WAV bytes and require 16kHz, 16-bit, mono
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let reader = WavReader::new(Cursor::new(data))?;
        let spec = reader.spec();

        let sample_width = spec.bits_per_sample / 8;
        if spec.sample_rate != SAMPLE_RATE
            || sample_width != SAMPLE_WIDTH
            || spec.channels != CHANNELS
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(FormatError::PcmFormat {
                sample_rate: spec.sample_rate,
                sample_width,
                channels: spec.channels,
            });
        }

        let pcm: Vec<u8> = reader
            .into_samples::<i16>()
            .map(|s| s.map(|s| s.to_le_bytes()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        debug!("Parsed WAV: {} byte(s) of PCM", pcm.len());

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            pcm,
        })
    }

    pub fn duration(&self) -> Duration {
        bytes_duration(self.pcm.len())
    }
}

/// Wrap 16kHz mono PCM samples in a WAV container
pub fn encode_wav(samples: &[i16]) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
