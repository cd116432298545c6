use anyhow::{Context, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::f32::consts::PI;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::Path;
use tracing::info;

use super::chunk::SAMPLE_RATE;

/// Feedback tones played to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Played when the endpoint starts listening for a command
    Ack,
    /// Played when speech recognition has finished
    Processing,
    /// Played when the pipeline reports an error
    Error,
    /// Pre-recorded message for calls that cannot be served
    Problem,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Tone::Ack, Tone::Processing, Tone::Error, Tone::Problem];

    /// Logical asset name; files are stored as `<name>.pcm`
    pub fn name(self) -> &'static str {
        match self {
            Tone::Ack => "ack",
            Tone::Processing => "processing",
            Tone::Error => "error",
            Tone::Problem => "problem",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tone| tone.name() == name)
    }

    fn bit(self) -> u8 {
        match self {
            Tone::Ack => 1,
            Tone::Processing => 1 << 1,
            Tone::Error => 1 << 2,
            Tone::Problem => 1 << 3,
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of tones enabled for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToneSet(u8);

impl ToneSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Ack, processing and error feedback
    pub fn feedback() -> Self {
        Tone::Ack | Tone::Processing | Tone::Error
    }

    pub fn contains(self, tone: Tone) -> bool {
        self.0 & tone.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, tone: Tone) {
        self.0 |= tone.bit();
    }

    /// Build from logical names, ignoring unknown ones
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        names
            .iter()
            .filter_map(|name| Tone::from_name(name.as_ref()))
            .fold(Self::empty(), |set, tone| set | tone)
    }
}

impl From<Tone> for ToneSet {
    fn from(tone: Tone) -> Self {
        Self(tone.bit())
    }
}

impl BitOr for Tone {
    type Output = ToneSet;

    fn bitor(self, rhs: Tone) -> ToneSet {
        ToneSet(self.bit() | rhs.bit())
    }
}

impl BitOr<Tone> for ToneSet {
    type Output = ToneSet;

    fn bitor(self, rhs: Tone) -> ToneSet {
        ToneSet(self.0 | rhs.bit())
    }
}

impl BitOrAssign<Tone> for ToneSet {
    fn bitor_assign(&mut self, rhs: Tone) {
        self.insert(rhs);
    }
}

/// PCM buffers for every tone (raw 16kHz 16-bit mono)
///
/// Loaded once and shared read-only between sessions.
#[derive(Debug, Clone, Default)]
pub struct ToneBank {
    tones: HashMap<Tone, Bytes>,
}

impl ToneBank {
    /// Load `<name>.pcm` for every tone from a directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut tones = HashMap::new();

        for tone in Tone::ALL {
            let path = dir.join(format!("{}.pcm", tone.name()));
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read tone file: {}", path.display()))?;
            tones.insert(tone, Bytes::from(data));
        }

        info!("Loaded {} tones from {}", tones.len(), dir.display());

        Ok(Self { tones })
    }

    /// Synthesize short sine beeps for every tone
    pub fn generated() -> Self {
        let mut tones = HashMap::new();
        tones.insert(Tone::Ack, beeps(&[(880.0, 120)], 0));
        tones.insert(Tone::Processing, beeps(&[(660.0, 80), (660.0, 80)], 60));
        tones.insert(Tone::Error, beeps(&[(330.0, 200), (220.0, 300)], 40));
        tones.insert(Tone::Problem, beeps(&[(440.0, 250), (350.0, 250), (440.0, 250)], 150));

        Self { tones }
    }

    /// Use explicit buffers (missing tones are empty)
    pub fn from_buffers(buffers: impl IntoIterator<Item = (Tone, Bytes)>) -> Self {
        Self {
            tones: buffers.into_iter().collect(),
        }
    }

    pub fn get(&self, tone: Tone) -> Bytes {
        self.tones.get(&tone).cloned().unwrap_or_default()
    }
}

/// Sequence of sine beeps separated by `gap_ms` of silence
fn beeps(parts: &[(f32, u32)], gap_ms: u32) -> Bytes {
    let mut samples: Vec<i16> = Vec::new();

    for (index, &(frequency, duration_ms)) in parts.iter().enumerate() {
        if index > 0 {
            samples.extend(std::iter::repeat(0).take((SAMPLE_RATE * gap_ms / 1000) as usize));
        }

        let count = SAMPLE_RATE * duration_ms / 1000;
        // 5ms fade in/out avoids clicks
        let fade = (SAMPLE_RATE / 200) as f32;
        for n in 0..count {
            let t = n as f32 / SAMPLE_RATE as f32;
            let edge = (n as f32).min((count - n) as f32);
            let gain = (edge / fade).min(1.0);
            let value = (2.0 * PI * frequency * t).sin() * 0.4 * gain;
            samples.push((value * i16::MAX as f32) as i16);
        }
    }

    samples
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect::<Vec<u8>>()
        .into()
}
