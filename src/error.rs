use std::time::Duration;

/// TTS media that cannot be played on a call
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Only WAV audio can be streamed, got {0}")]
    Container(String),

    #[error(
        "Expected rate/width/channels as 16000/2/1, got {sample_rate}/{sample_width}/{channels}"
    )]
    PcmFormat {
        sample_rate: u32,
        sample_width: u16,
        channels: u16,
    },

    #[error("Invalid WAV data: {0}")]
    Wav(#[from] hound::Error),
}

/// RTP transport failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("No remote address set")]
    NoRemote,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media source failures
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while streaming a TTS response
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("TTS playback timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
