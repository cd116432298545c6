//! RTP audio transport
//!
//! Inbound packets are decoded to raw PCM and handed to a [`ChunkHandler`];
//! outbound PCM goes through an [`AudioTransport`], which frames it into
//! RTP packets.

pub mod packet;
pub mod transport;

use async_trait::async_trait;
use bytes::Bytes;

use crate::audio::FRAME_BYTES;
use crate::error::TransportError;

pub use packet::{RtpHeader, RtpPacket};
pub use transport::{RtpConfig, RtpTransport};

/// Outbound audio path of a call
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Frame and send raw PCM (16-bit little-endian, 16kHz mono)
    ///
    /// Buffers longer than one frame are sent at playback rate.
    async fn send_chunk(&self, pcm: &[u8]) -> Result<(), TransportError>;

    /// Close the transport. Later sends fail with [`TransportError::Closed`].
    fn close(&self);

    /// Preferred chunk size for paced streaming
    fn chunk_bytes(&self) -> usize {
        FRAME_BYTES
    }
}

/// Receiver of decoded inbound audio
///
/// Called once per RTP payload; implementations must not block.
pub trait ChunkHandler: Send + Sync {
    fn on_chunk(&self, pcm: Bytes);
}
