//! RTP packet format (RFC 3550)

use bytes::{BufMut, Bytes, BytesMut};

/// Minimum RTP header length
pub const HEADER_LEN: usize = 12;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("RTP packet too short: {0} byte(s)")]
    TooShort(usize),

    #[error("Invalid RTP version: {0}")]
    Version(u8),
}

/// RTP packet header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn new(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type,
            sequence,
            timestamp,
            ssrc,
        }
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        // V(2) P(1) X(1) CC(4)
        buf.put_u8(
            (2 << 6)
                | ((self.padding as u8) << 5)
                | ((self.extension as u8) << 4)
                | (self.csrc_count & 0x0F),
        );
        // M(1) PT(7)
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }

    /// Parse a header, returning it with the offset of the payload
    pub fn parse(data: &[u8]) -> Result<(Self, usize), PacketError> {
        if data.len() < HEADER_LEN {
            return Err(PacketError::TooShort(data.len()));
        }

        let version = data[0] >> 6;
        if version != 2 {
            return Err(PacketError::Version(version));
        }

        let header = Self {
            padding: (data[0] >> 5) & 1 == 1,
            extension: (data[0] >> 4) & 1 == 1,
            csrc_count: data[0] & 0x0F,
            marker: (data[1] >> 7) & 1 == 1,
            payload_type: data[1] & 0x7F,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        };

        let mut offset = HEADER_LEN + header.csrc_count as usize * 4;

        if header.extension {
            // 4 byte extension header, length counted in 32-bit words
            if data.len() < offset + 4 {
                return Err(PacketError::TooShort(data.len()));
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
        }

        if data.len() < offset {
            return Err(PacketError::TooShort(data.len()));
        }

        Ok((header, offset))
    }
}

/// RTP packet with header and payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.header.write_to(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        let (header, offset) = RtpHeader::parse(data)?;
        let mut end = data.len();

        if header.padding {
            // Last byte holds the padding length
            let padding = data[end - 1] as usize;
            if padding > end - offset {
                return Err(PacketError::TooShort(data.len()));
            }
            end -= padding;
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&data[offset..end]),
        })
    }
}

/// Swap 16-bit sample byte order (L16 is big-endian on the wire)
pub fn swap_sample_bytes(pcm: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm.len());
    for pair in pcm.chunks_exact(2) {
        out.push(pair[1]);
        out.push(pair[0]);
    }
    out
}
