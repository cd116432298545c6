use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::packet::{swap_sample_bytes, RtpHeader, RtpPacket};
use super::{AudioTransport, ChunkHandler};
use crate::audio::{FRAME_BYTES, FRAME_MS, SAMPLE_WIDTH};
use crate::error::TransportError;

/// RTP socket settings
#[derive(Debug, Clone, Deserialize)]
pub struct RtpConfig {
    /// Local bind address
    pub bind: String,
    /// Local RTP port (0 = any)
    pub port: u16,
    /// Payload type for L16/16000/1
    pub payload_type: u8,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 10000,
            payload_type: 96,
        }
    }
}

/// RTP session for one call over UDP
pub struct RtpTransport {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    payload_type: u8,
    ssrc: u32,
    sequence: AtomicU16,
    timestamp: AtomicU32,
    closed: CancellationToken,
}

impl RtpTransport {
    /// Bind the local RTP socket and target the caller's RTP endpoint
    pub async fn bind(config: &RtpConfig, remote: SocketAddr) -> Result<Self> {
        let local = format!("{}:{}", config.bind, config.port);
        let socket = UdpSocket::bind(&local)
            .await
            .with_context(|| format!("Failed to bind RTP socket on {}", local))?;

        info!(
            "RTP bound to {} (remote {}, payload type {})",
            socket.local_addr()?,
            remote,
            config.payload_type
        );

        Ok(Self {
            socket: Arc::new(socket),
            remote,
            payload_type: config.payload_type,
            ssrc: rand::random(),
            sequence: AtomicU16::new(rand::random()),
            timestamp: AtomicU32::new(rand::random()),
            closed: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Spawn the receive loop, decoding packets into `handler`
    ///
    /// A socket error ends the loop and closes the transport.
    pub fn spawn_receiver(&self, handler: Arc<dyn ChunkHandler>) -> JoinHandle<()> {
        spawn_receive_loop(
            Arc::clone(&self.socket) as Arc<dyn PacketSource>,
            self.closed.clone(),
            self.remote.ip(),
            self.payload_type,
            handler,
        )
    }

    fn next_header(&self, payload_len: usize) -> RtpHeader {
        let samples = (payload_len / SAMPLE_WIDTH as usize) as u32;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp = self.timestamp.fetch_add(samples, Ordering::SeqCst);
        RtpHeader::new(self.payload_type, sequence, timestamp, self.ssrc)
    }
}

/// Datagram source for the receive loop
#[async_trait]
trait PacketSource: Send + Sync {
    async fn recv_packet(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl PacketSource for UdpSocket {
    async fn recv_packet(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }
}

fn spawn_receive_loop(
    source: Arc<dyn PacketSource>,
    closed: CancellationToken,
    remote_ip: IpAddr,
    payload_type: u8,
    handler: Arc<dyn ChunkHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        info!("RTP receive task started");

        loop {
            let (len, addr) = tokio::select! {
                _ = closed.cancelled() => break,
                received = source.recv_packet(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!("RTP receive error: {}", e);
                        // No more inbound audio; the call is over
                        closed.cancel();
                        break;
                    }
                },
            };

            if addr.ip() != remote_ip {
                debug!("Dropping RTP packet from unexpected peer {}", addr);
                continue;
            }

            let packet = match RtpPacket::parse(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("Dropping invalid RTP packet: {}", e);
                    continue;
                }
            };

            if packet.header.payload_type != payload_type {
                debug!(
                    "Dropping RTP packet with payload type {}",
                    packet.header.payload_type
                );
                continue;
            }

            handler.on_chunk(Bytes::from(swap_sample_bytes(&packet.payload)));
        }

        info!("RTP receive task stopped");
    })
}

#[async_trait]
impl AudioTransport for RtpTransport {
    async fn send_chunk(&self, pcm: &[u8]) -> Result<(), TransportError> {
        let mut frames = pcm.chunks(FRAME_BYTES).peekable();

        while let Some(frame) = frames.next() {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }

            let packet = RtpPacket::new(self.next_header(frame.len()), swap_sample_bytes(frame));
            self.socket.send_to(&packet.to_bytes(), self.remote).await?;

            if frames.peek().is_some() {
                tokio::select! {
                    _ = self.closed.cancelled() => return Err(TransportError::Closed),
                    _ = tokio::time::sleep(Duration::from_millis(FRAME_MS)) => {}
                }
            }
        }

        Ok(())
    }

    fn close(&self) {
        if !self.closed.is_cancelled() {
            warn!("Closing RTP transport to {}", self.remote);
            self.closed.cancel();
        }
    }
}
