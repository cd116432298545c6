use anyhow::{bail, Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use base64::Engine;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Pipeline, PipelineEvent, PipelineEventKind, PipelineRequest};
use crate::audio::{CHANNELS, SAMPLE_RATE};

/// Audio frame published to the pipeline engine
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub device_id: String,
    pub conversation_id: Option<String>,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Pipeline engine reached over NATS
///
/// Utterance audio is published to `voip.audio.<device>`; events are read from
/// `voip.event.<device>` until the run ends.
pub struct NatsPipeline {
    client: Client,
    event_timeout: Duration,
}

impl NatsPipeline {
    /// Connect to NATS server
    pub async fn connect(url: &str, event_timeout: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            event_timeout,
        })
    }

    async fn publish_frame(&self, subject: &str, message: &AudioFrameMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        Ok(())
    }
}

fn frame_message(
    request: &PipelineRequest,
    sequence: u32,
    pcm: &[u8],
    final_frame: bool,
) -> AudioFrameMessage {
    AudioFrameMessage {
        device_id: request.device_id.clone(),
        conversation_id: request.conversation_id.clone(),
        sequence,
        pcm: base64::engine::general_purpose::STANDARD.encode(pcm),
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        timestamp: chrono::Utc::now().to_rfc3339(),
        final_frame,
    }
}

/// Whether the engine sends nothing more after this event
fn ends_run(kind: PipelineEventKind) -> bool {
    matches!(
        kind,
        PipelineEventKind::RunEnd | PipelineEventKind::Error | PipelineEventKind::TtsEnd
    )
}

#[async_trait]
impl Pipeline for NatsPipeline {
    async fn run(&self, mut request: PipelineRequest) -> Result<()> {
        let audio_subject = format!("voip.audio.{}", request.device_id);
        let event_subject = format!("voip.event.{}", request.device_id);

        // Subscribe first so no early event is missed
        let mut events = self
            .client
            .subscribe(event_subject.clone())
            .await
            .context("Failed to subscribe to pipeline events")?;

        let mut sequence = 0;
        while let Some(chunk) = request.stt_stream.next().await {
            let message = frame_message(&request, sequence, chunk.as_bytes(), false);
            self.publish_frame(&audio_subject, &message).await?;
            sequence += 1;
        }

        let message = frame_message(&request, sequence, &[], true);
        self.publish_frame(&audio_subject, &message).await?;

        info!(
            "Published {} audio frame(s) to {}, waiting for events on {}",
            sequence, audio_subject, event_subject
        );

        loop {
            let msg = match tokio::time::timeout(self.event_timeout, events.next()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(_) => bail!("No pipeline event within {:?}", self.event_timeout),
            };

            let event = match serde_json::from_slice::<PipelineEvent>(&msg.payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Failed to parse pipeline event: {}", e);
                    continue;
                }
            };

            debug!("Pipeline event: {:?}", event.kind);
            let kind = event.kind;
            (request.event_callback)(event);

            if ends_run(kind) {
                break;
            }
        }

        Ok(())
    }
}
