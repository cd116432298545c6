//! Voice assistant pipeline collaborator
//!
//! The pipeline engine (speech-to-text, intent handling, text-to-speech) is a
//! black box: it consumes one utterance as a stream of audio chunks and reports
//! progress through [`PipelineEvent`]s.

mod events;
pub mod nats;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::audio::AudioChunk;

pub use events::{PipelineEvent, PipelineEventKind};
pub use nats::NatsPipeline;

/// Finite stream of utterance audio
pub type AudioStream = BoxStream<'static, AudioChunk>;

/// Receives pipeline events; called synchronously by the pipeline
pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// Inputs for one pipeline run
pub struct PipelineRequest {
    pub device_id: String,
    /// Conversation to continue, from a previous `intent-end`
    pub conversation_id: Option<String>,
    pub stt_stream: AudioStream,
    pub event_callback: EventCallback,
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Run one pipeline turn, emitting events until done
    async fn run(&self, request: PipelineRequest) -> Result<()>;
}
