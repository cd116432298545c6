// Shared test doubles for the call session collaborators
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use voip_assist::audio::{AudioChunk, ToneSet};
use voip_assist::error::{MediaError, TransportError};
use voip_assist::media::{MediaAudio, MediaSource};
use voip_assist::pipeline::{Pipeline, PipelineEvent, PipelineEventKind, PipelineRequest};
use voip_assist::rtp::AudioTransport;
use voip_assist::session::{CallSession, CallState, SessionConfig};
use voip_assist::vad::VadConfig;
use voip_assist::CallInfo;

/// Records everything sent; each `send_chunk` call is kept as one buffer
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Bytes>>,
    closes: AtomicUsize,
    closed: AtomicBool,
    send_delay: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send takes `delay`
    pub fn slow(delay: Duration) -> Self {
        Self {
            send_delay: delay,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_bytes(&self) -> usize {
        self.sent().iter().map(|b| b.len()).sum()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioTransport for MockTransport {
    async fn send_chunk(&self, pcm: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.sent.lock().unwrap().push(Bytes::copy_from_slice(pcm));
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Consumes the utterance, then replays a fixed list of events
///
/// The session's state is sampled after the utterance and after each event.
#[derive(Default)]
pub struct ScriptedPipeline {
    events: Vec<PipelineEvent>,
    fail: bool,
    pub session: OnceLock<CallSession>,
    pub states: Mutex<Vec<CallState>>,
    pub chunks: Mutex<Vec<AudioChunk>>,
    pub conversation_ids: Mutex<Vec<Option<String>>>,
    runs: AtomicUsize,
}

impl ScriptedPipeline {
    pub fn new(events: Vec<PipelineEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Emits the events, then fails the run
    pub fn failing(events: Vec<PipelineEvent>) -> Self {
        Self {
            events,
            fail: true,
            ..Self::default()
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn states(&self) -> Vec<CallState> {
        self.states.lock().unwrap().clone()
    }

    fn sample_state(&self) {
        if let Some(session) = self.session.get() {
            self.states.lock().unwrap().push(session.state());
        }
    }
}

#[async_trait]
impl Pipeline for ScriptedPipeline {
    async fn run(&self, mut request: PipelineRequest) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.conversation_ids
            .lock()
            .unwrap()
            .push(request.conversation_id.clone());

        while let Some(chunk) = request.stt_stream.next().await {
            self.chunks.lock().unwrap().push(chunk);
        }
        self.sample_state();

        for event in &self.events {
            (request.event_callback)(event.clone());
            self.sample_state();
        }

        if self.fail {
            bail!("pipeline engine failed");
        }
        Ok(())
    }
}

/// In-memory media keyed by media id
#[derive(Default)]
pub struct MemoryMedia {
    items: HashMap<String, MediaAudio>,
    fetches: AtomicUsize,
}

impl MemoryMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, media_id: &str, format: &str, data: Vec<u8>) -> Self {
        self.items.insert(
            media_id.to_string(),
            MediaAudio {
                format: format.to_string(),
                data: data.into(),
            },
        );
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for MemoryMedia {
    async fn fetch_audio(&self, media_id: &str) -> Result<MediaAudio, MediaError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.items
            .get(media_id)
            .cloned()
            .ok_or_else(|| MediaError::NotFound(media_id.to_string()))
    }
}

pub fn speech_chunk() -> AudioChunk {
    let samples: Vec<i16> = (0..320)
        .map(|n| if n % 2 == 0 { 6000 } else { -6000 })
        .collect();
    AudioChunk::from_samples(&samples)
}

pub fn silence_chunk() -> AudioChunk {
    AudioChunk::from_samples(&[0i16; 320])
}

/// Short timeouts so tests finish quickly; no tones
pub fn test_config() -> SessionConfig {
    SessionConfig {
        chunk_timeout: Duration::from_millis(300),
        tts_extra_timeout: Duration::from_millis(500),
        vad: VadConfig {
            silence_end: Some(Duration::from_millis(60)),
            ..VadConfig::default()
        },
        tones: ToneSet::empty(),
    }
}

pub fn call_info(caller: &str) -> CallInfo {
    CallInfo {
        call_id: "call-1".to_string(),
        caller: caller.parse().unwrap(),
        device_id: "phone-1".to_string(),
    }
}

/// WAV bytes with an arbitrary format
pub fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Feed one utterance: speech followed by enough silence to end it
pub fn speak(session: &CallSession) {
    use voip_assist::rtp::ChunkHandler;

    for _ in 0..5 {
        session.on_chunk(speech_chunk().into_bytes());
    }
    for _ in 0..5 {
        session.on_chunk(silence_chunk().into_bytes());
    }
}

/// Poll `condition` every 10ms, failing after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn stt_end(text: &str) -> PipelineEvent {
    PipelineEvent::new(
        PipelineEventKind::SttEnd,
        json!({ "stt_output": { "text": text } }),
    )
}

pub fn intent_end(conversation_id: &str) -> PipelineEvent {
    PipelineEvent::new(
        PipelineEventKind::IntentEnd,
        json!({ "intent_output": { "conversation_id": conversation_id } }),
    )
}

pub fn tts_end(media_id: &str) -> PipelineEvent {
    PipelineEvent::new(
        PipelineEventKind::TtsEnd,
        json!({ "tts_output": { "media_id": media_id } }),
    )
}

pub fn error_event(code: &str, message: &str) -> PipelineEvent {
    PipelineEvent::new(
        PipelineEventKind::Error,
        json!({ "code": code, "message": message }),
    )
}
