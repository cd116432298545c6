use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::state::{next_state, CallState, StateInput};
use super::stats::SessionStats;
use super::stream::utterance_stream;
use crate::audio::{AudioChunk, Tone, ToneBank};
use crate::call::CallInfo;
use crate::error::{TransportError, TtsError};
use crate::media::MediaSource;
use crate::pipeline::{Pipeline, PipelineEvent, PipelineEventKind, PipelineRequest};
use crate::rtp::{AudioTransport, ChunkHandler};
use crate::tts::TtsStreamer;

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call bridged to the voice assistant pipeline
///
/// Inbound audio arrives through [`ChunkHandler::on_chunk`]. The first chunk
/// while no pipeline run is active starts a run; the run consumes one utterance,
/// reacts to pipeline events and plays the response before the next run can
/// start. Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<SessionInner>,
}

pub(super) struct SessionInner {
    pub(super) session_id: String,
    pub(super) info: CallInfo,
    pub(super) config: SessionConfig,
    started_at: chrono::DateTime<Utc>,

    state: Mutex<CallState>,
    transport: Mutex<Option<Arc<dyn AudioTransport>>>,
    cancel: Mutex<CancellationToken>,

    /// Single hand-off between `on_chunk` and the utterance stream
    audio_tx: mpsc::UnboundedSender<AudioChunk>,
    pub(super) audio_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<AudioChunk>>>,

    run_task: Mutex<Option<JoinHandle<()>>>,
    conversation_id: Mutex<Option<String>>,

    pipeline: Arc<dyn Pipeline>,
    tts: TtsStreamer,
    tones: Arc<ToneBank>,

    utterances: AtomicUsize,
    responses_finished: AtomicUsize,
    responses_failed: AtomicUsize,
    tones_played: AtomicUsize,
}

/// Per-run bookkeeping shared with the event callback
#[derive(Default)]
struct RunState {
    had_error: AtomicBool,
    tts_task: Mutex<Option<JoinHandle<()>>>,
    processing_tone: Mutex<Option<JoinHandle<()>>>,
}

impl CallSession {
    /// Create a session for an accepted call; it stays muted until connected
    pub fn new(
        info: CallInfo,
        config: SessionConfig,
        pipeline: Arc<dyn Pipeline>,
        media: Arc<dyn MediaSource>,
        tones: Arc<ToneBank>,
    ) -> Self {
        let session_id = format!("call-{}", uuid::Uuid::new_v4());
        info!("Creating call session {} for {}", session_id, info.call_id);

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let tts = TtsStreamer::new(media, config.tts_extra_timeout);

        Self {
            inner: Arc::new(SessionInner {
                session_id,
                info,
                config,
                started_at: Utc::now(),
                state: Mutex::new(CallState::Muted),
                transport: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                audio_tx,
                audio_rx: Arc::new(tokio::sync::Mutex::new(audio_rx)),
                run_task: Mutex::new(None),
                conversation_id: Mutex::new(None),
                pipeline,
                tts,
                tones,
                utterances: AtomicUsize::new(0),
                responses_finished: AtomicUsize::new(0),
                responses_failed: AtomicUsize::new(0),
                tones_played: AtomicUsize::new(0),
            }),
        }
    }

    /// RTP connection is up: reset to idle and start capturing audio
    pub fn connection_established(&self, transport: Arc<dyn AudioTransport>) {
        info!("Call {} connected", self.inner.info.call_id);
        *lock(&self.inner.transport) = Some(transport);
        *lock(&self.inner.cancel) = CancellationToken::new();
        self.inner.transition(StateInput::Connected);
    }

    /// Hang up: close the transport and cancel in-flight work. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn state(&self) -> CallState {
        *lock(&self.inner.state)
    }

    pub fn is_muted(&self) -> bool {
        self.state() == CallState::Muted
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn call_info(&self) -> &CallInfo {
        &self.inner.info
    }

    pub fn conversation_id(&self) -> Option<String> {
        lock(&self.inner.conversation_id).clone()
    }

    /// Whether a pipeline run is in flight
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn stats(&self) -> SessionStats {
        let inner = &self.inner;
        let duration = Utc::now().signed_duration_since(inner.started_at);

        SessionStats {
            session_id: inner.session_id.clone(),
            call_id: inner.info.call_id.clone(),
            state: self.state(),
            started_at: inner.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            utterances: inner.utterances.load(Ordering::SeqCst),
            responses_finished: inner.responses_finished.load(Ordering::SeqCst),
            responses_failed: inner.responses_failed.load(Ordering::SeqCst),
            tones_played: inner.tones_played.load(Ordering::SeqCst),
            conversation_id: self.conversation_id(),
        }
    }

    #[cfg(test)]
    pub(crate) fn enqueue_raw(&self, chunk: AudioChunk) {
        let _ = self.inner.audio_tx.send(chunk);
    }
}

impl ChunkHandler for CallSession {
    fn on_chunk(&self, pcm: Bytes) {
        let inner = &self.inner;
        if inner.state() == CallState::Muted {
            return;
        }

        if !inner.is_running() {
            // Run until the voice command finishes, then start over
            inner.clear_audio_queue();
            let cancel = lock(&inner.cancel).clone();
            let task = tokio::spawn(Arc::clone(inner).run_pipeline(cancel));
            *lock(&inner.run_task) = Some(task);
        }

        let _ = inner.audio_tx.send(AudioChunk::new(pcm));
    }
}

impl SessionInner {
    fn state(&self) -> CallState {
        *lock(&self.state)
    }

    pub(super) fn transition(&self, input: StateInput) -> CallState {
        let mut state = lock(&self.state);
        let next = next_state(*state, input);
        if next != *state {
            debug!(
                "Call {}: {:?} -> {:?} ({:?})",
                self.info.call_id, *state, next, input
            );
            *state = next;
        }
        next
    }

    fn transport(&self) -> Option<Arc<dyn AudioTransport>> {
        lock(&self.transport).clone()
    }

    fn is_running(&self) -> bool {
        lock(&self.run_task)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn clear_audio_queue(&self) {
        // Locked only while a stream is consuming, in which case a run is active
        if let Ok(mut rx) = self.audio_rx.try_lock() {
            let mut dropped = 0;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("Discarded {} stale audio chunk(s)", dropped);
            }
        }
    }

    pub(super) fn disconnect(&self) {
        lock(&self.cancel).cancel();

        let transport = lock(&self.transport).take();
        if let Some(transport) = transport {
            info!("Call {} disconnected", self.info.call_id);
            transport.close();
        }

        self.transition(StateInput::Disconnected);
    }

    pub(super) fn speech_started(&self) {
        self.utterances.fetch_add(1, Ordering::SeqCst);
        self.transition(StateInput::SpeechStarted);
    }

    /// Send audio unless the call ends first; send failures end the call
    async fn send_audio(&self, pcm: &[u8]) -> Result<(), TransportError> {
        let transport = self.transport().ok_or(TransportError::Closed)?;
        let cancel = lock(&self.cancel).clone();

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Closed),
            result = transport.send_chunk(pcm) => result,
        };

        if let Err(e) = &result {
            if !cancel.is_cancelled() {
                warn!("Failed to send audio on call {}: {}", self.info.call_id, e);
                self.disconnect();
            }
        }

        result
    }

    /// Play a tone if it is enabled for this session
    async fn play_tone(&self, tone: Tone) {
        if !self.config.tones.contains(tone) {
            return;
        }

        let audio = self.tones.get(tone);
        if audio.is_empty() {
            return;
        }

        debug!("Playing {} tone ({} bytes)", tone, audio.len());
        if self.send_audio(&audio).await.is_ok() {
            self.tones_played.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn run_pipeline(self: Arc<Self>, cancel: CancellationToken) {
        let run = Arc::new(RunState::default());

        self.play_tone(Tone::Ack).await;

        let rx = Arc::clone(&self.audio_rx).lock_owned().await;
        let callback_session = Arc::clone(&self);
        let callback_run = Arc::clone(&run);
        let request = PipelineRequest {
            device_id: self.info.device_id.clone(),
            conversation_id: lock(&self.conversation_id).clone(),
            stt_stream: utterance_stream(Arc::clone(&self), rx),
            event_callback: Arc::new(move |event| {
                callback_session.handle_event(&callback_run, event)
            }),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Pipeline run cancelled");
                return;
            }
            result = self.pipeline.run(request) => result,
        };

        if let Err(e) = result {
            warn!("Pipeline run failed on call {}: {:#}", self.info.call_id, e);
            run.had_error.store(true, Ordering::SeqCst);
            self.transition(StateInput::PipelineFailed);
        }

        if run.had_error.load(Ordering::SeqCst) {
            // Error tone instead of a response
            self.play_tone(Tone::Error).await;
        } else {
            // Block until the response has been played
            let tts_task = lock(&run.tts_task).take();
            if let Some(task) = tts_task {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = task => {}
                }
            }

            if self.state() == CallState::Timeout {
                self.play_tone(Tone::Error).await;
            }
        }

        debug!("Pipeline finished");
        self.transition(StateInput::RunFinished);
        self.clear_audio_queue();
    }

    fn handle_event(self: &Arc<Self>, run: &Arc<RunState>, event: PipelineEvent) {
        match event.kind {
            PipelineEventKind::SttEnd => {
                match event.stt_text() {
                    Some(text) => info!("Call {} said: {}", self.info.call_id, text),
                    None => debug!("stt-end without text"),
                }
                self.transition(StateInput::SttFinished);

                if self.config.tones.contains(Tone::Processing) {
                    let session = Arc::clone(self);
                    let task = tokio::spawn(async move {
                        session.play_tone(Tone::Processing).await;
                    });
                    *lock(&run.processing_tone) = Some(task);
                }
            }
            PipelineEventKind::IntentEnd => {
                if let Some(conversation_id) = event.conversation_id() {
                    debug!("Conversation id: {}", conversation_id);
                    *lock(&self.conversation_id) = Some(conversation_id.to_string());
                }
            }
            PipelineEventKind::TtsEnd => {
                self.transition(StateInput::ResponseStarted);

                match event.tts_media_id() {
                    Some(media_id) => {
                        let session = Arc::clone(self);
                        let task = tokio::spawn(session.send_tts(
                            Arc::clone(run),
                            media_id.to_string(),
                        ));
                        *lock(&run.tts_task) = Some(task);
                    }
                    None => {
                        debug!("Empty TTS output");
                        self.response_finished();
                    }
                }
            }
            PipelineEventKind::Error => {
                warn!(
                    "Pipeline error on call {}: {} ({})",
                    self.info.call_id,
                    event.error_message().unwrap_or("unknown error"),
                    event.error_code().unwrap_or("no code")
                );
                run.had_error.store(true, Ordering::SeqCst);
                self.transition(StateInput::PipelineFailed);
            }
            PipelineEventKind::RunEnd | PipelineEventKind::Other => {}
        }
    }

    /// Play a TTS response, then report the response as finished
    async fn send_tts(self: Arc<Self>, run: Arc<RunState>, media_id: String) {
        if let Err(e) = self.try_send_tts(&run, &media_id).await {
            self.responses_failed.fetch_add(1, Ordering::SeqCst);
            match e {
                TtsError::Timeout(_) => {
                    self.transition(StateInput::ResponseTimedOut);
                }
                TtsError::Transport(e) => {
                    debug!("TTS stopped: {}", e);
                }
                e => warn!("Failed to play TTS media {}: {}", media_id, e),
            }
        }

        self.response_finished();
    }

    async fn try_send_tts(&self, run: &RunState, media_id: &str) -> Result<(), TtsError> {
        let transport = self.transport().ok_or(TransportError::Closed)?;
        let cancel = lock(&self.cancel).clone();

        // Don't overlap TTS and the processing tone
        let processing_tone = lock(&run.processing_tone).take();
        if let Some(task) = processing_tone {
            let _ = task.await;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Closed.into()),
            result = self.tts.stream(media_id, transport.as_ref()) => result,
        };

        match result {
            Ok(duration) => {
                info!("Played {:?} of TTS audio on call {}", duration, self.info.call_id);
                Ok(())
            }
            Err(TtsError::Transport(e)) => {
                if !cancel.is_cancelled() {
                    warn!("Failed to send TTS audio on call {}: {}", self.info.call_id, e);
                    self.disconnect();
                }
                Err(e.into())
            }
            Err(e) => Err(e),
        }
    }

    fn response_finished(&self) {
        self.responses_finished.fetch_add(1, Ordering::SeqCst);
        self.transition(StateInput::ResponseFinished);
    }
}
