//! Call admission and per-call audio handlers

use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::{Tone, ToneBank};
use crate::media::MediaSource;
use crate::pipeline::Pipeline;
use crate::rtp::{AudioTransport, ChunkHandler};
use crate::session::{CallSession, SessionConfig};

/// An incoming call, as negotiated by SIP
#[derive(Debug, Clone)]
pub struct CallInfo {
    pub call_id: String,
    /// Caller's RTP endpoint
    pub caller: SocketAddr,
    /// Device the call is attributed to
    pub device_id: String,
}

/// Decides whether a caller may use the assistant
pub trait CallAdmission: Send + Sync {
    fn is_allowed(&self, call: &CallInfo) -> bool;
}

/// Allow-list of caller hosts; an empty list allows nobody
pub struct AllowList {
    hosts: Vec<IpAddr>,
    allow_all: bool,
}

impl AllowList {
    pub fn new(hosts: Vec<IpAddr>) -> Self {
        Self {
            hosts,
            allow_all: false,
        }
    }

    pub fn allow_all() -> Self {
        Self {
            hosts: Vec::new(),
            allow_all: true,
        }
    }

    /// Parse host entries; `*` allows every caller
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        if entries.iter().any(|e| e.as_ref() == "*") {
            return Self::allow_all();
        }

        let hosts = entries
            .iter()
            .filter_map(|entry| match entry.as_ref().parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!("Ignoring invalid allowed caller: {}", entry.as_ref());
                    None
                }
            })
            .collect();

        Self::new(hosts)
    }
}

impl CallAdmission for AllowList {
    fn is_allowed(&self, call: &CallInfo) -> bool {
        self.allow_all || self.hosts.contains(&call.caller.ip())
    }
}

/// Plays a fixed message to callers that cannot be served
///
/// The message starts when the caller's audio arrives and is repeated, after
/// `loop_delay`, for as long as audio keeps arriving.
pub struct PreRecordedPlayer {
    audio: Bytes,
    loop_delay: Duration,
    transport: Arc<dyn AudioTransport>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PreRecordedPlayer {
    pub fn new(audio: Bytes, loop_delay: Duration, transport: Arc<dyn AudioTransport>) -> Self {
        Self {
            audio,
            loop_delay,
            transport,
            task: Mutex::new(None),
        }
    }
}

impl ChunkHandler for PreRecordedPlayer {
    fn on_chunk(&self, _pcm: Bytes) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let audio = self.audio.clone();
        let loop_delay = self.loop_delay;
        let transport = Arc::clone(&self.transport);
        *task = Some(tokio::spawn(async move {
            if let Err(e) = transport.send_chunk(&audio).await {
                warn!("Failed to play message: {}", e);
                transport.close();
                return;
            }
            tokio::time::sleep(loop_delay).await;
        }));
    }
}

/// Audio handler chosen for a call
pub enum CallHandler {
    Session(CallSession),
    PreRecorded(Arc<PreRecordedPlayer>),
}

impl CallHandler {
    /// Receiver for the call's inbound audio
    pub fn chunk_handler(&self) -> Arc<dyn ChunkHandler> {
        match self {
            CallHandler::Session(session) => Arc::new(session.clone()),
            CallHandler::PreRecorded(player) => Arc::clone(player) as Arc<dyn ChunkHandler>,
        }
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            CallHandler::Session(session) => Some(session),
            CallHandler::PreRecorded(_) => None,
        }
    }
}

/// Collaborators shared by all calls
pub struct Services {
    pub admission: Arc<dyn CallAdmission>,
    /// None when no pipeline is available
    pub pipeline: Option<Arc<dyn Pipeline>>,
    pub media: Arc<dyn MediaSource>,
    pub tones: Arc<ToneBank>,
    pub loop_delay: Duration,
}

/// Build the handler for an incoming call
///
/// Callers that are not allowed, or calls without a pipeline, get the
/// `problem` message. Everyone else gets a connected [`CallSession`].
pub fn make_handler(
    call: CallInfo,
    services: &Services,
    config: SessionConfig,
    transport: Arc<dyn AudioTransport>,
) -> CallHandler {
    if !services.admission.is_allowed(&call) {
        info!("Call {} from {} is not allowed", call.call_id, call.caller);
        return pre_recorded(services, transport);
    }

    let Some(pipeline) = services.pipeline.clone() else {
        warn!("No pipeline available for call {}", call.call_id);
        return pre_recorded(services, transport);
    };

    let session = CallSession::new(
        call,
        config,
        pipeline,
        Arc::clone(&services.media),
        Arc::clone(&services.tones),
    );
    session.connection_established(transport);

    CallHandler::Session(session)
}

fn pre_recorded(services: &Services, transport: Arc<dyn AudioTransport>) -> CallHandler {
    CallHandler::PreRecorded(Arc::new(PreRecordedPlayer::new(
        services.tones.get(Tone::Problem),
        services.loop_delay,
        transport,
    )))
}
