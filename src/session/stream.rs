use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tracing::{debug, warn};

use super::session::SessionInner;
use crate::audio::AudioChunk;
use crate::pipeline::AudioStream;
use crate::vad::{SegmentStep, VoiceSegmenter};

struct UtteranceState {
    session: Arc<SessionInner>,
    queue: OwnedMutexGuard<mpsc::UnboundedReceiver<AudioChunk>>,
    segmenter: VoiceSegmenter,
    started: bool,
    finished: bool,
}

/// Stream of one utterance pulled from the session's audio queue
///
/// Silence before speech is skipped. The stream ends after the chunk that
/// closes the utterance. If no chunk arrives within the session's chunk
/// timeout the receive path is considered dead and the call is disconnected.
pub(super) fn utterance_stream(
    session: Arc<SessionInner>,
    queue: OwnedMutexGuard<mpsc::UnboundedReceiver<AudioChunk>>,
) -> AudioStream {
    let segmenter = VoiceSegmenter::new(session.config.vad.clone());
    let state = UtteranceState {
        session,
        queue,
        segmenter,
        started: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let timeout = state.session.config.chunk_timeout;
        loop {
            let chunk = match tokio::time::timeout(timeout, state.queue.recv()).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return None,
                Err(_) => {
                    warn!(
                        "No audio from call {} within {:?}",
                        state.session.info.call_id, timeout
                    );
                    state.session.disconnect();
                    return None;
                }
            };

            let step = state.segmenter.process(&chunk);
            if !step.forwards() {
                continue;
            }

            if !state.started {
                state.started = true;
                state.session.speech_started();
            }

            if step == SegmentStep::Ended {
                debug!("Utterance finished on call {}", state.session.info.call_id);
                state.finished = true;
            }

            return Some((chunk, state));
        }
    })
    .boxed()
}
