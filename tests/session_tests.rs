// Integration tests for the call session
//
// These tests drive a session with inbound audio chunks and verify its
// state, the pipeline run it starts and the audio it sends back.

mod common;

use anyhow::Result;
use bytes::Bytes;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use voip_assist::audio::{encode_wav, Tone, ToneBank, ToneSet};
use voip_assist::rtp::ChunkHandler;
use voip_assist::session::{CallSession, CallState, SessionConfig};

fn new_session(
    config: SessionConfig,
    pipeline: &Arc<ScriptedPipeline>,
    media: &Arc<MemoryMedia>,
    tones: ToneBank,
) -> CallSession {
    let session = CallSession::new(
        call_info("127.0.0.1:5004"),
        config,
        Arc::clone(pipeline) as _,
        Arc::clone(media) as _,
        Arc::new(tones),
    );
    let _ = pipeline.session.set(session.clone());
    session
}

fn reply_wav(ms: usize) -> Vec<u8> {
    encode_wav(&vec![1000i16; ms * 16]).unwrap()
}

async fn wait_for_runs(pipeline: &ScriptedPipeline, session: &CallSession, runs: usize) {
    wait_until(|| pipeline.runs() == runs && !session.is_running()).await;
}

#[tokio::test]
async fn test_full_turn() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![
        stt_end("turn on the lights"),
        intent_end("conv-1"),
        tts_end("reply.wav"),
    ]));
    let media = Arc::new(MemoryMedia::new().with("reply.wav", "wav", reply_wav(100)));
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    let transport = Arc::new(MockTransport::new());

    assert!(session.is_muted());
    session.connection_established(transport.clone());
    assert_eq!(session.state(), CallState::Idle);

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    assert_eq!(
        pipeline.states(),
        vec![
            CallState::Listening,
            CallState::Processing,
            CallState::Processing,
            CallState::Responding,
        ]
    );
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(session.conversation_id().as_deref(), Some("conv-1"));

    // 100ms of audio in 20ms frames
    assert_eq!(transport.sent_bytes(), 3200);
    assert!(transport.sent().iter().all(|chunk| chunk.len() <= 640));

    let stats = session.stats();
    assert_eq!(stats.utterances, 1);
    assert_eq!(stats.responses_finished, 1);
    assert_eq!(stats.responses_failed, 0);

    Ok(())
}

#[tokio::test]
async fn test_utterance_excludes_leading_silence() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    session.connection_established(Arc::new(MockTransport::new()));

    for _ in 0..3 {
        session.on_chunk(silence_chunk().into_bytes());
    }
    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    let chunks = pipeline.chunks.lock().unwrap().clone();
    assert_eq!(chunks.first(), Some(&speech_chunk()));
    // Five speech chunks, then silence up to 60ms
    assert_eq!(chunks.len(), 8);

    Ok(())
}

#[tokio::test]
async fn test_conversation_id_carries_to_next_run() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![
        stt_end("what time is it"),
        intent_end("conv-1"),
        tts_end(""),
    ]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    session.connection_established(Arc::new(MockTransport::new()));

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;
    speak(&session);
    wait_for_runs(&pipeline, &session, 2).await;

    let ids = pipeline.conversation_ids.lock().unwrap().clone();
    assert_eq!(ids, vec![None, Some("conv-1".to_string())]);
    assert_eq!(session.stats().utterances, 2);

    Ok(())
}

#[tokio::test]
async fn test_chunk_timeout_disconnects_once() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![stt_end("never")]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    let transport = Arc::new(MockTransport::new());
    session.connection_established(transport.clone());

    // Speech, then the caller goes quiet at the network level
    session.on_chunk(speech_chunk().into_bytes());

    wait_until(|| session.is_muted()).await;
    wait_until(|| !session.is_running()).await;
    assert_eq!(transport.close_count(), 1);

    // Late events don't bring a hung-up session back
    assert!(pipeline
        .states()
        .iter()
        .all(|state| *state == CallState::Muted));
    assert_eq!(session.state(), CallState::Muted);

    session.disconnect();
    assert_eq!(transport.close_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_error_event_plays_error_tone_once() -> Result<()> {
    // Tone assets on disk, loaded the way the binary does
    let dir = TempDir::new()?;
    for tone in Tone::ALL {
        std::fs::write(
            dir.path().join(format!("{}.pcm", tone.name())),
            vec![tone as u8 + 1; 640],
        )?;
    }
    let tones = ToneBank::load(dir.path())?;
    let error_tone = Bytes::from(std::fs::read(dir.path().join("error.pcm"))?);
    let config = SessionConfig {
        tones: ToneSet::from(Tone::Error),
        ..test_config()
    };

    let pipeline = Arc::new(ScriptedPipeline::new(vec![
        stt_end("gibberish"),
        error_event("intent-failed", "No intent matched"),
    ]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(config, &pipeline, &media, tones);
    let transport = Arc::new(MockTransport::new());
    session.connection_established(transport.clone());

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    assert_eq!(
        pipeline.states(),
        vec![CallState::Listening, CallState::Processing, CallState::Error]
    );
    assert_eq!(transport.sent(), vec![error_tone]);
    assert_eq!(session.state(), CallState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_failed_run_plays_error_tone() -> Result<()> {
    let error_tone = Bytes::from(vec![7u8; 320]);
    let config = SessionConfig {
        tones: ToneSet::feedback(),
        ..test_config()
    };

    let pipeline = Arc::new(ScriptedPipeline::failing(vec![]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(
        config,
        &pipeline,
        &media,
        ToneBank::from_buffers([(Tone::Error, error_tone.clone())]),
    );
    let transport = Arc::new(MockTransport::new());
    session.connection_established(transport.clone());

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    // Ack and processing buffers are empty, so only the error tone is sent
    assert_eq!(transport.sent(), vec![error_tone]);
    assert_eq!(session.state(), CallState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_empty_tts_output_skips_playback() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![stt_end("hello"), tts_end("")]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    let transport = Arc::new(MockTransport::new());
    session.connection_established(transport.clone());

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    assert_eq!(media.fetches(), 0);
    assert!(transport.sent().is_empty());
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(session.stats().responses_finished, 1);

    Ok(())
}

#[tokio::test]
async fn test_feedback_tones_precede_response() -> Result<()> {
    let ack = Bytes::from(vec![1u8; 64]);
    let processing = Bytes::from(vec![2u8; 64]);
    let tones = ToneBank::from_buffers([
        (Tone::Ack, ack.clone()),
        (Tone::Processing, processing.clone()),
    ]);
    let config = SessionConfig {
        tones: Tone::Ack | Tone::Processing,
        ..test_config()
    };

    let pipeline = Arc::new(ScriptedPipeline::new(vec![
        stt_end("hello"),
        tts_end("reply.wav"),
    ]));
    let media = Arc::new(MemoryMedia::new().with("reply.wav", "wav", reply_wav(40)));
    let session = new_session(config, &pipeline, &media, tones);
    let transport = Arc::new(MockTransport::new());
    session.connection_established(transport.clone());

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0], ack);
    assert_eq!(sent[1], processing);
    assert_eq!(sent[2].len() + sent[3].len(), 1280);
    assert_eq!(session.stats().tones_played, 2);

    Ok(())
}

#[tokio::test]
async fn test_tts_timeout_plays_error_tone() -> Result<()> {
    let error_tone = Bytes::from(vec![7u8; 100]);
    let config = SessionConfig {
        tts_extra_timeout: Duration::from_millis(1),
        tones: ToneSet::from(Tone::Error),
        ..test_config()
    };

    let pipeline = Arc::new(ScriptedPipeline::new(vec![
        stt_end("tell me a story"),
        tts_end("story.wav"),
    ]));
    let media = Arc::new(MemoryMedia::new().with("story.wav", "wav", reply_wav(100)));
    let session = new_session(
        config,
        &pipeline,
        &media,
        ToneBank::from_buffers([(Tone::Error, error_tone.clone())]),
    );
    // Each frame takes longer to send than it plays
    let transport = Arc::new(MockTransport::slow(Duration::from_millis(50)));
    session.connection_established(transport.clone());

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    let sent = transport.sent();
    assert!(transport.sent_bytes() < 3200 + error_tone.len());
    assert_eq!(sent.last(), Some(&error_tone));
    assert_eq!(session.state(), CallState::Idle);

    let stats = session.stats();
    assert_eq!(stats.responses_failed, 1);
    assert_eq!(stats.responses_finished, 1);

    Ok(())
}

#[tokio::test]
async fn test_bad_tts_media_still_finishes_response() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![
        stt_end("hello"),
        tts_end("reply.mp3"),
    ]));
    let media = Arc::new(MemoryMedia::new().with("reply.mp3", "mp3", vec![0u8; 64]));
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    let transport = Arc::new(MockTransport::new());
    session.connection_established(transport.clone());

    speak(&session);
    wait_for_runs(&pipeline, &session, 1).await;

    assert!(transport.sent().is_empty());
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(session.stats().responses_failed, 1);

    Ok(())
}

#[tokio::test]
async fn test_silence_keeps_session_idle() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    session.connection_established(Arc::new(MockTransport::new()));

    for _ in 0..5 {
        session.on_chunk(silence_chunk().into_bytes());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(session.state(), CallState::Idle);
    assert!(pipeline.chunks.lock().unwrap().is_empty());
    assert_eq!(session.stats().utterances, 0);

    Ok(())
}

#[tokio::test]
async fn test_disconnect_is_idempotent() -> Result<()> {
    let pipeline = Arc::new(ScriptedPipeline::new(vec![]));
    let media = Arc::new(MemoryMedia::new());
    let session = new_session(test_config(), &pipeline, &media, ToneBank::default());
    let transport = Arc::new(MockTransport::new());
    session.connection_established(transport.clone());

    session.disconnect();
    session.disconnect();

    assert!(session.is_muted());
    assert_eq!(transport.close_count(), 1);

    // Muted sessions ignore audio
    speak(&session);
    assert!(!session.is_running());
    assert_eq!(pipeline.runs(), 0);

    Ok(())
}
