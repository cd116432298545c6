use serde::{Deserialize, Serialize};

/// State of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No call connected (before the call and after hang-up)
    Muted,
    /// Waiting for speech
    Idle,
    /// Collecting an utterance for the pipeline
    Listening,
    /// Speech recognized, waiting for the response
    Processing,
    /// Playing the response
    Responding,
    /// Pipeline failed; error tone pending
    Error,
    /// Response playback timed out
    Timeout,
}

/// Inputs driving [`next_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateInput {
    Connected,
    SpeechStarted,
    SttFinished,
    ResponseStarted,
    ResponseFinished,
    ResponseTimedOut,
    PipelineFailed,
    RunFinished,
    Disconnected,
}

/// Session transition function
pub fn next_state(state: CallState, input: StateInput) -> CallState {
    use CallState::*;
    use StateInput::*;

    match (state, input) {
        (_, Disconnected) => Muted,
        (_, Connected) => Idle,
        (Muted, _) => Muted,
        (_, PipelineFailed) => Error,
        (_, RunFinished) => Idle,
        (Idle, SpeechStarted) => Listening,
        (Idle | Listening, SttFinished) => Processing,
        (Idle | Listening | Processing, ResponseStarted) => Responding,
        (Responding, ResponseTimedOut) => Timeout,
        (Processing | Responding, ResponseFinished) => Idle,
        (state, _) => state,
    }
}
