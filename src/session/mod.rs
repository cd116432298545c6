//! Call session management
//!
//! This module provides the `CallSession` abstraction that manages:
//! - Inbound audio queueing and utterance segmentation
//! - Pipeline runs and reaction to pipeline events
//! - TTS playback and tone feedback
//! - Session state and statistics

mod config;
mod session;
mod state;
mod stats;
mod stream;

pub use config::SessionConfig;
pub use session::CallSession;
pub use state::{next_state, CallState, StateInput};
pub use stats::SessionStats;
