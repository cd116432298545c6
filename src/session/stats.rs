use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::CallState;

/// Statistics about a call session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub call_id: String,

    pub state: CallState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Utterances in which speech was detected
    pub utterances: usize,

    /// Responses finished (played, skipped or failed)
    pub responses_finished: usize,

    /// Responses that failed to play
    pub responses_failed: usize,

    pub tones_played: usize,

    /// Conversation id from the last intent result
    pub conversation_id: Option<String>,
}
