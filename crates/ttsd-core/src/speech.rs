use serde::{Deserialize, Serialize};

/// A single utterance queued with the speaker, tagged with the session that
/// owns it so the speaker can report back without holding a session
/// reference directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechItem {
    pub session_id: u32,
    pub speech_id: u32,
    pub text: String,
    pub secure: bool,
}

impl SpeechItem {
    pub fn new(session_id: u32, speech_id: u32, text: impl Into<String>, secure: bool) -> Self {
        Self {
            session_id,
            speech_id,
            text: text.into(),
            secure,
        }
    }
}

/// Lifecycle state of a queued or in-flight speech, as reported by
/// `Speaker::speech_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechState {
    /// Not known to the speaker (never queued, already finished, or
    /// cancelled).
    None,
    /// Sitting in the FIFO queue, not yet started.
    Pending,
    /// Currently the speaker's in-flight utterance.
    Speaking,
    /// The in-flight utterance, but playback is paused.
    Paused,
}
