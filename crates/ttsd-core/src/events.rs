use serde::{Deserialize, Serialize};

/// Extended, opt-in lifecycle events a session can subscribe to on top of
/// the baseline events (session created/destroyed, `resource_acquired`,
/// `resource_released`, `started`, `spoke`, plus the connection-scope
/// `tts_state_changed`/`voice_changed`), which are always emitted.
/// Bit order matches spec.md §6.2, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedEvents(u32);

impl ExtendedEvents {
    pub const NONE: Self = Self(0);
    pub const PAUSED: Self = Self(1 << 0);
    pub const RESUMED: Self = Self(1 << 1);
    pub const CANCELLED: Self = Self(1 << 2);
    pub const INTERRUPTED: Self = Self(1 << 3);
    pub const NETWORK_ERROR: Self = Self(1 << 4);
    pub const PLAYBACK_ERROR: Self = Self(1 << 5);
    pub const WILL_SPEAK: Self = Self(1 << 6);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: Self) {
        self.0 &= !flag.0;
    }
}

impl Default for ExtendedEvents {
    fn default() -> Self {
        Self::NONE
    }
}

/// A single event emitted by a [`Session`](crate) or the Manager, carried as
/// a tagged enum rather than a dynamic property bag so listeners pattern
/// match instead of string-keying into a map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Baseline: fired once when the Manager creates the session.
    Created,
    /// Baseline: fired once, just before the Manager tears the session down.
    Destroyed,
    /// Baseline: the speaker has attached to this session (it is now the
    /// effective active session under the current policy).
    ResourceAcquired { session_id: u32 },
    /// Baseline: the speaker has been detached from this session.
    ResourceReleased { session_id: u32 },
    /// Baseline: the speaker has begun processing this speech (always
    /// fires; distinct from the extended, opt-in `WillSpeak`).
    Started { speech_id: u32, text: String },
    /// Baseline: the speech completed normally.
    Spoke { speech_id: u32, text: String },
    /// Extended: fires immediately before `Started`, only if requested.
    WillSpeak { speech_id: u32, text: String },
    Paused { speech_id: u32 },
    Resumed { speech_id: u32 },
    Cancelled { speech_ids: Vec<u32> },
    Interrupted { speech_id: u32 },
    NetworkError { speech_id: u32 },
    PlaybackError { speech_id: u32 },
}

/// Manager-scoped events, not tied to any one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ManagerEvent {
    TtsStateChanged { enabled: bool },
    VoiceChanged { voice: String },
}

impl SessionEvent {
    /// Whether this event requires the owning session's extended-event
    /// mask to contain the matching flag before being delivered. The
    /// baseline events always return `None` (always delivered).
    pub fn required_flag(&self) -> Option<ExtendedEvents> {
        match self {
            SessionEvent::WillSpeak { .. } => Some(ExtendedEvents::WILL_SPEAK),
            SessionEvent::Paused { .. } => Some(ExtendedEvents::PAUSED),
            SessionEvent::Resumed { .. } => Some(ExtendedEvents::RESUMED),
            SessionEvent::Cancelled { .. } => Some(ExtendedEvents::CANCELLED),
            SessionEvent::Interrupted { .. } => Some(ExtendedEvents::INTERRUPTED),
            SessionEvent::NetworkError { .. } => Some(ExtendedEvents::NETWORK_ERROR),
            SessionEvent::PlaybackError { .. } => Some(ExtendedEvents::PLAYBACK_ERROR),
            SessionEvent::Created
            | SessionEvent::Destroyed
            | SessionEvent::ResourceAcquired { .. }
            | SessionEvent::ResourceReleased { .. }
            | SessionEvent::Started { .. }
            | SessionEvent::Spoke { .. } => None,
        }
    }
}
