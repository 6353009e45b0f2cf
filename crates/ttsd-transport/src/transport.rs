//! The `Transport` trait models the "object-RPC with events" wire in
//! spec.md §1/§6 as a narrow, swappable interface rather than a concrete
//! wire format — the spec explicitly treats the real transport as an
//! external collaborator and asks only that its request/response/event
//! shape be faithfully modeled (spec.md §1 "Out of scope").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use ttsd_config::{SpeechConfig, SpeechConfigPatch};
use ttsd_core::{ManagerEvent, SessionEvent, SpeechState, TtsError};

/// Every operation in the client-facing API (spec.md §6.1), carried as one
/// request enum instead of per-method RPC stubs — the Rust analogue of the
/// object-RPC method table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TtsRequest {
    EnableTts(bool),
    ListVoices(Option<String>),
    GetConfiguration,
    SetConfiguration(SpeechConfigPatch),
    IsTtsEnabled,
    IsSessionActiveForApp(u32),
    AcquireResource(u32),
    ClaimResource(u32),
    ReleaseResource(u32),
    CreateSession { app_id: u32, app_name: String },
    DestroySession(u32),
    IsActiveSession(u32),
    SetPreemptiveSpeak { session_id: u32, preemptive: bool },
    RequestExtendedEvents { session_id: u32, mask: u32 },
    GetSessionConfiguration(u32),
    SetSessionConfiguration { session_id: u32, patch: SpeechConfigPatch },
    Speak { session_id: u32, speech_id: u32, text: String, secure: bool },
    Pause { session_id: u32, speech_id: u32 },
    Resume { session_id: u32, speech_id: u32 },
    Abort { session_id: u32, clear_pending: bool },
    IsSpeaking(u32),
    GetSpeechState { session_id: u32, speech_id: u32 },
}

/// Every possible reply shape. A transport maps `TtsError` into this
/// envelope rather than raising it as an exception (spec.md §7: "errors
/// are first-class return values").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TtsResponse {
    Ok,
    Err(TtsError),
    Voices(Vec<String>),
    Configuration(SpeechConfig),
    Bool(bool),
    /// `0` on failure, matching `createSession`'s "sessionId | 0" contract.
    SessionId(u32),
    SpeechState(SpeechState),
}

impl TtsResponse {
    pub fn from_result(result: Result<(), TtsError>) -> Self {
        match result {
            Ok(()) => TtsResponse::Ok,
            Err(e) => TtsResponse::Err(e),
        }
    }
}

/// One event delivered out-of-band from a `Transport`. Manager-scope events
/// aren't tied to a session; session-scope events carry the session id so
/// a single multiplexed channel (as `SingleSessionTransport` uses) can
/// still demux them correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransportEvent {
    Manager(ManagerEvent),
    Session { session_id: u32, event: SessionEvent },
    /// Connection-scope: the server side of this transport became reachable
    /// (spec.md §4.6 item 3, `onTTSServerConnected`).
    ServerConnected,
    /// Connection-scope: the server side became unreachable
    /// (`onTTSServerClosed`).
    ServerClosed,
}

/// The narrow interface every client-facing transport implements. Two
/// implementations ship in this crate: [`crate::channel::ChannelTransport`]
/// (multi-session, object-RPC analogue) and
/// [`crate::single_session::SingleSessionTransport`] (single-session,
/// JSON-RPC/plugin analogue) — spec.md §4.6 item 4's "cross-transport
/// parity".
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: TtsRequest) -> TtsResponse;

    /// Subscribe to every event this transport instance delivers. Each call
    /// returns an independent receiver, the way a fresh client proxy
    /// subscribing to the server's event source would.
    fn subscribe_events(&self) -> mpsc::Receiver<TransportEvent>;
}
