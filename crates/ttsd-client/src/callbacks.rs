//! Listener interfaces the client-facing API dispatches events to.
//!
//! `original_source`'s `TTSSpeakerClient`/event-map pattern is replaced here
//! by two plain traits with default no-op methods — a session registers one
//! `SessionCallbacks` implementation at `create_session` time instead of a
//! dynamic per-event-name key enumeration, and the process registers one
//! `ConnectionCallbacks` implementation for the connection-scope events.

/// Session-scoped callbacks (spec.md §6.2). Every method has a default
/// no-op body; implementors override only the events they care about.
pub trait SessionCallbacks: Send + Sync {
    fn on_created(&self) {}
    fn on_destroyed(&self) {}
    fn on_resource_acquired(&self) {}
    fn on_resource_released(&self) {}
    fn on_started(&self, _speech_id: u32, _text: &str) {}
    fn on_spoke(&self, _speech_id: u32, _text: &str) {}
    fn on_will_speak(&self, _speech_id: u32, _text: &str) {}
    fn on_paused(&self, _speech_id: u32) {}
    fn on_resumed(&self, _speech_id: u32) {}
    fn on_cancelled(&self, _speech_ids: &[u32]) {}
    fn on_interrupted(&self, _speech_id: u32) {}
    fn on_network_error(&self, _speech_id: u32) {}
    fn on_playback_error(&self, _speech_id: u32) {}
}

/// Connection-scoped callbacks (spec.md §6.2).
pub trait ConnectionCallbacks: Send + Sync {
    fn on_tts_state_changed(&self, _enabled: bool) {}
    fn on_voice_changed(&self, _voice: &str) {}
    fn on_server_connected(&self) {}
    fn on_server_closed(&self) {}
}

/// A `ConnectionCallbacks` that does nothing, for callers that only care
/// about session-scope events.
pub struct NoopConnectionCallbacks;
impl ConnectionCallbacks for NoopConnectionCallbacks {}

pub(crate) fn dispatch_session_event(callbacks: &dyn SessionCallbacks, event: ttsd_core::SessionEvent) {
    use ttsd_core::SessionEvent;
    match event {
        SessionEvent::Created => callbacks.on_created(),
        SessionEvent::Destroyed => callbacks.on_destroyed(),
        SessionEvent::ResourceAcquired { .. } => callbacks.on_resource_acquired(),
        SessionEvent::ResourceReleased { .. } => callbacks.on_resource_released(),
        SessionEvent::Started { speech_id, text } => callbacks.on_started(speech_id, &text),
        SessionEvent::Spoke { speech_id, text } => callbacks.on_spoke(speech_id, &text),
        SessionEvent::WillSpeak { speech_id, text } => callbacks.on_will_speak(speech_id, &text),
        SessionEvent::Paused { speech_id } => callbacks.on_paused(speech_id),
        SessionEvent::Resumed { speech_id } => callbacks.on_resumed(speech_id),
        SessionEvent::Cancelled { speech_ids } => callbacks.on_cancelled(&speech_ids),
        SessionEvent::Interrupted { speech_id } => callbacks.on_interrupted(speech_id),
        SessionEvent::NetworkError { speech_id } => callbacks.on_network_error(speech_id),
        SessionEvent::PlaybackError { speech_id } => callbacks.on_playback_error(speech_id),
    }
}
