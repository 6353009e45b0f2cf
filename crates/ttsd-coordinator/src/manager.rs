//! Process-wide arbiter (C4): owns every [`Session`], the shared
//! [`Speaker`], and the reserve/claim/release resource-policy state
//! machine. Ported line-for-line from `TTSManager.cpp`
//! (`reservePlayerResource`/`claimPlayerResource`/`releasePlayerResource`/
//! `makeReservedOrClaimedSessionActive`/`makeSessionActive`/
//! `makeSessionInActive`).
//!
//! Locking model (spec.md §5): a single `parking_lot::Mutex` guards every
//! map and policy field, taken for the whole of each public entry point.
//! It is never held across an `.await` — session/speaker operations that
//! may block happen after the guard is dropped, with the session handle
//! cloned out first.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use ttsd_config::{SpeechConfig, SpeechConfigPatch};
use ttsd_core::{ExtendedEvents, ManagerEvent, ResourceAllocationPolicy, SessionEvent, SpeechState, TtsError};
use ttsd_speaker::{AudioPipeline, Speaker};

use crate::event_source::EventSource;
use crate::session::Session;
use crate::voices::list_voices;

struct ManagerState {
    policy: ResourceAllocationPolicy,
    /// 0 means "none", matching the engine's `appId_t` sentinel.
    reserved_app: u32,
    claimed_app: u32,
    /// Session currently holding the real `Speaker` handle, under
    /// RESERVATION. Unused under OPEN, where every live session holds it.
    active_session: Option<u32>,
    tts_enabled: bool,
    default_config: SpeechConfig,
    sessions: HashMap<u32, Arc<Session>>,
    app_to_session: HashMap<u32, u32>,
    next_session_id: u32,
}

impl ManagerState {
    /// The app id the current policy says should hold the speaker, ignoring
    /// `tts_enabled`. Claim always wins over reservation.
    fn effective_app(&self) -> Option<u32> {
        if self.claimed_app != 0 {
            Some(self.claimed_app)
        } else if self.reserved_app != 0 {
            Some(self.reserved_app)
        } else {
            None
        }
    }

    /// `PRIORITY` has no implemented arbitration of its own and silently
    /// downgrades to `OPEN` semantics (every live session active at once)
    /// rather than synthesizing behavior the spec never defines.
    fn is_open_like(&self) -> bool {
        self.policy != ResourceAllocationPolicy::Reservation
    }
}

struct Inner {
    state: Mutex<ManagerState>,
    speaker: Speaker,
    events: EventSource<ManagerEvent>,
}

/// The process-wide TTS coordinator. One instance per server process; owns
/// the single [`Speaker`] and every [`Session`].
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    pub fn new(policy: ResourceAllocationPolicy, default_config: SpeechConfig, pipeline: Box<dyn AudioPipeline>) -> Self {
        let state = ManagerState {
            policy,
            reserved_app: 0,
            claimed_app: 0,
            active_session: None,
            tts_enabled: false,
            default_config,
            sessions: HashMap::new(),
            app_to_session: HashMap::new(),
            next_session_id: 1,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                speaker: Speaker::spawn(pipeline),
                events: EventSource::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> (u64, mpsc::Receiver<ManagerEvent>) {
        self.inner.events.add_listener()
    }

    pub fn unsubscribe(&self, id: u64) {
        self.inner.events.remove_listener(id);
    }

    // ---- Sessions ----------------------------------------------------

    /// `createSession`: `CREATE_SESSION_DUPLICATE` if `app_id` already has a
    /// live session, `EMPTY_APPID_INPUT` for `app_id == 0`.
    pub fn create_session(&self, app_id: u32, app_name: String) -> Result<Arc<Session>, TtsError> {
        if app_id == 0 {
            return Err(TtsError::EmptyAppIdInput);
        }

        let mut state = self.inner.state.lock();
        if state.app_to_session.contains_key(&app_id) {
            return Err(TtsError::CreateSessionDuplicate);
        }

        let session_id = state.next_session_id;
        state.next_session_id += 1;
        let session = Session::new(app_id, app_name, session_id, state.default_config.clone());
        state.sessions.insert(session_id, session.clone());
        state.app_to_session.insert(app_id, session_id);
        info!(app_id, session_id, "session created");
        session.emit_lifecycle(SessionEvent::Created);

        if state.is_open_like() && state.tts_enabled {
            session.set_active(self.inner.speaker.clone(), true);
        }

        Ok(session)
    }

    /// `destroySession`: `NO_SESSION_FOUND` for an unknown id. Implicitly
    /// clears pending speeches and drops the speaker handle before removal.
    pub fn destroy_session(&self, session_id: u32) -> Result<(), TtsError> {
        let mut state = self.inner.state.lock();
        let Some(session) = state.sessions.remove(&session_id) else {
            return Err(TtsError::NoSessionFound);
        };
        state.app_to_session.remove(&session.app_id());

        let app_id = session.app_id();
        if state.reserved_app == app_id {
            state.reserved_app = 0;
        }
        if state.claimed_app == app_id {
            state.claimed_app = 0;
        }
        if state.active_session == Some(session_id) {
            state.active_session = None;
        }

        session.set_inactive(false);
        session.emit_lifecycle(SessionEvent::Destroyed);
        info!(app_id, session_id, "session destroyed");

        self.recompute_active(&mut state);
        Ok(())
    }

    pub fn session(&self, session_id: u32) -> Option<Arc<Session>> {
        self.inner.state.lock().sessions.get(&session_id).cloned()
    }

    fn session_or(&self, session_id: u32) -> Result<Arc<Session>, TtsError> {
        self.session(session_id).ok_or(TtsError::NoSessionFound)
    }

    pub fn is_active_session(&self, session_id: u32) -> bool {
        self.session(session_id).map(|s| s.is_active()).unwrap_or(false)
    }

    pub fn is_session_active_for_app(&self, app_id: u32) -> bool {
        let state = self.inner.state.lock();
        state
            .app_to_session
            .get(&app_id)
            .and_then(|id| state.sessions.get(id))
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    // ---- Resource arbitration -----------------------------------------

    /// `reservePlayerResource`.
    pub fn reserve_resource(&self, app_id: u32) -> Result<(), TtsError> {
        if app_id == 0 {
            return Err(TtsError::EmptyAppIdInput);
        }
        let mut state = self.inner.state.lock();
        if state.policy != ResourceAllocationPolicy::Reservation {
            return Ok(());
        }
        if state.reserved_app == 0 {
            state.reserved_app = app_id;
        } else if state.reserved_app != app_id {
            return Err(TtsError::ResourceBusy);
        }
        self.recompute_active(&mut state);
        Ok(())
    }

    /// `claimPlayerResource`. Requires a live session for `app_id`. A
    /// self-claim (claiming app already holds the reservation) collapses
    /// back to "reserved only" — the claim doesn't need to be remembered
    /// separately since releasing it is equivalent to releasing nothing.
    pub fn claim_resource(&self, app_id: u32) -> Result<(), TtsError> {
        if app_id == 0 {
            return Err(TtsError::EmptyAppIdInput);
        }
        let mut state = self.inner.state.lock();
        if state.policy != ResourceAllocationPolicy::Reservation {
            return Ok(());
        }
        if !state.app_to_session.contains_key(&app_id) {
            return Err(TtsError::AppNotFound);
        }

        if state.claimed_app == 0 {
            state.claimed_app = app_id;
        } else if state.claimed_app != app_id {
            return Err(TtsError::ResourceBusy);
        }

        if state.claimed_app == state.reserved_app {
            debug!(app_id, "self-claim collapses to existing reservation");
            state.claimed_app = 0;
        }

        self.recompute_active(&mut state);
        Ok(())
    }

    /// `releasePlayerResource`. Releasing a claim restores the prior
    /// reservation if it differed; releasing the reservation while a claim
    /// is nested is impossible (the claim already holds the resource, so
    /// the reservation-only app owns neither and would fail here, matching
    /// the `release(A) ⇒ FAIL` arm of the state diagram).
    pub fn release_resource(&self, app_id: u32) -> Result<(), TtsError> {
        if app_id == 0 {
            return Err(TtsError::EmptyAppIdInput);
        }
        let mut state = self.inner.state.lock();
        if state.policy != ResourceAllocationPolicy::Reservation {
            return Ok(());
        }

        if state.claimed_app == app_id {
            state.claimed_app = 0;
        } else if state.reserved_app == app_id {
            state.reserved_app = 0;
        } else {
            return Err(TtsError::Fail);
        }

        self.recompute_active(&mut state);
        Ok(())
    }

    /// Reassigns the Speaker handle to whichever session the current
    /// policy/claim/reservation state says should hold it. No-op while
    /// `tts_enabled` is false — the effective owner is still tracked, just
    /// not attached to a live Speaker (`enableTTS(true)` catches it up).
    fn recompute_active(&self, state: &mut ManagerState) {
        if state.policy == ResourceAllocationPolicy::Open {
            return;
        }

        let wanted_session = state
            .effective_app()
            .and_then(|app| state.app_to_session.get(&app).copied());

        if !state.tts_enabled {
            if let Some(prev) = state.active_session.take() {
                if let Some(session) = state.sessions.get(&prev) {
                    session.set_inactive(true);
                }
            }
            return;
        }

        if wanted_session == state.active_session {
            return;
        }

        if let Some(prev) = state.active_session.take() {
            if let Some(session) = state.sessions.get(&prev) {
                session.set_inactive(true);
            }
        }
        if let Some(new_id) = wanted_session {
            if let Some(session) = state.sessions.get(&new_id) {
                session.set_active(self.inner.speaker.clone(), true);
                state.active_session = Some(new_id);
            }
        }
    }

    // ---- Global enable/config ------------------------------------------

    pub fn is_tts_enabled(&self) -> bool {
        self.inner.state.lock().tts_enabled
    }

    /// `enableTTS`. Under OPEN, every live session is activated/deactivated
    /// together; under RESERVATION only the reserved/claimed session is.
    pub fn enable_tts(&self, enabled: bool) {
        let mut state = self.inner.state.lock();
        if state.tts_enabled == enabled {
            return;
        }
        state.tts_enabled = enabled;

        if state.policy == ResourceAllocationPolicy::Open {
            let sessions: Vec<Arc<Session>> = state.sessions.values().cloned().collect();
            for session in sessions {
                if enabled {
                    session.set_active(self.inner.speaker.clone(), true);
                } else {
                    session.set_inactive(true);
                }
            }
        } else {
            self.recompute_active(&mut state);
        }

        self.inner.events.send_event(ManagerEvent::TtsStateChanged { enabled });
    }

    pub fn configuration(&self) -> SpeechConfig {
        self.inner.state.lock().default_config.clone()
    }

    /// `setConfiguration`: updates the default and propagates to every live
    /// session (each applies it per its own deferred-apply rule). Fires
    /// `voice_changed` only if the resolved voice actually changed.
    pub fn set_configuration(&self, patch: SpeechConfigPatch) {
        let mut state = self.inner.state.lock();
        let previous_voice = state.default_config.voice().to_string();

        state.default_config.update_with(&patch);
        let new_voice = state.default_config.voice().to_string();

        let config = state.default_config.clone();
        for session in state.sessions.values() {
            session.set_configuration(config.clone());
        }
        drop(state);

        if previous_voice != new_voice {
            self.inner.events.send_event(ManagerEvent::VoiceChanged { voice: new_voice });
        }
    }

    pub fn list_voices(&self, language: Option<&str>) -> Vec<String> {
        list_voices(&self.inner.state.lock().default_config, language)
    }

    // ---- Per-session passthroughs --------------------------------------

    pub async fn speak(&self, session_id: u32, speech_id: u32, text: String, secure: bool) -> Result<(), TtsError> {
        if !self.inner.state.lock().tts_enabled {
            return Err(TtsError::NotEnabled);
        }
        self.session_or(session_id)?.speak(speech_id, text, secure).await
    }

    pub fn pause(&self, session_id: u32, speech_id: u32) -> Result<(), TtsError> {
        self.session_or(session_id)?.pause(speech_id)
    }

    pub fn resume(&self, session_id: u32, speech_id: u32) -> Result<(), TtsError> {
        self.session_or(session_id)?.resume(speech_id)
    }

    /// `abort(sessionId, clearPending)`: both forms route to the same
    /// non-blocking flush; `clearPending` only affects queued items, since
    /// the in-flight item is always interrupted either way. Kept as a
    /// distinct flag purely to mirror the client-facing signature.
    pub fn abort(&self, session_id: u32, _clear_pending: bool) -> Result<(), TtsError> {
        self.session_or(session_id)?.shut()
    }

    pub fn clear_all_pending_speeches(&self, session_id: u32) -> Result<(), TtsError> {
        self.session_or(session_id)?.clear_all_pending_speeches()
    }

    pub fn is_speaking(&self, session_id: u32) -> Result<bool, TtsError> {
        Ok(self.session_or(session_id)?.is_speaking())
    }

    pub fn speech_state(&self, session_id: u32, speech_id: u32) -> Result<SpeechState, TtsError> {
        Ok(self.session_or(session_id)?.speech_state(speech_id))
    }

    pub fn set_preemptive_speak(&self, session_id: u32, preemptive: bool) -> Result<(), TtsError> {
        let session = self.session_or(session_id)?;
        let mut config = session.configuration();
        config.set_preemptive(preemptive);
        session.set_configuration(config);
        Ok(())
    }

    pub fn request_extended_events(&self, session_id: u32, mask: u32) -> Result<(), TtsError> {
        self.session_or(session_id)?
            .set_extended_events(ExtendedEvents::from_bits(mask));
        Ok(())
    }

    pub fn session_configuration(&self, session_id: u32) -> Result<SpeechConfig, TtsError> {
        Ok(self.session_or(session_id)?.configuration())
    }

    pub fn set_session_configuration(&self, session_id: u32, patch: SpeechConfigPatch) -> Result<(), TtsError> {
        let session = self.session_or(session_id)?;
        let mut config = session.configuration();
        config.update_with(&patch);
        session.set_configuration(config);
        Ok(())
    }

    // ---- Connection watcher --------------------------------------------

    /// Binds the liveness-monitoring UNIX socket and spawns the accept
    /// loop in the background. Each connection writes its session id once
    /// then the Manager reads it; EOF on that connection destroys the
    /// session, giving robust cleanup if a client process crashes
    /// (`MonitorClients`/`MonitorClientsSourceIOCB` in original_source).
    pub fn spawn_connection_watcher(&self, socket_path: &Path) -> std::io::Result<()> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        let manager = self.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let manager = manager.clone();
                        tokio::spawn(async move { manager.watch_connection(stream).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "connection-watch accept failed");
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    async fn watch_connection(&self, mut stream: tokio::net::UnixStream) {
        let mut buf = Vec::new();
        if stream.read_to_end(&mut buf).await.is_err() {
            return;
        }
        let Ok(text) = std::str::from_utf8(&buf) else { return };
        let Ok(session_id) = text.trim().parse::<u32>() else {
            return;
        };

        debug!(session_id, "connection-watch stream closed, destroying session");
        if let Err(e) = self.destroy_session(session_id) {
            debug!(session_id, error = ?e, "session already gone by the time connection watcher fired");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc as tokio_mpsc;
    use ttsd_speaker::{PipelineError, PipelineMessage, PipelineState};

    use super::*;

    struct InstantEosPipeline {
        state: PipelineState,
        rx: tokio_mpsc::UnboundedReceiver<PipelineMessage>,
        tx: tokio_mpsc::UnboundedSender<PipelineMessage>,
    }

    impl InstantEosPipeline {
        fn new() -> Self {
            let (tx, rx) = tokio_mpsc::unbounded_channel();
            Self { state: PipelineState::Null, rx, tx }
        }
    }

    #[async_trait]
    impl AudioPipeline for InstantEosPipeline {
        async fn set_source(&mut self, _url: &str) -> Result<(), PipelineError> {
            self.state = PipelineState::Ready;
            Ok(())
        }
        async fn play(&mut self) -> Result<(), PipelineError> {
            self.state = PipelineState::Playing;
            let _ = self.tx.send(PipelineMessage::Eos);
            Ok(())
        }
        async fn pause(&mut self) -> Result<(), PipelineError> {
            self.state = PipelineState::Paused;
            Ok(())
        }
        async fn stop(&mut self) -> Result<(), PipelineError> {
            self.state = PipelineState::Null;
            Ok(())
        }
        fn set_volume(&mut self, _volume: u8) {}
        fn state(&self) -> PipelineState {
            self.state
        }
        async fn next_message(&mut self) -> Option<PipelineMessage> {
            self.rx.recv().await
        }
    }

    fn valid_config() -> SpeechConfig {
        let mut c = SpeechConfig::default();
        c.endpoint = "http://localhost/tts".to_string();
        c
    }

    fn manager(policy: ResourceAllocationPolicy) -> Manager {
        Manager::new(policy, valid_config(), Box::new(InstantEosPipeline::new()))
    }

    #[test]
    fn create_session_twice_for_same_app_is_duplicate() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        mgr.create_session(42, "app".to_string()).unwrap();
        let err = mgr.create_session(42, "app".to_string()).unwrap_err();
        assert_eq!(err, TtsError::CreateSessionDuplicate);
    }

    #[test]
    fn destroy_unknown_session_fails() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        assert_eq!(mgr.destroy_session(999).unwrap_err(), TtsError::NoSessionFound);
    }

    #[test]
    fn reservation_grants_exclusive_speaker_attachment() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        let a = mgr.create_session(1, "a".to_string()).unwrap();
        let b = mgr.create_session(2, "b".to_string()).unwrap();
        mgr.enable_tts(true);

        mgr.reserve_resource(1).unwrap();
        assert!(a.is_active());
        assert!(!b.is_active());

        mgr.reserve_resource(2).unwrap_err();
    }

    #[test]
    fn claim_overrides_reservation_and_release_restores_it() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        let a = mgr.create_session(1, "a".to_string()).unwrap();
        let b = mgr.create_session(2, "b".to_string()).unwrap();
        mgr.enable_tts(true);
        mgr.reserve_resource(1).unwrap();
        assert!(a.is_active());

        mgr.claim_resource(2).unwrap();
        assert!(!a.is_active());
        assert!(b.is_active());

        mgr.release_resource(2).unwrap();
        assert!(a.is_active());
        assert!(!b.is_active());
    }

    #[test]
    fn self_claim_collapses_and_release_clears_reservation() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        let a = mgr.create_session(5, "a".to_string()).unwrap();
        mgr.enable_tts(true);
        mgr.reserve_resource(5).unwrap();

        mgr.claim_resource(5).unwrap();
        assert!(a.is_active());

        mgr.release_resource(5).unwrap();
        assert!(!a.is_active());
    }

    #[test]
    fn claim_without_live_session_is_app_not_found() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        assert_eq!(mgr.claim_resource(7).unwrap_err(), TtsError::AppNotFound);
    }

    #[test]
    fn release_when_owning_neither_fails() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        mgr.create_session(1, "a".to_string()).unwrap();
        assert_eq!(mgr.release_resource(1).unwrap_err(), TtsError::Fail);
    }

    #[test]
    fn open_policy_resource_calls_are_inert() {
        let mgr = manager(ResourceAllocationPolicy::Open);
        let a = mgr.create_session(1, "a".to_string()).unwrap();
        let b = mgr.create_session(2, "b".to_string()).unwrap();
        mgr.enable_tts(true);

        assert!(a.is_active());
        assert!(b.is_active());
        mgr.reserve_resource(1).unwrap();
        mgr.claim_resource(2).unwrap();
        assert!(a.is_active());
        assert!(b.is_active());
    }

    #[tokio::test]
    async fn speak_fails_when_tts_disabled() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        mgr.create_session(1, "a".to_string()).unwrap();
        mgr.reserve_resource(1).unwrap();
        let err = mgr.speak(1, 1, "hi".to_string(), false).await.unwrap_err();
        assert_eq!(err, TtsError::NotEnabled);
    }

    #[test]
    fn destroying_reserved_app_session_releases_reservation() {
        let mgr = manager(ResourceAllocationPolicy::Reservation);
        let a = mgr.create_session(1, "a".to_string()).unwrap();
        mgr.enable_tts(true);
        mgr.reserve_resource(1).unwrap();
        assert!(a.is_active());

        mgr.destroy_session(a.session_id()).unwrap();
        // A fresh app can now reserve without RESOURCE_BUSY.
        mgr.create_session(9, "c".to_string()).unwrap();
        mgr.reserve_resource(9).unwrap();
    }

    #[test]
    fn list_voices_delegates_to_default_configuration() {
        let mut config = valid_config();
        config.extras.insert("voice_for_en-US".to_string(), "amy".to_string());
        config.language = "en-US".to_string();
        let mgr = Manager::new(
            ResourceAllocationPolicy::Reservation,
            config,
            Box::new(InstantEosPipeline::new()),
        );
        assert_eq!(mgr.list_voices(None), vec!["amy".to_string()]);
    }
}
