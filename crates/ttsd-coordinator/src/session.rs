use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};
use ttsd_config::SpeechConfig;
use ttsd_core::{ExtendedEvents, SessionEvent, SpeechState, TtsError};
use ttsd_speaker::{Speaker, SpeakerClient};

use crate::event_source::EventSource;

/// A single app's speech session: one per `app_id`, created and destroyed
/// by the Manager, which also hands it the shared [`Speaker`] handle once
/// the app holds the resource.
pub struct Session {
    app_id: u32,
    app_name: String,
    session_id: u32,
    speaker: Mutex<Option<Speaker>>,
    configuration: RwLock<SpeechConfig>,
    pending_configuration: Mutex<Option<SpeechConfig>>,
    extended_events: Mutex<ExtendedEvents>,
    events: EventSource<SessionEvent>,
}

impl Session {
    pub fn new(app_id: u32, app_name: String, session_id: u32, configuration: SpeechConfig) -> Arc<Self> {
        Arc::new(Self {
            app_id,
            app_name,
            session_id,
            speaker: Mutex::new(None),
            configuration: RwLock::new(configuration),
            pending_configuration: Mutex::new(None),
            extended_events: Mutex::new(ExtendedEvents::NONE),
            events: EventSource::new(),
        })
    }

    pub fn app_id(&self) -> u32 {
        self.app_id
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.speaker.lock().is_some()
    }

    pub fn is_speaking(&self) -> bool {
        match self.speaker.lock().as_ref() {
            Some(speaker) => speaker.is_speaking(Some(self.session_id)),
            None => false,
        }
    }

    pub fn configuration(&self) -> SpeechConfig {
        self.configuration.read().clone()
    }

    /// Deferred-apply: if a speech is in flight, the new configuration is
    /// staged and swapped in only once the current utterance finishes
    /// (`spoke` event), matching `TTSSession::setConfiguration`.
    pub fn set_configuration(&self, config: SpeechConfig) {
        if self.is_speaking() {
            warn!(
                session_id = self.session_id,
                "session is speaking, deferring configuration update until done"
            );
            *self.pending_configuration.lock() = Some(config);
        } else {
            *self.configuration.write() = config;
        }
    }

    pub fn extended_events(&self) -> ExtendedEvents {
        *self.extended_events.lock()
    }

    pub fn set_extended_events(&self, events: ExtendedEvents) {
        *self.extended_events.lock() = events;
    }

    /// Subscribe to this session's events; returns a listener id (for
    /// unsubscribing) and the receiving half of its mailbox.
    pub fn subscribe(&self) -> (u64, mpsc::Receiver<SessionEvent>) {
        self.events.add_listener()
    }

    pub fn unsubscribe(&self, id: u64) {
        self.events.remove_listener(id);
    }

    pub async fn speak(self: &Arc<Self>, speech_id: u32, text: String, secure: bool) -> Result<(), TtsError> {
        trace!(session_id = self.session_id, speech_id, "speak");
        let speaker = self
            .speaker
            .lock()
            .clone()
            .ok_or(TtsError::SessionNotActive)?;

        let config = self.configuration.read().clone();
        if !config.is_valid() {
            return Err(TtsError::InvalidConfiguration);
        }

        speaker
            .speak(self.clone(), self.session_id, speech_id, text, secure, config)
            .await;
        Ok(())
    }

    pub fn shut(&self) -> Result<(), TtsError> {
        let speaker = self.speaker.lock().clone().ok_or(TtsError::SessionNotActive)?;
        let session_id = self.session_id;
        tokio::spawn(async move { speaker.clear_all_from(session_id).await });
        Ok(())
    }

    pub fn pause(&self, speech_id: u32) -> Result<(), TtsError> {
        let speaker = self.speaker.lock().clone().ok_or(TtsError::SessionNotActive)?;
        speaker.pause(speech_id);
        Ok(())
    }

    pub fn resume(&self, speech_id: u32) -> Result<(), TtsError> {
        let speaker = self.speaker.lock().clone().ok_or(TtsError::SessionNotActive)?;
        speaker.resume(speech_id);
        Ok(())
    }

    pub fn speech_state(&self, speech_id: u32) -> SpeechState {
        match self.speaker.lock().as_ref() {
            Some(speaker) => speaker.speech_state(self.session_id, speech_id),
            None => SpeechState::None,
        }
    }

    pub fn clear_all_pending_speeches(&self) -> Result<(), TtsError> {
        self.shut()
    }

    /// Attach the shared speaker, marking the session active. Called only
    /// by the Manager while holding its lock.
    pub fn set_active(&self, speaker: Speaker, notify_client: bool) {
        if self.speaker.lock().is_some() {
            warn!(session_id = self.session_id, "session is already active");
            return;
        }
        info!(session_id = self.session_id, app_id = self.app_id, "activating session");
        *self.speaker.lock() = Some(speaker);
        if notify_client {
            self.events.send_event(SessionEvent::ResourceAcquired {
                session_id: self.session_id,
            });
        }
    }

    /// Detach the speaker, cancelling anything in flight for this session.
    pub fn set_inactive(&self, notify_client: bool) {
        let speaker = self.speaker.lock().take();
        if let Some(speaker) = speaker {
            let session_id = self.session_id;
            tokio::spawn(async move { speaker.clear_all_from(session_id).await });
            if notify_client {
                self.events.send_event(SessionEvent::ResourceReleased {
                    session_id: self.session_id,
                });
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(flag) = event.required_flag() {
            if !self.extended_events.lock().contains(flag) {
                return;
            }
        }
        self.events.send_event(event);
    }

    /// Emit a baseline event the Manager is responsible for, not the
    /// Speaker — `Created`/`Destroyed` around this session's lifetime.
    pub(crate) fn emit_lifecycle(&self, event: SessionEvent) {
        self.emit(event);
    }
}

#[async_trait]
impl SpeakerClient for Session {
    async fn will_speak(&self, speech_id: u32, text: &str) {
        // `WillSpeak` is the extended, opt-in notification; `Started` is
        // the baseline one that always fires, per spec.md §6.2/§8-4
        // (`willSpeak` precedes `started` when both are observed).
        self.emit(SessionEvent::WillSpeak {
            speech_id,
            text: text.to_string(),
        });
        self.emit(SessionEvent::Started {
            speech_id,
            text: text.to_string(),
        });
    }

    async fn spoke(&self, speech_id: u32, text: &str) {
        if let Some(pending) = self.pending_configuration.lock().take() {
            *self.configuration.write() = pending;
        }
        self.emit(SessionEvent::Spoke {
            speech_id,
            text: text.to_string(),
        });
    }

    async fn paused(&self, speech_id: u32) {
        self.emit(SessionEvent::Paused { speech_id });
    }

    async fn resumed(&self, speech_id: u32) {
        self.emit(SessionEvent::Resumed { speech_id });
    }

    async fn cancelled(&self, speech_ids: Vec<u32>) {
        self.emit(SessionEvent::Cancelled { speech_ids });
    }

    async fn interrupted(&self, speech_id: u32) {
        self.emit(SessionEvent::Interrupted { speech_id });
    }

    async fn network_error(&self, speech_id: u32) {
        self.emit(SessionEvent::NetworkError { speech_id });
    }

    async fn playback_error(&self, speech_id: u32) {
        self.emit(SessionEvent::PlaybackError { speech_id });
    }
}
