//! `ChannelTransport`: the object-RPC analogue (spec.md §4.6 item 4,
//! "object-RPC transport supports multiple sessions and extended events
//! directly"). Calls go straight to an in-process [`Manager`] over a
//! [`Dispatcher`] so every call and every event delivery lands on the same
//! task, the way the real rtRemote transport's message loop would
//! serialize them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use ttsd_coordinator::Manager;
use ttsd_core::SessionEvent;

use crate::dispatcher::Dispatcher;
use crate::transport::{TransportEvent, TtsRequest, TtsResponse};
use crate::Transport;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Inner {
    manager: Manager,
    dispatcher: Dispatcher,
    events_tx: broadcast::Sender<TransportEvent>,
    /// Listener ids on each session's own `EventSource`, keyed by session id,
    /// so `forward_session_events` is only installed once per session.
    forwarded_sessions: Mutex<HashMap<u32, ()>>,
}

/// Multi-session, in-process [`Transport`]. Every session created through
/// this transport gets its events forwarded onto one shared broadcast
/// channel tagged with its session id, so `subscribe_events` demultiplexes
/// the same way a real multi-session RPC proxy would.
#[derive(Clone)]
pub struct ChannelTransport {
    inner: Arc<Inner>,
}

impl ChannelTransport {
    pub fn new(manager: Manager) -> Self {
        let (events_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            manager,
            dispatcher: Dispatcher::spawn(),
            events_tx,
            forwarded_sessions: Mutex::new(HashMap::new()),
        });

        let manager_events = inner.manager.subscribe();
        let tx = inner.events_tx.clone();
        tokio::spawn(forward_manager_events(manager_events.1, tx));

        Self { inner }
    }

    fn ensure_session_forwarded(&self, session_id: u32) {
        let mut forwarded = self.inner.forwarded_sessions.lock();
        if forwarded.contains_key(&session_id) {
            return;
        }
        forwarded.insert(session_id, ());
        drop(forwarded);

        let Some(session) = self.inner.manager.session(session_id) else {
            return;
        };
        let (_id, rx) = session.subscribe();
        let tx = self.inner.events_tx.clone();
        tokio::spawn(forward_session_events(session_id, rx, tx));
    }
}

async fn forward_manager_events(
    mut rx: mpsc::Receiver<ttsd_core::ManagerEvent>,
    tx: broadcast::Sender<TransportEvent>,
) {
    while let Some(event) = rx.recv().await {
        let _ = tx.send(TransportEvent::Manager(event));
    }
}

async fn forward_session_events(
    session_id: u32,
    mut rx: mpsc::Receiver<SessionEvent>,
    tx: broadcast::Sender<TransportEvent>,
) {
    while let Some(event) = rx.recv().await {
        let _ = tx.send(TransportEvent::Session { session_id, event });
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn call(&self, request: TtsRequest) -> TtsResponse {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let this = self.clone();

        self.inner.dispatcher.post(async move {
            let response = this.handle(request).await;
            let _ = reply_tx.send(response);
        });

        reply_rx.await.unwrap_or(TtsResponse::Err(ttsd_core::TtsError::Fail))
    }

    fn subscribe_events(&self) -> mpsc::Receiver<TransportEvent> {
        let mut broadcast_rx = self.inner.events_tx.subscribe();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "channel transport subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }
}

impl ChannelTransport {
    async fn handle(&self, request: TtsRequest) -> TtsResponse {
        let manager = &self.inner.manager;
        match request {
            TtsRequest::EnableTts(enabled) => {
                manager.enable_tts(enabled);
                TtsResponse::Ok
            }
            TtsRequest::ListVoices(language) => {
                TtsResponse::Voices(manager.list_voices(language.as_deref()))
            }
            TtsRequest::GetConfiguration => TtsResponse::Configuration(manager.configuration()),
            TtsRequest::SetConfiguration(patch) => {
                manager.set_configuration(patch);
                TtsResponse::Ok
            }
            TtsRequest::IsTtsEnabled => TtsResponse::Bool(manager.is_tts_enabled()),
            TtsRequest::IsSessionActiveForApp(app_id) => {
                TtsResponse::Bool(manager.is_session_active_for_app(app_id))
            }
            TtsRequest::AcquireResource(app_id) => {
                TtsResponse::from_result(manager.reserve_resource(app_id))
            }
            TtsRequest::ClaimResource(app_id) => {
                TtsResponse::from_result(manager.claim_resource(app_id))
            }
            TtsRequest::ReleaseResource(app_id) => {
                TtsResponse::from_result(manager.release_resource(app_id))
            }
            TtsRequest::CreateSession { app_id, app_name } => {
                match manager.create_session(app_id, app_name) {
                    Ok(session) => {
                        let session_id = session.session_id();
                        self.ensure_session_forwarded(session_id);
                        TtsResponse::SessionId(session_id)
                    }
                    Err(_) => TtsResponse::SessionId(0),
                }
            }
            TtsRequest::DestroySession(session_id) => {
                TtsResponse::from_result(manager.destroy_session(session_id))
            }
            TtsRequest::IsActiveSession(session_id) => {
                TtsResponse::Bool(manager.is_active_session(session_id))
            }
            TtsRequest::SetPreemptiveSpeak { session_id, preemptive } => {
                TtsResponse::from_result(manager.set_preemptive_speak(session_id, preemptive))
            }
            TtsRequest::RequestExtendedEvents { session_id, mask } => {
                TtsResponse::from_result(manager.request_extended_events(session_id, mask))
            }
            TtsRequest::GetSessionConfiguration(session_id) => {
                match manager.session_configuration(session_id) {
                    Ok(config) => TtsResponse::Configuration(config),
                    Err(e) => TtsResponse::Err(e),
                }
            }
            TtsRequest::SetSessionConfiguration { session_id, patch } => {
                TtsResponse::from_result(manager.set_session_configuration(session_id, patch))
            }
            TtsRequest::Speak { session_id, speech_id, text, secure } => {
                TtsResponse::from_result(manager.speak(session_id, speech_id, text, secure).await)
            }
            TtsRequest::Pause { session_id, speech_id } => {
                TtsResponse::from_result(manager.pause(session_id, speech_id))
            }
            TtsRequest::Resume { session_id, speech_id } => {
                TtsResponse::from_result(manager.resume(session_id, speech_id))
            }
            TtsRequest::Abort { session_id, clear_pending } => {
                TtsResponse::from_result(manager.abort(session_id, clear_pending))
            }
            TtsRequest::IsSpeaking(session_id) => match manager.is_speaking(session_id) {
                Ok(speaking) => TtsResponse::Bool(speaking),
                Err(e) => TtsResponse::Err(e),
            },
            TtsRequest::GetSpeechState { session_id, speech_id } => {
                match manager.speech_state(session_id, speech_id) {
                    Ok(state) => TtsResponse::SpeechState(state),
                    Err(e) => TtsResponse::Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as async_trait_attr;
    use ttsd_config::SpeechConfig;
    use ttsd_core::{ResourceAllocationPolicy, TtsError};
    use ttsd_speaker::{AudioPipeline, PipelineError, PipelineMessage, PipelineState};

    struct NullPipeline;

    #[async_trait_attr]
    impl AudioPipeline for NullPipeline {
        async fn set_source(&mut self, _url: &str) -> Result<(), PipelineError> {
            Ok(())
        }
        async fn play(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }
        async fn pause(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }
        async fn stop(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }
        fn set_volume(&mut self, _volume: u8) {}
        fn state(&self) -> PipelineState {
            PipelineState::Null
        }
        async fn next_message(&mut self) -> Option<PipelineMessage> {
            std::future::pending().await
        }
    }

    fn manager() -> Manager {
        let mut config = SpeechConfig::default();
        config.endpoint = "http://localhost/tts".to_string();
        Manager::new(ResourceAllocationPolicy::Reservation, config, Box::new(NullPipeline))
    }

    #[tokio::test]
    async fn create_session_round_trips_over_the_channel() {
        let transport = ChannelTransport::new(manager());
        let response = transport
            .call(TtsRequest::CreateSession { app_id: 1, app_name: "app".to_string() })
            .await;
        assert!(matches!(response, TtsResponse::SessionId(id) if id != 0));
    }

    #[tokio::test]
    async fn unknown_session_speak_reports_no_session_found() {
        let transport = ChannelTransport::new(manager());
        let response = transport
            .call(TtsRequest::Speak {
                session_id: 999,
                speech_id: 1,
                text: "hi".to_string(),
                secure: false,
            })
            .await;
        assert!(matches!(response, TtsResponse::Err(TtsError::NoSessionFound)));
    }

    #[tokio::test]
    async fn manager_events_are_forwarded_to_subscribers() {
        let transport = ChannelTransport::new(manager());
        let mut events = transport.subscribe_events();

        transport.call(TtsRequest::EnableTts(true)).await;

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            TransportEvent::Manager(ttsd_core::ManagerEvent::TtsStateChanged { enabled: true })
        ));
    }
}
