//! `SingleSessionTransport`: the JSON-RPC/plugin analogue (spec.md §4.6
//! item 4). This transport is deliberately single-session: `CreateSession`
//! synthesizes a fixed session id no matter which app asked, and every
//! client-assigned speech id is translated to a distinct service-assigned
//! id through a [`BiMap`] before being forwarded to the real, multi-session
//! transport underneath. This asymmetry versus [`crate::ChannelTransport`]
//! is a documented, intentional limitation of the JSON-RPC transport
//! (spec.md §9 "Open questions" — "preserved as a documented asymmetry,
//! not fixed"), not an oversight here.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use ttsd_core::{SessionEvent, TtsError};

use crate::bimap::BiMap;
use crate::channel::ChannelTransport;
use crate::transport::{TransportEvent, TtsRequest, TtsResponse};
use crate::Transport;

/// The only session id this transport ever hands back to a caller.
pub const SINGLE_SESSION_ID: u32 = 1;

const TRANSLATED_EVENT_CAPACITY: usize = 256;

struct State {
    /// The real, manager-assigned session id once `CreateSession` has run.
    real_session_id: Option<u32>,
    speech_ids: BiMap,
    next_service_speech_id: AtomicU32,
}

/// Single-session, in-process [`Transport`]. Wraps a [`ChannelTransport`]
/// and presents exactly one session ([`SINGLE_SESSION_ID`]) no matter how
/// many distinct apps call `CreateSession` through it.
#[derive(Clone)]
pub struct SingleSessionTransport {
    inner: ChannelTransport,
    state: Arc<Mutex<State>>,
}

impl SingleSessionTransport {
    pub fn new(inner: ChannelTransport) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(State {
                real_session_id: None,
                speech_ids: BiMap::new(),
                next_service_speech_id: AtomicU32::new(1),
            })),
        }
    }

    fn real_session_id(&self) -> Option<u32> {
        self.state.lock().real_session_id
    }

    fn service_id_for_new_speech(&self, client_id: u32) -> u32 {
        let mut state = self.state.lock();
        let service_id = state.next_service_speech_id.fetch_add(1, Ordering::SeqCst);
        state.speech_ids.insert(client_id, service_id);
        service_id
    }

    fn service_id_for(&self, client_id: u32) -> u32 {
        self.state
            .lock()
            .speech_ids
            .get_right(client_id)
            .unwrap_or(client_id)
    }
}

#[async_trait]
impl Transport for SingleSessionTransport {
    async fn call(&self, request: TtsRequest) -> TtsResponse {
        match request {
            TtsRequest::CreateSession { app_id, app_name } => {
                if self.real_session_id().is_some() {
                    return TtsResponse::SessionId(SINGLE_SESSION_ID);
                }
                let response = self.inner.call(TtsRequest::CreateSession { app_id, app_name }).await;
                match response {
                    TtsResponse::SessionId(real_id) if real_id != 0 => {
                        self.state.lock().real_session_id = Some(real_id);
                        TtsResponse::SessionId(SINGLE_SESSION_ID)
                    }
                    _ => TtsResponse::SessionId(0),
                }
            }

            TtsRequest::DestroySession(_session_id) => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::NoSessionFound);
                };
                let response = self.inner.call(TtsRequest::DestroySession(real_id)).await;
                self.state.lock().real_session_id = None;
                response
            }

            TtsRequest::IsActiveSession(_) => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Bool(false);
                };
                self.inner.call(TtsRequest::IsActiveSession(real_id)).await
            }

            TtsRequest::SetPreemptiveSpeak { preemptive, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                self.inner
                    .call(TtsRequest::SetPreemptiveSpeak { session_id: real_id, preemptive })
                    .await
            }

            TtsRequest::RequestExtendedEvents { mask, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                self.inner
                    .call(TtsRequest::RequestExtendedEvents { session_id: real_id, mask })
                    .await
            }

            TtsRequest::GetSessionConfiguration(_) => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                self.inner.call(TtsRequest::GetSessionConfiguration(real_id)).await
            }

            TtsRequest::SetSessionConfiguration { patch, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                self.inner
                    .call(TtsRequest::SetSessionConfiguration { session_id: real_id, patch })
                    .await
            }

            TtsRequest::Speak { speech_id, text, secure, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                let service_speech_id = self.service_id_for_new_speech(speech_id);
                self.inner
                    .call(TtsRequest::Speak {
                        session_id: real_id,
                        speech_id: service_speech_id,
                        text,
                        secure,
                    })
                    .await
            }

            TtsRequest::Pause { speech_id, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                let service_speech_id = self.service_id_for(speech_id);
                self.inner
                    .call(TtsRequest::Pause { session_id: real_id, speech_id: service_speech_id })
                    .await
            }

            TtsRequest::Resume { speech_id, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                let service_speech_id = self.service_id_for(speech_id);
                self.inner
                    .call(TtsRequest::Resume { session_id: real_id, speech_id: service_speech_id })
                    .await
            }

            TtsRequest::Abort { clear_pending, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Err(TtsError::SessionNotActive);
                };
                self.inner.call(TtsRequest::Abort { session_id: real_id, clear_pending }).await
            }

            TtsRequest::IsSpeaking(_) => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::Bool(false);
                };
                self.inner.call(TtsRequest::IsSpeaking(real_id)).await
            }

            TtsRequest::GetSpeechState { speech_id, .. } => {
                let Some(real_id) = self.real_session_id() else {
                    return TtsResponse::SpeechState(ttsd_core::SpeechState::None);
                };
                let service_speech_id = self.service_id_for(speech_id);
                self.inner
                    .call(TtsRequest::GetSpeechState { session_id: real_id, speech_id: service_speech_id })
                    .await
            }

            // Connection-scope requests need no session translation at all.
            other @ (TtsRequest::EnableTts(_)
            | TtsRequest::ListVoices(_)
            | TtsRequest::GetConfiguration
            | TtsRequest::SetConfiguration(_)
            | TtsRequest::IsTtsEnabled
            | TtsRequest::IsSessionActiveForApp(_)
            | TtsRequest::AcquireResource(_)
            | TtsRequest::ClaimResource(_)
            | TtsRequest::ReleaseResource(_)) => self.inner.call(other).await,
        }
    }

    fn subscribe_events(&self) -> mpsc::Receiver<TransportEvent> {
        let mut inner_rx = self.inner.subscribe_events();
        let state = self.state.clone();
        let (tx, rx) = mpsc::channel(TRANSLATED_EVENT_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = inner_rx.recv().await {
                let translated = match event {
                    TransportEvent::Session { session_id, event } => {
                        if Some(session_id) != state.lock().real_session_id {
                            continue;
                        }
                        TransportEvent::Session {
                            session_id: SINGLE_SESSION_ID,
                            event: translate_event(&state, event),
                        }
                    }
                    other => other,
                };
                if tx.send(translated).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

/// Rewrite service-assigned speech ids on an event back to the
/// client-assigned ids the caller originally used, via the same [`BiMap`]
/// `call` populated when the speech was queued.
fn translate_event(state: &Mutex<State>, event: SessionEvent) -> SessionEvent {
    let client_id_for = |service_id: u32| -> u32 {
        state.lock().speech_ids.get_left(service_id).unwrap_or(service_id)
    };

    match event {
        SessionEvent::Cancelled { speech_ids } => SessionEvent::Cancelled {
            speech_ids: speech_ids.into_iter().map(client_id_for).collect(),
        },
        SessionEvent::WillSpeak { speech_id, text } => {
            SessionEvent::WillSpeak { speech_id: client_id_for(speech_id), text }
        }
        SessionEvent::Started { speech_id, text } => {
            SessionEvent::Started { speech_id: client_id_for(speech_id), text }
        }
        SessionEvent::Spoke { speech_id, text } => {
            SessionEvent::Spoke { speech_id: client_id_for(speech_id), text }
        }
        SessionEvent::Paused { speech_id } => SessionEvent::Paused { speech_id: client_id_for(speech_id) },
        SessionEvent::Resumed { speech_id } => SessionEvent::Resumed { speech_id: client_id_for(speech_id) },
        SessionEvent::Interrupted { speech_id } => {
            SessionEvent::Interrupted { speech_id: client_id_for(speech_id) }
        }
        SessionEvent::NetworkError { speech_id } => {
            SessionEvent::NetworkError { speech_id: client_id_for(speech_id) }
        }
        SessionEvent::PlaybackError { speech_id } => {
            SessionEvent::PlaybackError { speech_id: client_id_for(speech_id) }
        }
        other @ (SessionEvent::Created
        | SessionEvent::Destroyed
        | SessionEvent::ResourceAcquired { .. }
        | SessionEvent::ResourceReleased { .. }) => other,
    }
}
