//! `TtsClient`: the synchronous-looking façade of spec.md §6.1, realized as
//! async methods over whatever [`Transport`] the connection supervisor
//! currently holds. Every method returns `TtsError::Fail` while
//! disconnected, matching §7's "subsequent speech call returns FAIL" until
//! a new `onTTSServerConnected` lands.

use std::sync::Arc;

use ttsd_config::{SpeechConfig, SpeechConfigPatch};
use ttsd_core::{SpeechState, TtsError};
use ttsd_transport::{Transport, TtsRequest, TtsResponse};

use crate::callbacks::{ConnectionCallbacks, NoopConnectionCallbacks, SessionCallbacks};
use crate::state::ClientState;
use crate::supervisor::{ConnectFn, ConnectionSupervisor};

/// A connected session handle. Dropping it does not destroy the session —
/// call [`TtsClient::destroy_session`] explicitly, mirroring §6.1's
/// `destroySession(sessionId)` being a distinct operation from garbage
/// collection.
pub type SessionId = u32;

pub struct TtsClient {
    state: Arc<ClientState>,
    supervisor: ConnectionSupervisor,
}

impl TtsClient {
    /// Connect using a caller-supplied `connect` closure (e.g. one that
    /// clones a [`ttsd_transport::ChannelTransport`] or dials a
    /// [`ttsd_transport::SingleSessionTransport`]), with no connection-scope
    /// listener installed.
    pub fn connect(connect: ConnectFn) -> Self {
        Self::connect_with_callbacks(connect, Arc::new(NoopConnectionCallbacks))
    }

    pub fn connect_with_callbacks(
        connect: ConnectFn,
        connection_callbacks: Arc<dyn ConnectionCallbacks>,
    ) -> Self {
        let state = Arc::new(ClientState::new());
        let supervisor = ConnectionSupervisor::spawn(connect, state.clone(), connection_callbacks);
        Self { state, supervisor }
    }

    /// Signal the supervisor to stop retrying and wait for its task to exit
    /// ("quit", spec.md §4.6 item 3).
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    fn transport(&self) -> Result<Arc<dyn Transport>, TtsError> {
        self.state.transport().ok_or(TtsError::Fail)
    }

    pub async fn enable_tts(&self, enabled: bool) -> Result<(), TtsError> {
        *self.state.cached_enable_tts.lock() = Some(enabled);
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::EnableTts(enabled)).await)
    }

    pub async fn list_voices(&self, language: Option<&str>) -> Result<Vec<String>, TtsError> {
        let transport = self.transport()?;
        match transport.call(TtsRequest::ListVoices(language.map(str::to_string))).await {
            TtsResponse::Voices(voices) => Ok(voices),
            TtsResponse::Err(e) => Err(e),
            _ => Err(TtsError::Fail),
        }
    }

    pub async fn get_configuration(&self) -> Result<SpeechConfig, TtsError> {
        let transport = self.transport()?;
        match transport.call(TtsRequest::GetConfiguration).await {
            TtsResponse::Configuration(config) => Ok(config),
            TtsResponse::Err(e) => Err(e),
            _ => Err(TtsError::Fail),
        }
    }

    pub async fn set_configuration(&self, patch: SpeechConfigPatch) -> Result<(), TtsError> {
        *self.state.cached_configuration.lock() = Some(patch.clone());
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::SetConfiguration(patch)).await)
    }

    pub async fn is_tts_enabled(&self) -> Result<bool, TtsError> {
        let transport = self.transport()?;
        as_bool(transport.call(TtsRequest::IsTtsEnabled).await)
    }

    pub async fn is_session_active_for_app(&self, app_id: u32) -> Result<bool, TtsError> {
        let transport = self.transport()?;
        as_bool(transport.call(TtsRequest::IsSessionActiveForApp(app_id)).await)
    }

    pub async fn acquire_resource(&self, app_id: u32) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::AcquireResource(app_id)).await)
    }

    pub async fn claim_resource(&self, app_id: u32) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::ClaimResource(app_id)).await)
    }

    pub async fn release_resource(&self, app_id: u32) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::ReleaseResource(app_id)).await)
    }

    /// Returns `0` on failure, matching §6.1's `sessionId | 0` contract; the
    /// supplied callbacks are installed before the call returns so no
    /// `created` event is ever missed.
    pub async fn create_session(
        &self,
        app_id: u32,
        app_name: impl Into<String>,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> SessionId {
        let Ok(transport) = self.transport() else {
            return 0;
        };
        let response = transport
            .call(TtsRequest::CreateSession { app_id, app_name: app_name.into() })
            .await;
        let TtsResponse::SessionId(session_id) = response else {
            return 0;
        };
        if session_id != 0 {
            self.state.session_callbacks.lock().insert(session_id, callbacks);
        }
        session_id
    }

    pub async fn destroy_session(&self, session_id: SessionId) -> Result<(), TtsError> {
        let transport = self.transport()?;
        let result = as_unit(transport.call(TtsRequest::DestroySession(session_id)).await);
        self.state.session_callbacks.lock().remove(&session_id);
        result
    }

    pub async fn is_active_session(&self, session_id: SessionId) -> Result<bool, TtsError> {
        let transport = self.transport()?;
        as_bool(transport.call(TtsRequest::IsActiveSession(session_id)).await)
    }

    pub async fn set_preemptive_speak(&self, session_id: SessionId, preemptive: bool) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::SetPreemptiveSpeak { session_id, preemptive }).await)
    }

    pub async fn request_extended_events(&self, session_id: SessionId, mask: u32) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::RequestExtendedEvents { session_id, mask }).await)
    }

    pub async fn speak(
        &self,
        session_id: SessionId,
        speech_id: u32,
        text: impl Into<String>,
        secure: bool,
    ) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(
            transport
                .call(TtsRequest::Speak { session_id, speech_id, text: text.into(), secure })
                .await,
        )
    }

    pub async fn pause(&self, session_id: SessionId, speech_id: u32) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::Pause { session_id, speech_id }).await)
    }

    pub async fn resume(&self, session_id: SessionId, speech_id: u32) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::Resume { session_id, speech_id }).await)
    }

    pub async fn abort(&self, session_id: SessionId, clear_pending: bool) -> Result<(), TtsError> {
        let transport = self.transport()?;
        as_unit(transport.call(TtsRequest::Abort { session_id, clear_pending }).await)
    }

    pub async fn is_speaking(&self, session_id: SessionId) -> Result<bool, TtsError> {
        let transport = self.transport()?;
        as_bool(transport.call(TtsRequest::IsSpeaking(session_id)).await)
    }

    pub async fn get_speech_state(&self, session_id: SessionId, speech_id: u32) -> Result<SpeechState, TtsError> {
        let transport = self.transport()?;
        match transport.call(TtsRequest::GetSpeechState { session_id, speech_id }).await {
            TtsResponse::SpeechState(state) => Ok(state),
            TtsResponse::Err(e) => Err(e),
            _ => Err(TtsError::Fail),
        }
    }
}

fn as_unit(response: TtsResponse) -> Result<(), TtsError> {
    match response {
        TtsResponse::Ok => Ok(()),
        TtsResponse::Err(e) => Err(e),
        _ => Err(TtsError::Fail),
    }
}

fn as_bool(response: TtsResponse) -> Result<bool, TtsError> {
    match response {
        TtsResponse::Bool(b) => Ok(b),
        TtsResponse::Err(e) => Err(e),
        _ => Err(TtsError::Fail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait as async_trait_attr;
    use ttsd_config::SpeechConfig;
    use ttsd_core::ResourceAllocationPolicy;
    use ttsd_coordinator::Manager;
    use ttsd_speaker::{AudioPipeline, PipelineError, PipelineMessage, PipelineState};
    use ttsd_transport::ChannelTransport;

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

    fn in_process_connect() -> ConnectFn {
        let mut config = SpeechConfig::default();
        config.endpoint = "http://localhost/tts".to_string();
        let manager = Manager::new(ResourceAllocationPolicy::Reservation, config, Box::new(NullPipeline));
        let transport: Arc<dyn Transport> = Arc::new(ChannelTransport::new(manager));
        Arc::new(move || {
            let transport = transport.clone();
            Box::pin(async move { Some(transport) })
        })
    }

    struct RecordingSessionCallbacks {
        started: Arc<std::sync::Mutex<Vec<u32>>>,
    }

    impl SessionCallbacks for RecordingSessionCallbacks {
        fn on_started(&self, speech_id: u32, _text: &str) {
            self.started.lock().unwrap().push(speech_id);
        }
    }

    async fn wait_connected(client: &TtsClient) {
        for _ in 0..100 {
            if client.state.transport().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("client never connected");
    }

    #[tokio::test]
    async fn enable_tts_and_create_session_round_trip() {
        let client = TtsClient::connect(in_process_connect());
        wait_connected(&client).await;

        client.enable_tts(true).await.unwrap();
        let started = Arc::new(std::sync::Mutex::new(Vec::new()));
        let callbacks = Arc::new(RecordingSessionCallbacks { started: started.clone() });

        let session_id = client.create_session(7, "test-app", callbacks).await;
        assert_ne!(session_id, 0);

        client.acquire_resource(7).await.unwrap();
        client.speak(session_id, 1, "hello", false).await.unwrap();

        for _ in 0..100 {
            if !started.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*started.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn operations_before_connect_fail_fast() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        let never_connects: ConnectFn = Arc::new(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { None })
        });
        let client = TtsClient::connect(never_connects);

        let result = client.enable_tts(true).await;
        assert!(matches!(result, Err(TtsError::Fail)));
        client.shutdown().await;
    }
}
