//! Connection supervisor (spec.md §4.6 items 1-3): a startup worker that
//! retries connecting on a fixed interval, a crash-recovery window once
//! connected, and cached-state replay on every reconnect. Grounded in
//! `gglib-runtime`'s `ProxySupervisor` (crash-vs-clean-stop detection via a
//! cancellation token plus a task handle, bind-then-report), adapted from
//! "supervise one external process" to "supervise one transport connection".

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ttsd_core::ManagerEvent;
use ttsd_transport::{Transport, TransportEvent};

use crate::callbacks::ConnectionCallbacks;
use crate::state::ClientState;

/// Short blocking lookup a fresh client does on its own call stack before
/// falling back to the retrying startup worker (spec.md §4.6 item 1).
const STARTUP_LOOKUP_TIMEOUT: Duration = Duration::from_millis(100);
/// Interval between retry attempts, both during startup and after a crash.
const RETRY_INTERVAL: Duration = Duration::from_secs(10);
/// How long the supervisor waits for a crashed server to reappear before
/// falling back to the unbounded startup retry loop.
const CRASH_RECOVERY_WINDOW: Duration = Duration::from_secs(30);

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
/// Attempts to (re)establish a transport. Returns `None` on failure; the
/// supervisor decides when to try again.
pub type ConnectFn = Arc<dyn Fn() -> BoxFuture<Option<Arc<dyn Transport>>> + Send + Sync>;

pub(crate) struct ConnectionSupervisor {
    cancel: CancellationToken,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub(crate) fn spawn(
        connect: ConnectFn,
        state: Arc<ClientState>,
        callbacks: Arc<dyn ConnectionCallbacks>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(connect, state, callbacks, cancel.clone()));
        Self { cancel, handle: tokio::sync::Mutex::new(Some(handle)) }
    }

    /// Signal "quit" and wait for the supervisor task to exit.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn connect_with_retry(
    connect: &ConnectFn,
    interval: Duration,
    cancel: &CancellationToken,
) -> Option<Arc<dyn Transport>> {
    loop {
        if let Some(transport) = connect().await {
            return Some(transport);
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn replay_cached_state(transport: &Arc<dyn Transport>, state: &ClientState) {
    if let Some(enabled) = *state.cached_enable_tts.lock() {
        let _ = transport.call(ttsd_transport::TtsRequest::EnableTts(enabled)).await;
    }
    let patch = state.cached_configuration.lock().clone();
    if let Some(patch) = patch {
        let _ = transport.call(ttsd_transport::TtsRequest::SetConfiguration(patch)).await;
    }
}

async fn run_event_dispatch(
    transport: Arc<dyn Transport>,
    state: Arc<ClientState>,
    callbacks: Arc<dyn ConnectionCallbacks>,
) {
    let mut events = transport.subscribe_events();
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Manager(ManagerEvent::TtsStateChanged { enabled }) => {
                *state.cached_enable_tts.lock() = Some(enabled);
                callbacks.on_tts_state_changed(enabled);
            }
            TransportEvent::Manager(ManagerEvent::VoiceChanged { voice }) => {
                callbacks.on_voice_changed(&voice);
            }
            TransportEvent::ServerConnected => callbacks.on_server_connected(),
            TransportEvent::ServerClosed => callbacks.on_server_closed(),
            TransportEvent::Session { session_id, event } => {
                let callback = state.session_callbacks.lock().get(&session_id).cloned();
                if let Some(callback) = callback {
                    crate::callbacks::dispatch_session_event(callback.as_ref(), event);
                }
            }
        }
    }
}

async fn run(
    connect: ConnectFn,
    state: Arc<ClientState>,
    callbacks: Arc<dyn ConnectionCallbacks>,
    cancel: CancellationToken,
) {
    let mut transport = match tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(STARTUP_LOOKUP_TIMEOUT, connect()) => result.ok().flatten(),
    } {
        Some(transport) => transport,
        None => {
            debug!("no tts coordinator reachable on first lookup, starting retry worker");
            match connect_with_retry(&connect, RETRY_INTERVAL, &cancel).await {
                Some(transport) => transport,
                None => return,
            }
        }
    };

    loop {
        replay_cached_state(&transport, &state).await;
        *state.transport.write() = Some(transport.clone());
        info!("tts client connected");
        callbacks.on_server_connected();

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = run_event_dispatch(transport.clone(), state.clone(), callbacks.clone()) => {}
        }

        *state.transport.write() = None;
        warn!("tts coordinator connection lost");
        callbacks.on_server_closed();

        let reconnected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio::time::timeout(
                CRASH_RECOVERY_WINDOW,
                connect_with_retry(&connect, RETRY_INTERVAL, &cancel),
            ) => result.ok().flatten(),
        };

        transport = match reconnected {
            Some(transport) => transport,
            None => {
                debug!("coordinator did not reappear within the crash recovery window, resuming startup retries");
                match connect_with_retry(&connect, RETRY_INTERVAL, &cancel).await {
                    Some(transport) => transport,
                    None => return,
                }
            }
        };
    }
}
