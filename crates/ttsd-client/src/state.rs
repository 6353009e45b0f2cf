//! Shared state the [`crate::TtsClient`] facade and the connection
//! supervisor both touch: the current transport (`None` while disconnected),
//! the per-session callback registry, and the last `enableTTS`/Configuration
//! values applied, so they can be replayed against a freshly (re)connected
//! transport (spec.md §6.5 "cached `enableTTS`/configuration re-applied
//! before the client is notified").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use ttsd_config::SpeechConfigPatch;
use ttsd_transport::Transport;

use crate::callbacks::SessionCallbacks;

pub(crate) struct ClientState {
    pub(crate) transport: RwLock<Option<Arc<dyn Transport>>>,
    pub(crate) session_callbacks: Mutex<HashMap<u32, Arc<dyn SessionCallbacks>>>,
    pub(crate) cached_enable_tts: Mutex<Option<bool>>,
    pub(crate) cached_configuration: Mutex<Option<SpeechConfigPatch>>,
}

impl ClientState {
    pub(crate) fn new() -> Self {
        Self {
            transport: RwLock::new(None),
            session_callbacks: Mutex::new(HashMap::new()),
            cached_enable_tts: Mutex::new(None),
            cached_configuration: Mutex::new(None),
        }
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }
}
