//! Plugin activation (spec.md §4.6 item 5, JSON-RPC transport only). The
//! real plugin-host IPC channel is an external collaborator out of scope
//! for this crate; [`PluginStatusProbe`] stands in for it so the state
//! machine — polling cadence, activation timeout, and the bounded
//! reactivation window — is implemented and testable against a fake.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};
use ttsd_core::TtsError;

/// How often the post-activation worker polls plugin status.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Inactive,
    Activating,
    Active,
}

/// Why the plugin host reported a deactivation. `Requested` deactivations
/// never trigger automatic reactivation, matching §4.6 item 5's "was not
/// Requested" guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    Requested,
    Crashed,
}

/// The narrow surface this crate needs from a plugin host: ask it to
/// activate, and poll its current status.
#[async_trait]
pub trait PluginStatusProbe: Send + Sync {
    async fn activate(&self) -> Result<(), TtsError>;
    async fn status(&self) -> PluginStatus;
}

pub struct PluginSupervisorConfig {
    /// Upper bound on how long `activate` waits for `Active` status.
    pub activation_timeout: Duration,
    pub should_activate_on_crash: bool,
    pub max_restarts_in_monitoring_period: u32,
    pub health_threshold: Duration,
}

impl Default for PluginSupervisorConfig {
    fn default() -> Self {
        Self {
            activation_timeout: Duration::from_secs(5),
            should_activate_on_crash: true,
            max_restarts_in_monitoring_period: 3,
            health_threshold: Duration::from_secs(60),
        }
    }
}

struct RestartWindow {
    attempts: u32,
    window_start: Instant,
}

/// Drives one plugin host's activation lifecycle: activate-and-poll, notify
/// subscribers once active, and on an unrequested deactivation, schedule a
/// bounded number of reactivation attempts within a sliding time window.
pub struct PluginSupervisor {
    probe: Arc<dyn PluginStatusProbe>,
    config: PluginSupervisorConfig,
    on_activation: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    restart_window: Mutex<Option<RestartWindow>>,
}

impl PluginSupervisor {
    pub fn new(probe: Arc<dyn PluginStatusProbe>, config: PluginSupervisorConfig) -> Self {
        Self {
            probe,
            config,
            on_activation: Mutex::new(Vec::new()),
            restart_window: Mutex::new(None),
        }
    }

    pub fn on_activation(&self, listener: Arc<dyn Fn() + Send + Sync>) {
        self.on_activation.lock().push(listener);
    }

    /// Ask the plugin host to activate, then poll its status at
    /// [`STATUS_POLL_INTERVAL`] until it reports `Active` or
    /// `activation_timeout` elapses.
    pub async fn activate(&self) -> Result<(), TtsError> {
        self.probe.activate().await?;

        let deadline = Instant::now() + self.config.activation_timeout;
        loop {
            match self.probe.status().await {
                PluginStatus::Active => {
                    info!("plugin activated");
                    for listener in self.on_activation.lock().iter() {
                        listener();
                    }
                    return Ok(());
                }
                PluginStatus::Inactive | PluginStatus::Activating => {
                    if Instant::now() >= deadline {
                        warn!("plugin activation timed out");
                        return Err(TtsError::Fail);
                    }
                    tokio::time::sleep(STATUS_POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Called when the plugin host reports a deactivation. Returns `true`
    /// if a reactivation attempt was scheduled (and ran).
    pub async fn handle_deactivation(&self, reason: DeactivationReason) -> bool {
        if reason == DeactivationReason::Requested || !self.config.should_activate_on_crash {
            return false;
        }

        if !self.record_restart_attempt() {
            warn!("plugin restart budget exhausted for this monitoring period, not reactivating");
            return false;
        }

        self.activate().await.is_ok()
    }

    /// Sliding-window admission check: at most
    /// `max_restarts_in_monitoring_period` attempts within
    /// `health_threshold`; a session that ran longer than the threshold
    /// resets the counter (spec.md §4.6 item 5).
    fn record_restart_attempt(&self) -> bool {
        let mut window = self.restart_window.lock();
        let now = Instant::now();

        match window.as_mut() {
            Some(w) if now.duration_since(w.window_start) > self.config.health_threshold => {
                w.window_start = now;
                w.attempts = 1;
                true
            }
            Some(w) if w.attempts < self.config.max_restarts_in_monitoring_period => {
                w.attempts += 1;
                true
            }
            Some(_) => false,
            None => {
                *window = Some(RestartWindow { attempts: 1, window_start: now });
                true
            }
        }
    }
}
