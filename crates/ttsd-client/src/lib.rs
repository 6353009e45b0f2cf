//! Client library: the façade of spec.md §6.1, a connection supervisor that
//! tolerates coordinator restarts, and the plugin activation state machine
//! used by the JSON-RPC transport.

mod callbacks;
mod client;
mod plugin;
mod state;
mod supervisor;

pub use callbacks::{ConnectionCallbacks, NoopConnectionCallbacks, SessionCallbacks};
pub use client::{SessionId, TtsClient};
pub use plugin::{
    DeactivationReason, PluginStatus, PluginStatusProbe, PluginSupervisor, PluginSupervisorConfig,
    STATUS_POLL_INTERVAL,
};
pub use supervisor::{BoxFuture, ConnectFn};
