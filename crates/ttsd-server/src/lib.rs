//! TTS coordinator binary support crate: the minimal HTTP surface the
//! process exposes for health checks and metrics scraping, layered over the
//! same [`Manager`](ttsd_coordinator::Manager) the in-process transport and
//! connection watcher are built on.

pub mod http;

pub use http::{create_router, AppState};
