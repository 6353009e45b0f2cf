//! Health, readiness and metrics endpoints. The client-facing API is the
//! in-process `Transport`, not HTTP — this router exists only for the
//! ambient operational surface every service in this workspace carries.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;
use ttsd_coordinator::Manager;
use ttsd_transport::ChannelTransport;

#[derive(Clone)]
pub struct AppState {
    manager: Manager,
    /// The in-process transport listener this binary owns. Nothing dials
    /// into it over a wire — `ttsd-server` is the process that hosts it, and
    /// in-process clients (tests, or an embedded `TtsClient`) obtain their
    /// own clone rather than reaching it through HTTP.
    transport: ChannelTransport,
    metrics_handle: PrometheusHandle,
    started_at: Arc<Instant>,
}

impl AppState {
    pub fn new(manager: Manager, transport: ChannelTransport, metrics_handle: PrometheusHandle) -> Self {
        Self { manager, transport, metrics_handle, started_at: Arc::new(Instant::now()) }
    }

    pub fn transport(&self) -> &ChannelTransport {
        &self.transport
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, format!("ok {}s", state.started_at.elapsed().as_secs()))
}

/// Ready once `enableTTS(true)` has run at least once; before that, the
/// Manager exists but no session can speak, which upstream health checks
/// should treat as "not yet serving" rather than "down".
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.manager.is_tts_enabled() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "tts disabled")
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
