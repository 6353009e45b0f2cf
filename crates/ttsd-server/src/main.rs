//! TTS coordinator entry point.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use ttsd_config::{load_settings, Settings};
use ttsd_coordinator::Manager;
use ttsd_server::{create_router, AppState};
use ttsd_speaker::HttpAudioPipeline;
use ttsd_transport::ChannelTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_file = std::env::var("TTSD_SETTINGS_FILE").ok().map(PathBuf::from);
    let speech_config_file = std::env::var("TTSD_SPEECH_CONFIG_FILE")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/ttsd/tts.conf"));

    let config = match load_settings(settings_file.as_deref(), Some(&speech_config_file)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("warning: failed to load configuration: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting tts coordinator");
    tracing::info!(policy = ?config.resource_access_policy, "resolved resource allocation policy");

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install prometheus recorder: {e}"))?;

    let pipeline = Box::new(HttpAudioPipeline::new());
    let manager = Manager::new(config.resource_access_policy, config.default_config.clone(), pipeline);

    manager
        .spawn_connection_watcher(Path::new(&config.server.socket_path))
        .map_err(|e| anyhow::anyhow!("failed to bind connection-watch socket {}: {e}", config.server.socket_path))?;
    tracing::info!(socket = %config.server.socket_path, "connection watcher listening");

    // The in-process transport listener this process owns. No socket is
    // bound for it — embedding code in this same process (a `TtsClient`
    // wired up via its `ConnectFn`) clones this handle directly.
    let transport = ChannelTransport::new(manager.clone());

    let app_state = AppState::new(manager, transport, metrics_handle);
    let app = create_router(app_state);

    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind_addr {}: {e}", config.server.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening for health/metrics requests");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("tts coordinator shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ttsd_server=info,ttsd_coordinator=info,ttsd_speaker=info,tower_http=info".into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.logging.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
