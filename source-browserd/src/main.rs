use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use source_browserd::api;
use source_browserd::config::Config;
use source_browserd::discovery::mdns::MdnsProvider;
use source_browserd::discovery::{DiscoveryProvider, DiscoverySession, SessionContext};
use source_browserd::probe::ProbeContext;
use source_browserd::rtsp::RtspClient;
use source_browserd::sources::SourceTable;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("source_browserd=info"))
        )
        .init();

    tracing::info!("Starting source-browserd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/source-browser/browserd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Remote source table, the owner of everything discovered
    let (hash_tx, hash_rx) = watch::channel(String::new());
    let sources = Arc::new(SourceTable::new(hash_tx));

    let rtsp = RtspClient::new(config.probe.connect_timeout(), config.probe.io_timeout());
    let ctx = SessionContext::new(
        config.browser.service_type.clone(),
        ProbeContext {
            prober: Arc::new(rtsp),
            sink: sources.clone(),
            path_prefix: config.probe.path_prefix.clone(),
        },
    );

    let mut session = DiscoverySession::new(
        config.browser.interface.clone(),
        ctx,
        Box::new(|| -> Box<dyn DiscoveryProvider> { Box::new(MdnsProvider::new()) }),
    );
    session.init().context("Failed to start discovery session")?;

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Build API router
    let app_state = api::routes::AppState {
        sources: sources.clone(),
        hash_rx,
        session: session.status(),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Reap finished probes as they complete, with a periodic fallback
    let completions = session.registry().completions();
    let mut maintenance_interval = tokio::time::interval(
        Duration::from_secs(config.maintenance.reap_interval_secs.max(1))
    );
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Ok(_) = completions.recv_async() => {
                session.reap();
            }
            _ = maintenance_interval.tick() => {
                session.reap();
            }
            result = &mut shutdown => {
                result.context("Failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    tracing::info!("Shutdown signal received");

    // Stop serving before draining probes
    cancel.cancel();
    let _ = server_handle.await;

    // Waits for in-flight probes, so keep it off the async workers
    tokio::task::spawn_blocking(move || session.terminate())
        .await
        .context("Discovery shutdown task failed")??;

    tracing::info!("Shutdown complete");
    Ok(())
}
