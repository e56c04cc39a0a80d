use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_interview::{
    create_router, AppState, Config, HttpArtifactClient, LocalStorage, SessionMetrics, WsConnector,
};

#[derive(Debug, Parser)]
#[command(name = "voice-interview", version, about = "Voice interview session service")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-interview")]
    config: String,

    /// Override the HTTP port from the configuration
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    if cfg.agent.agent_id.is_empty() {
        warn!("No agent.agent_id configured; interviews will fail to connect");
    }

    let connector = Arc::new(WsConnector::for_agent(
        &cfg.agent.ws_url,
        &cfg.agent.agent_id,
        cfg.agent.api_key.clone(),
    ));
    let storage = Arc::new(LocalStorage::new(&cfg.storage.root));
    info!("Storing interview artifacts under {}", cfg.storage.root.display());

    let metrics = Arc::new(SessionMetrics::new());
    metrics.init();

    let mut state = AppState::new(connector, storage)
        .with_metrics(Arc::clone(&metrics))
        .with_session_defaults(cfg.session.clone())
        .with_capture_config(cfg.capture.to_capture_config());

    if cfg.artifacts.enabled {
        let client = HttpArtifactClient::new(&cfg.agent.api_url, cfg.agent.api_key.clone())
            .with_polling(cfg.artifacts.poll_attempts, cfg.artifacts.poll_interval());
        state = state.with_artifacts(Arc::new(client));
    } else {
        info!("Remote artifact retrieval disabled; using locally assembled artifacts");
    }

    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", cfg.service.http.bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    metrics.shutdown();
    Ok(())
}
