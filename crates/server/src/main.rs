use server::config;
use server::routes;
use server::state::AppState;

use anyhow::Context;
use coach_engine::EngineController;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();

    // Jobs queue until the handshake completes, so the server can start
    // accepting requests right away.
    let engine = EngineController::new(config.engine.clone());
    tokio::spawn({
        let engine = engine.clone();
        async move {
            match engine.init().await {
                Ok(()) => tracing::info!("Chess engine ready"),
                Err(e) => tracing::warn!("Chess engine unavailable: {e}"),
            }
        }
    });

    let state = AppState::new(config.clone(), engine.clone()).context("Failed to build clients")?;
    if state.games.is_configured() {
        tracing::info!("Realtime store configured - multiplayer enabled");
    } else {
        tracing::info!("Realtime store not configured - multiplayer disabled");
    }

    let games = state.games.clone();
    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    if let Err(e) = games.shutdown().await {
        tracing::warn!("Failed to mark players offline: {e}");
    }
    engine.destroy().await;
    Ok(())
}
