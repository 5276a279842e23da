//! HTTPサーバー
//!
//! CDNへのアップロード・一覧・タグ更新、試合一覧、スコアリングサービスへの
//! RPCプロキシを提供する。

pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::Config;
pub use state::AppState;

/// レート制限の期限切れエントリを掃除する間隔
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config
        .max_video_bytes
        .max(state.config.max_photo_bytes) as usize
        + MULTIPART_OVERHEAD;

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/upload", post(routes::upload))
        .route("/api/photos", get(routes::list_photos))
        .route("/api/photos/update", post(routes::update_photo))
        .route("/api/games", get(routes::games))
        .route("/api/games/:game_id/media", post(routes::submit_media))
        .route("/api/rpc", post(routes::rpc_proxy))
        .route("/api/webhooks/cdn", post(routes::cdn_webhook))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(config);
    let sweeper = state.limiter.spawn_sweeper(SWEEP_INTERVAL);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("Server running on {}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
