pub mod account;
pub mod classes;
pub mod extract;
pub mod progress;
pub mod routes;

use crate::config::Config;
use crate::streak::UserLocks;
use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub async fn run_server(config: Arc<Config>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.api_port)
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;

    let cors = cors_layer(&config);
    let state = routes::ApiState {
        config,
        streak_locks: Arc::new(UserLocks::default()),
    };
    let app: Router = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server: {addr}"))?;

    info!(address = %addr, "EduStreakz API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(origin = %origin, error = %error, "ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
