use anyhow::{Context, Result};
use std::time::Duration;

use tracing::info;

use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;

use super::metrics::metrics_handler;
use super::sensor_routes::{make_sensor_routes, run_store_operation, ApiError};
use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub readings_count: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> Result<Json<ServerStats>, ApiError> {
    let store = state.reading_store.clone();
    let readings_count = run_store_operation("count", move || store.count()).await?;
    Ok(Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        readings_count,
    }))
}

pub fn make_app(config: ServerConfig, reading_store: GuardedReadingStore) -> Router {
    let state = ServerState::new(config, reading_store);

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router
        .merge(make_sensor_routes(state.clone()))
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves the API and the metrics endpoint until either listener fails.
pub async fn run_server(config: ServerConfig, reading_store: GuardedReadingStore) -> Result<()> {
    let api_addr = format!("{}:{}", config.host, config.port);
    let metrics_addr = format!("{}:{}", config.host, config.metrics_port);

    let app = make_app(config, reading_store);

    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind API listener on {}", api_addr))?;
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", metrics_addr))?;

    info!("Ready to serve at {}!", api_addr);
    info!("Metrics available at {}!", metrics_addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("API server stopped")
        }
        result = axum::serve(metrics_listener, make_metrics_app()) => {
            result.context("Metrics server stopped")
        }
    }
}
