//! Sensor ingestion, history and liveness routes.

use super::metrics::{record_reading_ingested, record_reading_rejected, record_store_operation};
use super::state::{GuardedReadingStore, ServerState};
use crate::liveness::{LivenessEvaluator, OfflineSensor};
use crate::readings_store::{NewReading, Reading, SensorId, StoreError};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

pub const INGEST_SUCCESS_MESSAGE: &str = "Data received successfully";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::StorageUnavailable(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(msg) => {
                warn!("Rejected request: {}", msg);
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::StorageUnavailable(msg) => {
                error!("{}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestReadingBody {
    pub sensor_id: i64,
    pub temp_in: f64,
    pub temp_out: f64,
    pub flow_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SensorStatusResponse {
    pub offline_sensors: Vec<OfflineSensor>,
}

/// Runs a blocking store call on the blocking thread pool and records its
/// duration under `operation`.
pub(super) async fn run_store_operation<T, F>(operation: &'static str, f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let start = Instant::now();
    let result = tokio::task::spawn_blocking(f).await.map_err(|err| {
        ApiError::StorageUnavailable(format!("Storage unavailable: {} task failed: {}", operation, err))
    })?;
    record_store_operation(operation, start.elapsed(), result.is_ok());
    Ok(result?)
}

/// POST /sensor
pub async fn ingest_reading(
    State(store): State<GuardedReadingStore>,
    payload: Result<Json<IngestReadingBody>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(body) = payload.inspect_err(|_| record_reading_rejected())?;

    let sensor_id = SensorId::from(body.sensor_id);
    info!("Received data from sensor {}", sensor_id);

    let reading = NewReading::new(sensor_id, body.temp_in, body.temp_out, body.flow_rate);
    run_store_operation("append", move || store.append(&reading)).await?;

    record_reading_ingested();
    Ok(Json(IngestResponse {
        message: INGEST_SUCCESS_MESSAGE.to_string(),
    }))
}

/// GET /sensor
pub async fn get_history(
    State(store): State<GuardedReadingStore>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let readings = run_store_operation("scan_all", move || store.scan_all()).await?;
    Ok(Json(readings))
}

/// GET /sensor/status
pub async fn get_sensor_status(
    State(liveness): State<LivenessEvaluator>,
) -> Result<Json<SensorStatusResponse>, ApiError> {
    let offline_sensors =
        run_store_operation("latest_per_sensor", move || liveness.evaluate()).await?;
    Ok(Json(SensorStatusResponse { offline_sensors }))
}

pub fn make_sensor_routes(state: ServerState) -> Router {
    Router::new()
        .route("/sensor", post(ingest_reading).get(get_history))
        .route("/sensor/status", get(get_sensor_status))
        .with_state(state)
}
