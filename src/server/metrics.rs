use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all telemetry server metrics
const PREFIX: &str = "telemetry";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "route", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "route"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Ingestion Metrics
    pub static ref READINGS_INGESTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_readings_ingested_total"),
        "Total number of readings accepted and stored"
    ).expect("Failed to create readings_ingested_total metric");

    pub static ref READINGS_REJECTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_readings_rejected_total"),
        "Total number of readings rejected by validation"
    ).expect("Failed to create readings_rejected_total metric");

    // Store Metrics
    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_store_operation_duration_seconds"),
            "Readings store operation duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["operation"]
    ).expect("Failed to create store_operation_duration_seconds metric");

    pub static ref STORE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_store_errors_total"), "Total readings store errors"),
        &["operation"]
    ).expect("Failed to create store_errors_total metric");

    // Liveness Metrics
    pub static ref OFFLINE_SENSORS: Gauge = Gauge::new(
        format!("{PREFIX}_offline_sensors"),
        "Number of sensors found offline by the last liveness check"
    ).expect("Failed to create offline_sensors metric");

    pub static ref TIMESTAMP_PARSE_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_timestamp_parse_failures_total"),
        "Stored timestamps that could not be parsed during liveness checks"
    ).expect("Failed to create timestamp_parse_failures_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(READINGS_INGESTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(READINGS_REJECTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STORE_OPERATION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(STORE_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(OFFLINE_SENSORS.clone()));
    let _ = REGISTRY.register(Box::new(TIMESTAMP_PARSE_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request under its route template, never the raw path
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route])
        .observe(duration.as_secs_f64());
}

pub fn record_reading_ingested() {
    READINGS_INGESTED_TOTAL.inc();
}

pub fn record_reading_rejected() {
    READINGS_REJECTED_TOTAL.inc();
}

/// Record a store operation, successful or not
pub fn record_store_operation(operation: &str, duration: Duration, succeeded: bool) {
    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());

    if !succeeded {
        STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    }
}

pub fn set_offline_sensors(count: usize) {
    OFFLINE_SENSORS.set(count as f64);
}

pub fn record_timestamp_parse_failure() {
    TIMESTAMP_PARSE_FAILURES_TOTAL.inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // Value is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
