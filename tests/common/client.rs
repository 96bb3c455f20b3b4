//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per telemetry endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Sensor Endpoints
    // ========================================================================

    /// POST /sensor with a well-formed reading
    pub async fn post_reading(
        &self,
        sensor_id: i64,
        temp_in: f64,
        temp_out: f64,
        flow_rate: f64,
    ) -> Response {
        self.post_raw_reading(json!({
            "sensor_id": sensor_id,
            "temp_in": temp_in,
            "temp_out": temp_out,
            "flow_rate": flow_rate,
        }))
        .await
    }

    /// POST /sensor with an arbitrary JSON body
    pub async fn post_raw_reading(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/sensor", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Post reading request failed")
    }

    /// GET /sensor
    pub async fn get_history(&self) -> Response {
        self.client
            .get(format!("{}/sensor", self.base_url))
            .send()
            .await
            .expect("Get history request failed")
    }

    /// GET /sensor/status
    pub async fn get_status(&self) -> Response {
        self.client
            .get(format!("{}/sensor/status", self.base_url))
            .send()
            .await
            .expect("Get status request failed")
    }

    // ========================================================================
    // Server Endpoints
    // ========================================================================

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }
}
