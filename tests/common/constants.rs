//! Shared constants for end-to-end tests

// ============================================================================
// Server lifecycle
// ============================================================================

/// Maximum time to wait for a spawned server to answer
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Delay between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Timeout applied to every request made by the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Sensors
// ============================================================================

/// A sensor that reports regularly in tests
pub const SENSOR_1_ID: i64 = 1;

/// A second, independent sensor
pub const SENSOR_2_ID: i64 = 2;

/// A sensor id no test ever writes
pub const UNKNOWN_SENSOR_ID: i64 = 999;

/// Acknowledgement returned for every stored reading
pub const INGEST_SUCCESS_MESSAGE: &str = "Data received successfully";
