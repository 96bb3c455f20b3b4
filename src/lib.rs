//! Sensor Telemetry Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod liveness;
pub mod readings_store;
pub mod server;
pub mod sqlite_persistence;

#[cfg(test)]
mod test_logs;

// Re-export commonly used types for convenience
pub use liveness::{LivenessEvaluator, OfflineSensor, FRESHNESS_WINDOW};
pub use readings_store::{ReadingStore, SensorId, SqliteReadingStore, StoreError};
pub use server::{run_server, RequestsLoggingLevel, ServerConfig};
