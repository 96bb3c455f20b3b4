mod models;
mod schema;
mod sqlite_reading_store;

pub use models::*;
pub use schema::{READINGS_VERSIONED_SCHEMAS, TABLE_SENSOR_DATA};
pub use sqlite_reading_store::SqliteReadingStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    #[error("Storage unavailable: connection lock poisoned")]
    LockPoisoned,

    #[error("Storage unavailable: schema setup failed: {0:#}")]
    Schema(anyhow::Error),
}

/// Append-only store of sensor readings.
///
/// Implementations serialize writes and allow concurrent reads. A reading
/// whose `append` returned is visible to every later `scan_all` and
/// `latest_per_sensor` call.
pub trait ReadingStore: Send + Sync {
    /// Creates the readings table if it is missing and checks its layout.
    /// Safe to call any number of times.
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Appends one reading and returns the identity assigned to it.
    fn append(&self, reading: &NewReading) -> Result<ReadingId, StoreError>;

    /// Every reading, ordered by timestamp ascending then by insertion order.
    fn scan_all(&self) -> Result<Vec<Reading>, StoreError>;

    /// The maximum raw timestamp of every sensor that has at least one
    /// reading, in order of first appearance.
    fn latest_per_sensor(&self) -> Result<Vec<SensorLastSeen>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}
