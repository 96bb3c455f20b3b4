//! SQLite-backed readings store.
//!
//! Writes go through a single connection guarded by a mutex, reads are
//! spread over a small pool of read-only connections. The database runs in
//! WAL mode so readers see the last committed state without blocking the
//! writer.

use super::models::{
    format_store_timestamp, parse_timestamp, NewReading, Reading, ReadingId, SensorId,
    SensorLastSeen,
};
use super::schema::{READINGS_VERSIONED_SCHEMAS, TABLE_SENSOR_DATA};
use super::{ReadingStore, StoreError};
use crate::sqlite_persistence::VersionedSchema;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteReadingStore {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Vec<Arc<Mutex<Connection>>>,
    read_index: Arc<AtomicUsize>,
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table_name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Picks the schema of a database that was never stamped with a version:
/// the latest one for a fresh file, otherwise the newest layout the
/// existing table matches.
fn detect_unversioned_schema(conn: &Connection) -> Result<&'static VersionedSchema> {
    let latest = READINGS_VERSIONED_SCHEMAS
        .last()
        .ok_or_else(|| anyhow!("No readings schema defined"))?;

    if !table_exists(conn, TABLE_SENSOR_DATA)? {
        return Ok(latest);
    }

    if let Some(schema) = READINGS_VERSIONED_SCHEMAS
        .iter()
        .rev()
        .find(|schema| schema.validate_columns(conn).is_ok())
    {
        info!(
            "Adopting existing {} table as readings schema version {}",
            TABLE_SENSOR_DATA, schema.version
        );
        return Ok(schema);
    }

    latest.validate_columns(conn).with_context(|| {
        format!("Readings schema validation failed for table {}", TABLE_SENSOR_DATA)
    })?;
    Ok(latest)
}

fn apply_schema(conn: &Connection) -> Result<()> {
    let db_version: usize = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let schema = match db_version {
        0 => detect_unversioned_schema(conn)?,
        _ => READINGS_VERSIONED_SCHEMAS
            .iter()
            .find(|schema| schema.db_version() == db_version)
            .ok_or_else(|| anyhow!("Unknown readings database version {}", db_version))?,
    };

    schema.create(conn)?;
    schema
        .validate(conn)
        .with_context(|| format!("Readings schema validation failed for table {}", TABLE_SENSOR_DATA))
}

/// Folds `(sensor_id, timestamp)` rows into the latest timestamp per
/// sensor, compared as instants. A sensor whose timestamps never parse
/// keeps its greatest raw value so the liveness check can report it.
fn latest_by_instant(
    rows: impl Iterator<Item = rusqlite::Result<(SensorId, String)>>,
) -> rusqlite::Result<Vec<SensorLastSeen>> {
    let mut latest: Vec<(SensorLastSeen, Option<DateTime<Utc>>)> = Vec::new();
    let mut positions: HashMap<SensorId, usize> = HashMap::new();

    for row in rows {
        let (sensor_id, timestamp) = row?;
        let instant = parse_timestamp(&timestamp).ok();

        let Some(&position) = positions.get(&sensor_id) else {
            positions.insert(sensor_id.clone(), latest.len());
            latest.push((
                SensorLastSeen {
                    sensor_id,
                    last_seen: timestamp,
                },
                instant,
            ));
            continue;
        };

        let (current, current_instant) = &mut latest[position];
        let is_later = match (*current_instant, instant) {
            (Some(known), Some(candidate)) => candidate > known,
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (None, None) => timestamp > current.last_seen,
        };
        if is_later {
            current.last_seen = timestamp;
            *current_instant = instant;
        }
    }

    Ok(latest.into_iter().map(|(row, _)| row).collect())
}

impl SqliteReadingStore {
    /// Opens (creating if needed) the readings database at `db_path`.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `read_pool_size` - Number of connections used for concurrent reads
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();
        let is_new_db = !db_path.exists();

        let write_conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open readings database at {:?}", db_path))?;
        write_conn.busy_timeout(BUSY_TIMEOUT)?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;

        if is_new_db {
            info!("Creating new readings database at {:?}", db_path);
        }
        apply_schema(&write_conn)?;

        let read_pool_size = read_pool_size.max(1);
        let mut read_pool = Vec::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let read_conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .context("Failed to open read connection")?;
            read_conn.busy_timeout(BUSY_TIMEOUT)?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        let store = SqliteReadingStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        };
        info!(
            "Opened readings database: {} readings, {} read connections",
            store.count()?,
            read_pool_size
        );
        Ok(store)
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    /// Runs `f` on a pooled read connection; the connection goes back to
    /// the pool when this returns, whatever the outcome.
    fn with_read_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&conn)?)
    }

    fn with_write_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.write_conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    fn parse_reading_row(row: &rusqlite::Row) -> rusqlite::Result<Reading> {
        Ok(Reading {
            id: row.get(0)?,
            sensor_id: row.get(1)?,
            temp_in: row.get(2)?,
            temp_out: row.get(3)?,
            flow_rate: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }
}

impl ReadingStore for SqliteReadingStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_write_conn(|conn| apply_schema(conn).map_err(StoreError::Schema))
    }

    fn append(&self, reading: &NewReading) -> Result<ReadingId, StoreError> {
        self.with_write_conn(|conn| {
            match &reading.timestamp {
                Some(timestamp) => {
                    conn.prepare_cached(
                        "INSERT INTO sensor_data (sensor_id, temp_in, temp_out, flow_rate, timestamp)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?
                    .execute(params![
                        reading.sensor_id,
                        reading.temp_in,
                        reading.temp_out,
                        reading.flow_rate,
                        format_store_timestamp(timestamp),
                    ])?;
                }
                None => {
                    conn.prepare_cached(
                        "INSERT INTO sensor_data (sensor_id, temp_in, temp_out, flow_rate)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?
                    .execute(params![
                        reading.sensor_id,
                        reading.temp_in,
                        reading.temp_out,
                        reading.flow_rate,
                    ])?;
                }
            }
            let id = conn.last_insert_rowid();
            debug!("Appended reading {} for sensor {}", id, reading.sensor_id);
            Ok(id)
        })
    }

    fn scan_all(&self) -> Result<Vec<Reading>, StoreError> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, sensor_id, temp_in, temp_out, flow_rate, timestamp
                 FROM sensor_data
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let readings = stmt
                .query_map([], Self::parse_reading_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(readings)
        })
    }

    fn latest_per_sensor(&self) -> Result<Vec<SensorLastSeen>, StoreError> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT sensor_id, timestamp
                 FROM sensor_data
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, SensorId>(0)?, row.get::<_, String>(1)?))
            })?;
            let latest = latest_by_instant(rows)?;
            Ok(latest)
        })
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.with_read_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))
        })
    }
}
