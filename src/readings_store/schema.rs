//! SQLite schema definitions for the readings database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

pub const TABLE_SENSOR_DATA: &str = "sensor_data";

// =============================================================================
// Version 0 - Layout written by earlier deployments
// =============================================================================

/// Nullable columns and a `DATETIME` timestamp. Rows are read and appended
/// the same way as in version 1; only the declared column constraints differ.
const SENSOR_DATA_TABLE_V0: Table = Table {
    name: TABLE_SENSOR_DATA,
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("sensor_id", &SqlType::Text),
        sqlite_column!("temp_in", &SqlType::Real),
        sqlite_column!("temp_out", &SqlType::Real),
        sqlite_column!("flow_rate", &SqlType::Real),
        sqlite_column!(
            "timestamp",
            &SqlType::DateTime,
            default_value = Some("CURRENT_TIMESTAMP")
        ),
    ],
    indices: SENSOR_DATA_INDICES,
};

const SENSOR_DATA_INDICES: &[(&str, &str)] = &[
    ("idx_sensor_data_timestamp", "timestamp"),
    ("idx_sensor_data_sensor_timestamp", "sensor_id, timestamp"),
];

// =============================================================================
// Version 1 - Sensor readings
// =============================================================================

/// One row per accepted reading, `id` grows with insertion order
const SENSOR_DATA_TABLE_V1: Table = Table {
    name: TABLE_SENSOR_DATA,
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("sensor_id", &SqlType::Text, non_null = true),
        sqlite_column!("temp_in", &SqlType::Real, non_null = true),
        sqlite_column!("temp_out", &SqlType::Real, non_null = true),
        sqlite_column!("flow_rate", &SqlType::Real, non_null = true),
        sqlite_column!(
            "timestamp",
            &SqlType::Text,
            non_null = true,
            default_value = Some("CURRENT_TIMESTAMP")
        ),
    ],
    indices: SENSOR_DATA_INDICES,
};

/// Ordered by version; the last entry is used for new databases.
pub const READINGS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[SENSOR_DATA_TABLE_V0],
    },
    VersionedSchema {
        version: 1,
        tables: &[SENSOR_DATA_TABLE_V1],
    },
];
