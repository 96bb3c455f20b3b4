use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Text layout of SQLite's `CURRENT_TIMESTAMP`, always UTC and without offset.
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub type ReadingId = i64;

/// Opaque sensor identifier. Two readings belong to the same sensor iff
/// their identifiers are equal; nothing else about the value is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for SensorId {
    fn from(value: i64) -> Self {
        SensorId(value.to_string())
    }
}

impl From<&str> for SensorId {
    fn from(value: &str) -> Self {
        SensorId(value.to_string())
    }
}

impl From<String> for SensorId {
    fn from(value: String) -> Self {
        SensorId(value)
    }
}

impl ToSql for SensorId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for SensorId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        // Rows written by other tools may carry a numeric sensor_id
        match value {
            ValueRef::Text(_) => String::column_result(value).map(SensorId),
            ValueRef::Integer(i) => Ok(SensorId(i.to_string())),
            ValueRef::Real(r) => Ok(SensorId(r.to_string())),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// A reading about to be appended. `timestamp: None` lets the store stamp
/// it with its own clock.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub sensor_id: SensorId,
    pub temp_in: f64,
    pub temp_out: f64,
    pub flow_rate: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewReading {
    pub fn new(sensor_id: SensorId, temp_in: f64, temp_out: f64, flow_rate: f64) -> Self {
        NewReading {
            sensor_id,
            temp_in,
            temp_out,
            flow_rate,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A stored reading. The timestamp is kept exactly as the store holds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(skip_serializing)]
    pub id: ReadingId,
    pub sensor_id: SensorId,
    pub temp_in: f64,
    pub temp_out: f64,
    pub flow_rate: f64,
    pub timestamp: String,
}

/// Most recent raw timestamp recorded for one sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorLastSeen {
    pub sensor_id: SensorId,
    pub last_seen: String,
}

pub fn format_store_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(STORE_TIMESTAMP_FORMAT).to_string()
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unrecognized timestamp '{raw}'")]
pub struct TimestampParseError {
    pub raw: String,
}

/// Parses a stored timestamp into an absolute instant.
///
/// Values without an offset are taken as UTC, values with one are
/// converted to UTC. A bare date means midnight UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampParseError> {
    let value = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::<FixedOffset>::parse_from_str(value, format) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| TimestampParseError {
            raw: raw.to_string(),
        })
}
