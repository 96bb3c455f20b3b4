//! Sensor liveness.
//!
//! A sensor is offline when its most recent reading is older than the
//! freshness window. Sensors that never reported are unknown, not offline.

use crate::readings_store::{
    parse_timestamp, ReadingStore, SensorId, SensorLastSeen, StoreError,
};
use crate::server::metrics;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const FRESHNESS_WINDOW: TimeDelta = TimeDelta::minutes(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineSensor {
    pub sensor_id: SensorId,
    /// Last-seen timestamp exactly as stored.
    pub last_seen: String,
}

/// Returns the sensors whose last reading is strictly earlier than
/// `now - window`, keeping the order of `rows`.
///
/// A row whose timestamp cannot be parsed is logged and skipped; it never
/// affects the classification of the other rows.
pub fn find_offline_sensors(
    rows: &[SensorLastSeen],
    now: DateTime<Utc>,
    window: TimeDelta,
) -> Vec<OfflineSensor> {
    // None when the window reaches past the earliest representable instant
    let threshold = now.checked_sub_signed(window);

    let (parsed, failed): (Vec<_>, Vec<_>) = rows
        .iter()
        .map(|row| parse_timestamp(&row.last_seen).map(|last_seen| (row, last_seen)))
        .partition(Result::is_ok);

    for err in failed.into_iter().filter_map(Result::err) {
        error!("Could not evaluate sensor liveness: {}", err);
        metrics::record_timestamp_parse_failure();
    }

    parsed
        .into_iter()
        .filter_map(Result::ok)
        .filter(|(_, last_seen)| threshold.is_some_and(|threshold| *last_seen < threshold))
        .map(|(row, _)| {
            warn!(
                "Sensor {} is offline. Last seen: {}",
                row.sensor_id, row.last_seen
            );
            OfflineSensor {
                sensor_id: row.sensor_id.clone(),
                last_seen: row.last_seen.clone(),
            }
        })
        .collect()
}

/// Computes the offline sensors from the store using the wall clock.
#[derive(Clone)]
pub struct LivenessEvaluator {
    store: Arc<dyn ReadingStore>,
    window: TimeDelta,
}

impl LivenessEvaluator {
    pub fn new(store: Arc<dyn ReadingStore>, window: TimeDelta) -> Self {
        LivenessEvaluator { store, window }
    }

    pub fn evaluate(&self) -> Result<Vec<OfflineSensor>, StoreError> {
        self.evaluate_at(Utc::now())
    }

    pub fn evaluate_at(&self, now: DateTime<Utc>) -> Result<Vec<OfflineSensor>, StoreError> {
        let rows = self.store.latest_per_sensor()?;
        let offline = find_offline_sensors(&rows, now, self.window);
        debug!(
            "Liveness check: {} known sensors, {} offline",
            rows.len(),
            offline.len()
        );
        metrics::set_offline_sensors(offline.len());
        Ok(offline)
    }
}
