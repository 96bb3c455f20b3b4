use axum::extract::FromRef;
use chrono::TimeDelta;

use crate::liveness::LivenessEvaluator;
use crate::readings_store::ReadingStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedReadingStore = Arc<dyn ReadingStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub reading_store: GuardedReadingStore,
    pub liveness: LivenessEvaluator,
}

impl ServerState {
    pub fn new(config: ServerConfig, reading_store: GuardedReadingStore) -> ServerState {
        let window = i64::try_from(config.liveness_window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        ServerState {
            liveness: LivenessEvaluator::new(reading_store.clone(), window),
            config,
            start_time: Instant::now(),
            reading_store,
        }
    }
}

impl FromRef<ServerState> for GuardedReadingStore {
    fn from_ref(input: &ServerState) -> Self {
        input.reading_store.clone()
    }
}

impl FromRef<ServerState> for LivenessEvaluator {
    fn from_ref(input: &ServerState) -> Self {
        input.liveness.clone()
    }
}
