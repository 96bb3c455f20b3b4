//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own readings database.

use super::constants::*;
use sensor_telemetry_server::readings_store::SqliteReadingStore;
use sensor_telemetry_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated database
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Path of the SQLite file backing the server, for direct inspection
    pub db_path: PathBuf,

    /// Store shared with the running server
    pub store: Arc<SqliteReadingStore>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: Option<TempDir>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port backed by a fresh database
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created or the server fails to start.
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_db_dir.path().join("sensor_data.db");

        let mut server = Self::spawn_with_db(&db_path).await;
        server._temp_db_dir = Some(temp_db_dir);
        server
    }

    /// Spawns a test server on an existing (or not yet created) database file.
    /// The caller owns the file and its directory.
    pub async fn spawn_with_db(db_path: &Path) -> Self {
        let store =
            Arc::new(SqliteReadingStore::new(db_path, 2).expect("Failed to open reading store"));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };

        let app = make_app(config, store.clone());

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            db_path: db_path.to_path_buf(),
            store,
            _temp_db_dir: None,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Writes a row straight into the database, bypassing the API, so tests
    /// can plant readings with arbitrary timestamps.
    pub fn insert_raw_reading(&self, sensor_id: &str, timestamp: &str) {
        let conn = rusqlite::Connection::open(&self.db_path).expect("Failed to open database");
        conn.execute(
            "INSERT INTO sensor_data (sensor_id, temp_in, temp_out, flow_rate, timestamp)
             VALUES (?1, 50.0, 30.0, 1.0, ?2)",
            rusqlite::params![sensor_id, timestamp],
        )
        .expect("Failed to insert raw reading");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
