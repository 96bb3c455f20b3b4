pub mod config;
mod http_layers;
pub mod metrics;
pub mod sensor_routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use sensor_routes::ApiError;
pub use server::{make_app, run_server};
