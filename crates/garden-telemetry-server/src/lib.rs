//! Garden telemetry server — HTTP endpoints and CLI over the telemetry
//! pipeline.

pub mod config;
pub mod dispatch;
pub mod seed;
pub mod transport;
pub mod types;

pub use config::{resolve_config_path, ServerConfig};
pub use dispatch::DeviceRegistry;
pub use transport::{router, HttpTransport};
