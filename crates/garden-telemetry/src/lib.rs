//! Garden telemetry — time-series queries over garden sensor readings,
//! chart and heatmap rendering, and single-slot artifact storage.

pub mod artifact;
pub mod clock;
pub mod config;
pub mod heatmap;
pub mod query;
pub mod raster;
pub mod render;
pub mod service;
pub mod store;
pub mod types;

pub use artifact::ArtifactStore;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{SensorCatalog, SensorSpec, TelemetryConfig};
pub use heatmap::{HeatmapAggregator, HeatmapCell, RenderedHeatmap};
pub use query::QueryEngine;
pub use raster::{PngRasterizer, Rasterizer};
pub use render::{AxisConfig, SeriesRenderer};
pub use service::TelemetryService;
pub use store::{MemoryStore, SqliteStore, TimeSeriesStore};
pub use types::*;
