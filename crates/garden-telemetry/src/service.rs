//! Query API — the single entry point the boundary layer talks to.

use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::clock::{Clock, SystemClock};
use crate::config::{SensorCatalog, TelemetryConfig};
use crate::heatmap::{HeatmapAggregator, HeatmapLayout, RenderedHeatmap};
use crate::query::QueryEngine;
use crate::raster::{PngRasterizer, Rasterizer};
use crate::render::SeriesRenderer;
use crate::store::{MemoryStore, SqliteStore, TimeSeriesStore};
use crate::types::{
    ArtifactHandle, ArtifactId, CommittedArtifact, DeviceSet, Reading, Series, TelemetryResult,
};

/// Owns the shared store handle, renderers and artifact directory for the
/// lifetime of the process.
pub struct TelemetryService {
    store: Arc<dyn TimeSeriesStore>,
    engine: QueryEngine,
    renderer: SeriesRenderer,
    heatmap: HeatmapAggregator,
    artifacts: Arc<ArtifactStore>,
}

impl TelemetryService {
    /// Open the configured store and artifact directory with the system
    /// clock and the PNG rasterizer.
    pub fn open(config: &TelemetryConfig) -> TelemetryResult<Self> {
        config.validate()?;
        let store: Arc<dyn TimeSeriesStore> = if config.store.memory {
            tracing::info!("Using in-memory reading store");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(SqliteStore::open(&config.store.path)?)
        };
        Self::with_parts(config, store, Arc::new(SystemClock), Arc::new(PngRasterizer))
    }

    /// Assemble a service from explicit collaborators.
    pub fn with_parts(
        config: &TelemetryConfig,
        store: Arc<dyn TimeSeriesStore>,
        clock: Arc<dyn Clock>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> TelemetryResult<Self> {
        config.validate()?;
        let catalog = config.catalog();
        let artifacts = Arc::new(ArtifactStore::open(&config.artifacts.dir, clock.clone())?);

        let engine = QueryEngine::new(store.clone(), catalog.clone(), clock)
            .with_min_samples(config.query.min_samples);

        let renderer = SeriesRenderer::new(
            catalog,
            rasterizer.clone(),
            artifacts.clone(),
            config.render.width,
            config.render.height,
        );

        let heatmap = HeatmapAggregator::new(
            engine.clone(),
            config.heatmap.device_set(),
            config.heatmap.window_seconds,
            HeatmapLayout {
                width: config.render.width,
                height: config.render.height,
                base_map: config.heatmap.base_map.clone(),
                marker_radius: config.heatmap.marker_radius,
            },
            rasterizer,
            artifacts.clone(),
        );

        Ok(Self {
            store,
            engine,
            renderer,
            heatmap,
            artifacts,
        })
    }

    pub fn catalog(&self) -> &SensorCatalog {
        self.engine.catalog()
    }

    /// Sources shown on heatmaps.
    pub fn devices(&self) -> &DeviceSet {
        self.heatmap.devices()
    }

    pub fn now_secs(&self) -> i64 {
        self.engine.clock().now_secs()
    }

    /// Ordered readings without rendering.
    pub fn series_data(
        &self,
        source_id: &str,
        sensor_type: &str,
        window_seconds: u64,
    ) -> TelemetryResult<Series> {
        self.engine.query(source_id, sensor_type, window_seconds)
    }

    /// Query, render and commit a line chart. The bytes in the result are
    /// the committed PNG even if a later render has since replaced it.
    pub fn get_series(
        &self,
        source_id: &str,
        sensor_type: &str,
        window_seconds: u64,
    ) -> TelemetryResult<CommittedArtifact> {
        let series = self.engine.query(source_id, sensor_type, window_seconds)?;
        self.renderer.render(&series)
    }

    /// Render and commit a heatmap snapshot over the configured device set.
    pub fn get_heatmap(&self, sensor_type: &str) -> TelemetryResult<RenderedHeatmap> {
        self.heatmap.render(sensor_type)
    }

    pub fn artifact(&self, id: ArtifactId) -> TelemetryResult<Vec<u8>> {
        self.artifacts.get(id)
    }

    pub fn current_artifact(&self) -> TelemetryResult<Option<ArtifactHandle>> {
        self.artifacts.current()
    }

    /// Ingest a reading. Only sensor types from the catalog are accepted.
    pub fn record(&self, reading: &Reading) -> TelemetryResult<bool> {
        self.catalog().validate(&reading.sensor_type)?;
        self.store.insert(reading)
    }

    /// Ingest many readings at once. Returns how many were new.
    pub fn record_batch(&self, readings: &[Reading]) -> TelemetryResult<usize> {
        for reading in readings {
            self.catalog().validate(&reading.sensor_type)?;
        }
        self.store.insert_batch(readings)
    }

    /// Readings held per configured sensor type.
    pub fn reading_counts(&self) -> TelemetryResult<Vec<(String, usize)>> {
        self.catalog()
            .names()
            .map(|name| {
                self.store
                    .count(name)
                    .map(|count| (name.to_string(), count))
            })
            .collect()
    }
}
