//! Heatmap aggregation — latest in-window reading per known source, drawn
//! as coloured markers over the garden base map.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::query::QueryEngine;
use crate::raster::{HeatmapMarker, HeatmapSpec, Rasterizer};
use crate::types::{
    ArtifactHandle, ArtifactKind, CommittedArtifact, DeviceSet, TelemetryError, TelemetryResult,
};

/// Latest value of one source, or `None` when the source had no usable data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub source_id: String,
    pub value: Option<f64>,
    pub timestamp: Option<i64>,
}

impl HeatmapCell {
    pub fn has_data(&self) -> bool {
        self.value.is_some()
    }
}

/// A committed heatmap and the values it shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedHeatmap {
    pub artifact: ArtifactHandle,
    pub sensor_type: String,
    pub cells: Vec<HeatmapCell>,
    /// PNG bytes as committed.
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Canvas settings for heatmap snapshots.
#[derive(Debug, Clone)]
pub struct HeatmapLayout {
    pub width: u32,
    pub height: u32,
    pub base_map: Option<PathBuf>,
    pub marker_radius: u32,
}

pub struct HeatmapAggregator {
    engine: QueryEngine,
    devices: DeviceSet,
    window_seconds: u64,
    layout: HeatmapLayout,
    rasterizer: Arc<dyn Rasterizer>,
    artifacts: Arc<ArtifactStore>,
}

impl HeatmapAggregator {
    pub fn new(
        engine: QueryEngine,
        devices: DeviceSet,
        window_seconds: u64,
        layout: HeatmapLayout,
        rasterizer: Arc<dyn Rasterizer>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            engine,
            devices,
            window_seconds,
            layout,
            rasterizer,
            artifacts,
        }
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    /// Latest reading per device. Sources without enough data become
    /// "no data" cells; store outages abort.
    pub fn collect(&self, sensor_type: &str) -> TelemetryResult<Vec<HeatmapCell>> {
        self.engine.catalog().validate(sensor_type)?;

        let mut cells = Vec::with_capacity(self.devices.len());
        for device in self.devices.iter() {
            let cell = match self.engine.query(&device.source_id, sensor_type, self.window_seconds) {
                Ok(series) => {
                    let latest = series.latest();
                    HeatmapCell {
                        source_id: device.source_id.clone(),
                        value: latest.map(|p| p.value),
                        timestamp: latest.map(|p| p.timestamp),
                    }
                }
                Err(e @ TelemetryError::InsufficientData { .. }) => {
                    tracing::warn!("Heatmap source {} has no data: {e}", device.source_id);
                    HeatmapCell {
                        source_id: device.source_id.clone(),
                        value: None,
                        timestamp: None,
                    }
                }
                Err(e) => return Err(e),
            };
            cells.push(cell);
        }
        Ok(cells)
    }

    /// Build the snapshot for `sensor_type` and commit it.
    pub fn render(&self, sensor_type: &str) -> TelemetryResult<RenderedHeatmap> {
        let cells = self.collect(sensor_type)?;
        let spec = self.spec(&cells);
        let bytes = self.rasterizer.rasterize_heatmap(&spec)?;
        let CommittedArtifact { handle: artifact, bytes } =
            self.artifacts.save(ArtifactKind::Heatmap, bytes)?;
        tracing::info!(
            sensor_type,
            sources = cells.len(),
            with_data = cells.iter().filter(|c| c.has_data()).count(),
            "Rendered heatmap {}",
            artifact.id
        );
        Ok(RenderedHeatmap {
            artifact,
            sensor_type: sensor_type.to_string(),
            cells,
            bytes,
        })
    }

    fn spec(&self, cells: &[HeatmapCell]) -> HeatmapSpec {
        let scale = ColorScale::from_cells(cells);
        let markers = self
            .devices
            .iter()
            .zip(cells)
            .map(|(device, cell)| HeatmapMarker {
                source_id: device.source_id.clone(),
                x: device.x,
                y: device.y,
                color: cell.value.map(|v| scale.color(v)),
            })
            .collect();
        HeatmapSpec {
            width: self.layout.width,
            height: self.layout.height,
            base_map: self.layout.base_map.clone(),
            marker_radius: self.layout.marker_radius,
            markers,
        }
    }
}

/// Linear blue→red ramp over the range of values present in one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub min: f64,
    pub max: f64,
}

const COLD: [u8; 3] = [44, 123, 182];
const HOT: [u8; 3] = [215, 25, 28];

impl ColorScale {
    pub fn from_cells(cells: &[HeatmapCell]) -> Self {
        let (min, max) = cells
            .iter()
            .filter_map(|c| c.value)
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if min.is_finite() {
            Self { min, max }
        } else {
            Self { min: 0.0, max: 0.0 }
        }
    }

    /// Position of `value` on the ramp, 0.0 (cold) to 1.0 (hot). A single
    /// distinct value sits at the midpoint.
    pub fn intensity(&self, value: f64) -> f64 {
        if !value.is_finite() || self.max - self.min <= f64::EPSILON {
            return 0.5;
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    pub fn color(&self, value: f64) -> [u8; 3] {
        let t = self.intensity(value);
        let mut rgb = [0u8; 3];
        for (i, channel) in rgb.iter_mut().enumerate() {
            let c = f64::from(COLD[i]) + (f64::from(HOT[i]) - f64::from(COLD[i])) * t;
            *channel = c.round() as u8;
        }
        rgb
    }
}
