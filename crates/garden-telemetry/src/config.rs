//! Pipeline configuration: sensor catalog, heatmap device set, render and
//! storage settings.
//!
//! Every struct deserializes with `#[serde(default)]`, so a configuration
//! file only has to name what it changes. The defaults reproduce the
//! deployment the pipeline was built for: five garden Pis on
//! `192.168.0.10`–`.50`, four sensor kinds, a 20 hour heatmap window and
//! 1024×600 images.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{DeviceSet, HeatmapDevice, TelemetryError, TelemetryResult};

/// Default heatmap look-back window in seconds (20 hours).
pub const DEFAULT_HEATMAP_WINDOW_SECS: u64 = 72_000;

/// Minimum number of readings needed to draw anything.
pub const DEFAULT_MIN_SAMPLES: usize = 2;

/// Core pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub sensors: Vec<SensorSpec>,
    pub query: QueryConfig,
    pub heatmap: HeatmapConfig,
    pub render: RenderConfig,
    pub artifacts: ArtifactConfig,
    pub store: StoreConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sensors: default_sensors(),
            query: QueryConfig::default(),
            heatmap: HeatmapConfig::default(),
            render: RenderConfig::default(),
            artifacts: ArtifactConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// The accepted sensor set.
    pub fn catalog(&self) -> SensorCatalog {
        SensorCatalog::new(self.sensors.clone())
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.sensors.is_empty() {
            return Err(TelemetryError::InvalidInput(
                "At least one sensor type must be configured".to_string(),
            ));
        }
        if self.query.min_samples < 2 {
            return Err(TelemetryError::InvalidInput(format!(
                "query.min_samples must be at least 2, got {}",
                self.query.min_samples
            )));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(TelemetryError::InvalidInput(format!(
                "render size must be non-zero, got {}x{}",
                self.render.width, self.render.height
            )));
        }
        Ok(())
    }
}

/// One accepted sensor type and its axis label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSpec {
    pub name: String,
    #[serde(default)]
    pub label: String,
}

impl SensorSpec {
    pub fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
        }
    }
}

fn default_sensors() -> Vec<SensorSpec> {
    vec![
        SensorSpec::new("temperature", "Temperature (°C)"),
        SensorSpec::new("humidity", "Humidity"),
        SensorSpec::new("pressure", "Pressure (hPa)"),
        SensorSpec::new("moisture", "Moisture (%)"),
    ]
}

/// The enumerated set of sensor types the pipeline accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCatalog {
    sensors: Vec<SensorSpec>,
}

impl Default for SensorCatalog {
    fn default() -> Self {
        Self::new(default_sensors())
    }
}

impl SensorCatalog {
    pub fn new(sensors: Vec<SensorSpec>) -> Self {
        Self { sensors }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sensors.iter().any(|s| s.name == name)
    }

    /// Fail with `InvalidSensorType` unless `name` is in the catalog.
    pub fn validate(&self, name: &str) -> TelemetryResult<()> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(TelemetryError::InvalidSensorType(name.to_string()))
        }
    }

    /// Axis label for a sensor type. Unknown or legacy codes get `""`.
    pub fn label(&self, name: &str) -> &str {
        self.sensors
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.label.as_str())
            .unwrap_or("")
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sensors.iter().map(|s| s.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    pub min_samples: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeatmapConfig {
    pub window_seconds: u64,
    /// Base map image drawn under the device markers.
    pub base_map: Option<PathBuf>,
    /// Marker radius in pixels.
    pub marker_radius: u32,
    pub devices: Vec<HeatmapDevice>,
}

impl HeatmapConfig {
    pub fn device_set(&self) -> DeviceSet {
        DeviceSet::new(self.devices.clone())
    }
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        let devices = (1..=5u32)
            .map(|i| HeatmapDevice {
                source_id: format!("192.168.0.{}", i * 10),
                x: 170 * i,
                y: if i % 2 == 0 { 200 } else { 400 },
            })
            .collect();
        Self {
            window_seconds: DEFAULT_HEATMAP_WINDOW_SECS,
            base_map: None,
            marker_radius: 28,
            devices,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("images"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Keep readings in memory instead of SQLite.
    pub memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("garden.db"),
            memory: false,
        }
    }
}
