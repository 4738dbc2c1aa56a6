//! Core data types for sensor readings, series, and rendered artifacts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single sensor measurement as kept by the time-series store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub source_id: String,
    pub sensor_type: String,
    pub site: String,
    pub timestamp: i64,
    pub value: f64,
    pub content_id: String,
}

impl Reading {
    /// Build a reading and derive its content id.
    pub fn new(
        source_id: impl Into<String>,
        sensor_type: impl Into<String>,
        site: impl Into<String>,
        timestamp: i64,
        value: f64,
    ) -> Self {
        let source_id = source_id.into();
        let site = site.into();
        let content_id = content_id(&source_id, timestamp, &site, value);
        Self {
            source_id,
            sensor_type: sensor_type.into(),
            site,
            timestamp,
            value,
            content_id,
        }
    }
}

/// Digest of `(source_id, timestamp, site, value)` in that order.
///
/// Identical inputs always produce the same id, so it doubles as the
/// deduplication key in the bundled stores.
pub fn content_id(source_id: &str, timestamp: i64, site: &str, value: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(site.as_bytes());
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One point of a queried series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub value: f64,
    pub content_id: String,
}

/// Ordered readings for one source and sensor type within a window.
///
/// Built only by the query engine, which guarantees at least the configured
/// minimum number of points in ascending `(timestamp, content_id)` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub source_id: String,
    pub sensor_type: String,
    pub window_seconds: u64,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    /// The most recent point.
    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    /// Seconds between the first and last point.
    pub fn span(&self) -> i64 {
        match (self.first(), self.latest()) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => 0,
        }
    }

    /// `(timestamp, value)` pairs.
    pub fn pairs(&self) -> Vec<(i64, f64)> {
        self.points.iter().map(|p| (p.timestamp, p.value)).collect()
    }
}

/// Identifier of a rendered artifact: its creation time in POSIX microseconds.
///
/// Displays as fractional seconds (`1700000000.123456`), which is also the
/// artifact's file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(i64);

impl ArtifactId {
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.div_euclid(1_000_000);
        let micros = self.0.rem_euclid(1_000_000);
        write!(f, "{secs}.{micros:06}")
    }
}

impl FromStr for ArtifactId {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TelemetryError::InvalidInput(format!("Invalid artifact id: {s}"));
        let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
        if secs.is_empty() || frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let secs: i64 = secs.parse().map_err(|_| invalid())?;
        if secs < 0 {
            return Err(invalid());
        }
        let micros: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<6}").parse().map_err(|_| invalid())?
        };
        secs.checked_mul(1_000_000)
            .and_then(|s| s.checked_add(micros))
            .map(ArtifactId)
            .ok_or_else(invalid)
    }
}

impl Serialize for ArtifactId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArtifactId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What an artifact depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    LineChart,
    Heatmap,
}

/// A committed artifact in the artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub bytes_len: usize,
}

/// An artifact as it was committed, with the exact bytes written for it.
#[derive(Debug, Clone)]
pub struct CommittedArtifact {
    pub handle: ArtifactHandle,
    pub bytes: Vec<u8>,
}

/// A source placed on the heatmap base image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapDevice {
    pub source_id: String,
    /// Horizontal pixel position on the base map.
    pub x: u32,
    /// Vertical pixel position on the base map.
    pub y: u32,
}

/// The fixed set of sources aggregated into a heatmap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSet {
    pub devices: Vec<HeatmapDevice>,
}

impl DeviceSet {
    pub fn new(devices: Vec<HeatmapDevice>) -> Self {
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeatmapDevice> {
        self.devices.iter()
    }
}

/// Errors that can occur in the telemetry pipeline.
#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid sensor type: {0}")]
    InvalidSensorType(String),

    #[error("Not enough data for {source_id}/{sensor_type}: found {found}, need {required}")]
    InsufficientData {
        source_id: String,
        sensor_type: String,
        found: usize,
        required: usize,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Render failure: {0}")]
    RenderFailure(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact storage error: {0}")]
    ArtifactStorage(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TelemetryError {
    /// True for the expected "nothing to chart" outcome.
    pub fn is_no_data(&self) -> bool {
        matches!(self, TelemetryError::InsufficientData { .. })
    }
}

impl From<rusqlite::Error> for TelemetryError {
    fn from(e: rusqlite::Error) -> Self {
        TelemetryError::StoreUnavailable(e.to_string())
    }
}

impl From<image::ImageError> for TelemetryError {
    fn from(e: image::ImageError) -> Self {
        TelemetryError::RenderFailure(e.to_string())
    }
}

/// Convenience result type.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_stable() {
        let a = Reading::new("192.168.0.10", "temperature", "HQ", 100, 12.5);
        let b = Reading::new("192.168.0.10", "humidity", "HQ", 100, 12.5);
        assert_eq!(a.content_id, b.content_id);
        assert_eq!(a.content_id.len(), 64);

        let c = Reading::new("192.168.0.10", "temperature", "HQ", 101, 12.5);
        assert_ne!(a.content_id, c.content_id);
    }

    #[test]
    fn test_artifact_id_display_and_parse() {
        let id = ArtifactId::from_micros(1_700_000_000_000_042);
        assert_eq!(id.to_string(), "1700000000.000042");
        assert_eq!("1700000000.000042".parse::<ArtifactId>().unwrap(), id);
        assert_eq!(
            "1700000000.5".parse::<ArtifactId>().unwrap(),
            ArtifactId::from_micros(1_700_000_000_500_000)
        );
        assert_eq!(
            "12".parse::<ArtifactId>().unwrap(),
            ArtifactId::from_micros(12_000_000)
        );
    }

    #[test]
    fn test_artifact_id_rejects_garbage() {
        assert!("".parse::<ArtifactId>().is_err());
        assert!("abc".parse::<ArtifactId>().is_err());
        assert!("1.2345678".parse::<ArtifactId>().is_err());
        assert!("../etc/passwd".parse::<ArtifactId>().is_err());
        assert!("-5.0".parse::<ArtifactId>().is_err());
    }

    #[test]
    fn test_series_latest_and_span() {
        let series = Series {
            source_id: "carrot-patch".to_string(),
            sensor_type: "temperature".to_string(),
            window_seconds: 1000,
            points: vec![
                SeriesPoint { timestamp: 100, value: 10.0, content_id: "a".into() },
                SeriesPoint { timestamp: 300, value: 11.0, content_id: "b".into() },
            ],
        };
        assert_eq!(series.latest().unwrap().timestamp, 300);
        assert_eq!(series.span(), 200);
        assert_eq!(series.pairs(), vec![(100, 10.0), (300, 11.0)]);
    }
}
