//! Request and response bodies of the JSON API.

use serde::{Deserialize, Serialize};

use garden_telemetry::{ArtifactId, HeatmapCell, Reading};

/// Default look-back window for the JSON series endpoint (one day).
pub const DEFAULT_SERIES_WINDOW_SECS: u64 = 86_400;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesParams {
    pub window: Option<u64>,
}

/// A reading as posted by a sensor node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingInput {
    pub source_id: String,
    pub sensor_type: String,
    #[serde(default = "default_site")]
    pub site: String,
    /// POSIX seconds; the server clock is used when absent.
    pub timestamp: Option<i64>,
    pub value: f64,
}

fn default_site() -> String {
    "HQ".to_string()
}

impl ReadingInput {
    pub fn into_reading(self, now_secs: i64) -> Reading {
        Reading::new(
            self.source_id,
            self.sensor_type,
            self.site,
            self.timestamp.unwrap_or(now_secs),
            self.value,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingAccepted {
    pub content_id: String,
    /// False when an identical reading was already stored.
    pub inserted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapResponse {
    pub artifact_id: ArtifactId,
    pub sensor_type: String,
    pub cells: Vec<HeatmapCell>,
}
