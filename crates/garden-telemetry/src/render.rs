//! Series rendering — maps a queried series onto labelled, tick-tiered axes
//! and hands it to the rasterizer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::config::SensorCatalog;
use crate::raster::{ChartSpec, Rasterizer};
use crate::types::{ArtifactKind, CommittedArtifact, Series, TelemetryResult};

/// Windows shorter than this get 4-hourly minor ticks.
pub const MINOR_TICK_WINDOW_SECS: u64 = 172_800;

/// Windows shorter than this get daily major ticks; longer ones every 5 days.
pub const DAILY_TICK_WINDOW_SECS: u64 = 864_000;

const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;

/// Upper bound on generated ticks per axis.
const MAX_TICKS: usize = 500;

/// Spacing and label format of one tick level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSpec {
    pub interval_secs: i64,
    /// chrono strftime pattern.
    pub format: String,
}

impl TickSpec {
    fn new(interval_secs: i64, format: &str) -> Self {
        Self {
            interval_secs,
            format: format.to_string(),
        }
    }
}

/// Time-axis tick levels chosen from the query window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub major: TickSpec,
    pub minor: Option<TickSpec>,
}

impl AxisConfig {
    /// Tick density proportional to the query window, not the data span.
    pub fn for_window(window_seconds: u64) -> Self {
        let minor = (window_seconds < MINOR_TICK_WINDOW_SECS).then(|| TickSpec::new(4 * HOUR, "%H:%M"));
        let major = if window_seconds < DAILY_TICK_WINDOW_SECS {
            TickSpec::new(DAY, "%d-%m-%Y")
        } else {
            TickSpec::new(5 * DAY, "%d-%m-%Y")
        };
        Self { major, minor }
    }

    /// Tick positions within `[start, end]`, majors first then minors that
    /// do not coincide with a major.
    pub fn ticks(&self, start: i64, end: i64) -> Vec<Tick> {
        let mut ticks = aligned(&self.major, start, end, true);
        if let Some(minor) = &self.minor {
            let majors: Vec<i64> = ticks.iter().map(|t| t.timestamp).collect();
            ticks.extend(
                aligned(minor, start, end, false)
                    .into_iter()
                    .filter(|t| !majors.contains(&t.timestamp)),
            );
        }
        ticks
    }
}

/// A labelled position on the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: i64,
    pub label: String,
    pub major: bool,
}

fn aligned(spec: &TickSpec, start: i64, end: i64, major: bool) -> Vec<Tick> {
    if spec.interval_secs <= 0 || end < start {
        return Vec::new();
    }
    let first = start.div_euclid(spec.interval_secs) * spec.interval_secs;
    let first = if first < start { first + spec.interval_secs } else { first };
    let mut ticks = Vec::new();
    let mut t = first;
    while t <= end && ticks.len() < MAX_TICKS {
        ticks.push(Tick {
            timestamp: t,
            label: format_ts(t, &spec.format),
            major,
        });
        t = match t.checked_add(spec.interval_secs) {
            Some(next) => next,
            None => break,
        };
    }
    ticks
}

fn format_ts(ts: i64, format: &str) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format(format).to_string())
        .unwrap_or_default()
}

/// How points are drawn. Always markers joined by lines so sparse series
/// stay legible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStyle {
    LineWithMarkers,
}

/// Turns series into line-chart artifacts.
pub struct SeriesRenderer {
    catalog: SensorCatalog,
    rasterizer: Arc<dyn Rasterizer>,
    artifacts: Arc<ArtifactStore>,
    width: u32,
    height: u32,
}

impl SeriesRenderer {
    pub fn new(
        catalog: SensorCatalog,
        rasterizer: Arc<dyn Rasterizer>,
        artifacts: Arc<ArtifactStore>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            catalog,
            rasterizer,
            artifacts,
            width,
            height,
        }
    }

    /// Labelled chart description for `series`.
    pub fn chart_spec(&self, series: &Series) -> ChartSpec {
        let label = self.catalog.label(&series.sensor_type).to_string();
        let axis = AxisConfig::for_window(series.window_seconds);
        let (start, end) = match (series.first(), series.latest()) {
            (Some(a), Some(b)) => (a.timestamp, b.timestamp),
            _ => (0, 0),
        };
        let ticks = axis.ticks(start, end);

        ChartSpec {
            title: format!("Graph showing {label} against Time."),
            x_label: "Date & Time".to_string(),
            y_label: label,
            points: series.pairs(),
            axis,
            ticks,
            style: MarkerStyle::LineWithMarkers,
            width: self.width,
            height: self.height,
        }
    }

    /// Rasterize `series` and commit it as the current artifact.
    pub fn render(&self, series: &Series) -> TelemetryResult<CommittedArtifact> {
        let spec = self.chart_spec(series);
        tracing::debug!(
            source_id = %series.source_id,
            sensor_type = %series.sensor_type,
            points = spec.points.len(),
            span_secs = series.span(),
            "Plotting series"
        );
        let bytes = self.rasterizer.rasterize_chart(&spec)?;
        self.artifacts.save(ArtifactKind::LineChart, bytes)
    }
}
