//! Rasterizer seam and the bundled PNG implementation.
//!
//! The pipeline describes *what* to draw (`ChartSpec`, `HeatmapSpec`); a
//! [`Rasterizer`] turns that into encoded image bytes. `PngRasterizer`
//! paints frames, grid lines, polylines and markers with the `image` crate.
//! It draws no glyphs; titles and labels travel with the spec.

use std::io::Cursor;
use std::path::PathBuf;

use image::codecs::png::PngEncoder;
use image::{imageops::FilterType, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::render::{AxisConfig, MarkerStyle, Tick};
use crate::types::{TelemetryError, TelemetryResult};

/// Everything needed to draw one line chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// `(timestamp, value)`, ascending by timestamp.
    pub points: Vec<(i64, f64)>,
    pub axis: AxisConfig,
    pub ticks: Vec<Tick>,
    pub style: MarkerStyle,
    pub width: u32,
    pub height: u32,
}

/// One disc on the heatmap. `color: None` means "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapMarker {
    pub source_id: String,
    pub x: u32,
    pub y: u32,
    pub color: Option<[u8; 3]>,
}

/// Everything needed to draw one heatmap snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapSpec {
    pub width: u32,
    pub height: u32,
    pub base_map: Option<PathBuf>,
    pub marker_radius: u32,
    pub markers: Vec<HeatmapMarker>,
}

/// Turns drawing specs into encoded image bytes.
pub trait Rasterizer: Send + Sync {
    fn rasterize_chart(&self, chart: &ChartSpec) -> TelemetryResult<Vec<u8>>;
    fn rasterize_heatmap(&self, map: &HeatmapSpec) -> TelemetryResult<Vec<u8>>;
}

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const CANVAS: Rgb<u8> = Rgb([234, 234, 242]);
const FRAME: Rgb<u8> = Rgb([40, 40, 40]);
const MAJOR_GRID: Rgb<u8> = Rgb([190, 190, 200]);
const MINOR_GRID: Rgb<u8> = Rgb([220, 220, 228]);
const SERIES: Rgb<u8> = Rgb([49, 115, 176]);
const NO_DATA: Rgb<u8> = Rgb([150, 150, 150]);

const MARGIN_LEFT: u32 = 80;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_TOP: u32 = 40;
const MARGIN_BOTTOM: u32 = 70;
const MARKER_SIZE: i64 = 4;

/// PNG output via the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngRasterizer;

impl Rasterizer for PngRasterizer {
    fn rasterize_chart(&self, chart: &ChartSpec) -> TelemetryResult<Vec<u8>> {
        check_size(chart.width, chart.height)?;
        if chart.points.is_empty() {
            return Err(TelemetryError::RenderFailure("chart has no points".to_string()));
        }

        let mut img = RgbImage::from_pixel(chart.width, chart.height, BACKGROUND);
        let plot = PlotArea::new(chart.width, chart.height);
        fill_rect(&mut img, plot.x0, plot.y0, plot.x1, plot.y1, CANVAS);

        let t0 = chart.points[0].0;
        let t1 = chart.points[chart.points.len() - 1].0;
        let (v0, v1) = value_range(&chart.points);

        for tick in &chart.ticks {
            let x = plot.map_x(tick.timestamp, t0, t1);
            if tick.major {
                draw_line(&mut img, x, plot.y0, x, plot.y1, MAJOR_GRID);
                draw_line(&mut img, x, plot.y1, x, plot.y1 + 8, FRAME);
            } else {
                draw_line(&mut img, x, plot.y0, x, plot.y1, MINOR_GRID);
                draw_line(&mut img, x, plot.y1, x, plot.y1 + 4, FRAME);
            }
        }
        draw_rect(&mut img, plot.x0, plot.y0, plot.x1, plot.y1, FRAME);

        let pixels: Vec<(i64, i64)> = chart
            .points
            .iter()
            .map(|&(t, v)| (plot.map_x(t, t0, t1), plot.map_y(v, v0, v1)))
            .collect();

        match chart.style {
            MarkerStyle::LineWithMarkers => {
                for pair in pixels.windows(2) {
                    draw_line(&mut img, pair[0].0, pair[0].1, pair[1].0, pair[1].1, SERIES);
                }
                for &(x, y) in &pixels {
                    draw_cross(&mut img, x, y, MARKER_SIZE, SERIES);
                }
            }
        }

        encode_png(&img)
    }

    fn rasterize_heatmap(&self, map: &HeatmapSpec) -> TelemetryResult<Vec<u8>> {
        if map.width == 0 || map.height == 0 {
            return Err(TelemetryError::RenderFailure(format!(
                "canvas {}x{} is empty",
                map.width, map.height
            )));
        }

        let mut img = match &map.base_map {
            Some(path) => {
                let base = image::open(path).map_err(|e| {
                    TelemetryError::RenderFailure(format!(
                        "Failed to load base map {}: {e}",
                        path.display()
                    ))
                })?;
                base.resize_exact(map.width, map.height, FilterType::Triangle)
                    .to_rgb8()
            }
            None => RgbImage::from_pixel(map.width, map.height, CANVAS),
        };

        let r = i64::from(map.marker_radius.max(1));
        for marker in &map.markers {
            let (cx, cy) = (i64::from(marker.x), i64::from(marker.y));
            match marker.color {
                Some(rgb) => {
                    fill_circle(&mut img, cx, cy, r, Rgb(rgb));
                    draw_circle(&mut img, cx, cy, r, FRAME);
                }
                None => {
                    fill_circle(&mut img, cx, cy, r, NO_DATA);
                    draw_circle(&mut img, cx, cy, r, FRAME);
                    let arm = r * 7 / 10;
                    draw_cross(&mut img, cx, cy, arm, FRAME);
                }
            }
        }

        encode_png(&img)
    }
}

fn check_size(width: u32, height: u32) -> TelemetryResult<()> {
    if width <= MARGIN_LEFT + MARGIN_RIGHT || height <= MARGIN_TOP + MARGIN_BOTTOM {
        return Err(TelemetryError::RenderFailure(format!(
            "canvas {width}x{height} is too small"
        )));
    }
    Ok(())
}

fn encode_png(img: &RgbImage) -> TelemetryResult<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(Cursor::new(&mut buf));
    img.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Min/max of the values, widened so a flat series sits mid-plot.
fn value_range(points: &[(i64, f64)]) -> (f64, f64) {
    let (lo, hi) = points
        .iter()
        .map(|p| p.1)
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

struct PlotArea {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl PlotArea {
    fn new(width: u32, height: u32) -> Self {
        Self {
            x0: i64::from(MARGIN_LEFT),
            y0: i64::from(MARGIN_TOP),
            x1: i64::from(width - MARGIN_RIGHT),
            y1: i64::from(height - MARGIN_BOTTOM),
        }
    }

    fn map_x(&self, t: i64, t0: i64, t1: i64) -> i64 {
        if t1 <= t0 {
            return (self.x0 + self.x1) / 2;
        }
        let frac = (t - t0) as f64 / (t1 - t0) as f64;
        self.x0 + (frac * (self.x1 - self.x0) as f64).round() as i64
    }

    fn map_y(&self, v: f64, v0: f64, v1: f64) -> i64 {
        let frac = if v.is_finite() { (v - v0) / (v1 - v0) } else { 0.0 };
        self.y1 - (frac * (self.y1 - self.y0) as f64).round() as i64
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line, clipped to the image.
fn draw_line(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    loop {
        put(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_rect(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    draw_line(img, x0, y0, x1, y0, color);
    draw_line(img, x1, y0, x1, y1, color);
    draw_line(img, x1, y1, x0, y1, color);
    draw_line(img, x0, y1, x0, y0, color);
}

fn fill_rect(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            put(img, x, y, color);
        }
    }
}

fn draw_cross(img: &mut RgbImage, x: i64, y: i64, arm: i64, color: Rgb<u8>) {
    draw_line(img, x - arm, y - arm, x + arm, y + arm, color);
    draw_line(img, x - arm, y + arm, x + arm, y - arm, color);
}

fn fill_circle(img: &mut RgbImage, cx: i64, cy: i64, r: i64, color: Rgb<u8>) {
    for y in -r..=r {
        for x in -r..=r {
            if x * x + y * y <= r * r {
                put(img, cx + x, cy + y, color);
            }
        }
    }
}

/// Midpoint circle outline.
fn draw_circle(img: &mut RgbImage, cx: i64, cy: i64, r: i64, color: Rgb<u8>) {
    let (mut x, mut y, mut err) = (r, 0i64, 1 - r);
    while x >= y {
        for (px, py) in [(x, y), (y, x), (-y, x), (-x, y), (-x, -y), (-y, -x), (y, -x), (x, -y)] {
            put(img, cx + px, cy + py, color);
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}
