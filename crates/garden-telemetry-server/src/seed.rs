//! Fake-data generator for demos and local development.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use garden_telemetry::{Reading, TelemetryResult, TelemetryService};

/// Site recorded on generated readings.
pub const SEED_SITE: &str = "HQ";

#[derive(Debug, Clone)]
pub struct SeedPlan {
    /// Spread readings over this many days before `now`.
    pub days: u32,
    /// Readings per sensor type, spread randomly across sources.
    pub readings_per_sensor: usize,
    /// Fixed RNG seed for reproducible data.
    pub seed: Option<u64>,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            days: 30,
            readings_per_sensor: 10_000,
            seed: None,
        }
    }
}

/// Random readings with whole-number values in 0..=100 and timestamps in
/// `[now - days, now)`.
pub fn generate(plan: &SeedPlan, sources: &[String], sensors: &[String], now: i64) -> Vec<Reading> {
    if sources.is_empty() || sensors.is_empty() {
        return Vec::new();
    }
    let mut rng = match plan.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let start = now - i64::from(plan.days.max(1)) * 86_400;

    let mut readings = Vec::with_capacity(sensors.len() * plan.readings_per_sensor);
    for sensor in sensors {
        for _ in 0..plan.readings_per_sensor {
            let source = &sources[rng.gen_range(0..sources.len())];
            let timestamp = rng.gen_range(start..now);
            let value = f64::from(rng.gen_range(0..=100u8));
            readings.push(Reading::new(source.as_str(), sensor.as_str(), SEED_SITE, timestamp, value));
        }
    }
    readings
}

/// Generate and ingest readings for every heatmap source and catalog
/// sensor. Returns how many were new.
pub fn seed_service(
    service: &TelemetryService,
    sources: &[String],
    plan: &SeedPlan,
    now: i64,
) -> TelemetryResult<usize> {
    let sensors: Vec<String> = service.catalog().names().map(str::to_string).collect();
    let readings = generate(plan, sources, &sensors, now);
    let inserted = service.record_batch(&readings)?;
    tracing::info!(
        "Seeded {inserted} of {} readings for {} sources",
        readings.len(),
        sources.len()
    );
    Ok(inserted)
}
