//! Query engine — windowed, validated, ordered series retrieval.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{SensorCatalog, DEFAULT_MIN_SAMPLES};
use crate::store::TimeSeriesStore;
use crate::types::{Series, SeriesPoint, TelemetryError, TelemetryResult};

/// Fetches readings for one source and sensor type over a look-back window.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn TimeSeriesStore>,
    catalog: SensorCatalog,
    clock: Arc<dyn Clock>,
    min_samples: usize,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn TimeSeriesStore>, catalog: SensorCatalog, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            clock,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    /// Require at least `min_samples` readings (never fewer than two).
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(DEFAULT_MIN_SAMPLES);
        self
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Exclusive lower bound for a window ending now.
    pub fn lower_bound(&self, window_seconds: u64) -> i64 {
        let window = i64::try_from(window_seconds).unwrap_or(i64::MAX);
        self.clock.now_secs().saturating_sub(window)
    }

    /// Readings with `timestamp > now - window_seconds`, ascending by
    /// timestamp with ties ordered by content id.
    pub fn query(
        &self,
        source_id: &str,
        sensor_type: &str,
        window_seconds: u64,
    ) -> TelemetryResult<Series> {
        self.catalog.validate(sensor_type)?;

        let lower_bound = self.lower_bound(window_seconds);
        tracing::debug!(source_id, sensor_type, window_seconds, lower_bound, "Querying readings");

        let readings = self.store.find(source_id, sensor_type, lower_bound)?;
        if readings.len() < self.min_samples {
            tracing::debug!(
                source_id,
                sensor_type,
                found = readings.len(),
                "Not enough data to chart"
            );
            return Err(TelemetryError::InsufficientData {
                source_id: source_id.to_string(),
                sensor_type: sensor_type.to_string(),
                found: readings.len(),
                required: self.min_samples,
            });
        }

        let mut points: Vec<SeriesPoint> = readings
            .into_iter()
            .map(|r| SeriesPoint {
                timestamp: r.timestamp,
                value: r.value,
                content_id: r.content_id,
            })
            .collect();
        points.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });

        tracing::debug!(source_id, sensor_type, points = points.len(), "Data found");
        Ok(Series {
            source_id: source_id.to_string(),
            sensor_type: sensor_type.to_string(),
            window_seconds,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use crate::types::Reading;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store wrapper that counts `find` calls.
    struct CountingStore {
        inner: MemoryStore,
        finds: AtomicUsize,
    }

    impl TimeSeriesStore for CountingStore {
        fn find(&self, source_id: &str, sensor_type: &str, lower_bound: i64) -> TelemetryResult<Vec<Reading>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find(source_id, sensor_type, lower_bound)
        }

        fn insert(&self, reading: &Reading) -> TelemetryResult<bool> {
            self.inner.insert(reading)
        }

        fn count(&self, sensor_type: &str) -> TelemetryResult<usize> {
            self.inner.count(sensor_type)
        }
    }

    fn carrot_store() -> Arc<CountingStore> {
        let inner = MemoryStore::with_readings(vec![
            Reading::new("carrot-patch", "temperature", "HQ", 300, 11.0),
            Reading::new("carrot-patch", "temperature", "HQ", 100, 10.0),
            Reading::new("carrot-patch", "temperature", "HQ", 200, 12.0),
        ])
        .unwrap();
        Arc::new(CountingStore {
            inner,
            finds: AtomicUsize::new(0),
        })
    }

    fn engine(store: Arc<CountingStore>, now: i64) -> QueryEngine {
        QueryEngine::new(store, SensorCatalog::default(), Arc::new(FixedClock::at_secs(now)))
    }

    #[test]
    fn test_query_sorted_window() {
        let store = carrot_store();
        let series = engine(store, 350).query("carrot-patch", "temperature", 1000).unwrap();
        assert_eq!(series.pairs(), vec![(100, 10.0), (200, 12.0), (300, 11.0)]);
    }

    #[test]
    fn test_query_single_point_is_insufficient() {
        let store = carrot_store();
        let err = engine(store, 350).query("carrot-patch", "temperature", 50).unwrap_err();
        match err {
            TelemetryError::InsufficientData { found, required, .. } => {
                assert_eq!(found, 1);
                assert_eq!(required, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_query_lower_bound_is_exclusive() {
        let store = carrot_store();
        // lower bound 100: the reading at 100 is excluded
        let series = engine(store, 350).query("carrot-patch", "temperature", 250).unwrap();
        assert_eq!(series.pairs(), vec![(200, 12.0), (300, 11.0)]);
    }

    #[test]
    fn test_query_empty_is_insufficient() {
        let store = carrot_store();
        let err = engine(store, 350).query("nowhere", "temperature", 1000).unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn test_invalid_sensor_skips_store() {
        let store = carrot_store();
        let err = engine(store.clone(), 350).query("carrot-patch", "lux", 1000).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidSensorType(_)));
        assert_eq!(store.finds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ties_ordered_by_content_id() {
        let a = Reading::new("s", "humidity", "HQ", 50, 1.0);
        let b = Reading::new("s", "humidity", "HQ", 50, 2.0);
        let c = Reading::new("s", "humidity", "HQ", 10, 3.0);
        let inner = MemoryStore::with_readings(vec![b.clone(), c.clone(), a.clone()]).unwrap();
        let store = Arc::new(CountingStore { inner, finds: AtomicUsize::new(0) });
        let series = engine(store, 100).query("s", "humidity", 1000).unwrap();

        let mut tied = vec![a.content_id, b.content_id];
        tied.sort();
        let ids: Vec<String> = series.points.iter().map(|p| p.content_id.clone()).collect();
        assert_eq!(ids, vec![c.content_id, tied[0].clone(), tied[1].clone()]);
    }

    #[test]
    fn test_min_samples_never_below_two() {
        let store = carrot_store();
        let engine = engine(store, 350).with_min_samples(0);
        assert!(engine.query("carrot-patch", "temperature", 50).is_err());
    }

    #[test]
    fn test_huge_window_saturates() {
        let store = carrot_store();
        let series = engine(store, 350).query("carrot-patch", "temperature", u64::MAX).unwrap();
        assert_eq!(series.len(), 3);
    }
}
