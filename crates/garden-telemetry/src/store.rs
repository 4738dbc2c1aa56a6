//! Time-series store seam and the two bundled backends.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use rusqlite::{params, Connection};

use crate::types::{Reading, TelemetryError, TelemetryResult};

/// Append-only readings, queryable by source and a timestamp lower bound.
pub trait TimeSeriesStore: Send + Sync {
    /// All readings of `sensor_type` from `source_id` with
    /// `timestamp > lower_bound`, in no particular order.
    fn find(
        &self,
        source_id: &str,
        sensor_type: &str,
        lower_bound: i64,
    ) -> TelemetryResult<Vec<Reading>>;

    /// Append a reading. Returns `false` when a reading with the same
    /// content id already exists for that sensor type.
    fn insert(&self, reading: &Reading) -> TelemetryResult<bool>;

    /// Append many readings, returning how many were new.
    fn insert_batch(&self, readings: &[Reading]) -> TelemetryResult<usize> {
        let mut inserted = 0;
        for reading in readings {
            if self.insert(reading)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Number of readings held for `sensor_type`.
    fn count(&self, sensor_type: &str) -> TelemetryResult<usize>;
}

/// In-process store, one bucket per sensor type.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Reading>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with `readings`, dropping duplicates.
    pub fn with_readings(readings: impl IntoIterator<Item = Reading>) -> TelemetryResult<Self> {
        let store = Self::new();
        for reading in readings {
            store.insert(&reading)?;
        }
        Ok(store)
    }
}

fn poisoned() -> TelemetryError {
    TelemetryError::StoreUnavailable("store lock poisoned".to_string())
}

impl TimeSeriesStore for MemoryStore {
    fn find(
        &self,
        source_id: &str,
        sensor_type: &str,
        lower_bound: i64,
    ) -> TelemetryResult<Vec<Reading>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .get(sensor_type)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.source_id == source_id && r.timestamp > lower_bound)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert(&self, reading: &Reading) -> TelemetryResult<bool> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let rows = tables.entry(reading.sensor_type.clone()).or_default();
        if rows.iter().any(|r| r.content_id == reading.content_id) {
            return Ok(false);
        }
        rows.push(reading.clone());
        Ok(true)
    }

    fn count(&self, sensor_type: &str) -> TelemetryResult<usize> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.get(sensor_type).map_or(0, Vec::len))
    }
}

/// SQLite-backed store holding one long-lived connection.
///
/// The connection is opened once and shared by every query; it closes when
/// the store is dropped.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at `path`.
    pub fn open(path: &Path) -> TelemetryResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TelemetryError::StoreUnavailable(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        let db = Connection::open(path)?;
        tracing::info!("Opened reading store: {}", path.display());
        Self::init(db)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> TelemetryResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> TelemetryResult<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS readings (
                sensor_type TEXT NOT NULL,
                content_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                site TEXT NOT NULL,
                time INTEGER NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (sensor_type, content_id)
            );
            CREATE INDEX IF NOT EXISTS readings_by_source_time
                ON readings (sensor_type, source_id, time);",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }
}

impl TimeSeriesStore for SqliteStore {
    fn find(
        &self,
        source_id: &str,
        sensor_type: &str,
        lower_bound: i64,
    ) -> TelemetryResult<Vec<Reading>> {
        let db = self.db.lock().map_err(|_| poisoned())?;
        let mut stmt = db.prepare_cached(
            "SELECT source_id, site, time, value, content_id FROM readings
             WHERE sensor_type = ?1 AND source_id = ?2 AND time > ?3",
        )?;
        let rows = stmt
            .query_map(params![sensor_type, source_id, lower_bound], |row| {
                Ok(Reading {
                    source_id: row.get(0)?,
                    sensor_type: sensor_type.to_string(),
                    site: row.get(1)?,
                    timestamp: row.get(2)?,
                    value: row.get(3)?,
                    content_id: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert(&self, reading: &Reading) -> TelemetryResult<bool> {
        let db = self.db.lock().map_err(|_| poisoned())?;
        Ok(insert_row(&db, reading)? > 0)
    }

    /// One transaction for the whole batch.
    fn insert_batch(&self, readings: &[Reading]) -> TelemetryResult<usize> {
        let mut db = self.db.lock().map_err(|_| poisoned())?;
        let tx = db.transaction()?;
        let mut inserted = 0;
        for reading in readings {
            inserted += insert_row(&tx, reading)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn count(&self, sensor_type: &str) -> TelemetryResult<usize> {
        let db = self.db.lock().map_err(|_| poisoned())?;
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM readings WHERE sensor_type = ?1",
            params![sensor_type],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn insert_row(db: &Connection, reading: &Reading) -> rusqlite::Result<usize> {
    let mut stmt = db.prepare_cached(
        "INSERT OR IGNORE INTO readings (sensor_type, content_id, source_id, site, time, value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    stmt.execute(params![
        reading.sensor_type,
        reading.content_id,
        reading.source_id,
        reading.site,
        reading.timestamp,
        reading.value
    ])
}
