// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Database module for baseline persistence and anomaly history

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::analysis::BaselineModel;
use crate::core::{AnomalyRecord, IncompleteCycle, PowerState};
use crate::error::{CycleError, Result};

/// Baseline snapshot as stored on disk
#[derive(Debug, Clone)]
pub struct BaselineSnapshot {
    pub device: String,
    pub population: Vec<f64>,
    pub mean: f64,
    pub stdev: f64,
    /// Timestamp of the newest sample processed when the snapshot was taken
    pub last_sample: Option<DateTime<Utc>>,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct StoredAnomaly {
    pub id: String,
    pub record: AnomalyRecord,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub snapshot_count: usize,
    pub anomaly_count: usize,
    pub incomplete_count: usize,
}

/// SQLite-backed store for per-device baselines
pub struct BaselineStore {
    conn: Mutex<Connection>,
}

impl BaselineStore {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        "#,
        )?;

        let store = Self { conn: Mutex::new(conn) };
        store.create_tables()?;

        info!("Baseline store opened at {:?}", path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS baselines (
                device TEXT PRIMARY KEY,
                mean REAL NOT NULL,
                stdev REAL NOT NULL,
                population_len INTEGER NOT NULL,
                population BLOB NOT NULL,
                last_sample TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS anomalies (
                id TEXT PRIMARY KEY,
                device TEXT NOT NULL,
                timestamp_start TEXT NOT NULL,
                timestamp_end TEXT NOT NULL,
                valid_anomaly INTEGER NOT NULL,
                action_taken INTEGER NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_anomalies_device ON anomalies(device, timestamp_start);

            CREATE TABLE IF NOT EXISTS incomplete_cycles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device TEXT NOT NULL,
                label TEXT NOT NULL,
                start TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                samples BLOB NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;

        // Databases created before the watermark column existed
        let has_last_sample = conn
            .prepare("SELECT 1 FROM pragma_table_info('baselines') WHERE name = 'last_sample'")?
            .exists([])?;
        if !has_last_sample {
            conn.execute_batch("ALTER TABLE baselines ADD COLUMN last_sample TEXT;")?;
        }

        Ok(())
    }

    /// Replace the device's stored baseline with the model's current population.
    ///
    /// `last_sample` is the newest sample timestamp the population accounts
    /// for; a restarted monitor skips anything at or before it.
    pub fn save_baseline(
        &self,
        device: &str,
        model: &BaselineModel,
        last_sample: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let population = model.population();
        let blob = bincode::serialize(&population)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"INSERT OR REPLACE INTO baselines
               (device, mean, stdev, population_len, population, last_sample, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                device,
                model.mean(),
                model.stdev(),
                population.len() as i64,
                blob,
                last_sample.map(|ts| ts.to_rfc3339()),
                Utc::now().to_rfc3339()
            ],
        )?;

        debug!("Saved baseline for {} ({} values)", device, population.len());
        Ok(())
    }

    /// Raw stored snapshot for a device
    pub fn load_snapshot(&self, device: &str) -> Result<Option<BaselineSnapshot>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                "SELECT mean, stdev, population, last_sample, updated_at FROM baselines WHERE device = ?1",
                params![device],
                |row| {
                    let last_sample = row
                        .get::<_, Option<String>>(3)?
                        .map(|text| parse_stored_time(&text, 3))
                        .transpose()?;
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        last_sample,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((mean, stdev, blob, last_sample, updated_at)) => Ok(Some(BaselineSnapshot {
                device: device.to_string(),
                population: bincode::deserialize(&blob)?,
                mean,
                stdev,
                last_sample,
                updated_at,
            })),
            None => Ok(None),
        }
    }

    /// Rebuild a model from the stored population.
    ///
    /// Statistics are recomputed from the population rather than trusted
    /// from the stored columns.
    pub fn load_baseline(&self, device: &str) -> Result<Option<BaselineModel>> {
        Ok(self
            .load_snapshot(device)?
            .map(|snapshot| BaselineModel::from_population(&snapshot.population)))
    }

    pub fn store_anomaly(&self, record: &AnomalyRecord) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock();

        conn.execute(
            r#"INSERT INTO anomalies
               (id, device, timestamp_start, timestamp_end, valid_anomaly, action_taken)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                id,
                record.device_label,
                record.timestamp_start.to_rfc3339(),
                record.timestamp_end.to_rfc3339(),
                record.valid_anomaly,
                record.action_taken
            ],
        )?;

        Ok(id)
    }

    /// Most recent anomalies for a device, newest first
    pub fn query_anomalies(&self, device: &str, limit: usize) -> Result<Vec<StoredAnomaly>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"SELECT id, device, timestamp_start, timestamp_end, valid_anomaly, action_taken, created_at
               FROM anomalies WHERE device = ?1
               ORDER BY timestamp_start DESC LIMIT ?2"#,
        )?;

        let rows = stmt.query_map(params![device, limit as i64], |row| {
            let start: String = row.get(2)?;
            let end: String = row.get(3)?;
            Ok(StoredAnomaly {
                id: row.get(0)?,
                record: AnomalyRecord {
                    device_label: row.get(1)?,
                    timestamp_start: parse_stored_time(&start, 2)?,
                    timestamp_end: parse_stored_time(&end, 3)?,
                    valid_anomaly: row.get(4)?,
                    action_taken: row.get(5)?,
                },
                created_at: row.get(6)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Keep the unfinished run found at shutdown
    pub fn store_incomplete(&self, device: &str, cycle: &IncompleteCycle) -> Result<()> {
        let blob = bincode::serialize(&cycle.samples)?;
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO incomplete_cycles (device, label, start, last_seen, samples) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                device,
                cycle.label.to_string(),
                cycle.start.to_rfc3339(),
                cycle.last_seen.to_rfc3339(),
                blob
            ],
        )?;

        Ok(())
    }

    /// Unfinished runs kept for a device, oldest first
    pub fn query_incomplete(&self, device: &str) -> Result<Vec<IncompleteCycle>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"SELECT label, start, last_seen, samples FROM incomplete_cycles
               WHERE device = ?1 ORDER BY start ASC, id ASC"#,
        )?;

        let rows = stmt.query_map(params![device], |row| {
            let label: String = row.get(0)?;
            let start: String = row.get(1)?;
            let last_seen: String = row.get(2)?;
            Ok((
                label,
                parse_stored_time(&start, 1)?,
                parse_stored_time(&last_seen, 2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (label, start, last_seen, blob) = row?;
            let label = PowerState::parse(&label)
                .ok_or_else(|| CycleError::InvalidInput(format!("stored run label '{}'", label)))?;
            results.push(IncompleteCycle {
                label,
                start,
                last_seen,
                samples: bincode::deserialize(&blob)?,
            });
        }
        Ok(results)
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> rusqlite::Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        };

        Ok(StoreStats {
            snapshot_count: count("baselines")? as usize,
            anomaly_count: count("anomalies")? as usize,
            incomplete_count: count("incomplete_cycles")? as usize,
        })
    }
}

fn parse_stored_time(text: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}
