//! SQLite persistence for spread sample history.
//!
//! The statistics tracker is constructed with a historical backfill; this
//! store records every observed sample so a restart resumes with a warm
//! window instead of an empty one.

use crate::stats::Sample;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

/// SQLite-backed store of spread samples.
pub struct SampleStore {
    conn: Connection,
}

impl SampleStore {
    /// Open the store, initializing the database if needed.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data directory {:?}", parent))?;
            }
        }

        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let store = Self { conn };
        store.init_schema()?;

        info!("Sample store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS spread_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                profit_percent REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON spread_samples(timestamp);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Record one observed sample.
    pub fn record_sample(&self, sample: &Sample) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO spread_samples (timestamp, profit_percent) VALUES (?1, ?2)",
                params![sample.timestamp.to_rfc3339(), sample.profit_percent],
            )
            .context("Failed to record sample")?;
        Ok(())
    }

    /// Load samples newer than `now - window`, oldest first.
    pub fn load_recent(&self, window: Duration) -> Result<Vec<Sample>> {
        let cutoff = (Utc::now() - window).to_rfc3339();
        self.query_samples(
            "SELECT timestamp, profit_percent FROM spread_samples
             WHERE timestamp > ?1 ORDER BY timestamp ASC",
            params![cutoff],
        )
    }

    /// Load the most recent `limit` samples, oldest first.
    pub fn load_last(&self, limit: u32) -> Result<Vec<Sample>> {
        let mut samples = self.query_samples(
            "SELECT timestamp, profit_percent FROM spread_samples
             ORDER BY timestamp DESC LIMIT ?1",
            params![limit],
        )?;
        samples.reverse();
        Ok(samples)
    }

    /// Delete samples older than `cutoff`. Returns the number removed.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM spread_samples WHERE timestamp <= ?1",
                params![cutoff.to_rfc3339()],
            )
            .context("Failed to prune samples")?;

        if removed > 0 {
            debug!(removed, "Pruned stale samples");
        }
        Ok(removed)
    }

    /// Total number of stored samples.
    pub fn sample_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM spread_samples", [], |row| row.get(0))
            .context("Failed to count samples")?;
        Ok(count)
    }

    fn query_samples<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Sample>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            let timestamp: String = row.get(0)?;
            let profit_percent: f64 = row.get(1)?;
            Ok((timestamp, profit_percent))
        })?;

        let mut samples = Vec::new();
        for row in rows {
            let (timestamp, profit_percent) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .with_context(|| format!("Invalid sample timestamp in database: {timestamp}"))?
                .with_timezone(&Utc);
            samples.push(Sample {
                timestamp,
                profit_percent,
            });
        }
        Ok(samples)
    }
}
