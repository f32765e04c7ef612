//! SQLite storage layer -- samples, alerts, retention.
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch so
//! range filters and retention deletes hit the `ts` indexes directly.
//! Samples are kept as JSON documents; alerts are stored column-wise.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::models::{AlertEvent, AlertKind, ContainerSample, HostSample};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Handle to the monitor database
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Open (or create) the SQLite database and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
            )
        });

        let pool = R2D2Pool::new(manager)
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        let conn = pool.get()?;
        schema::migrate(&conn)?;

        Ok(Self { pool })
    }

    /// Run a storage closure on the blocking thread pool
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("Storage task panicked")?
    }

    pub fn insert_container_samples(&self, samples: &[ContainerSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO container_stats (ts, name, data) VALUES (?1, ?2, ?3)")?;
            for sample in samples {
                let data = serde_json::to_string(sample)?;
                stmt.execute(params![
                    sample.timestamp.timestamp_millis(),
                    sample.name,
                    data
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    pub fn insert_host_sample(&self, sample: &HostSample) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO host_stats (ts, data) VALUES (?1, ?2)",
            params![
                sample.timestamp.timestamp_millis(),
                serde_json::to_string(sample)?
            ],
        )?;
        Ok(())
    }

    pub fn insert_alert(&self, alert: &AlertEvent) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO alerts (ts, type, target, value, message) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                alert.timestamp.timestamp_millis(),
                alert.kind.as_str(),
                alert.target,
                alert.value,
                alert.message
            ],
        )?;
        Ok(())
    }

    /// Samples of one container newer than `since`, oldest first
    pub fn container_history(
        &self,
        name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContainerSample>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM container_stats WHERE name = ?1 AND ts > ?2 ORDER BY ts",
        )?;

        let rows = stmt.query_map(params![name, since.timestamp_millis()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut samples = Vec::new();
        for data in rows {
            samples.push(serde_json::from_str(&data?).context("Corrupt container sample row")?);
        }
        Ok(samples)
    }

    /// Host samples newer than `since`, oldest first
    pub fn host_history(&self, since: DateTime<Utc>) -> Result<Vec<HostSample>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT data FROM host_stats WHERE ts > ?1 ORDER BY ts")?;

        let rows = stmt.query_map(params![since.timestamp_millis()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut samples = Vec::new();
        for data in rows {
            samples.push(serde_json::from_str(&data?).context("Corrupt host sample row")?);
        }
        Ok(samples)
    }

    /// Alerts newer than `since`, newest first
    pub fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertEvent>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT ts, type, target, value, message FROM alerts
             WHERE ts > ?1 ORDER BY ts DESC, id DESC",
        )?;

        let rows = stmt.query_map(params![since.timestamp_millis()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut alerts = Vec::new();
        for row in rows {
            let (ts, kind, target, value, message) = row?;
            let kind: AlertKind = kind.parse()?;
            let timestamp = DateTime::<Utc>::from_timestamp_millis(ts)
                .with_context(|| format!("Alert timestamp out of range: {ts}"))?;

            alerts.push(AlertEvent {
                kind,
                target,
                value,
                timestamp,
                message,
            });
        }
        Ok(alerts)
    }

    /// Delete rows older than `before` from every table, returning the count
    pub fn cleanup(&self, before: DateTime<Utc>) -> Result<usize> {
        let cutoff = before.timestamp_millis();

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for table in ["container_stats", "host_stats", "alerts"] {
            deleted += tx.execute(&format!("DELETE FROM {table} WHERE ts < ?1"), [cutoff])?;
        }
        tx.commit()?;

        Ok(deleted)
    }
}
