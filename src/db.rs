//! SQLite-backed `Storage` implementation. The warehouse lives in a single
//! database file: staging tables here, dim/fact/quality tables created by
//! the SQL stage scripts.

use crate::error::{PipelineError, Result};
use crate::storage::Storage;
use crate::types::{IngestionRun, StagingRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the warehouse database at `db_path` and apply the
    /// staging schema migration.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening warehouse database at {}", db_path.display());
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(include_str!("../migrations/001_create_staging_schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read back the full run log, newest first. Test/inspection utility;
    /// the pipeline itself only reads runs in aggregate.
    pub fn list_ingestion_runs(&self) -> Result<Vec<IngestionRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, source, records_fetched, records_loaded, status,
                    error_message, started_at, finished_at
             FROM ingestion_log ORDER BY started_at DESC",
        )?;

        let mut runs = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let run_id: String = row.get(0)?;
            let source: String = row.get(1)?;
            let status: String = row.get(4)?;
            let started_at: String = row.get(6)?;
            let finished_at: Option<String> = row.get(7)?;

            runs.push(IngestionRun {
                run_id: run_id
                    .parse()
                    .map_err(|e| PipelineError::Database(format!("bad run_id: {}", e)))?,
                source: source.parse().map_err(PipelineError::Database)?,
                records_fetched: row.get::<_, i64>(2)? as usize,
                records_loaded: row.get::<_, i64>(3)? as usize,
                status: status.parse().map_err(PipelineError::Database)?,
                error_message: row.get(5)?,
                started_at: parse_timestamp(&started_at)?,
                finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(runs)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::Database(format!("bad timestamp '{}': {}", value, e)))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_staging_rows(&self, rows: &[StagingRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO staging_events (
                    source, raw_event_id, raw_payload, event_name, event_date,
                    event_time, venue_name, venue_city, venue_country,
                    venue_lat, venue_lon, category, subcategory,
                    price_min, price_max, currency, url, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            )?;

            for row in rows {
                inserted += stmt.execute(params![
                    row.source.as_str(),
                    row.raw_event_id,
                    row.raw_payload,
                    row.event_name,
                    row.event_date,
                    row.event_time,
                    row.venue_name,
                    row.venue_city,
                    row.venue_country,
                    row.venue_lat,
                    row.venue_lon,
                    row.category,
                    row.subcategory,
                    row.price_min,
                    row.price_max,
                    row.currency,
                    row.url,
                    row.status,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Inserted {} of {} staging rows", inserted, rows.len());
        Ok(inserted)
    }

    async fn create_ingestion_run(&self, run: &IngestionRun) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ingestion_log (
                run_id, source, records_fetched, records_loaded, status,
                error_message, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.run_id.to_string(),
                run.source.as_str(),
                run.records_fetched as i64,
                run.records_loaded as i64,
                run.status.as_str(),
                run.error_message,
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn update_ingestion_run(&self, run: &IngestionRun) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE ingestion_log
             SET records_fetched = ?2, records_loaded = ?3, status = ?4,
                 error_message = ?5, finished_at = ?6
             WHERE run_id = ?1",
            params![
                run.run_id.to_string(),
                run.records_fetched as i64,
                run.records_loaded as i64,
                run.status.as_str(),
                run.error_message,
                run.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        if updated == 0 {
            return Err(PipelineError::Database(format!(
                "Cannot update unknown ingestion run {}",
                run.run_id
            )));
        }
        Ok(())
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        Ok(())
    }

    async fn aggregate_count(&self, query: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(query, [], |row| row.get(0))?;
        Ok(count)
    }
}
