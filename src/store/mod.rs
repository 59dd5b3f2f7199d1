//! Result store: hospitals, uploaded datasets and their prediction summaries.
//!
//! Backed by SQLite. Writes are retried while the database is locked by
//! another process.

pub mod archive;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::types::prediction::DatasetSummary;

pub use archive::{Archive, ArchivedPaths, PredictionsFile, PREDICTION_COLUMN};

/// A registered hospital account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hospital {
    pub id: i64,
    pub name: String,
    /// Base64-encoded bcrypt hash
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
    pub is_admin: bool,
}

/// Hospital with its upload count, for the admin listing
#[derive(Debug, Clone, Serialize)]
pub struct HospitalOverview {
    pub id: i64,
    pub name: String,
    pub registered_at: DateTime<Utc>,
    pub is_admin: bool,
    pub dataset_count: u64,
}

/// One scored upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub id: i64,
    pub hospital_id: i64,
    pub uploaded_at: DateTime<Utc>,
    pub data_path: String,
    pub predictions_path: String,
}

/// Write retry policy for a locked database
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

/// SQLite-backed result store
pub struct ResultStore {
    conn: Connection,
    retry: RetryPolicy,
}

impl ResultStore {
    /// Open (creating if needed) the configured database file.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(&config.database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&config.database_path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let store = Self {
            conn,
            retry: RetryPolicy {
                attempts: config.retry_attempts.max(1),
                delay: Duration::from_millis(config.retry_delay_ms),
            },
        };
        store.init_schema()?;

        info!(path = %config.database_path, "Result store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            retry: RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS hospitals (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT UNIQUE,
                 password TEXT,
                 registered_date DATE,
                 is_admin BOOLEAN DEFAULT 0
             );
             CREATE TABLE IF NOT EXISTS datasets (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 hospital_id INTEGER,
                 upload_date DATE,
                 data_path TEXT,
                 predictions_path TEXT
             );
             CREATE TABLE IF NOT EXISTS predictions (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 dataset_id INTEGER,
                 total_cases INTEGER,
                 fraud_count INTEGER,
                 non_fraud_count INTEGER,
                 rejected_count INTEGER DEFAULT 0
             );",
        )?;

        // Databases created before these columns existed
        self.add_column_if_missing("hospitals", "is_admin", "BOOLEAN DEFAULT 0")?;
        self.add_column_if_missing("predictions", "rejected_count", "INTEGER DEFAULT 0")?;
        Ok(())
    }

    fn add_column_if_missing(
        &self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        if !columns.iter().any(|c| c == column) {
            warn!(table = %table, column = %column, "Migrating legacy table");
            self.conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition),
                [],
            )?;
        }
        Ok(())
    }

    /// Run a write, retrying while another connection holds the lock.
    fn with_retry<T>(
        &self,
        mut op: impl FnMut(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        for attempt in 1..=self.retry.attempts {
            match op(&self.conn) {
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
                {
                    warn!(
                        attempt = attempt,
                        max_attempts = self.retry.attempts,
                        "Database locked, retrying in {:?}",
                        self.retry.delay
                    );
                    thread::sleep(self.retry.delay);
                }
                other => return other.map_err(StoreError::from),
            }
        }

        Err(StoreError::Locked {
            attempts: self.retry.attempts,
        })
    }

    /// Insert a hospital account and return its id.
    pub fn insert_hospital(
        &self,
        name: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<i64, StoreError> {
        let registered_at = Utc::now();
        let result = self.with_retry(|conn| {
            conn.execute(
                "INSERT INTO hospitals (name, password, registered_date, is_admin)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, password_hash, registered_at, is_admin],
            )?;
            Ok(conn.last_insert_rowid())
        });

        match result {
            Err(StoreError::Database(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateHospital(name.to_string()))
            }
            other => other,
        }
    }

    pub fn hospital_by_name(&self, name: &str) -> Result<Option<Hospital>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, name, password, registered_date, is_admin
                 FROM hospitals WHERE name = ?1",
                params![name],
                hospital_from_row,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn hospital_by_id(&self, id: i64) -> Result<Option<Hospital>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, name, password, registered_date, is_admin
                 FROM hospitals WHERE id = ?1",
                params![id],
                hospital_from_row,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn update_password(&self, hospital_id: i64, password_hash: &str) -> Result<(), StoreError> {
        let updated = self.with_retry(|conn| {
            conn.execute(
                "UPDATE hospitals SET password = ?1 WHERE id = ?2",
                params![password_hash, hospital_id],
            )
        })?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("hospital #{}", hospital_id)));
        }
        Ok(())
    }

    /// Every hospital with its number of uploads
    pub fn list_hospitals(&self) -> Result<Vec<HospitalOverview>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT h.id, h.name, h.registered_date, h.is_admin, COUNT(d.id) AS dataset_count
             FROM hospitals h
             LEFT JOIN datasets d ON d.hospital_id = h.id
             GROUP BY h.id
             ORDER BY h.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HospitalOverview {
                id: row.get("id")?,
                name: row.get("name")?,
                registered_at: row.get("registered_date")?,
                is_admin: row.get::<_, Option<bool>>("is_admin")?.unwrap_or(false),
                dataset_count: row.get::<_, i64>("dataset_count")? as u64,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Persist one upload and its summary atomically; returns the dataset id.
    pub fn record_upload(
        &self,
        summary: &DatasetSummary,
        paths: &ArchivedPaths,
    ) -> Result<i64, StoreError> {
        let dataset_id = self.with_retry(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO datasets (hospital_id, upload_date, data_path, predictions_path)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    summary.hospital_id,
                    summary.uploaded_at,
                    paths.data_path,
                    paths.predictions_path
                ],
            )?;
            let dataset_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO predictions
                 (dataset_id, total_cases, fraud_count, non_fraud_count, rejected_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    dataset_id,
                    summary.total_cases as i64,
                    summary.fraud_count as i64,
                    summary.non_fraud_count as i64,
                    summary.rejected_count as i64
                ],
            )?;
            tx.commit()?;
            Ok(dataset_id)
        })?;

        debug!(
            dataset_id = dataset_id,
            hospital_id = summary.hospital_id,
            total = summary.total_cases,
            fraud = summary.fraud_count,
            "Upload recorded"
        );
        Ok(dataset_id)
    }

    pub fn datasets_for_hospital(&self, hospital_id: i64) -> Result<Vec<Dataset>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, hospital_id, upload_date, data_path, predictions_path
             FROM datasets WHERE hospital_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![hospital_id], dataset_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn dataset(&self, dataset_id: i64) -> Result<Option<Dataset>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, hospital_id, upload_date, data_path, predictions_path
                 FROM datasets WHERE id = ?1",
                params![dataset_id],
                dataset_from_row,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn summary_for_dataset(&self, dataset_id: i64) -> Result<Option<DatasetSummary>, StoreError> {
        self.conn
            .query_row(
                "SELECT d.hospital_id, d.upload_date, p.total_cases, p.fraud_count,
                        p.non_fraud_count, p.rejected_count
                 FROM predictions p
                 JOIN datasets d ON d.id = p.dataset_id
                 WHERE p.dataset_id = ?1",
                params![dataset_id],
                |row| {
                    Ok(DatasetSummary {
                        hospital_id: row.get(0)?,
                        uploaded_at: row.get(1)?,
                        total_cases: count_value(row.get(2)?),
                        fraud_count: count_value(row.get(3)?),
                        non_fraud_count: count_value(row.get(4)?),
                        rejected_count: count_value(row.get(5)?),
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// Every dataset across all hospitals
    pub fn all_datasets(&self) -> Result<Vec<Dataset>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, hospital_id, upload_date, data_path, predictions_path
             FROM datasets ORDER BY hospital_id, id",
        )?;
        let rows = stmt.query_map([], dataset_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Delete every hospital, dataset and summary.
    pub fn purge(&self) -> Result<(), StoreError> {
        self.with_retry(|conn| {
            // Dropping an uncommitted transaction rolls it back before a retry
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(
                "DELETE FROM predictions;
                 DELETE FROM datasets;
                 DELETE FROM hospitals;",
            )?;
            tx.commit()
        })?;
        warn!("All hospitals, datasets and prediction summaries deleted");
        Ok(())
    }
}

fn hospital_from_row(row: &Row<'_>) -> rusqlite::Result<Hospital> {
    Ok(Hospital {
        id: row.get(0)?,
        name: row.get(1)?,
        password_hash: password_text(row.get(2)?),
        registered_at: row.get(3)?,
        is_admin: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
    })
}

fn dataset_from_row(row: &Row<'_>) -> rusqlite::Result<Dataset> {
    Ok(Dataset {
        id: row.get(0)?,
        hospital_id: row.get(1)?,
        uploaded_at: row.get(2)?,
        data_path: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        predictions_path: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

/// Password column may hold text or, in older rows, raw bytes.
fn password_text(value: Value) -> String {
    match value {
        Value::Text(text) => text,
        Value::Blob(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

/// Count columns may hold integers or, in older rows, little-endian blobs.
fn count_value(value: Value) -> u64 {
    match value {
        Value::Integer(n) => n.max(0) as u64,
        Value::Blob(bytes) => bytes
            .iter()
            .take(8)
            .enumerate()
            .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i))),
        Value::Real(r) => r.max(0.0) as u64,
        Value::Text(text) => text.trim().parse().unwrap_or(0),
        Value::Null => 0,
    }
}
