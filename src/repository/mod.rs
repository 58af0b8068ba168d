//! Scan history persistence.
//!
//! The orchestrator only needs [`ScanStore`]; the SQLite implementation is
//! what the CLI wires in. Store failures never fail an extraction.

pub mod scan;

pub use scan::SqliteScanStore;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{ExtractionRecord, ScanStatus};
use crate::providers::ProviderId;

/// Row identifier assigned by the store.
pub type RowId = i64;

/// Errors from the scan store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A record as persisted, with its scan metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredScan {
    /// Unique id of the logical scan (one per `extract()` call).
    pub scan_id: String,
    pub provider: ProviderId,
    pub status: ScanStatus,
    pub record: ExtractionRecord,
    pub created_at: DateTime<Utc>,
}

/// A stored scan with its row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRow {
    pub id: RowId,
    #[serde(flatten)]
    pub scan: StoredScan,
}

/// Persistence collaborator for extracted scans.
pub trait ScanStore: Send + Sync {
    /// Persist one scan.
    fn insert(&self, scan: &StoredScan) -> Result<RowId>;

    /// Fetch a scan by row id.
    fn get(&self, id: RowId) -> Result<Option<ScanRow>>;

    /// Most recent scans, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<ScanRow>>;
}

/// Open a connection, creating the parent directory if needed.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Convert "no rows" into `None`.
pub(crate) fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
