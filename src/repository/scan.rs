//! SQLite-backed scan store.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, Row};

use super::{parse_datetime, Result, RowId, ScanRow, ScanStore, StoredScan};
use crate::extract::{ExtractionRecord, ScanStatus};
use crate::providers::ProviderId;

/// SQLite scan history (sync, one connection per operation).
pub struct SqliteScanStore {
    db_path: PathBuf,
}

impl SqliteScanStore {
    /// Open (or create) the store at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scan_id TEXT NOT NULL UNIQUE,
                provider TEXT NOT NULL,
                status TEXT NOT NULL,
                recipient TEXT NOT NULL,
                address_line TEXT NOT NULL,
                postal_code TEXT NOT NULL,
                city TEXT NOT NULL,
                region TEXT,
                country TEXT NOT NULL,
                sorting_center_id TEXT NOT NULL,
                sorting_center_name TEXT NOT NULL,
                confidence INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scans_created_at ON scans(created_at);
            CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status);
        "#,
        )?;
        Ok(())
    }

    fn row_to_scan(row: &Row<'_>) -> rusqlite::Result<ScanRow> {
        let provider: String = row.get("provider")?;
        let status: String = row.get("status")?;
        Ok(ScanRow {
            id: row.get("id")?,
            scan: StoredScan {
                scan_id: row.get("scan_id")?,
                provider: ProviderId::from_str(&provider).unwrap_or(ProviderId::OcrService),
                status: ScanStatus::from_str(&status).unwrap_or(ScanStatus::NeedsReview),
                record: ExtractionRecord {
                    recipient: row.get("recipient")?,
                    address_line: row.get("address_line")?,
                    postal_code: row.get("postal_code")?,
                    city: row.get("city")?,
                    region: row.get("region")?,
                    country: row.get("country")?,
                    sorting_center_id: row.get("sorting_center_id")?,
                    sorting_center_name: row.get("sorting_center_name")?,
                    confidence: row.get::<_, i64>("confidence")?.clamp(0, 100) as u8,
                },
                created_at: parse_datetime(&row.get::<_, String>("created_at")?),
            },
        })
    }
}

impl ScanStore for SqliteScanStore {
    fn insert(&self, scan: &StoredScan) -> Result<RowId> {
        let conn = self.connect()?;
        let record = &scan.record;
        conn.execute(
            r#"INSERT INTO scans (
                scan_id, provider, status, recipient, address_line, postal_code, city,
                region, country, sorting_center_id, sorting_center_name, confidence, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            params![
                scan.scan_id,
                scan.provider.as_str(),
                scan.status.as_str(),
                record.recipient,
                record.address_line,
                record.postal_code,
                record.city,
                record.region,
                record.country,
                record.sorting_center_id,
                record.sorting_center_name,
                record.confidence as i64,
                scan.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get(&self, id: RowId) -> Result<Option<ScanRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM scans WHERE id = ?")?;
        super::to_option(stmt.query_row(params![id], Self::row_to_scan))
    }

    fn recent(&self, limit: usize) -> Result<Vec<ScanRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM scans ORDER BY id DESC LIMIT ?")?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_scan)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
