//! SqliteRecordStore: build records in a single SQLite table.

use super::schema::RECORDS_SCHEMA;
use super::{normalize, RecordStore, StoreError, StoreResult};
use crate::build::Build;
use crate::record::{BuildRecord, RecordOverrides};
use crate::registry::converters::parse_timestamp;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_COLUMNS: &str =
    "SELECT machine, build_id, note, logs, keep, submitted, completed, built FROM build_records";

/// SQLite-backed records store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (creating if needed) a file-backed store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> StoreResult<()> {
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL");
        conn.execute_batch(RECORDS_SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }
}

fn format_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn parse_ts(column: &str, value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            parse_timestamp(&s)
                .map_err(|e| StoreError::corrupt(format!("build_records.{}: {}", column, e)))
        })
        .transpose()
}

struct RawRow {
    machine: String,
    build_id: String,
    note: Option<String>,
    logs: Option<String>,
    keep: bool,
    submitted: Option<String>,
    completed: Option<String>,
    built: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            machine: row.get(0)?,
            build_id: row.get(1)?,
            note: row.get(2)?,
            logs: row.get(3)?,
            keep: row.get(4)?,
            submitted: row.get(5)?,
            completed: row.get(6)?,
            built: row.get(7)?,
        })
    }

    fn into_record(self) -> StoreResult<BuildRecord> {
        let build = Build::new(self.machine, self.build_id)
            .map_err(|e| StoreError::corrupt(format!("build_records: {}", e)))?;

        Ok(BuildRecord {
            build,
            note: self.note,
            logs: self.logs,
            keep: self.keep,
            submitted: parse_ts("submitted", self.submitted)?,
            completed: parse_ts("completed", self.completed)?,
            built: parse_ts("built", self.built)?,
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn list_machines(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT machine FROM build_records ORDER BY machine")?;
        let machines = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(machines)
    }

    fn for_machine(&self, machine: &str) -> StoreResult<Vec<BuildRecord>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!("{} WHERE machine = ?1", SELECT_COLUMNS))?;
            let rows = stmt
                .query_map([machine], RawRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut records = rows
            .into_iter()
            .map(RawRow::into_record)
            .collect::<StoreResult<Vec<_>>>()?;
        records.sort_by(|a, b| a.build.cmp(&b.build));
        Ok(records)
    }

    fn get(&self, build: &Build) -> StoreResult<BuildRecord> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("{} WHERE machine = ?1 AND build_id = ?2", SELECT_COLUMNS),
                params![build.machine(), build.build_id()],
                RawRow::from_row,
            )
            .optional()?
        };

        row.ok_or_else(|| StoreError::not_found(build))?.into_record()
    }

    fn save(&self, record: BuildRecord, overrides: RecordOverrides) -> StoreResult<BuildRecord> {
        let record = normalize(record, overrides);
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO build_records (machine, build_id, note, logs, keep, submitted, completed, built)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(machine, build_id) DO UPDATE SET
                note = excluded.note,
                logs = excluded.logs,
                keep = excluded.keep,
                submitted = excluded.submitted,
                completed = excluded.completed,
                built = excluded.built
            "#,
            params![
                record.build.machine(),
                record.build.build_id(),
                record.note,
                record.logs,
                record.keep,
                format_ts(record.submitted),
                format_ts(record.completed),
                format_ts(record.built),
            ],
        )?;
        Ok(record)
    }

    fn exists(&self, build: &Build) -> StoreResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM build_records WHERE machine = ?1 AND build_id = ?2",
            params![build.machine(), build.build_id()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn delete(&self, build: &Build) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM build_records WHERE machine = ?1 AND build_id = ?2",
            params![build.machine(), build.build_id()],
        )?;
        Ok(())
    }
}
