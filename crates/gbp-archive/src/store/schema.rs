//! SQLite schema for build records.

/// DDL for the records table.
///
/// Timestamps are RFC 3339 text (UTC); `keep` is 0/1.
pub const RECORDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS build_records (
    machine    TEXT NOT NULL,
    build_id   TEXT NOT NULL,
    note       TEXT,
    logs       TEXT,
    keep       INTEGER NOT NULL DEFAULT 0,
    submitted  TEXT NOT NULL,
    completed  TEXT,
    built      TEXT,
    PRIMARY KEY (machine, build_id)
);

CREATE INDEX IF NOT EXISTS idx_build_records_completed ON build_records(completed);
"#;
