use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, SyncError};

pub(super) const SCHEMA_VERSION: i64 = 2;

const MIGRATION_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS partitions (
        name TEXT PRIMARY KEY,
        key_mode TEXT NOT NULL CHECK(key_mode IN ('sequence', 'natural')),
        next_seq INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS records (
        partition TEXT NOT NULL,
        record_key TEXT NOT NULL,
        seq INTEGER NOT NULL,
        value_json TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (partition, record_key),
        FOREIGN KEY (partition) REFERENCES partitions(name) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_records_partition_seq
    ON records(partition, seq);

    CREATE TABLE IF NOT EXISTS system_kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

pub(super) fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_SCHEMA_SQL)?;
    ensure_required_column(
        conn,
        "partitions",
        "next_seq",
        "unsupported partitions schema: next_seq is missing; reset the local state database",
    )?;
    ensure_required_column(
        conn,
        "records",
        "seq",
        "unsupported records schema: seq is missing; reset the local state database",
    )?;

    let recorded = conn
        .query_row(
            "SELECT value FROM system_kv WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    match recorded.map(|raw| raw.parse::<i64>()) {
        Some(Ok(version)) if version > SCHEMA_VERSION => {
            return Err(SyncError::Persistence(format!(
                "state database schema {version} is newer than supported {SCHEMA_VERSION}"
            )));
        }
        Some(Err(_)) => {
            return Err(SyncError::Persistence(
                "state database schema_version is corrupt".to_string(),
            ));
        }
        _ => {}
    }

    conn.execute(
        r"
        INSERT INTO system_kv(key, value, updated_at)
        VALUES ('schema_version', ?1, ?2)
        ON CONFLICT(key) DO UPDATE SET
          value = excluded.value,
          updated_at = excluded.updated_at
        ",
        params![SCHEMA_VERSION.to_string(), chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ensure_required_column(
    conn: &Connection,
    table: &str,
    column: &str,
    error_message: &'static str,
) -> Result<()> {
    if has_column(conn, table, column)? {
        Ok(())
    } else {
        Err(SyncError::Persistence(error_message.to_string()))
    }
}
