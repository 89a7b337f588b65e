use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::error::{Result, SyncError};

use super::migration::migrate;
use super::{
    KeyMode, PartitionSpec, RecordKey, StoreBackend, StoredRecord, ensure_key_mode,
    validate_partition_name,
};

/// SQLite-backed store. Every call runs on the blocking pool so async callers
/// only suspend, never stall the reactor.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        migrate(&conn)?;
        #[cfg(unix)]
        harden_sqlite_permissions(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn schema_version(&self) -> Result<Option<i64>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SyncError::mutex_poisoned("sqlite"))?;
        let value = conn
            .query_row(
                "SELECT value FROM system_kv WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.and_then(|raw| raw.parse::<i64>().ok()))
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| SyncError::mutex_poisoned("sqlite"))?;
            f(&mut *guard)
        })
        .await?
    }

    async fn run_tx<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }
}

#[async_trait]
impl StoreBackend for SqliteStore {
    async fn open_partition(&self, spec: &PartitionSpec) -> Result<()> {
        validate_partition_name(&spec.name)?;
        let spec = spec.clone();
        self.run_tx(move |tx| {
            tx.execute(
                r"
                INSERT OR IGNORE INTO partitions(name, key_mode, next_seq, created_at)
                VALUES (?1, ?2, 1, ?3)
                ",
                params![spec.name, spec.key_mode.as_str(), Utc::now().to_rfc3339()],
            )?;
            let existing = load_key_mode(tx, &spec.name)?;
            if existing != spec.key_mode {
                return Err(SyncError::Validation(format!(
                    "partition {} already exists with {} keys",
                    spec.name,
                    existing.as_str()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn append(&self, partition: &str, value: serde_json::Value) -> Result<i64> {
        let partition = partition.to_string();
        let value_json = value.to_string();
        self.run_tx(move |tx| {
            let mode = load_key_mode(tx, &partition)?;
            ensure_key_mode(&partition, mode, KeyMode::Sequence)?;
            let seq = allocate_seq(tx, &partition)?;
            tx.execute(
                r"
                INSERT INTO records(partition, record_key, seq, value_json, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    partition,
                    seq.to_string(),
                    seq,
                    value_json,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(seq)
        })
        .await
    }

    async fn put(&self, partition: &str, key: &RecordKey, value: serde_json::Value) -> Result<()> {
        let partition = partition.to_string();
        let key = key.clone();
        let value_json = value.to_string();
        self.run_tx(move |tx| {
            let mode = load_key_mode(tx, &partition)?;
            ensure_key_mode(&partition, mode, KeyMode::Natural)?;
            ensure_key_mode(&partition, mode, key.mode())?;
            let record_key = key.storage_text();
            let now = Utc::now().to_rfc3339();
            let replaced = tx.execute(
                r"
                UPDATE records
                SET value_json = ?3, updated_at = ?4
                WHERE partition = ?1 AND record_key = ?2
                ",
                params![partition, record_key, value_json, now],
            )?;
            if replaced == 0 {
                let seq = allocate_seq(tx, &partition)?;
                tx.execute(
                    r"
                    INSERT INTO records(partition, record_key, seq, value_json, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                    params![partition, record_key, seq, value_json, now],
                )?;
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, partition: &str, key: &RecordKey) -> Result<Option<serde_json::Value>> {
        let partition = partition.to_string();
        let key = key.clone();
        self.run(move |conn| {
            let mode = load_key_mode(conn, &partition)?;
            ensure_key_mode(&partition, mode, key.mode())?;
            let raw = conn
                .query_row(
                    "SELECT value_json FROM records WHERE partition = ?1 AND record_key = ?2",
                    params![partition, key.storage_text()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            raw.map(|raw| decode_value(&partition, &key, &raw))
                .transpose()
        })
        .await
    }

    async fn get_all(&self, partition: &str) -> Result<Vec<StoredRecord>> {
        let partition = partition.to_string();
        self.run(move |conn| {
            let mode = load_key_mode(conn, &partition)?;
            let mut stmt = conn.prepare(
                r"
                SELECT record_key, seq, value_json
                FROM records
                WHERE partition = ?1
                ORDER BY seq ASC
                ",
            )?;
            let rows = stmt.query_map(params![partition], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (record_key, seq, raw) = row?;
                let key = match mode {
                    KeyMode::Sequence => RecordKey::Seq(seq),
                    KeyMode::Natural => RecordKey::Natural(record_key),
                };
                let value = decode_value(&partition, &key, &raw)?;
                out.push(StoredRecord { key, value });
            }
            Ok(out)
        })
        .await
    }

    async fn delete(&self, partition: &str, key: &RecordKey) -> Result<bool> {
        let partition = partition.to_string();
        let key = key.clone();
        self.run(move |conn| {
            let mode = load_key_mode(conn, &partition)?;
            ensure_key_mode(&partition, mode, key.mode())?;
            let affected = conn.execute(
                "DELETE FROM records WHERE partition = ?1 AND record_key = ?2",
                params![partition, key.storage_text()],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    async fn count(&self, partition: &str) -> Result<u64> {
        let partition = partition.to_string();
        self.run(move |conn| {
            load_key_mode(conn, &partition)?;
            let count = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE partition = ?1",
                params![partition],
                |row| row.get::<_, i64>(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }
}

fn load_key_mode(conn: &Connection, partition: &str) -> Result<KeyMode> {
    let raw = conn
        .query_row(
            "SELECT key_mode FROM partitions WHERE name = ?1",
            params![partition],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .ok_or_else(|| SyncError::partition_not_open(partition))?;
    KeyMode::parse(&raw)
}

fn allocate_seq(tx: &Transaction<'_>, partition: &str) -> Result<i64> {
    let seq = tx.query_row(
        "SELECT next_seq FROM partitions WHERE name = ?1",
        params![partition],
        |row| row.get::<_, i64>(0),
    )?;
    tx.execute(
        "UPDATE partitions SET next_seq = ?2 WHERE name = ?1",
        params![partition, seq.saturating_add(1)],
    )?;
    Ok(seq)
}

fn decode_value(partition: &str, key: &RecordKey, raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|err| {
        SyncError::Persistence(format!("corrupt record {partition}/{key}: {err}"))
    })
}

#[cfg(unix)]
fn harden_sqlite_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for suffix in ["", "-wal", "-shm"] {
        let mut os = path.as_os_str().to_os_string();
        os.push(suffix);
        let candidate = PathBuf::from(os);
        if candidate.exists() {
            std::fs::set_permissions(candidate, std::fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}
