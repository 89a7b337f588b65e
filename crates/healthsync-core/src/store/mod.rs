//! Durable storage capability split into independently addressable partitions.
//!
//! A partition is either sequence-keyed (the store assigns strictly increasing
//! ids on [`StoreBackend::append`]) or naturally keyed (callers choose the key and
//! [`StoreBackend::put`] replaces the whole record). Sequence ids are never reused,
//! even after the record they named has been deleted.

use async_trait::async_trait;

use crate::error::{Result, SyncError};

mod memory;
mod migration;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

const MAX_PARTITION_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    Sequence,
    Natural,
}

impl KeyMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Natural => "natural",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self> {
        match raw {
            "sequence" => Ok(Self::Sequence),
            "natural" => Ok(Self::Natural),
            other => Err(SyncError::Persistence(format!(
                "unknown partition key mode: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionSpec {
    pub name: String,
    pub key_mode: KeyMode,
}

impl PartitionSpec {
    pub fn sequence(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_mode: KeyMode::Sequence,
        }
    }

    pub fn natural(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_mode: KeyMode::Natural,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Seq(i64),
    Natural(String),
}

impl RecordKey {
    pub fn natural(key: impl Into<String>) -> Self {
        Self::Natural(key.into())
    }

    pub fn as_seq(&self) -> Option<i64> {
        match self {
            Self::Seq(seq) => Some(*seq),
            Self::Natural(_) => None,
        }
    }

    pub(crate) fn storage_text(&self) -> String {
        match self {
            Self::Seq(seq) => seq.to_string(),
            Self::Natural(key) => key.clone(),
        }
    }

    pub(crate) fn mode(&self) -> KeyMode {
        match self {
            Self::Seq(_) => KeyMode::Sequence,
            Self::Natural(_) => KeyMode::Natural,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seq(seq) => write!(f, "#{seq}"),
            Self::Natural(key) => f.write_str(key),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: RecordKey,
    pub value: serde_json::Value,
}

/// Async storage capability shared by the outbox and every cache partition.
///
/// Implementations must serialize writes within a partition and return
/// [`StoreBackend::get_all`] in insertion order.
#[async_trait]
pub trait StoreBackend: Send + Sync + std::fmt::Debug {
    async fn open_partition(&self, spec: &PartitionSpec) -> Result<()>;

    async fn append(&self, partition: &str, value: serde_json::Value) -> Result<i64>;

    async fn put(&self, partition: &str, key: &RecordKey, value: serde_json::Value) -> Result<()>;

    async fn get(&self, partition: &str, key: &RecordKey) -> Result<Option<serde_json::Value>>;

    async fn get_all(&self, partition: &str) -> Result<Vec<StoredRecord>>;

    /// Returns `false` when the key was already absent.
    async fn delete(&self, partition: &str, key: &RecordKey) -> Result<bool>;

    async fn count(&self, partition: &str) -> Result<u64>;
}

pub(crate) fn validate_partition_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_PARTITION_NAME_LEN {
        return Err(SyncError::Validation(format!(
            "partition name must be 1..={MAX_PARTITION_NAME_LEN} bytes: {name:?}"
        )));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
    {
        return Err(SyncError::Validation(format!(
            "partition name contains unsupported characters: {name:?}"
        )));
    }
    Ok(())
}

pub(crate) fn ensure_key_mode(partition: &str, expected: KeyMode, actual: KeyMode) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(SyncError::Validation(format!(
        "partition {partition} is {} keyed; operation requires {} keys",
        expected.as_str(),
        actual.as_str()
    )))
}

#[cfg(test)]
mod tests;
