//! Read-through replica of reference data, one natural-keyed partition per entity kind.
//!
//! Writes replace whole records. There is no expiry; a record is as fresh as the last
//! successful online fetch that wrote it.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::store::{PartitionSpec, RecordKey, StoreBackend};

pub const CACHE_NAMESPACE: &str = "cache.";

/// A server-side entity that can be cached under its natural identifier.
pub trait CacheRecord: Serialize + DeserializeOwned {
    fn cache_key(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct ReferenceCache {
    store: Arc<dyn StoreBackend>,
    partition: String,
}

impl ReferenceCache {
    /// `name` may be given with or without the `cache.` prefix.
    pub async fn open(store: Arc<dyn StoreBackend>, name: &str) -> Result<Self> {
        let name = name.trim();
        let partition = if name.starts_with(CACHE_NAMESPACE) {
            name.to_string()
        } else {
            format!("{CACHE_NAMESPACE}{name}")
        };
        if partition.len() == CACHE_NAMESPACE.len() {
            return Err(SyncError::Validation(
                "cache partition name must not be empty".to_string(),
            ));
        }
        store
            .open_partition(&PartitionSpec::natural(partition.clone()))
            .await?;
        Ok(Self { store, partition })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub async fn cache_data<T: CacheRecord>(&self, records: &[T]) -> Result<usize> {
        let mut prepared = Vec::with_capacity(records.len());
        for record in records {
            let key = checked_key(record.cache_key())?;
            prepared.push((key, serde_json::to_value(record)?));
        }
        self.write_all(prepared).await
    }

    /// Upserts untyped records keyed by `key_field`. Every key is validated before
    /// anything is written.
    pub async fn cache_json(&self, records: &[serde_json::Value], key_field: &str) -> Result<usize> {
        let mut prepared = Vec::with_capacity(records.len());
        for record in records {
            let key = match record.get(key_field) {
                Some(serde_json::Value::String(key)) => key.clone(),
                Some(serde_json::Value::Number(key)) => key.to_string(),
                Some(_) => {
                    return Err(SyncError::Validation(format!(
                        "cache key field {key_field} must be a string or number"
                    )));
                }
                None => {
                    return Err(SyncError::Validation(format!(
                        "cache record is missing key field {key_field}"
                    )));
                }
            };
            prepared.push((checked_key(key)?, record.clone()));
        }
        self.write_all(prepared).await
    }

    /// All cached records. Callers must not rely on the order.
    pub async fn get_cached_data<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.store
            .get_all(&self.partition)
            .await?
            .into_iter()
            .map(|record| self.decode(&record.key, record.value))
            .collect()
    }

    pub async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let key = RecordKey::natural(key);
        self.store
            .get(&self.partition, &key)
            .await?
            .map(|value| self.decode(&key, value))
            .transpose()
    }

    pub async fn record_count(&self) -> Result<u64> {
        self.store.count(&self.partition).await
    }

    async fn write_all(&self, prepared: Vec<(RecordKey, serde_json::Value)>) -> Result<usize> {
        let written = prepared.len();
        for (key, value) in prepared {
            self.store.put(&self.partition, &key, value).await?;
        }
        debug!(partition = %self.partition, written, "cache records replaced");
        Ok(written)
    }

    fn decode<T: DeserializeOwned>(&self, key: &RecordKey, value: serde_json::Value) -> Result<T> {
        serde_json::from_value(value).map_err(|err| {
            SyncError::Persistence(format!(
                "cached record {}/{key} does not decode: {err}",
                self.partition
            ))
        })
    }
}

fn checked_key(key: String) -> Result<RecordKey> {
    if key.trim().is_empty() {
        return Err(SyncError::Validation("cache key must not be empty".to_string()));
    }
    Ok(RecordKey::Natural(key))
}
