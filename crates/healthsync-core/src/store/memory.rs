use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, SyncError};

use super::{
    KeyMode, PartitionSpec, RecordKey, StoreBackend, StoredRecord, ensure_key_mode,
    validate_partition_name,
};

#[derive(Debug)]
struct MemoryPartition {
    key_mode: KeyMode,
    next_seq: i64,
    by_seq: BTreeMap<i64, StoredRecord>,
    seq_by_key: HashMap<RecordKey, i64>,
}

impl MemoryPartition {
    fn new(key_mode: KeyMode) -> Self {
        Self {
            key_mode,
            next_seq: 1,
            by_seq: BTreeMap::new(),
            seq_by_key: HashMap::new(),
        }
    }

    fn allocate_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        seq
    }
}

/// In-process store. Clones share state, so dropping every consumer and
/// reopening over a clone behaves like an application restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    partitions: Arc<Mutex<HashMap<String, MemoryPartition>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every mutating call fails with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Persistence("store is unavailable".to_string()));
        }
        Ok(())
    }

    fn with_partition<T>(
        &self,
        partition: &str,
        f: impl FnOnce(&mut MemoryPartition) -> Result<T>,
    ) -> Result<T> {
        let mut partitions = self
            .partitions
            .lock()
            .map_err(|_| SyncError::mutex_poisoned("memory store"))?;
        let state = partitions
            .get_mut(partition)
            .ok_or_else(|| SyncError::partition_not_open(partition))?;
        f(state)
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn open_partition(&self, spec: &PartitionSpec) -> Result<()> {
        validate_partition_name(&spec.name)?;
        let mut partitions = self
            .partitions
            .lock()
            .map_err(|_| SyncError::mutex_poisoned("memory store"))?;
        let state = partitions
            .entry(spec.name.clone())
            .or_insert_with(|| MemoryPartition::new(spec.key_mode));
        if state.key_mode != spec.key_mode {
            return Err(SyncError::Validation(format!(
                "partition {} already exists with {} keys",
                spec.name,
                state.key_mode.as_str()
            )));
        }
        Ok(())
    }

    async fn append(&self, partition: &str, value: serde_json::Value) -> Result<i64> {
        self.check_writable()?;
        self.with_partition(partition, |state| {
            ensure_key_mode(partition, state.key_mode, KeyMode::Sequence)?;
            let seq = state.allocate_seq();
            let key = RecordKey::Seq(seq);
            state.seq_by_key.insert(key.clone(), seq);
            state.by_seq.insert(seq, StoredRecord { key, value });
            Ok(seq)
        })
    }

    async fn put(&self, partition: &str, key: &RecordKey, value: serde_json::Value) -> Result<()> {
        self.check_writable()?;
        self.with_partition(partition, |state| {
            ensure_key_mode(partition, state.key_mode, KeyMode::Natural)?;
            ensure_key_mode(partition, state.key_mode, key.mode())?;
            let seq = match state.seq_by_key.get(key) {
                Some(seq) => *seq,
                None => {
                    let seq = state.allocate_seq();
                    state.seq_by_key.insert(key.clone(), seq);
                    seq
                }
            };
            state.by_seq.insert(
                seq,
                StoredRecord {
                    key: key.clone(),
                    value,
                },
            );
            Ok(())
        })
    }

    async fn get(&self, partition: &str, key: &RecordKey) -> Result<Option<serde_json::Value>> {
        self.with_partition(partition, |state| {
            ensure_key_mode(partition, state.key_mode, key.mode())?;
            Ok(state
                .seq_by_key
                .get(key)
                .and_then(|seq| state.by_seq.get(seq))
                .map(|record| record.value.clone()))
        })
    }

    async fn get_all(&self, partition: &str) -> Result<Vec<StoredRecord>> {
        self.with_partition(partition, |state| Ok(state.by_seq.values().cloned().collect()))
    }

    async fn delete(&self, partition: &str, key: &RecordKey) -> Result<bool> {
        self.check_writable()?;
        self.with_partition(partition, |state| {
            ensure_key_mode(partition, state.key_mode, key.mode())?;
            match state.seq_by_key.remove(key) {
                Some(seq) => Ok(state.by_seq.remove(&seq).is_some()),
                None => Ok(false),
            }
        })
    }

    async fn count(&self, partition: &str) -> Result<u64> {
        self.with_partition(partition, |state| {
            Ok(u64::try_from(state.by_seq.len()).unwrap_or(u64::MAX))
        })
    }
}
