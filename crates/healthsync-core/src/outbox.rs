//! Durable, ordered queue of mutations the remote authority has not confirmed yet.
//!
//! Any caller may append. Removal is crate-private and only the sync processor
//! calls it, after the remote authority has confirmed the specific id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::models::{MutationAction, OutboxEntry};
use crate::store::{PartitionSpec, RecordKey, StoreBackend, StoredRecord};

pub const DEFAULT_OUTBOX_PARTITION: &str = "outbox";

#[derive(Debug, Serialize, Deserialize)]
struct StoredMutation {
    #[serde(rename = "type")]
    entry_type: String,
    action: MutationAction,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

pub struct Outbox {
    store: Arc<dyn StoreBackend>,
    partition: String,
    write_gate: Mutex<()>,
    revision: watch::Sender<u64>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

impl Outbox {
    pub async fn open(store: Arc<dyn StoreBackend>, partition: impl Into<String>) -> Result<Self> {
        let partition = partition.into();
        store
            .open_partition(&PartitionSpec::sequence(partition.clone()))
            .await?;
        let (revision, _) = watch::channel(0);
        Ok(Self {
            store,
            partition,
            write_gate: Mutex::new(()),
            revision,
        })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Persists the mutation before returning. A storage failure is returned to
    /// the caller; nothing is queued in that case.
    pub async fn enqueue(
        &self,
        entry_type: &str,
        action: MutationAction,
        payload: impl Serialize,
    ) -> Result<OutboxEntry> {
        let entry_type = entry_type.trim();
        if entry_type.is_empty() {
            return Err(SyncError::Validation(
                "outbox entry type must not be empty".to_string(),
            ));
        }
        let payload = serde_json::to_value(payload)?;
        let record = StoredMutation {
            entry_type: entry_type.to_string(),
            action,
            payload,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&record)?;

        let appended = {
            let _gate = self.write_gate.lock().await;
            self.store.append(&self.partition, value).await
        };
        let id = appended.inspect_err(|err| {
            warn!(
                partition = %self.partition,
                entry_type,
                error = %err,
                "outbox enqueue failed"
            );
        })?;
        self.bump_revision();
        debug!(partition = %self.partition, id, entry_type, %action, "outbox entry queued");

        Ok(OutboxEntry {
            id,
            entry_type: record.entry_type,
            action: record.action,
            payload: record.payload,
            created_at: record.created_at,
        })
    }

    /// All pending entries in insertion order.
    pub async fn list_pending(&self) -> Result<Vec<OutboxEntry>> {
        let records = self.store.get_all(&self.partition).await?;
        records
            .into_iter()
            .map(|record| decode_entry(&self.partition, record))
            .collect()
    }

    pub async fn pending_count(&self) -> Result<u64> {
        self.store.count(&self.partition).await
    }

    /// Idempotent: an absent id yields `Ok(false)`.
    pub(crate) async fn remove(&self, id: i64) -> Result<bool> {
        let removed = {
            let _gate = self.write_gate.lock().await;
            self.store
                .delete(&self.partition, &RecordKey::Seq(id))
                .await?
        };
        if removed {
            self.bump_revision();
        }
        Ok(removed)
    }

    /// Revision counter bumped after every successful append or removal.
    pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump_revision(&self) {
        self.revision
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

fn decode_entry(partition: &str, record: StoredRecord) -> Result<OutboxEntry> {
    let Some(id) = record.key.as_seq() else {
        return Err(SyncError::Persistence(format!(
            "outbox partition {partition} holds a non-sequence key {}",
            record.key
        )));
    };
    let stored = serde_json::from_value::<StoredMutation>(record.value).map_err(|err| {
        SyncError::Persistence(format!("corrupt outbox entry {partition}/#{id}: {err}"))
    })?;
    Ok(OutboxEntry {
        id,
        entry_type: stored.entry_type,
        action: stored.action,
        payload: stored.payload,
        created_at: stored.created_at,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::error::ErrorClass;
    use crate::store::MemoryStore;

    async fn memory_outbox(store: &MemoryStore) -> Outbox {
        Outbox::open(Arc::new(store.clone()), DEFAULT_OUTBOX_PARTITION)
            .await
            .expect("open outbox")
    }

    #[tokio::test]
    async fn enqueue_assigns_ids_and_lists_in_insertion_order() {
        let store = MemoryStore::new();
        let outbox = memory_outbox(&store).await;

        let a = outbox
            .enqueue("vitals", MutationAction::Create, json!({"bpm": 61}))
            .await
            .expect("a");
        let b = outbox
            .enqueue("appointment", MutationAction::Update, json!({"slot": "10:30"}))
            .await
            .expect("b");
        let c = outbox
            .enqueue("cart_item", MutationAction::Delete, json!({"sku": "vit-d"}))
            .await
            .expect("c");

        let pending = outbox.list_pending().await.expect("list");
        assert_eq!(pending, vec![a.clone(), b, c]);
        assert_eq!(pending[0].payload, json!({"bpm": 61}));
        assert_eq!(outbox.pending_count().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn entries_survive_restart_unchanged() {
        let store = MemoryStore::new();
        let before = {
            let outbox = memory_outbox(&store).await;
            for n in 0..5 {
                outbox
                    .enqueue("note", MutationAction::Create, json!({"n": n}))
                    .await
                    .expect("enqueue");
            }
            outbox.list_pending().await.expect("list before")
        };

        let restarted = memory_outbox(&store).await;
        let after = restarted.list_pending().await.expect("list after");
        assert_eq!(after, before);
        assert_eq!(after.len(), 5);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = MemoryStore::new();
        let outbox = memory_outbox(&store).await;
        let entry = outbox
            .enqueue("note", MutationAction::Create, json!({}))
            .await
            .expect("enqueue");

        assert!(outbox.remove(entry.id).await.expect("first remove"));
        assert!(!outbox.remove(entry.id).await.expect("second remove"));
        assert!(!outbox.remove(9_999).await.expect("unknown id"));
        assert_eq!(outbox.pending_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_to_the_caller() {
        let store = MemoryStore::new();
        let outbox = memory_outbox(&store).await;
        store.set_fail_writes(true);

        let err = outbox
            .enqueue("vitals", MutationAction::Create, json!({"bpm": 70}))
            .await
            .expect_err("enqueue must fail loudly");
        assert_eq!(err.class(), ErrorClass::Persistence);

        store.set_fail_writes(false);
        assert!(outbox.list_pending().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn rejects_blank_type_and_unserializable_payloads() {
        let store = MemoryStore::new();
        let outbox = memory_outbox(&store).await;

        assert!(matches!(
            outbox
                .enqueue("  ", MutationAction::Create, json!({}))
                .await,
            Err(SyncError::Validation(_))
        ));

        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys cannot become json object keys");
        assert!(matches!(
            outbox.enqueue("note", MutationAction::Create, bad).await,
            Err(SyncError::Json(_))
        ));
        assert_eq!(outbox.pending_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn revisions_bump_on_append_and_effective_remove() {
        let store = MemoryStore::new();
        let outbox = memory_outbox(&store).await;
        let revisions = outbox.subscribe_revisions();
        assert_eq!(*revisions.borrow(), 0);

        let entry = outbox
            .enqueue("note", MutationAction::Create, json!({}))
            .await
            .expect("enqueue");
        assert_eq!(*revisions.borrow(), 1);

        outbox.remove(entry.id).await.expect("remove");
        assert_eq!(*revisions.borrow(), 2);

        outbox.remove(entry.id).await.expect("remove again");
        assert_eq!(*revisions.borrow(), 2);
    }
}
