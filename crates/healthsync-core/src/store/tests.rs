use serde_json::json;
use tempfile::tempdir;

use super::*;
use crate::error::ErrorClass;

fn backends() -> Vec<Box<dyn StoreBackend>> {
    vec![
        Box::new(MemoryStore::new()),
        Box::new(SqliteStore::open_in_memory().expect("sqlite in memory")),
    ]
}

#[tokio::test]
async fn append_assigns_increasing_ids_in_insertion_order() {
    for store in backends() {
        store
            .open_partition(&PartitionSpec::sequence("outbox"))
            .await
            .expect("open");
        let a = store.append("outbox", json!({"n": "a"})).await.expect("a");
        let b = store.append("outbox", json!({"n": "b"})).await.expect("b");
        let c = store.append("outbox", json!({"n": "c"})).await.expect("c");
        assert!(a < b && b < c, "{store:?}");

        let all = store.get_all("outbox").await.expect("get_all");
        let keys = all.iter().map(|r| r.key.clone()).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![RecordKey::Seq(a), RecordKey::Seq(b), RecordKey::Seq(c)]
        );
        assert_eq!(all[1].value, json!({"n": "b"}));
    }
}

#[tokio::test]
async fn sequence_ids_are_not_reused_after_delete() {
    for store in backends() {
        store
            .open_partition(&PartitionSpec::sequence("outbox"))
            .await
            .expect("open");
        let first = store.append("outbox", json!(1)).await.expect("first");
        assert!(
            store
                .delete("outbox", &RecordKey::Seq(first))
                .await
                .expect("delete")
        );
        let second = store.append("outbox", json!(2)).await.expect("second");
        assert!(second > first);
    }
}

#[tokio::test]
async fn delete_of_absent_key_is_a_noop() {
    for store in backends() {
        store
            .open_partition(&PartitionSpec::sequence("outbox"))
            .await
            .expect("open");
        let removed = store
            .delete("outbox", &RecordKey::Seq(42))
            .await
            .expect("delete absent");
        assert!(!removed);
        assert_eq!(store.count("outbox").await.expect("count"), 0);
    }
}

#[tokio::test]
async fn put_replaces_whole_record_by_natural_key() {
    for store in backends() {
        store
            .open_partition(&PartitionSpec::natural("cache.doctors"))
            .await
            .expect("open");
        let key = RecordKey::natural("dr-1");
        store
            .put("cache.doctors", &key, json!({"name": "Ada", "room": 4}))
            .await
            .expect("put1");
        store
            .put("cache.doctors", &key, json!({"name": "Ada L."}))
            .await
            .expect("put2");

        let value = store.get("cache.doctors", &key).await.expect("get");
        assert_eq!(value, Some(json!({"name": "Ada L."})));
        assert_eq!(store.count("cache.doctors").await.expect("count"), 1);
    }
}

#[tokio::test]
async fn partitions_are_independent() {
    for store in backends() {
        store
            .open_partition(&PartitionSpec::sequence("outbox"))
            .await
            .expect("open outbox");
        store
            .open_partition(&PartitionSpec::natural("cache.products"))
            .await
            .expect("open cache");
        store.append("outbox", json!("m")).await.expect("append");
        store
            .put("cache.products", &RecordKey::natural("p1"), json!("p"))
            .await
            .expect("put");

        assert_eq!(store.count("outbox").await.expect("outbox count"), 1);
        assert_eq!(store.count("cache.products").await.expect("cache count"), 1);
        assert_eq!(
            store
                .get("cache.products", &RecordKey::natural("p1"))
                .await
                .expect("get"),
            Some(json!("p"))
        );
    }
}

#[tokio::test]
async fn unopened_partition_is_a_persistence_error() {
    for store in backends() {
        let err = store
            .append("missing", json!(1))
            .await
            .expect_err("append to unopened partition");
        assert_eq!(err.class(), crate::error::ErrorClass::Persistence);
    }
}

#[tokio::test]
async fn reopening_with_other_key_mode_is_rejected() {
    for store in backends() {
        store
            .open_partition(&PartitionSpec::sequence("outbox"))
            .await
            .expect("open");
        store
            .open_partition(&PartitionSpec::sequence("outbox"))
            .await
            .expect("reopen same mode");
        let err = store
            .open_partition(&PartitionSpec::natural("outbox"))
            .await
            .expect_err("mode mismatch");
        assert!(matches!(err, SyncError::Validation(_)));
    }
}

#[tokio::test]
async fn append_on_natural_partition_is_rejected() {
    for store in backends() {
        store
            .open_partition(&PartitionSpec::natural("cache.labs"))
            .await
            .expect("open");
        assert!(store.append("cache.labs", json!(1)).await.is_err());
        assert!(
            store
                .put("cache.labs", &RecordKey::Seq(1), json!(1))
                .await
                .is_err()
        );
    }
}

#[tokio::test]
async fn invalid_partition_names_are_rejected() {
    let store = MemoryStore::new();
    let too_long = "x".repeat(65);
    for name in ["", "has space", "slash/name", too_long.as_str()] {
        assert!(
            store
                .open_partition(&PartitionSpec::natural(name))
                .await
                .is_err(),
            "{name:?}"
        );
    }
}

#[tokio::test]
async fn memory_store_write_failures_surface_as_persistence_errors() {
    let store = MemoryStore::new();
    store
        .open_partition(&PartitionSpec::sequence("outbox"))
        .await
        .expect("open");
    store.set_fail_writes(true);
    let err = store.append("outbox", json!(1)).await.expect_err("append");
    assert_eq!(err.class(), crate::error::ErrorClass::Persistence);
    store.set_fail_writes(false);
    assert_eq!(store.count("outbox").await.expect("count"), 0);
}

#[tokio::test]
async fn sqlite_records_survive_reopen() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("nested").join("state.db");
    let (first, second) = {
        let store = SqliteStore::open(&db_path).expect("open");
        store
            .open_partition(&PartitionSpec::sequence("outbox"))
            .await
            .expect("partition");
        let first = store.append("outbox", json!({"v": 1})).await.expect("1");
        let second = store.append("outbox", json!({"v": 2})).await.expect("2");
        (first, second)
    };

    let reopened = SqliteStore::open(&db_path).expect("reopen");
    reopened
        .open_partition(&PartitionSpec::sequence("outbox"))
        .await
        .expect("partition again");
    let all = reopened.get_all("outbox").await.expect("get_all");
    assert_eq!(
        all,
        vec![
            StoredRecord {
                key: RecordKey::Seq(first),
                value: json!({"v": 1}),
            },
            StoredRecord {
                key: RecordKey::Seq(second),
                value: json!({"v": 2}),
            },
        ]
    );
    let third = reopened.append("outbox", json!({"v": 3})).await.expect("3");
    assert!(third > second);
    assert_eq!(
        reopened.schema_version().expect("schema version"),
        Some(super::migration::SCHEMA_VERSION)
    );
}

#[test]
fn open_rejects_newer_or_corrupt_schema_version() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("state.db");
    drop(SqliteStore::open(&db_path).expect("create"));

    for recorded in ["99", "x"] {
        let conn = rusqlite::Connection::open(&db_path).expect("raw connection");
        conn.execute(
            "UPDATE system_kv SET value = ?1 WHERE key = 'schema_version'",
            [recorded],
        )
        .expect("overwrite schema_version");
        drop(conn);

        let err = SqliteStore::open(&db_path).expect_err("schema must be rejected");
        assert_eq!(err.class(), ErrorClass::Persistence, "{recorded}: {err}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn open_hardens_state_db_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("state.db");
    let _store = SqliteStore::open(&db_path).expect("open");

    let mode = std::fs::metadata(&db_path)
        .expect("metadata")
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600);
}
