mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use common::{alice, history_over, HOUR, WED};
use lifehub::domains::records::Table;
use lifehub::interfaces::storage::{ChangeKind, RecordStore, RowQuery};
use lifehub::providers::memory::InMemoryRecordStore;
use lifehub::providers::sqlite::SqliteRecordStore;
use lifehub::services::history::HistoryQuery;

async fn open(dir: &TempDir) -> SqliteRecordStore {
    let path = dir.path().join("nested").join("lifehub.db");
    SqliteRecordStore::new(path.to_str().unwrap()).await.unwrap()
}

#[tokio::test]
async fn crud_is_scoped_to_the_owner() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let row = store
        .insert(
            Table::Tasks,
            "alice",
            json!({"description": "Buy milk", "completed": false, "created_at": WED}),
        )
        .await
        .unwrap();
    let id = row["id"].as_i64().unwrap();
    assert!(id > 0);
    assert_eq!(row["user_id"], "alice");

    assert!(store
        .select(Table::Tasks, RowQuery::for_user("bob"))
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .update(Table::Tasks, "bob", id, json!({"completed": true}))
        .await
        .unwrap()
        .is_none());
    assert!(!store.delete(Table::Tasks, "bob", id).await.unwrap());

    let updated = store
        .update(Table::Tasks, "alice", id, json!({"completed": true, "user_id": "bob"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["completed"], true);
    assert_eq!(updated["user_id"], "alice");

    let rows = store
        .select(Table::Tasks, RowQuery::for_user("alice").eq("completed", true))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["description"], "Buy milk");

    assert!(store.delete(Table::Tasks, "alice", id).await.unwrap());
    assert!(store
        .find_one(Table::Tasks, RowQuery::for_user("alice"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn tables_do_not_leak_into_each_other() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .insert(Table::Meals, "alice", json!({"name": "Eggs", "calories": 300}))
        .await
        .unwrap();

    assert!(store
        .select(Table::Tasks, RowQuery::for_user("alice"))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .select(Table::Meals, RowQuery::for_user("alice"))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn writes_are_published_on_the_change_channel() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let mut changes = store.subscribe();

    let row = store
        .insert(Table::JournalEntries, "alice", json!({"content": "hi", "mood": "happy"}))
        .await
        .unwrap();
    let id = row["id"].as_i64().unwrap();
    store
        .update(Table::JournalEntries, "alice", id, json!({"mood": "tired"}))
        .await
        .unwrap();
    store.delete(Table::JournalEntries, "alice", id).await.unwrap();

    let inserted = changes.recv().await.unwrap();
    assert_eq!(inserted.kind, ChangeKind::Insert);
    assert_eq!(inserted.table, Table::JournalEntries);
    assert_eq!(inserted.row["id"], id);
    let updated = changes.recv().await.unwrap();
    assert_eq!(updated.kind, ChangeKind::Update);
    assert_eq!(updated.row["mood"], "tired");
    let deleted = changes.recv().await.unwrap();
    assert_eq!(deleted.kind, ChangeKind::Delete);
    assert_eq!(deleted.user_id, "alice");
}

#[tokio::test]
async fn rows_survive_reopening_and_feed_history() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir).await;
        store
            .insert(
                Table::Tasks,
                "alice",
                json!({"description": "Buy milk", "created_at": WED + 9 * HOUR}),
            )
            .await
            .unwrap();
        store
            .insert(
                Table::SleepLogs,
                "alice",
                json!({"bed_time": WED, "wake_time": WED + 7 * HOUR, "duration_minutes": 405}),
            )
            .await
            .unwrap();
    }

    let store = Arc::new(open(&dir).await);
    let events = history_over(store)
        .recent(&alice(), HistoryQuery::latest(10))
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].content, "Buy milk");
    assert_eq!(events[1].content, "Slept for 6h 45m");
}

#[tokio::test]
async fn sql_filters_match_in_memory_semantics() {
    let dir = TempDir::new().unwrap();
    let sqlite = open(&dir).await;
    let memory = InMemoryRecordStore::new();
    let rows = [
        json!({"name": "a", "created_at": WED, "end_time": null, "completed": true}),
        json!({"name": "b", "created_at": "2025-03-05T02:00:00Z", "end_time": WED + HOUR}),
        json!({"name": "c", "created_at": (WED + 3 * HOUR).to_string(), "completed": false}),
        json!({"name": "d", "end_time": WED, "completed": true, "date": "someday"}),
        json!({"name": "e", "created_at": WED + 4 * HOUR, "date": "2025-03-09", "calories": 2.5}),
    ];
    for row in rows {
        sqlite.insert(Table::Meals, "alice", row.clone()).await.unwrap();
        memory.insert(Table::Meals, "alice", row).await.unwrap();
    }
    sqlite
        .insert(Table::Meals, "bob", json!({"name": "z", "created_at": WED}))
        .await
        .unwrap();

    let queries = [
        RowQuery::for_user("alice").order_desc("created_at"),
        RowQuery::for_user("alice").order_desc("created_at").limit(2),
        RowQuery::for_user("alice").since("created_at", WED + HOUR),
        RowQuery::for_user("alice").before("created_at", WED + 3 * HOUR),
        RowQuery::for_user("alice").is_null("end_time"),
        RowQuery::for_user("alice").not_null("end_time").order_asc("end_time"),
        RowQuery::for_user("alice").eq("completed", true),
        RowQuery::for_user("alice").eq("name", "c"),
        RowQuery::for_user("alice").eq("calories", 2.5),
        RowQuery::for_user("alice").order_asc("completed").order_desc("created_at"),
        RowQuery::for_user("alice").order_desc("date").limit(3),
        RowQuery::for_user("alice").order_desc("completed").order_desc("id"),
    ];
    for query in queries {
        let names = |rows: Vec<serde_json::Value>| -> Vec<String> {
            rows.iter().map(|r| r["name"].as_str().unwrap().to_string()).collect()
        };
        let from_sql = names(sqlite.select(Table::Meals, query.clone()).await.unwrap());
        let from_memory = names(memory.select(Table::Meals, query.clone()).await.unwrap());
        assert_eq!(from_sql, from_memory, "{query:?}");
    }
}

#[tokio::test]
async fn unusual_field_names_are_refused() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let err = store
        .select(
            Table::Tasks,
            RowQuery::for_user("alice").order_desc("created_at') --"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, lifehub::LifehubError::Storage(_)));
}
