use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::domains::records::{field_i64, Table};
use crate::error::Result;
use crate::interfaces::storage::{
    merge_patch, object_of, stamp_new_row, ChangeKind, RecordStore, RowChange, RowQuery,
};
use crate::local_time::now_ts;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<Table, Vec<Value>>>,
    next_id: AtomicI64,
    changes: broadcast::Sender<RowChange>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            tables: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            changes,
        }
    }

    /// Stores a row verbatim, keeping its `id`, without notifying subscribers.
    #[doc(hidden)]
    pub async fn seed(&self, table: Table, row: Value) {
        if let Some(id) = field_i64(&row, "id") {
            self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        }
        let mut guard = self.tables.write().await;
        guard.entry(table).or_default().push(row);
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn publish(&self, table: Table, kind: ChangeKind, user_id: &str, row: &Value) {
        // No receivers is the normal state when nothing is mounted.
        let _ = self.changes.send(RowChange {
            table,
            kind,
            user_id: user_id.to_string(),
            row: row.clone(),
        });
    }
}

fn owned_by(row: &Value, user_id: &str, id: i64) -> bool {
    field_i64(row, "id") == Some(id)
        && row.get("user_id").and_then(|v| v.as_str()) == Some(user_id)
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select(&self, table: Table, query: RowQuery) -> Result<Vec<Value>> {
        let guard = self.tables.read().await;
        let rows = guard.get(&table).cloned().unwrap_or_default();
        Ok(query.apply(rows))
    }

    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value> {
        let fields = object_of(row)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = stamp_new_row(fields, id, user_id, now_ts());
        {
            let mut guard = self.tables.write().await;
            guard.entry(table).or_default().push(stored.clone());
        }
        self.publish(table, ChangeKind::Insert, user_id, &stored);
        Ok(stored)
    }

    async fn update(
        &self,
        table: Table,
        user_id: &str,
        id: i64,
        patch: Value,
    ) -> Result<Option<Value>> {
        let patch = object_of(patch)?;
        let updated = {
            let mut guard = self.tables.write().await;
            let Some(row) = guard
                .get_mut(&table)
                .and_then(|rows| rows.iter_mut().find(|row| owned_by(row, user_id, id)))
            else {
                return Ok(None);
            };
            merge_patch(row, patch);
            row.clone()
        };
        self.publish(table, ChangeKind::Update, user_id, &updated);
        Ok(Some(updated))
    }

    async fn delete(&self, table: Table, user_id: &str, id: i64) -> Result<bool> {
        let removed = {
            let mut guard = self.tables.write().await;
            let Some(rows) = guard.get_mut(&table) else {
                return Ok(false);
            };
            let Some(pos) = rows.iter().position(|row| owned_by(row, user_id, id)) else {
                return Ok(false);
            };
            rows.remove(pos)
        };
        self.publish(table, ChangeKind::Delete, user_id, &removed);
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.changes.subscribe()
    }
}
