#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use lifehub::domains::records::Table;
use lifehub::error::{LifehubError, Result};
use lifehub::interfaces::providers::{ChatCompletionRequest, LlmProvider};
use lifehub::interfaces::storage::{RecordStore, RowChange, RowQuery};
use lifehub::providers::memory::InMemoryRecordStore;
use lifehub::services::history::HistoryService;
use lifehub::UserContext;

/// 2025-03-05T00:00:00Z, a Wednesday.
pub const WED: i64 = 1_741_132_800;
pub const HOUR: i64 = 3_600;
pub const MINUTE: i64 = 60;

pub fn alice() -> UserContext {
    UserContext::authenticated("alice")
}

pub fn bob() -> UserContext {
    UserContext::authenticated("bob")
}

pub fn history_over(store: Arc<dyn RecordStore>) -> Arc<HistoryService> {
    Arc::new(HistoryService::new(store, time::UtcOffset::UTC))
}

/// Model stand-in that replays queued replies and remembers every request.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String>>>,
    pub requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub async fn calls(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String> {
        self.requests.lock().await.push(request);
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("scripted reply".to_string()))
    }
}

/// Delegates to an in-memory store but misbehaves on one table.
pub struct FaultyStore {
    pub inner: InMemoryRecordStore,
    table: Table,
    fault: Fault,
}

#[derive(Clone, Copy)]
pub enum Fault {
    Fail,
    Stall(Duration),
    /// Reads the rows, then holds on to them before answering.
    SlowRead(Duration),
}

impl FaultyStore {
    pub fn new(table: Table, fault: Fault) -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            table,
            fault,
        }
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn select(&self, table: Table, query: RowQuery) -> Result<Vec<Value>> {
        if table == self.table {
            match self.fault {
                Fault::Fail => {
                    return Err(LifehubError::Storage(format!("{table} is unavailable")))
                }
                Fault::Stall(delay) => tokio::time::sleep(delay).await,
                Fault::SlowRead(delay) => {
                    let rows = self.inner.select(table, query).await?;
                    tokio::time::sleep(delay).await;
                    return Ok(rows);
                }
            }
        }
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value> {
        self.inner.insert(table, user_id, row).await
    }

    async fn update(
        &self,
        table: Table,
        user_id: &str,
        id: i64,
        patch: Value,
    ) -> Result<Option<Value>> {
        self.inner.update(table, user_id, id, patch).await
    }

    async fn delete(&self, table: Table, user_id: &str, id: i64) -> Result<bool> {
        self.inner.delete(table, user_id, id).await
    }

    fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.inner.subscribe()
    }
}
