use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use time::UtcOffset;
use tracing::{debug, warn};

use crate::domains::history::{EventType, HistoryEvent};
use crate::domains::user::UserContext;
use crate::error::{LifehubError, Result};
use crate::interfaces::storage::{RecordStore, RowQuery};
use crate::local_time::{now_ts, start_of_day};
use crate::services::normalizer::normalize_row;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
/// Upper bound for a single day's window handed to the summary builder.
pub const MAX_DAY_EVENTS: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub since: Option<i64>,
}

impl HistoryQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            since: None,
        }
    }

    pub fn since(mut self, ts: i64) -> Self {
        self.since = Some(ts);
        self
    }
}

/// Fans out one read per event type, normalizes, and merges into a single
/// newest-first window for one user.
pub struct HistoryService {
    store: Arc<dyn RecordStore>,
    default_limit: usize,
    fetch_timeout: Duration,
    offset: UtcOffset,
}

impl HistoryService {
    pub fn new(store: Arc<dyn RecordStore>, offset: UtcOffset) -> Self {
        Self {
            store,
            default_limit: DEFAULT_HISTORY_LIMIT,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            offset,
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Any failed or timed-out source read fails the whole call; a partial
    /// feed is never returned.
    pub async fn recent(
        &self,
        ctx: &UserContext,
        query: HistoryQuery,
    ) -> Result<Vec<HistoryEvent>> {
        let user_id = ctx.require()?;
        let limit = query.limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let reads = EventType::ALL
            .into_iter()
            .map(|kind| self.fetch_kind(user_id, kind, query.since, limit));
        let mut events = Vec::new();
        for outcome in join_all(reads).await {
            events.extend(outcome?);
        }
        let merged = merge_events(events, limit);
        debug!(user_id, count = merged.len(), limit, "history aggregated");
        Ok(merged)
    }

    /// Today's events (local day of the configured offset), newest first.
    pub async fn today(&self, ctx: &UserContext) -> Result<Vec<HistoryEvent>> {
        self.today_at(ctx, now_ts()).await
    }

    pub async fn today_at(&self, ctx: &UserContext, now: i64) -> Result<Vec<HistoryEvent>> {
        let since = start_of_day(now, self.offset);
        self.recent(ctx, HistoryQuery::latest(MAX_DAY_EVENTS).since(since))
            .await
    }

    async fn fetch_kind(
        &self,
        user_id: &str,
        kind: EventType,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<HistoryEvent>> {
        let field = kind.timestamp_field();
        let mut query = RowQuery::for_user(user_id).order_desc(field).limit(limit);
        if kind.requires_end_marker() {
            query = query.not_null(field);
        }
        if let Some(since) = since {
            query = query.since(field, since);
        }

        let table = kind.table();
        let read = tokio::time::timeout(self.fetch_timeout, self.store.select(table, query));
        let rows = match read.await {
            Ok(Ok(rows)) => rows,
            Ok(Err(err)) => {
                warn!(table = table.name(), error = %err, "history source read failed");
                return Err(err);
            }
            Err(_) => {
                warn!(table = table.name(), "history source read timed out");
                return Err(LifehubError::Timeout {
                    operation: format!("reading {table}"),
                    seconds: self.fetch_timeout.as_secs(),
                });
            }
        };

        Ok(rows
            .iter()
            .filter_map(|row| normalize_row(kind, row, self.offset))
            .collect())
    }
}

/// Dedups by `(type, id)` keeping the first occurrence, sorts newest first
/// (stable for ties), and truncates to `limit`.
pub fn merge_events(events: Vec<HistoryEvent>, limit: usize) -> Vec<HistoryEvent> {
    let mut seen = HashSet::new();
    let mut merged: Vec<HistoryEvent> = events
        .into_iter()
        .filter(|event| seen.insert(event.key()))
        .collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventType, id: i64, timestamp: i64) -> HistoryEvent {
        HistoryEvent {
            id,
            event_type: kind,
            timestamp,
            content: format!("{kind}-{id}"),
            secondary_info: None,
            mood: None,
        }
    }

    #[test]
    fn merge_dedups_by_type_and_id_only() {
        let merged = merge_events(
            vec![
                event(EventType::Task, 1, 10),
                event(EventType::Meal, 1, 20),
                event(EventType::Task, 1, 30),
            ],
            10,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].event_type, EventType::Meal);
        assert_eq!(merged[1].timestamp, 10);
    }

    #[test]
    fn merge_keeps_input_order_for_ties() {
        let merged = merge_events(
            vec![
                event(EventType::Task, 1, 5),
                event(EventType::Meal, 2, 5),
                event(EventType::Journal, 3, 9),
            ],
            2,
        );
        let keys: Vec<_> = merged.iter().map(HistoryEvent::key).collect();
        assert_eq!(keys, vec![(EventType::Journal, 3), (EventType::Task, 1)]);
    }
}
