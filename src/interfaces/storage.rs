use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::domains::records::{field_bool, field_ts, Table};
use crate::error::{LifehubError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    Eq(String, Value),
    IsNull(String),
    NotNull(String),
    /// Timestamp field at or after the given Unix second.
    Since(String, i64),
    /// Timestamp field strictly before the given Unix second.
    Before(String, i64),
}

impl FieldFilter {
    fn matches(&self, row: &Value) -> bool {
        match self {
            Self::Eq(field, expected) => row.get(field) == Some(expected),
            Self::IsNull(field) => row.get(field).map_or(true, Value::is_null),
            Self::NotNull(field) => row.get(field).is_some_and(|v| !v.is_null()),
            Self::Since(field, ts) => field_ts(row, field).is_some_and(|v| v >= *ts),
            Self::Before(field, ts) => field_ts(row, field).is_some_and(|v| v < *ts),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// `select(filter, order, limit)` against one table, always scoped to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub user_id: String,
    pub filters: Vec<FieldFilter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push(FieldFilter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.filters.push(FieldFilter::IsNull(field.to_string()));
        self
    }

    pub fn not_null(mut self, field: &str) -> Self {
        self.filters.push(FieldFilter::NotNull(field.to_string()));
        self
    }

    pub fn since(mut self, field: &str, ts: i64) -> Self {
        self.filters.push(FieldFilter::Since(field.to_string(), ts));
        self
    }

    pub fn before(mut self, field: &str, ts: i64) -> Self {
        self.filters.push(FieldFilter::Before(field.to_string(), ts));
        self
    }

    pub fn order_desc(mut self, field: &str) -> Self {
        self.order.push(OrderBy {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    pub fn order_asc(mut self, field: &str) -> Self {
        self.order.push(OrderBy {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get("user_id").and_then(|v| v.as_str()) == Some(self.user_id.as_str())
            && self.filters.iter().all(|filter| filter.matches(row))
    }

    /// Filters, orders and truncates rows already loaded for this table.
    /// The sort is stable, so rows that tie on every key keep store order.
    pub fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
        let mut rows: Vec<Value> = rows.into_iter().filter(|row| self.matches(row)).collect();
        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                self.order.iter().fold(Ordering::Equal, |acc, order| {
                    acc.then_with(|| {
                        let ord = compare_field(a, b, &order.field);
                        if order.descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                })
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Missing and null values sort before anything present.
fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let left = a.get(field).filter(|v| !v.is_null());
    let right = b.get(field).filter(|v| !v.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Bool(_)), Some(Value::Bool(_))) => {
            field_bool(a, field).cmp(&field_bool(b, field))
        }
        (Some(Value::Number(l)), Some(Value::Number(r))) => l
            .as_f64()
            .unwrap_or_default()
            .total_cmp(&r.as_f64().unwrap_or_default()),
        _ => match (field_ts(a, field), field_ts(b, field)) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => a
                .get(field)
                .and_then(|v| v.as_str())
                .cmp(&b.get(field).and_then(|v| v.as_str())),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Pushed on the store's change channel after every successful write.
/// For deletes `row` carries the last stored version.
#[derive(Debug, Clone, Serialize)]
pub struct RowChange {
    pub table: Table,
    pub kind: ChangeKind,
    pub user_id: String,
    pub row: Value,
}

/// Row-level storage collaborator. Every call is scoped to one user; a store
/// never returns or mutates rows belonging to another `user_id`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: Table, query: RowQuery) -> Result<Vec<Value>>;

    /// Stores `row` for `user_id` and returns it with `id`, `user_id` and a
    /// defaulted `created_at` filled in.
    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value>;

    /// Merges `patch` into the row; `None` when no such row exists for the user.
    async fn update(
        &self,
        table: Table,
        user_id: &str,
        id: i64,
        patch: Value,
    ) -> Result<Option<Value>>;

    async fn delete(&self, table: Table, user_id: &str, id: i64) -> Result<bool>;

    fn subscribe(&self) -> broadcast::Receiver<RowChange>;

    async fn find_one(&self, table: Table, query: RowQuery) -> Result<Option<Value>> {
        Ok(self.select(table, query.limit(1)).await?.into_iter().next())
    }
}

pub(crate) fn object_of(row: Value) -> Result<Map<String, Value>> {
    match row {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(LifehubError::Storage(format!(
            "row must be a JSON object, got {other}"
        ))),
    }
}

/// Applies the defaults a fresh row gets from the store.
pub(crate) fn stamp_new_row(
    mut row: Map<String, Value>,
    id: i64,
    user_id: &str,
    now: i64,
) -> Value {
    row.insert("id".to_string(), Value::from(id));
    row.insert("user_id".to_string(), Value::from(user_id));
    if row.get("created_at").map_or(true, Value::is_null) {
        row.insert("created_at".to_string(), Value::from(now));
    }
    Value::Object(row)
}

/// Shallow merge; `id` and `user_id` are never overwritten.
pub(crate) fn merge_patch(row: &mut Value, patch: Map<String, Value>) {
    if let Value::Object(target) = row {
        for (key, value) in patch {
            if key == "id" || key == "user_id" {
                continue;
            }
            target.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn query_filters_orders_and_limits() {
        let rows = vec![
            json!({"id": 1, "user_id": "u", "created_at": 10, "end_time": null}),
            json!({"id": 2, "user_id": "u", "created_at": 30, "end_time": 40}),
            json!({"id": 3, "user_id": "other", "created_at": 50, "end_time": 60}),
            json!({"id": 4, "user_id": "u", "created_at": 20, "end_time": 25}),
        ];
        let query = RowQuery::for_user("u")
            .not_null("end_time")
            .order_desc("created_at")
            .limit(5);
        let ids: Vec<_> = query
            .apply(rows.clone())
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 4]);

        let open = RowQuery::for_user("u").is_null("end_time").apply(rows.clone());
        assert_eq!(open.len(), 1);

        let since = RowQuery::for_user("u").since("created_at", 20).apply(rows);
        assert_eq!(since.len(), 2);
    }

    #[test]
    fn bool_then_timestamp_ordering() {
        let rows = vec![
            json!({"id": 1, "user_id": "u", "completed": true, "created_at": 5}),
            json!({"id": 2, "user_id": "u", "completed": false, "created_at": 1}),
            json!({"id": 3, "user_id": "u", "completed": false, "created_at": 9}),
        ];
        let ids: Vec<_> = RowQuery::for_user("u")
            .order_asc("completed")
            .order_desc("created_at")
            .apply(rows)
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn patch_keeps_identity() {
        let mut row = json!({"id": 1, "user_id": "u", "comments": null});
        let patch = object_of(json!({"id": 9, "user_id": "x", "comments": "ok"})).unwrap();
        merge_patch(&mut row, patch);
        assert_eq!(row, json!({"id": 1, "user_id": "u", "comments": "ok"}));
        assert!(object_of(json!([1])).is_err());
    }
}
