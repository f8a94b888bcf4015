use std::path::Path;

use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Double, Nullable, Text};
use diesel::sqlite::{Sqlite, SqliteConnection};
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domains::records::Table;
use crate::error::{LifehubError, Result};
use crate::interfaces::storage::{
    merge_patch, object_of, stamp_new_row, ChangeKind, FieldFilter, RecordStore, RowChange,
    RowQuery,
};
use crate::local_time::now_ts;

mod schema;
use schema::records;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const CHANGE_CHANNEL_CAPACITY: usize = 256;

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Queryable)]
struct RecordRow {
    id: i32,
    #[allow(dead_code)]
    table_name: String,
    user_id: String,
    data: String,
    #[allow(dead_code)]
    created_at: i64,
    #[allow(dead_code)]
    updated_at: i64,
}

#[derive(QueryableByName)]
struct RowId {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    id: i64,
}

#[derive(Insertable)]
#[diesel(table_name = records)]
struct NewRecord<'a> {
    table_name: &'a str,
    user_id: &'a str,
    data: &'a str,
    created_at: i64,
    updated_at: i64,
}

/// Rows of every logical table live in one `records` table as JSON documents;
/// `id` and `user_id` are columns and get injected back on read.
pub struct SqliteRecordStore {
    pool: SqlitePool,
    changes: broadcast::Sender<RowChange>,
}

impl SqliteRecordStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| LifehubError::Storage(e.to_string()))?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { pool, changes })
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| LifehubError::Storage(e.to_string()))
    }

    async fn load_owned(
        &self,
        conn: &mut SqlitePooledConn<'_>,
        table: Table,
        user_id: &str,
        id: i64,
    ) -> Result<Option<RecordRow>> {
        let Ok(id) = i32::try_from(id) else {
            return Ok(None);
        };
        records::table
            .filter(records::table_name.eq(table.name()))
            .filter(records::user_id.eq(user_id))
            .filter(records::id.eq(id))
            .first::<RecordRow>(conn)
            .await
            .optional()
            .map_err(|e| LifehubError::Storage(e.to_string()))
    }

    fn publish(&self, table: Table, kind: ChangeKind, user_id: &str, row: &Value) {
        let _ = self.changes.send(RowChange {
            table,
            kind,
            user_id: user_id.to_string(),
            row: row.clone(),
        });
    }
}

/// `'$.field'` for use inside `json_extract`. Field names come from code, but
/// anything outside `[A-Za-z0-9_]` is refused rather than spliced into SQL.
fn json_path(field: &str) -> Result<String> {
    if !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(format!("'$.{field}'"))
    } else {
        Err(LifehubError::Storage(format!(
            "unsupported field name: {field:?}"
        )))
    }
}

/// Unix seconds from an integer, a numeric string or an RFC 3339 string;
/// NULL otherwise.
fn timestamp_sql(path: &str) -> String {
    let value = format!("json_extract(data, {path})");
    let text = format!("trim({value})");
    let digits = format!("ltrim({text}, '-')");
    format!(
        "(CASE json_type(data, {path}) \
         WHEN 'integer' THEN {value} \
         WHEN 'text' THEN CASE \
           WHEN {digits} != '' AND {digits} NOT GLOB '*[^0-9]*' THEN CAST({text} AS INTEGER) \
           WHEN {text} GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9][Tt]*' THEN unixepoch({text}) \
         END \
         END)"
    )
}

/// Sort key: timestamps by instant, everything else by its stored value.
/// Missing and null sort first, as in [`RowQuery::apply`].
fn sort_key_sql(path: &str) -> String {
    format!(
        "COALESCE({}, json_extract(data, {path}))",
        timestamp_sql(path)
    )
}

fn push_filter<'a>(
    statement: records::BoxedQuery<'a, Sqlite>,
    filter: &FieldFilter,
) -> Result<records::BoxedQuery<'a, Sqlite>> {
    let statement = match filter {
        FieldFilter::Eq(field, value) if field == "id" => match value.as_i64() {
            Some(id) => statement.filter(sql::<Bool>("id = ").bind::<BigInt, _>(id)),
            None => statement.filter(sql::<Bool>("0")),
        },
        FieldFilter::Eq(field, value) if field == "user_id" => match value.as_str() {
            Some(owner) => statement.filter(records::user_id.eq(owner.to_string())),
            None => statement.filter(sql::<Bool>("0")),
        },
        FieldFilter::Eq(field, value) => {
            let path = json_path(field)?;
            let kind = format!("json_type(data, {path})");
            let value_sql = format!("json_extract(data, {path})");
            match value {
                Value::Null => statement.filter(sql::<Bool>(&format!("{kind} = 'null'"))),
                Value::Bool(flag) => statement.filter(sql::<Bool>(&format!(
                    "{kind} = '{}'",
                    if *flag { "true" } else { "false" }
                ))),
                Value::String(text) => statement.filter(
                    sql::<Bool>(&format!("({kind} = 'text' AND {value_sql} = "))
                        .bind::<Text, _>(text.clone())
                        .sql(")"),
                ),
                Value::Number(number) => match number.as_i64() {
                    Some(int) => statement.filter(
                        sql::<Bool>(&format!("({kind} = 'integer' AND {value_sql} = "))
                            .bind::<BigInt, _>(int)
                            .sql(")"),
                    ),
                    None => statement.filter(
                        sql::<Bool>(&format!("({kind} = 'real' AND {value_sql} = "))
                            .bind::<Double, _>(number.as_f64().unwrap_or_default())
                            .sql(")"),
                    ),
                },
                Value::Array(_) | Value::Object(_) => statement.filter(
                    sql::<Bool>(&format!("({kind} IN ('array', 'object') AND json({value_sql}) = json("))
                        .bind::<Text, _>(value.to_string())
                        .sql("))"),
                ),
            }
        }
        FieldFilter::IsNull(field) => statement.filter(sql::<Bool>(&format!(
            "json_extract(data, {}) IS NULL",
            json_path(field)?
        ))),
        FieldFilter::NotNull(field) => statement.filter(sql::<Bool>(&format!(
            "json_extract(data, {}) IS NOT NULL",
            json_path(field)?
        ))),
        FieldFilter::Since(field, ts) => statement.filter(
            sql::<Bool>(&format!("{} >= ", timestamp_sql(&json_path(field)?)))
                .bind::<BigInt, _>(*ts),
        ),
        FieldFilter::Before(field, ts) => statement.filter(
            sql::<Bool>(&format!("{} < ", timestamp_sql(&json_path(field)?)))
                .bind::<BigInt, _>(*ts),
        ),
    };
    Ok(statement)
}

/// Translates a [`RowQuery`] into one statement so SQLite does the filtering,
/// ordering and limiting. Ties fall back to insertion order.
fn boxed_select(table: Table, query: &RowQuery) -> Result<records::BoxedQuery<'static, Sqlite>> {
    let mut statement = records::table
        .filter(records::table_name.eq(table.name()))
        .filter(records::user_id.eq(query.user_id.clone()))
        .filter(sql::<Bool>("json_valid(data)"))
        .into_boxed();
    for filter in &query.filters {
        statement = push_filter(statement, filter)?;
    }
    for order in &query.order {
        statement = match (order.field.as_str(), order.descending) {
            ("id", true) => statement.then_order_by(records::id.desc()),
            ("id", false) => statement.then_order_by(records::id.asc()),
            (field, descending) => {
                let key = sql::<Nullable<Text>>(&sort_key_sql(&json_path(field)?));
                if descending {
                    statement.then_order_by(key.desc())
                } else {
                    statement.then_order_by(key.asc())
                }
            }
        };
    }
    statement = statement.then_order_by(records::id.asc());
    if let Some(limit) = query.limit {
        statement = statement.limit(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    Ok(statement)
}

fn decode(row: RecordRow) -> Option<Value> {
    match serde_json::from_str::<Value>(&row.data).map(object_of) {
        Ok(Ok(fields)) => Some(with_identity(fields, i64::from(row.id), &row.user_id)),
        _ => {
            warn!(id = row.id, "skipping record with unreadable data");
            None
        }
    }
}

fn with_identity(mut fields: Map<String, Value>, id: i64, user_id: &str) -> Value {
    fields.insert("id".to_string(), Value::from(id));
    fields.insert("user_id".to_string(), Value::from(user_id));
    Value::Object(fields)
}

fn encode(row: &Value) -> Result<String> {
    let mut fields = row.as_object().cloned().unwrap_or_default();
    fields.remove("id");
    fields.remove("user_id");
    serde_json::to_string(&fields).map_err(|e| LifehubError::Serialization(e.to_string()))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn select(&self, table: Table, query: RowQuery) -> Result<Vec<Value>> {
        let statement = boxed_select(table, &query)?;
        let mut conn = self.conn().await?;
        let rows: Vec<RecordRow> = statement
            .load(&mut conn)
            .await
            .map_err(|e| LifehubError::Storage(e.to_string()))?;
        debug!(table = table.name(), loaded = rows.len(), "sqlite select");
        Ok(rows.into_iter().filter_map(decode).collect())
    }

    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value> {
        let now = now_ts();
        let stored = stamp_new_row(object_of(row)?, 0, user_id, now);
        let data = encode(&stored)?;
        let new = NewRecord {
            table_name: table.name(),
            user_id,
            data: &data,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(records::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| LifehubError::Storage(e.to_string()))?;
        let row_id: RowId = diesel::sql_query("SELECT last_insert_rowid() as id")
            .get_result(&mut conn)
            .await
            .map_err(|e| LifehubError::Storage(e.to_string()))?;

        let stored = stamp_new_row(object_of(stored)?, row_id.id, user_id, now);
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
        let mut conn = self.conn().await?;
        let Some(existing) = self.load_owned(&mut conn, table, user_id, id).await? else {
            return Ok(None);
        };
        let Some(mut row) = decode(existing) else {
            return Ok(None);
        };
        merge_patch(&mut row, patch);
        let data = encode(&row)?;
        let row_pk = i32::try_from(id).map_err(|e| LifehubError::Storage(e.to_string()))?;
        diesel::update(records::table.filter(records::id.eq(row_pk)))
            .set((records::data.eq(&data), records::updated_at.eq(now_ts())))
            .execute(&mut conn)
            .await
            .map_err(|e| LifehubError::Storage(e.to_string()))?;

        self.publish(table, ChangeKind::Update, user_id, &row);
        Ok(Some(row))
    }

    async fn delete(&self, table: Table, user_id: &str, id: i64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let Some(existing) = self.load_owned(&mut conn, table, user_id, id).await? else {
            return Ok(false);
        };
        let row_pk = existing.id;
        let last = decode(existing);
        let count = diesel::delete(records::table.filter(records::id.eq(row_pk)))
            .execute(&mut conn)
            .await
            .map_err(|e| LifehubError::Storage(e.to_string()))?;
        if count > 0 {
            if let Some(row) = last {
                self.publish(table, ChangeKind::Delete, user_id, &row);
            }
        }
        Ok(count > 0)
    }

    fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.changes.subscribe()
    }
}

pub fn default_db_path() -> String {
    "./data/lifehub.db".to_string()
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LifehubError::Storage(e.to_string()))?;
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| LifehubError::Storage(e.to_string()))?;
        conn.batch_execute("PRAGMA journal_mode = WAL;")
            .map_err(|e| LifehubError::Storage(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| LifehubError::Storage(e.to_string()))?;
        Ok::<_, LifehubError>(())
    })
    .await
    .map_err(|e| LifehubError::Runtime(e.to_string()))??;
    Ok(())
}
