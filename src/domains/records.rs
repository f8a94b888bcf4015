//! Source records as the storage collaborator hands them back.
//!
//! Rows arrive as loosely-typed JSON documents. Every `from_row` here is
//! lenient: a missing or oddly-typed field falls back to a default instead
//! of failing, so one malformed row never poisons a whole read.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::domains::history::Mood;
use crate::error::LifehubError;
use crate::local_time::parse_rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Tasks,
    Meals,
    Exercise,
    SleepLogs,
    ActivitySessions,
    JournalEntries,
    FinanceRecords,
    DailySummaries,
    PrivateLogs,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Tasks,
        Table::Meals,
        Table::Exercise,
        Table::SleepLogs,
        Table::ActivitySessions,
        Table::JournalEntries,
        Table::FinanceRecords,
        Table::DailySummaries,
        Table::PrivateLogs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Meals => "meals",
            Self::Exercise => "exercise",
            Self::SleepLogs => "sleep_logs",
            Self::ActivitySessions => "activity_sessions",
            Self::JournalEntries => "journal_entries",
            Self::FinanceRecords => "finance_records",
            Self::DailySummaries => "daily_summaries",
            Self::PrivateLogs => "private_logs",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = LifehubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.name() == value.trim())
            .ok_or_else(|| LifehubError::Storage(format!("unknown table: {value}")))
    }
}

pub fn field_str<'a>(row: &'a Value, key: &str) -> Option<&'a str> {
    row.get(key).and_then(|v| v.as_str())
}

pub fn field_string(row: &Value, key: &str) -> String {
    field_str(row, key).unwrap_or_default().to_string()
}

pub fn field_i64(row: &Value, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

pub fn field_f64(row: &Value, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn field_bool(row: &Value, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.trim(), "true" | "1"),
        _ => false,
    }
}

/// Unix seconds stored either as a number or as an RFC 3339 string.
pub fn field_ts(row: &Value, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::String(s) => parse_rfc3339(s).or_else(|| s.trim().parse().ok()),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn first_present<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| field_str(row, key).filter(|v| !v.trim().is_empty()))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub description: String,
    pub completed: bool,
    pub created_at: i64,
}

impl Task {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            description: field_string(row, "description"),
            completed: field_bool(row, "completed"),
            created_at: field_ts(row, "created_at").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meal {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub calories: i64,
    pub created_at: i64,
}

impl Meal {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            name: first_present(row, &["name", "meal_name"])
                .unwrap_or_default()
                .to_string(),
            calories: field_i64(row, "calories").unwrap_or_default(),
            created_at: field_ts(row, "created_at").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workout {
    pub id: i64,
    pub user_id: String,
    pub activity_type: String,
    pub distance_km: Option<f64>,
    pub duration_mins: Option<i64>,
    pub calories_burned: Option<i64>,
    pub created_at: i64,
}

impl Workout {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            activity_type: first_present(row, &["activity_type", "type"])
                .unwrap_or("Workout")
                .to_string(),
            distance_km: field_f64(row, "distance_km"),
            duration_mins: field_i64(row, "duration_mins"),
            calories_burned: field_i64(row, "calories_burned"),
            created_at: field_ts(row, "created_at").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepLog {
    pub id: i64,
    pub user_id: String,
    pub bed_time: Option<i64>,
    pub wake_time: Option<i64>,
    pub duration_minutes: Option<i64>,
}

impl SleepLog {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            bed_time: field_ts(row, "bed_time"),
            wake_time: field_ts(row, "wake_time"),
            duration_minutes: field_i64(row, "duration_minutes"),
        }
    }

    pub fn in_progress(&self) -> bool {
        self.wake_time.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySession {
    pub id: i64,
    pub user_id: String,
    pub activity_name: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub comments: Option<String>,
}

impl ActivitySession {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            activity_name: field_string(row, "activity_name"),
            start_time: field_ts(row, "start_time"),
            end_time: field_ts(row, "end_time"),
            duration_seconds: field_i64(row, "duration_seconds"),
            comments: non_empty(field_str(row, "comments")),
        }
    }

    pub fn in_progress(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub mood: Mood,
    pub created_at: i64,
}

impl JournalEntry {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            content: field_string(row, "content"),
            mood: Mood::parse_or_neutral(field_str(row, "mood")),
            created_at: field_ts(row, "created_at").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinanceKind {
    Income,
    Expense,
}

impl FinanceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl FromStr for FinanceKind {
    type Err = LifehubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(LifehubError::Serialization(format!(
                "unknown finance record type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceRecord {
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: FinanceKind,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub date: String,
    pub created_at: i64,
}

impl FinanceRecord {
    /// Anything that is not explicitly income is treated as an expense.
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            kind: field_str(row, "type")
                .and_then(|v| v.parse().ok())
                .unwrap_or(FinanceKind::Expense),
            amount: field_f64(row, "amount").unwrap_or_default(),
            category: field_string(row, "category"),
            description: non_empty(field_str(row, "description")),
            date: field_string(row, "date"),
            created_at: field_ts(row, "created_at").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub date: String,
    pub created_at: i64,
}

impl DailySummary {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            content: field_string(row, "content"),
            date: field_string(row, "date"),
            created_at: field_ts(row, "created_at").unwrap_or_default(),
        }
    }
}

/// Entries of the private vault. They never appear in the unified history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateLog {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub created_at: i64,
}

impl PrivateLog {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: field_i64(row, "id").unwrap_or_default(),
            user_id: field_string(row, "user_id"),
            content: field_string(row, "content"),
            created_at: field_ts(row, "created_at").unwrap_or_default(),
        }
    }
}
