use std::sync::Arc;

use serde_json::{json, Value};
use time::UtcOffset;
use tracing::{debug, info};

use crate::domains::history::{EventType, HistoryEvent, Mood};
use crate::domains::records::{
    ActivitySession, FinanceKind, FinanceRecord, JournalEntry, Meal, PrivateLog, SleepLog, Table,
    Task, Workout,
};
use crate::domains::user::UserContext;
use crate::error::{LifehubError, Result};
use crate::interfaces::storage::{RecordStore, RowQuery};
use crate::local_time::{format_date, local_date, now_ts, start_of_day};
use crate::services::finance::{finance_stats, FinanceStats};
use crate::services::normalizer::{normalize_row, sleep_duration_minutes};
use crate::services::quick_log::{QuickLogClassifier, QuickLogEntry};

pub const WORKOUT_KCAL_PER_MINUTE: i64 = 8;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkout {
    pub activity_type: String,
    pub distance_km: Option<f64>,
    pub duration_mins: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFinanceRecord {
    pub kind: FinanceKind,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    /// `YYYY-MM-DD`; today's local date when absent.
    pub date: Option<String>,
}

fn require_text<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LifehubError::Runtime(format!("{what} must not be empty")));
    }
    Ok(value)
}

/// Create/update/delete operations behind the dashboard widgets. Every call
/// is scoped to the identity in the [`UserContext`].
pub struct TrackerService {
    store: Arc<dyn RecordStore>,
    offset: UtcOffset,
}

impl TrackerService {
    pub fn new(store: Arc<dyn RecordStore>, offset: UtcOffset) -> Self {
        Self { store, offset }
    }

    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value> {
        let stored = self.store.insert(table, user_id, row).await?;
        debug!(table = table.name(), user_id, "record created");
        Ok(stored)
    }

    async fn update(&self, table: Table, user_id: &str, id: i64, patch: Value) -> Result<Value> {
        self.store
            .update(table, user_id, id, patch)
            .await?
            .ok_or_else(|| LifehubError::NotFound(format!("{table} #{id}")))
    }

    async fn delete(&self, table: Table, user_id: &str, id: i64) -> Result<()> {
        if self.store.delete(table, user_id, id).await? {
            debug!(table = table.name(), user_id, id, "record deleted");
            Ok(())
        } else {
            Err(LifehubError::NotFound(format!("{table} #{id}")))
        }
    }

    // Tasks

    pub async fn add_task(&self, ctx: &UserContext, description: &str) -> Result<Task> {
        self.add_task_at(ctx, description, now_ts()).await
    }

    pub async fn add_task_at(
        &self,
        ctx: &UserContext,
        description: &str,
        now: i64,
    ) -> Result<Task> {
        let user_id = ctx.require()?;
        let description = require_text(description, "task description")?;
        let row = json!({ "description": description, "completed": false, "created_at": now });
        Ok(Task::from_row(&self.insert(Table::Tasks, user_id, row).await?))
    }

    pub async fn set_task_completed(
        &self,
        ctx: &UserContext,
        id: i64,
        completed: bool,
    ) -> Result<Task> {
        let user_id = ctx.require()?;
        let row = self
            .update(Table::Tasks, user_id, id, json!({ "completed": completed }))
            .await?;
        Ok(Task::from_row(&row))
    }

    pub async fn delete_task(&self, ctx: &UserContext, id: i64) -> Result<()> {
        self.delete(Table::Tasks, ctx.require()?, id).await
    }

    /// Open tasks first, newest first within each group.
    pub async fn list_tasks(&self, ctx: &UserContext) -> Result<Vec<Task>> {
        let query = RowQuery::for_user(ctx.require()?)
            .order_asc("completed")
            .order_desc("created_at")
            .order_desc("id");
        let rows = self.store.select(Table::Tasks, query).await?;
        Ok(rows.iter().map(Task::from_row).collect())
    }

    // Meals

    pub async fn add_meal(&self, ctx: &UserContext, name: &str, calories: i64) -> Result<Meal> {
        self.add_meal_at(ctx, name, calories, now_ts()).await
    }

    pub async fn add_meal_at(
        &self,
        ctx: &UserContext,
        name: &str,
        calories: i64,
        now: i64,
    ) -> Result<Meal> {
        let user_id = ctx.require()?;
        let name = require_text(name, "meal name")?;
        let row = json!({ "name": name, "calories": calories.max(0), "created_at": now });
        Ok(Meal::from_row(&self.insert(Table::Meals, user_id, row).await?))
    }

    pub async fn meals_today(&self, ctx: &UserContext) -> Result<Vec<Meal>> {
        self.meals_today_at(ctx, now_ts()).await
    }

    pub async fn meals_today_at(&self, ctx: &UserContext, now: i64) -> Result<Vec<Meal>> {
        let query = RowQuery::for_user(ctx.require()?)
            .since("created_at", start_of_day(now, self.offset))
            .order_desc("created_at");
        let rows = self.store.select(Table::Meals, query).await?;
        Ok(rows.iter().map(Meal::from_row).collect())
    }

    // Workouts

    pub async fn log_workout(&self, ctx: &UserContext, workout: NewWorkout) -> Result<Workout> {
        self.log_workout_at(ctx, workout, now_ts()).await
    }

    pub async fn log_workout_at(
        &self,
        ctx: &UserContext,
        workout: NewWorkout,
        now: i64,
    ) -> Result<Workout> {
        let user_id = ctx.require()?;
        let activity_type = require_text(&workout.activity_type, "workout type")?;
        let calories = workout
            .duration_mins
            .map(|mins| mins.max(0) * WORKOUT_KCAL_PER_MINUTE);
        let row = json!({
            "activity_type": activity_type,
            "distance_km": workout.distance_km,
            "duration_mins": workout.duration_mins,
            "calories_burned": calories,
            "created_at": now,
        });
        Ok(Workout::from_row(&self.insert(Table::Exercise, user_id, row).await?))
    }

    // Timed sessions

    pub async fn active_session(&self, ctx: &UserContext) -> Result<Option<ActivitySession>> {
        let query = RowQuery::for_user(ctx.require()?)
            .is_null("end_time")
            .order_desc("start_time")
            .limit(1);
        let rows = self.store.select(Table::ActivitySessions, query).await?;
        Ok(rows.first().map(ActivitySession::from_row))
    }

    pub async fn start_session(&self, ctx: &UserContext, name: &str) -> Result<ActivitySession> {
        self.start_session_at(ctx, name, now_ts()).await
    }

    pub async fn start_session_at(
        &self,
        ctx: &UserContext,
        name: &str,
        now: i64,
    ) -> Result<ActivitySession> {
        let user_id = ctx.require()?;
        let name = require_text(name, "activity name")?;
        if let Some(active) = self.active_session(ctx).await? {
            return Err(LifehubError::Conflict(format!(
                "session '{}' is already running",
                active.activity_name
            )));
        }
        let row = json!({
            "activity_name": name,
            "start_time": now,
            "end_time": Value::Null,
            "created_at": now,
        });
        let stored = self.insert(Table::ActivitySessions, user_id, row).await?;
        info!(user_id, activity = name, "session started");
        Ok(ActivitySession::from_row(&stored))
    }

    pub async fn stop_session(
        &self,
        ctx: &UserContext,
        comment: Option<&str>,
    ) -> Result<ActivitySession> {
        self.stop_session_at(ctx, comment, now_ts()).await
    }

    pub async fn stop_session_at(
        &self,
        ctx: &UserContext,
        comment: Option<&str>,
        now: i64,
    ) -> Result<ActivitySession> {
        let user_id = ctx.require()?;
        let active = self
            .active_session(ctx)
            .await?
            .ok_or_else(|| LifehubError::NotFound("no active session".to_string()))?;
        let start = active.start_time.unwrap_or(now);
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        let patch = json!({
            "end_time": now,
            "duration_seconds": now.saturating_sub(start).max(0),
            "comments": comment,
        });
        let row = self
            .update(Table::ActivitySessions, user_id, active.id, patch)
            .await?;
        info!(user_id, id = active.id, "session stopped");
        Ok(ActivitySession::from_row(&row))
    }

    // Sleep

    pub async fn active_sleep(&self, ctx: &UserContext) -> Result<Option<SleepLog>> {
        let query = RowQuery::for_user(ctx.require()?)
            .is_null("wake_time")
            .order_desc("bed_time")
            .limit(1);
        let rows = self.store.select(Table::SleepLogs, query).await?;
        Ok(rows.first().map(SleepLog::from_row))
    }

    pub async fn start_sleep(&self, ctx: &UserContext) -> Result<SleepLog> {
        self.start_sleep_at(ctx, now_ts()).await
    }

    pub async fn start_sleep_at(&self, ctx: &UserContext, now: i64) -> Result<SleepLog> {
        let user_id = ctx.require()?;
        if self.active_sleep(ctx).await?.is_some() {
            return Err(LifehubError::Conflict("already asleep".to_string()));
        }
        let row = json!({ "bed_time": now, "wake_time": Value::Null, "created_at": now });
        Ok(SleepLog::from_row(&self.insert(Table::SleepLogs, user_id, row).await?))
    }

    pub async fn wake_up(&self, ctx: &UserContext) -> Result<SleepLog> {
        self.wake_up_at(ctx, now_ts()).await
    }

    pub async fn wake_up_at(&self, ctx: &UserContext, now: i64) -> Result<SleepLog> {
        let user_id = ctx.require()?;
        let active = self
            .active_sleep(ctx)
            .await?
            .ok_or_else(|| LifehubError::NotFound("no sleep in progress".to_string()))?;
        let minutes = sleep_duration_minutes(active.bed_time.unwrap_or(now), now);
        let patch = json!({ "wake_time": now, "duration_minutes": minutes });
        let row = self
            .update(Table::SleepLogs, user_id, active.id, patch)
            .await?;
        info!(user_id, minutes, "woke up");
        Ok(SleepLog::from_row(&row))
    }

    /// Sleep logs whose bed time falls in the last `days` days, oldest first.
    pub async fn sleep_logs_since(&self, ctx: &UserContext, days: u32) -> Result<Vec<SleepLog>> {
        self.sleep_logs_since_at(ctx, days, now_ts()).await
    }

    pub async fn sleep_logs_since_at(
        &self,
        ctx: &UserContext,
        days: u32,
        now: i64,
    ) -> Result<Vec<SleepLog>> {
        let query = RowQuery::for_user(ctx.require()?)
            .since("bed_time", now - i64::from(days) * SECONDS_PER_DAY)
            .order_asc("bed_time");
        let rows = self.store.select(Table::SleepLogs, query).await?;
        Ok(rows.iter().map(SleepLog::from_row).collect())
    }

    // Journal

    pub async fn add_journal_entry(
        &self,
        ctx: &UserContext,
        content: &str,
        mood: Mood,
    ) -> Result<JournalEntry> {
        self.add_journal_entry_at(ctx, content, mood, now_ts()).await
    }

    pub async fn add_journal_entry_at(
        &self,
        ctx: &UserContext,
        content: &str,
        mood: Mood,
        now: i64,
    ) -> Result<JournalEntry> {
        let user_id = ctx.require()?;
        let content = require_text(content, "journal entry")?;
        let row = json!({ "content": content, "mood": mood.as_str(), "created_at": now });
        let stored = self.insert(Table::JournalEntries, user_id, row).await?;
        Ok(JournalEntry::from_row(&stored))
    }

    pub async fn list_journal(&self, ctx: &UserContext) -> Result<Vec<JournalEntry>> {
        let query = RowQuery::for_user(ctx.require()?)
            .order_desc("created_at")
            .order_desc("id");
        let rows = self.store.select(Table::JournalEntries, query).await?;
        Ok(rows.iter().map(JournalEntry::from_row).collect())
    }

    pub async fn delete_journal_entry(&self, ctx: &UserContext, id: i64) -> Result<()> {
        self.delete(Table::JournalEntries, ctx.require()?, id).await
    }

    // Private vault

    pub async fn list_private_logs(&self, ctx: &UserContext) -> Result<Vec<PrivateLog>> {
        let query = RowQuery::for_user(ctx.require()?)
            .order_desc("created_at")
            .order_desc("id");
        let rows = self.store.select(Table::PrivateLogs, query).await?;
        Ok(rows.iter().map(PrivateLog::from_row).collect())
    }

    // Finance

    pub async fn add_finance_record(
        &self,
        ctx: &UserContext,
        record: NewFinanceRecord,
    ) -> Result<FinanceRecord> {
        self.add_finance_record_at(ctx, record, now_ts()).await
    }

    pub async fn add_finance_record_at(
        &self,
        ctx: &UserContext,
        record: NewFinanceRecord,
        now: i64,
    ) -> Result<FinanceRecord> {
        let user_id = ctx.require()?;
        if !record.amount.is_finite() || record.amount < 0.0 {
            return Err(LifehubError::Runtime(format!(
                "amount must be a non-negative number, got {}",
                record.amount
            )));
        }
        let date = record
            .date
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format_date(local_date(now, self.offset)));
        let row = json!({
            "type": record.kind.as_str(),
            "amount": record.amount,
            "category": record.category.trim(),
            "description": record.description,
            "date": date,
            "created_at": now,
        });
        let stored = self.insert(Table::FinanceRecords, user_id, row).await?;
        Ok(FinanceRecord::from_row(&stored))
    }

    pub async fn list_finance_records(&self, ctx: &UserContext) -> Result<Vec<FinanceRecord>> {
        let query = RowQuery::for_user(ctx.require()?)
            .order_desc("date")
            .order_desc("created_at")
            .order_desc("id");
        let rows = self.store.select(Table::FinanceRecords, query).await?;
        Ok(rows.iter().map(FinanceRecord::from_row).collect())
    }

    pub async fn delete_finance_record(&self, ctx: &UserContext, id: i64) -> Result<()> {
        self.delete(Table::FinanceRecords, ctx.require()?, id).await
    }

    pub async fn finance_stats(&self, ctx: &UserContext) -> Result<FinanceStats> {
        self.finance_stats_at(ctx, now_ts()).await
    }

    pub async fn finance_stats_at(&self, ctx: &UserContext, now: i64) -> Result<FinanceStats> {
        let records = self.list_finance_records(ctx).await?;
        Ok(finance_stats(&records, local_date(now, self.offset)))
    }

    // Quick log

    /// Classifies `text` and creates the matching record, returned as the
    /// history event it projects to.
    pub async fn quick_log(
        &self,
        ctx: &UserContext,
        text: &str,
        classifier: &dyn QuickLogClassifier,
    ) -> Result<HistoryEvent> {
        self.quick_log_at(ctx, text, classifier, now_ts()).await
    }

    pub async fn quick_log_at(
        &self,
        ctx: &UserContext,
        text: &str,
        classifier: &dyn QuickLogClassifier,
        now: i64,
    ) -> Result<HistoryEvent> {
        ctx.require()?;
        let text = require_text(text, "quick log text")?;
        let entry = classifier.classify(text);
        debug!(?entry, "quick log classified");

        let (kind, row) = match entry {
            QuickLogEntry::Task { description } => {
                let task = self.add_task_at(ctx, &description, now).await?;
                (EventType::Task, serde_json::to_value(task))
            }
            QuickLogEntry::Meal { name, calories } => {
                let meal = self.add_meal_at(ctx, &name, calories, now).await?;
                (EventType::Meal, serde_json::to_value(meal))
            }
            QuickLogEntry::Workout {
                activity_type,
                distance_km,
                duration_mins,
            } => {
                let workout = NewWorkout {
                    activity_type,
                    distance_km,
                    duration_mins,
                };
                let workout = self.log_workout_at(ctx, workout, now).await?;
                (EventType::Workout, serde_json::to_value(workout))
            }
            QuickLogEntry::Journal { content, mood } => {
                let entry = self.add_journal_entry_at(ctx, &content, mood, now).await?;
                (EventType::Journal, serde_json::to_value(entry))
            }
        };
        let row = row.map_err(|e| LifehubError::Serialization(e.to_string()))?;
        normalize_row(kind, &row, self.offset)
            .ok_or_else(|| LifehubError::Runtime(format!("quick log produced no {kind} event")))
    }
}
