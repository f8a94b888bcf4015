//! Pure projections from stored rows into [`HistoryEvent`]s.
//!
//! Every function here tolerates missing optional fields and never fails;
//! `None` means the row is not (yet) eligible for the history feed.

use serde_json::Value;
use time::UtcOffset;

use crate::domains::history::{EventType, HistoryEvent};
use crate::domains::records::{ActivitySession, JournalEntry, Meal, SleepLog, Task, Workout};
use crate::local_time::format_hhmm;

/// Minutes subtracted from a sleep once it lasted longer than [`SLEEP_LATENCY_THRESHOLD_MINS`].
pub const SLEEP_LATENCY_MINS: i64 = 15;
pub const SLEEP_LATENCY_THRESHOLD_MINS: i64 = 20;

/// Whole minutes slept between `bed_time` and `wake_time`, with the latency
/// correction applied. Never negative.
pub fn sleep_duration_minutes(bed_time: i64, wake_time: i64) -> i64 {
    let elapsed = wake_time.saturating_sub(bed_time).max(0) / 60;
    if elapsed > SLEEP_LATENCY_THRESHOLD_MINS {
        elapsed - SLEEP_LATENCY_MINS
    } else {
        elapsed
    }
}

/// `45s`, `1m 5s`, `1h 5m 3s`. Leading zero units are dropped.
pub fn format_compact_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

fn format_distance(km: f64) -> String {
    if km.fract() == 0.0 {
        format!("{}", km as i64)
    } else {
        format!("{}", (km * 100.0).round() / 100.0)
    }
}

pub fn normalize_task(task: &Task) -> HistoryEvent {
    HistoryEvent {
        id: task.id,
        event_type: EventType::Task,
        timestamp: task.created_at,
        content: task.description.clone(),
        secondary_info: task.completed.then(|| "completed".to_string()),
        mood: None,
    }
}

pub fn normalize_meal(meal: &Meal) -> HistoryEvent {
    HistoryEvent {
        id: meal.id,
        event_type: EventType::Meal,
        timestamp: meal.created_at,
        content: format!("Ate {} ({}kcal)", meal.name, meal.calories),
        secondary_info: None,
        mood: None,
    }
}

pub fn normalize_workout(workout: &Workout) -> HistoryEvent {
    let distance = format_distance(workout.distance_km.unwrap_or_default());
    HistoryEvent {
        id: workout.id,
        event_type: EventType::Workout,
        timestamp: workout.created_at,
        content: format!("{} • {}km", workout.activity_type, distance),
        secondary_info: workout.duration_mins.map(|mins| format!("{mins} min")),
        mood: None,
    }
}

pub fn normalize_sleep(sleep: &SleepLog) -> Option<HistoryEvent> {
    let wake_time = sleep.wake_time?;
    let minutes = sleep
        .duration_minutes
        .or_else(|| sleep.bed_time.map(|bed| sleep_duration_minutes(bed, wake_time)))
        .unwrap_or_default()
        .max(0);
    Some(HistoryEvent {
        id: sleep.id,
        event_type: EventType::Sleep,
        timestamp: wake_time,
        content: format!("Slept for {}h {}m", minutes / 60, minutes % 60),
        secondary_info: None,
        mood: None,
    })
}

pub fn normalize_session(session: &ActivitySession, offset: UtcOffset) -> Option<HistoryEvent> {
    let end_time = session.end_time?;
    let start_time = session.start_time.unwrap_or(end_time);
    let seconds = session
        .duration_seconds
        .unwrap_or(end_time.saturating_sub(start_time));
    let mut content = format!(
        "{} - {} ({}) • {}",
        format_hhmm(start_time, offset),
        format_hhmm(end_time, offset),
        format_compact_duration(seconds),
        session.activity_name
    );
    if let Some(comment) = &session.comments {
        content.push_str(&format!(" — \"{comment}\""));
    }
    Some(HistoryEvent {
        id: session.id,
        event_type: EventType::Session,
        timestamp: end_time,
        content,
        secondary_info: None,
        mood: None,
    })
}

pub fn normalize_journal(entry: &JournalEntry) -> HistoryEvent {
    HistoryEvent {
        id: entry.id,
        event_type: EventType::Journal,
        timestamp: entry.created_at,
        content: entry.content.clone(),
        secondary_info: Some(entry.mood.as_str().to_string()),
        mood: Some(entry.mood),
    }
}

/// Dispatches a raw row of the given kind to its projection.
pub fn normalize_row(kind: EventType, row: &Value, offset: UtcOffset) -> Option<HistoryEvent> {
    match kind {
        EventType::Task => Some(normalize_task(&Task::from_row(row))),
        EventType::Meal => Some(normalize_meal(&Meal::from_row(row))),
        EventType::Workout => Some(normalize_workout(&Workout::from_row(row))),
        EventType::Sleep => normalize_sleep(&SleepLog::from_row(row)),
        EventType::Session => normalize_session(&ActivitySession::from_row(row), offset),
        EventType::Journal => Some(normalize_journal(&JournalEntry::from_row(row))),
    }
}
