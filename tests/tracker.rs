mod common;

use std::sync::Arc;

use serde_json::json;

use common::{alice, bob, HOUR, MINUTE, WED};
use lifehub::domains::records::{FinanceKind, Table};
use lifehub::error::LifehubError;
use lifehub::interfaces::storage::RecordStore;
use lifehub::providers::memory::InMemoryRecordStore;
use lifehub::services::history::{HistoryQuery, HistoryService};
use lifehub::services::quick_log::RegexClassifier;
use lifehub::services::tracker::{NewFinanceRecord, NewWorkout, TrackerService};
use lifehub::{EventType, Mood, UserContext};

fn tracker() -> TrackerService {
    TrackerService::new(Arc::new(InMemoryRecordStore::new()), time::UtcOffset::UTC)
}

fn spend(kind: FinanceKind, amount: f64, date: &str) -> NewFinanceRecord {
    NewFinanceRecord {
        kind,
        amount,
        category: "misc".to_string(),
        description: None,
        date: Some(date.to_string()),
    }
}

#[tokio::test]
async fn tasks_list_open_first_then_newest() {
    let tracker = tracker();
    let a = tracker.add_task_at(&alice(), "old open", WED).await.unwrap();
    let b = tracker.add_task_at(&alice(), "done", WED + HOUR).await.unwrap();
    let c = tracker.add_task_at(&alice(), "new open", WED + 2 * HOUR).await.unwrap();
    tracker.set_task_completed(&alice(), b.id, true).await.unwrap();

    let ids: Vec<i64> = tracker
        .list_tasks(&alice())
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![c.id, a.id, b.id]);

    tracker.delete_task(&alice(), a.id).await.unwrap();
    assert!(matches!(
        tracker.delete_task(&alice(), a.id).await,
        Err(LifehubError::NotFound(_))
    ));
}

#[tokio::test]
async fn records_of_other_users_are_out_of_reach() {
    let tracker = tracker();
    let task = tracker.add_task(&alice(), "private").await.unwrap();

    assert!(matches!(
        tracker.set_task_completed(&bob(), task.id, true).await,
        Err(LifehubError::NotFound(_))
    ));
    assert!(tracker.list_tasks(&bob()).await.unwrap().is_empty());
    assert!(matches!(
        tracker.add_task(&UserContext::anonymous(), "x").await,
        Err(LifehubError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn workout_burns_eight_kcal_per_minute() {
    let workout = tracker()
        .log_workout(
            &alice(),
            NewWorkout {
                activity_type: "Run".to_string(),
                distance_km: Some(5.0),
                duration_mins: Some(30),
            },
        )
        .await
        .unwrap();
    assert_eq!(workout.calories_burned, Some(240));
}

#[tokio::test]
async fn meals_today_ignores_yesterday() {
    let tracker = tracker();
    tracker.add_meal_at(&alice(), "Pizza", 800, WED - HOUR).await.unwrap();
    tracker.add_meal_at(&alice(), "Eggs", 300, WED + 8 * HOUR).await.unwrap();

    let meals = tracker.meals_today_at(&alice(), WED + 12 * HOUR).await.unwrap();
    assert_eq!(meals.len(), 1);
    assert_eq!(meals[0].name, "Eggs");
}

#[tokio::test]
async fn only_one_session_runs_at_a_time() {
    let tracker = tracker();
    tracker.start_session_at(&alice(), "Study", WED).await.unwrap();
    assert!(matches!(
        tracker.start_session_at(&alice(), "Gaming", WED + 10).await,
        Err(LifehubError::Conflict(_))
    ));

    let stopped = tracker
        .stop_session_at(&alice(), Some("  "), WED + 45 * MINUTE + 3)
        .await
        .unwrap();
    assert_eq!(stopped.duration_seconds, Some(45 * 60 + 3));
    assert_eq!(stopped.comments, None);
    assert!(tracker.active_session(&alice()).await.unwrap().is_none());
    assert!(matches!(
        tracker.stop_session(&alice(), None).await,
        Err(LifehubError::NotFound(_))
    ));
}

#[tokio::test]
async fn waking_up_applies_sleep_latency() {
    let tracker = tracker();
    tracker.start_sleep_at(&alice(), WED).await.unwrap();
    assert!(matches!(
        tracker.start_sleep_at(&alice(), WED + 1).await,
        Err(LifehubError::Conflict(_))
    ));
    let sleep = tracker.wake_up_at(&alice(), WED + 40 * MINUTE).await.unwrap();
    assert_eq!(sleep.duration_minutes, Some(25));

    tracker.start_sleep_at(&alice(), WED + HOUR).await.unwrap();
    let nap = tracker
        .wake_up_at(&alice(), WED + HOUR + 15 * MINUTE)
        .await
        .unwrap();
    assert_eq!(nap.duration_minutes, Some(15));

    let week = tracker
        .sleep_logs_since_at(&alice(), 7, WED + 2 * HOUR)
        .await
        .unwrap();
    assert_eq!(week.len(), 2);
    assert!(week[0].bed_time < week[1].bed_time);
}

#[tokio::test]
async fn journal_entries_round_trip_their_mood() {
    let tracker = tracker();
    let entry = tracker
        .add_journal_entry(&alice(), "Great run today", Mood::Excited)
        .await
        .unwrap();
    let listed = tracker.list_journal(&alice()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].mood, Mood::Excited);

    tracker.delete_journal_entry(&alice(), entry.id).await.unwrap();
    assert!(tracker.list_journal(&alice()).await.unwrap().is_empty());
}

#[tokio::test]
async fn finance_week_runs_monday_to_sunday() {
    let tracker = tracker();
    let records = [
        spend(FinanceKind::Income, 1000.0, "2025-03-01"),
        spend(FinanceKind::Income, 15.0, "2025-03-05"),
        spend(FinanceKind::Expense, 20.0, "2025-03-05"),
        spend(FinanceKind::Expense, 30.0, "2025-03-03"),
        spend(FinanceKind::Expense, 40.0, "2025-03-09"),
        spend(FinanceKind::Expense, 50.0, "2025-03-02"),
        spend(FinanceKind::Expense, 5.0, "someday"),
    ];
    for record in records {
        tracker
            .add_finance_record_at(&alice(), record, WED)
            .await
            .unwrap();
    }

    let stats = tracker
        .finance_stats_at(&alice(), WED + 10 * HOUR)
        .await
        .unwrap();
    assert_eq!(stats.total_balance, 870.0);
    assert_eq!(stats.income_today, 15.0);
    assert_eq!(stats.expense_today, 20.0);
    assert_eq!(stats.expense_week, 90.0);

    let listed = tracker.list_finance_records(&alice()).await.unwrap();
    assert_eq!(listed.len(), 7);
    assert_eq!(listed[0].date, "someday");
    assert_eq!(listed[1].date, "2025-03-09");
}

#[tokio::test]
async fn finance_date_defaults_to_today() {
    let tracker = tracker();
    let record = tracker
        .add_finance_record_at(
            &alice(),
            NewFinanceRecord {
                kind: FinanceKind::Expense,
                amount: 3.5,
                category: "coffee".to_string(),
                description: Some("flat white".to_string()),
                date: None,
            },
            WED + HOUR,
        )
        .await
        .unwrap();
    assert_eq!(record.date, "2025-03-05");

    let negative = tracker
        .add_finance_record(&alice(), spend(FinanceKind::Expense, -1.0, "2025-03-05"))
        .await;
    assert!(negative.is_err());
}

#[tokio::test]
async fn quick_log_creates_the_classified_record() {
    let tracker = tracker();

    let meal = tracker
        .quick_log_at(&alice(), "ate Ramen (650 kcal)", &RegexClassifier, WED)
        .await
        .unwrap();
    assert_eq!(meal.event_type, EventType::Meal);
    assert_eq!(meal.content, "Ate Ramen (650kcal)");

    let run = tracker
        .quick_log_at(&alice(), "ran 5km in 28 min", &RegexClassifier, WED)
        .await
        .unwrap();
    assert_eq!(run.event_type, EventType::Workout);
    assert_eq!(run.content, "Run • 5km");
    assert_eq!(run.secondary_info.as_deref(), Some("28 min"));

    let fallback = tracker
        .quick_log_at(&alice(), "call the plumber", &RegexClassifier, WED)
        .await
        .unwrap();
    assert_eq!(fallback.event_type, EventType::Task);
    assert_eq!(fallback.content, "call the plumber");

    assert!(tracker
        .quick_log(&alice(), "   ", &RegexClassifier)
        .await
        .is_err());
}

#[tokio::test]
async fn private_vault_lists_own_entries_newest_first() {
    let store = Arc::new(InMemoryRecordStore::new());
    for (user, content, at) in [
        ("alice", "first secret", WED),
        ("alice", "second secret", WED + HOUR),
        ("bob", "not yours", WED + 2 * HOUR),
        ("alice", "same minute", WED + HOUR),
    ] {
        store
            .insert(
                Table::PrivateLogs,
                user,
                json!({"content": content, "created_at": at}),
            )
            .await
            .unwrap();
    }
    let tracker = TrackerService::new(store.clone(), time::UtcOffset::UTC);

    let contents: Vec<String> = tracker
        .list_private_logs(&alice())
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.content)
        .collect();
    assert_eq!(contents, vec!["same minute", "second secret", "first secret"]);

    let bob_logs = tracker.list_private_logs(&bob()).await.unwrap();
    assert_eq!(bob_logs.len(), 1);
    assert_eq!(bob_logs[0].user_id, "bob");
    assert_eq!(bob_logs[0].created_at, WED + 2 * HOUR);

    assert!(matches!(
        tracker.list_private_logs(&UserContext::anonymous()).await,
        Err(LifehubError::NotAuthenticated)
    ));

    let history = HistoryService::new(store, time::UtcOffset::UTC);
    assert!(history
        .recent(&alice(), HistoryQuery::default())
        .await
        .unwrap()
        .is_empty());
}
