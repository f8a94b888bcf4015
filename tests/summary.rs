mod common;

use std::sync::Arc;

use serde_json::json;

use common::{alice, history_over, ScriptedLlm, HOUR, MINUTE, WED};
use lifehub::domains::records::Table;
use lifehub::error::LifehubError;
use lifehub::interfaces::storage::{RecordStore, RowQuery};
use lifehub::providers::memory::InMemoryRecordStore;
use lifehub::services::summary::SummaryService;
use lifehub::{SummaryOutcome, UserContext};

#[tokio::test]
async fn empty_day_never_calls_the_model() {
    let store = Arc::new(InMemoryRecordStore::new());
    store
        .insert(
            Table::Tasks,
            "alice",
            json!({"description": "last week", "created_at": WED - 3 * 24 * HOUR}),
        )
        .await
        .unwrap();
    let llm = Arc::new(ScriptedLlm::replying("should not be used"));
    let service = SummaryService::new(history_over(store.clone()), llm.clone());

    let outcome = service
        .generate_daily_at(&alice(), WED + 20 * HOUR)
        .await
        .unwrap();

    assert_eq!(outcome, SummaryOutcome::NothingToSummarize);
    assert_eq!(llm.calls().await, 0);
    let saved = store
        .select(Table::DailySummaries, RowQuery::for_user("alice"))
        .await
        .unwrap();
    assert!(saved.is_empty());
}

#[tokio::test]
async fn generates_from_a_chronological_log_and_persists() {
    let store = Arc::new(InMemoryRecordStore::new());
    store
        .insert(
            Table::Meals,
            "alice",
            json!({"name": "Eggs", "calories": 300, "created_at": WED + 8 * HOUR}),
        )
        .await
        .unwrap();
    store
        .insert(
            Table::Exercise,
            "alice",
            json!({"activity_type": "Run", "distance_km": 5, "duration_mins": 30, "created_at": WED + 9 * HOUR + 15 * MINUTE}),
        )
        .await
        .unwrap();
    let llm = Arc::new(ScriptedLlm::replying("Solid day."));
    let service = SummaryService::new(history_over(store.clone()), llm.clone())
        .with_model(Some("summary-model".to_string()))
        .with_template("RECAP:\n{activity_log}\nEND");

    let outcome = service
        .generate_daily_at(&alice(), WED + 20 * HOUR)
        .await
        .unwrap();

    let SummaryOutcome::Generated(summary) = outcome else {
        panic!("expected a summary");
    };
    assert_eq!(summary.content, "Solid day.");
    assert_eq!(summary.date, "2025-03-05");
    assert_eq!(summary.user_id, "alice");

    let requests = llm.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model.as_deref(), Some("summary-model"));
    assert_eq!(requests[0].temperature, Some(0.7));
    assert_eq!(
        requests[0].messages[0].content,
        "RECAP:\n- [08:00] MEAL: Ate Eggs (300kcal)\n- [09:15] WORKOUT: Run • 5km (30 min)\nEND"
    );
    drop(requests);

    let latest = service
        .latest_for_today_at(&alice(), WED + 21 * HOUR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, summary.id);
    let tomorrow = service
        .latest_for_today_at(&alice(), WED + 30 * HOUR)
        .await
        .unwrap();
    assert!(tomorrow.is_none());
}

#[tokio::test]
async fn model_errors_propagate_unchanged() {
    let store = Arc::new(InMemoryRecordStore::new());
    store
        .insert(
            Table::Tasks,
            "alice",
            json!({"description": "Ship it", "created_at": WED + HOUR}),
        )
        .await
        .unwrap();
    let llm = Arc::new(ScriptedLlm::new(vec![Err(LifehubError::Upstream {
        status: 429,
        message: "{\"error\":{\"message\":\"Rate limit\"}}".to_string(),
    })]));
    let service = SummaryService::new(history_over(store.clone()), llm);

    let err = service
        .generate_daily_at(&alice(), WED + 2 * HOUR)
        .await
        .unwrap_err();

    match err {
        LifehubError::Upstream { status, message } => {
            assert_eq!(status, 429);
            assert!(message.contains("Rate limit"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let saved = store
        .select(Table::DailySummaries, RowQuery::for_user("alice"))
        .await
        .unwrap();
    assert!(saved.is_empty());
}

#[tokio::test]
async fn anonymous_summary_requests_fail_fast() {
    let store = Arc::new(InMemoryRecordStore::new());
    let llm = Arc::new(ScriptedLlm::replying("x"));
    let service = SummaryService::new(history_over(store), llm.clone());

    let err = service
        .generate_daily(&UserContext::anonymous())
        .await
        .unwrap_err();

    assert!(matches!(err, LifehubError::NotAuthenticated));
    assert_eq!(llm.calls().await, 0);
}
