mod common;

use std::sync::Arc;

use common::ScriptedLlm;
use lifehub::error::LifehubError;
use lifehub::interfaces::providers::ChatMessage;
use lifehub::services::chat::ChatSession;

#[tokio::test]
async fn persona_leads_every_turn() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        Ok("Hi there".to_string()),
        Ok("Drink water".to_string()),
    ]));
    let mut session = ChatSession::new(llm.clone(), "Be brief.").with_model(Some("tiny".into()));

    assert_eq!(session.send("hello").await.unwrap(), "Hi there");
    assert_eq!(session.send("  any tips?  ").await.unwrap(), "Drink water");

    let requests = llm.requests.lock().await;
    assert_eq!(requests.len(), 2);
    let second = &requests[1];
    assert_eq!(second.model.as_deref(), Some("tiny"));
    assert_eq!(
        second.messages,
        vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("hello"),
            ChatMessage::assistant("Hi there"),
            ChatMessage::user("any tips?"),
        ]
    );
    assert_eq!(session.history().len(), 4);
}

#[tokio::test]
async fn failed_turn_is_rolled_back() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        Err(LifehubError::Upstream {
            status: 500,
            message: "boom".to_string(),
        }),
        Ok("recovered".to_string()),
    ]));
    let mut session = ChatSession::new(llm.clone(), "");

    let err = session.send("first").await.unwrap_err();
    assert!(matches!(err, LifehubError::Upstream { status: 500, .. }));
    assert!(session.history().is_empty());

    session.send("second").await.unwrap();
    let requests = llm.requests.lock().await;
    assert_eq!(requests[1].messages, vec![ChatMessage::user("second")]);
}

#[tokio::test]
async fn blank_messages_never_reach_the_model() {
    let llm = Arc::new(ScriptedLlm::replying("unused"));
    let mut session = ChatSession::new(llm.clone(), "persona");

    assert!(session.send("   ").await.is_err());
    assert_eq!(llm.calls().await, 0);

    session.send("ok").await.unwrap();
    session.clear();
    assert!(session.history().is_empty());
}
