//! Integration tests for the async session driver
//!
//! Sessions run on a paused tokio clock, so every reading delay elapses as
//! soon as the runtime goes idle. The AI side is a `ScriptedTurnHandler`.

use std::sync::Arc;
use std::time::Duration;

use lesson_chat::core::config::DeliveryConfig;
use lesson_chat::core::types::{NodeId, NodeKind, Role};
use lesson_chat::engine::SessionHandle;
use lesson_chat::graph::{GraphDocument, GraphStore, LearningNode};
use lesson_chat::llm::{AiReply, ScriptedTurnHandler};

fn lesson() -> Arc<GraphStore> {
    let doc = GraphDocument::new(vec![
        LearningNode::new("0", NodeKind::ModuleTitle, "Stars").with_successors(["1"]),
        LearningNode::new("1", NodeKind::Narration, "Stars are giant balls of gas.")
            .with_successors(["2"]),
        LearningNode::new("2", NodeKind::Narration, "They shine by fusing hydrogen.")
            .with_successors(["3"]),
        LearningNode::new("3", NodeKind::BranchPrompt, "Where next?").with_successors(["3.1", "3.2"]),
        LearningNode::new("3.1", NodeKind::BranchOption, "Supernovae").with_successors(["4"]),
        LearningNode::new("3.2", NodeKind::BranchOption, "Black holes").with_successors(["4"]),
        LearningNode::new("4", NodeKind::Narration, "That's all for today."),
    ]);
    Arc::new(GraphStore::from_document(doc).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_full_lesson_with_question_and_continue() {
    let ai = Arc::new(
        ScriptedTurnHandler::new()
            .with_raw_reply("Fusion joins light nuclei.\n\nIt releases energy. [[CONTINUE]]"),
    );
    let session = SessionHandle::spawn(lesson(), ai.clone(), DeliveryConfig::default());
    session.start(None).unwrap();

    let snapshot = session.wait_until(|s| s.transcript.len() == 1).await.unwrap();
    assert_eq!(snapshot.module_title.as_deref(), Some("Stars"));

    session.handle_free_text("What is fusion?").unwrap();
    let snapshot = session
        .wait_until(|s| !s.offered_choices.is_empty())
        .await
        .unwrap();

    assert_eq!(
        snapshot.texts(),
        vec![
            "Stars are giant balls of gas.",
            "What is fusion?",
            "Fusion joins light nuclei.",
            "It releases energy.",
            "They shine by fusing hydrogen.",
            "Where next?",
        ]
    );
    assert_eq!(snapshot.transcript[2].role, Role::Assistant);
    assert_eq!(ai.call_count(), 1);

    let requests = ai.requests();
    assert_eq!(requests[0].context.module_title.as_deref(), Some("Stars"));

    session.choose_branch(NodeId::from("3.2")).unwrap();
    let snapshot = session
        .wait_until(|s| s.texts().last() == Some(&"That's all for today."))
        .await
        .unwrap();
    assert!(snapshot.offered_choices.is_empty());
    assert!(!snapshot.is_typing);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ai_failure_shows_fallback_and_learner_can_retry() {
    let config = DeliveryConfig::default();
    let fallback = config.ai_fallback_message.clone();
    let ai = Arc::new(
        ScriptedTurnHandler::new()
            .with_failure("upstream timeout")
            .with_raw_reply("Here you go."),
    );
    let session = SessionHandle::spawn(lesson(), ai.clone(), config);
    session.start(None).unwrap();
    session.wait_until(|s| !s.offered_choices.is_empty()).await.unwrap();

    session.handle_free_text("Explain?").unwrap();
    let snapshot = session
        .wait_until(|s| s.texts().last() == Some(&fallback.as_str()))
        .await
        .unwrap();
    assert_eq!(snapshot.offered_choices.len(), 2);

    session.handle_free_text("Explain again?").unwrap();
    let snapshot = session
        .wait_until(|s| s.texts().last() == Some(&"Here you go."))
        .await
        .unwrap();
    assert_eq!(snapshot.offered_choices.len(), 2);
    assert_eq!(ai.call_count(), 2);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_undo_cancels_reply_in_progress() {
    let ai = Arc::new(
        ScriptedTurnHandler::new()
            .with_reply(AiReply::new("First part.\n\nSecond part.\n\nThird part.", false)),
    );
    let session = SessionHandle::spawn(lesson(), ai, DeliveryConfig::default());
    session.start(None).unwrap();
    session.wait_until(|s| !s.offered_choices.is_empty()).await.unwrap();

    session.handle_free_text("Tell me a story").unwrap();
    session
        .wait_until(|s| s.texts().contains(&"First part."))
        .await
        .unwrap();

    session.undo_last_exchange().unwrap();
    let snapshot = session
        .wait_until(|s| !s.texts().contains(&"First part."))
        .await
        .unwrap();
    assert!(!snapshot.texts().contains(&"Tell me a story"));
    assert_eq!(snapshot.offered_choices.len(), 2);

    // The rest of the reply never arrives.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = session.snapshot();
    assert!(!snapshot.texts().contains(&"Second part."));
    assert!(!snapshot.is_typing);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_waits_for_explicit_continue() {
    let ai = Arc::new(ScriptedTurnHandler::new());
    let session = SessionHandle::spawn(lesson(), ai, DeliveryConfig::default());
    session.report_scroll_state(true, 200.0).unwrap();
    session.start(None).unwrap();

    let snapshot = session.wait_until(|s| s.is_paused).await.unwrap();
    let paused_len = snapshot.transcript.len();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.snapshot().transcript.len(), paused_len);
    assert!(session.snapshot().is_paused);

    session.user_requested_continue().unwrap();
    session
        .wait_until(|s| s.transcript.len() > paused_len)
        .await
        .unwrap();

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_taller_viewport_resumes_pause() {
    let ai = Arc::new(ScriptedTurnHandler::new());
    let session = SessionHandle::spawn(lesson(), ai, DeliveryConfig::default());
    session.report_scroll_state(true, 200.0).unwrap();
    session.start(None).unwrap();

    let snapshot = session.wait_until(|s| s.is_paused).await.unwrap();
    let paused_len = snapshot.transcript.len();

    session.report_scroll_state(true, 1200.0).unwrap();
    let snapshot = session
        .wait_until(|s| s.transcript.len() > paused_len)
        .await
        .unwrap();
    assert!(!snapshot.is_paused);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sessions_keep_separate_ledgers() {
    let graph = lesson();
    let first = SessionHandle::spawn(
        Arc::clone(&graph),
        Arc::new(ScriptedTurnHandler::new()),
        DeliveryConfig::default(),
    );
    let second = SessionHandle::spawn(
        graph,
        Arc::new(ScriptedTurnHandler::new()),
        DeliveryConfig::default(),
    );
    assert_ne!(first.id(), second.id());

    first.start(None).unwrap();
    second.start(None).unwrap();
    first.wait_until(|s| !s.offered_choices.is_empty()).await.unwrap();
    second.wait_until(|s| !s.offered_choices.is_empty()).await.unwrap();

    first.choose_branch(NodeId::from("3.1")).unwrap();
    first.wait_until(|s| s.offered_choices.is_empty()).await.unwrap();

    // Restarting the second session still offers both options.
    second.start(Some(NodeId::from("3"))).unwrap();
    let snapshot = second
        .wait_until(|s| s.offered_choices.len() == 2 && s.texts() == ["Where next?"])
        .await
        .unwrap();
    assert_eq!(snapshot.offered_choices[0].text, "Supernovae");

    first.shutdown().await;
    second.shutdown().await;
}
