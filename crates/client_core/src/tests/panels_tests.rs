use std::time::Duration;

use super::*;
use crate::fake_api::{api_error, record, session, FakeApi};
use shared::domain::ChatRole;

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1))
}

fn file(id: &str) -> FileId {
    FileId::new(id)
}

fn upload(name: &str) -> UploadFile {
    UploadFile {
        filename: name.to_string(),
        mime_type: Some("text/csv".to_string()),
        bytes: b"a,b\n1,2\n".to_vec(),
    }
}

#[tokio::test]
async fn analysis_stores_payload() {
    let api = FakeApi::new();
    let panel = AnalysisPanel::new(api.clone(), fast_retry());

    assert_eq!(panel.run(&file("f1"), Locale::Fr, None).await, PanelOutcome::Applied);

    let state = panel.snapshot().await;
    assert!(!state.loading);
    assert_eq!(state.data.expect("payload").summary, "standard summary");
}

#[tokio::test]
async fn analysis_error_prefers_backend_message() {
    let api = FakeApi::new();
    FakeApi::script(&api.analyze, Err(api_error(404, "File not found")));
    let panel = AnalysisPanel::new(api.clone(), fast_retry());

    assert_eq!(panel.run(&file("f1"), Locale::En, None).await, PanelOutcome::Failed);

    let state = panel.snapshot().await;
    assert_eq!(state.error.as_deref(), Some("File not found"));
    assert_eq!(api.count("analyze"), 1);
}

#[tokio::test]
async fn analysis_falls_back_to_generic_message() {
    let api = FakeApi::new();
    FakeApi::script(&api.analyze, Err(ClientError::Decode("unexpected eof".to_string())));
    let panel = AnalysisPanel::new(api.clone(), fast_retry());

    panel.run(&file("f1"), Locale::En, None).await;
    assert_eq!(panel.snapshot().await.error.as_deref(), Some(ANALYSIS_FALLBACK));
}

#[tokio::test]
async fn blank_custom_prompt_is_never_sent() {
    let api = FakeApi::new();
    let panel = AnalysisPanel::new(api.clone(), fast_retry());

    assert_eq!(panel.run_custom(&file("f1"), Locale::En, "   ").await, PanelOutcome::Skipped);
    assert_eq!(api.count("analyze"), 0);

    assert_eq!(
        panel.run_custom(&file("f1"), Locale::En, "  focus on churn ").await,
        PanelOutcome::Applied
    );
    assert_eq!(
        panel.snapshot().await.data.expect("payload").summary,
        "focus on churn"
    );
}

#[tokio::test]
async fn newer_analysis_supersedes_older() {
    let api = FakeApi::new();
    let pause = api.pause("analyze");
    let panel = Arc::new(AnalysisPanel::new(api.clone(), fast_retry()));

    let first = {
        let panel = panel.clone();
        tokio::spawn(async move { panel.run(&file("f1"), Locale::En, Some("first")).await })
    };
    pause.entered.notified().await;

    let second = {
        let panel = panel.clone();
        tokio::spawn(async move { panel.run(&file("f1"), Locale::En, Some("second")).await })
    };
    pause.entered.notified().await;

    pause.release.notify_one();
    pause.release.notify_one();

    let outcomes = [first.await.expect("join"), second.await.expect("join")];
    assert!(outcomes.contains(&PanelOutcome::Stale));
    assert!(outcomes.contains(&PanelOutcome::Applied));
    assert_eq!(outcomes[0], PanelOutcome::Stale);
    assert_eq!(panel.snapshot().await.data.expect("payload").summary, "second");
}

#[tokio::test]
async fn cleaning_failure_uses_fallback_for_opaque_errors() {
    let api = FakeApi::new();
    FakeApi::script(&api.cleaning, Err(api_error(500, " ")));
    let panel = CleaningPanel::new(api.clone());

    assert_eq!(panel.load(&file("f1")).await, PanelOutcome::Failed);
    assert_eq!(api.count("clean"), 1);
    assert_eq!(panel.snapshot().await.error.as_deref(), Some(CLEANING_FALLBACK));
}

#[tokio::test]
async fn chat_sends_prior_history_and_records_session() {
    let api = FakeApi::new();
    let chat = ChatPanel::new(api.clone());

    assert_eq!(chat.send(&file("f1"), "What sold best?", Locale::En).await, PanelOutcome::Applied);
    assert_eq!(chat.send(&file("f1"), "And worst?", Locale::En).await, PanelOutcome::Applied);

    let requests = api.chat_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].chat_history.is_empty());
    assert_eq!(requests[0].session_id, None);
    assert_eq!(requests[1].chat_history.len(), 2);
    assert_eq!(requests[1].session_id, Some(SessionId::new("session-1")));

    let state = chat.snapshot().await;
    assert_eq!(state.messages.len(), 4);
    assert_eq!(state.messages[3].content, "answer to And worst?");
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(api.count("chat_sessions"), 2);
}

#[tokio::test]
async fn chat_failure_appends_error_reply() {
    let api = FakeApi::new();
    FakeApi::script(&api.chat, Err(api_error(500, "llm offline")));
    let chat = ChatPanel::new(api.clone());

    assert_eq!(chat.send(&file("f1"), "hello", Locale::En).await, PanelOutcome::Failed);

    let state = chat.snapshot().await;
    assert!(!state.sending);
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].role, ChatRole::Assistant);
    assert_eq!(state.messages[1].content, CHAT_ERROR_REPLY);
    assert_eq!(api.count("chat_sessions"), 0);
}

#[tokio::test]
async fn chat_ignores_blank_and_concurrent_sends() {
    let api = FakeApi::new();
    let pause = api.pause("chat");
    let chat = Arc::new(ChatPanel::new(api.clone()));

    assert_eq!(chat.send(&file("f1"), "  ", Locale::En).await, PanelOutcome::Skipped);

    let pending = {
        let chat = chat.clone();
        tokio::spawn(async move { chat.send(&file("f1"), "first", Locale::En).await })
    };
    pause.entered.notified().await;

    assert_eq!(chat.send(&file("f1"), "second", Locale::En).await, PanelOutcome::Skipped);
    pause.release.notify_one();
    assert_eq!(pending.await.expect("join"), PanelOutcome::Applied);
    assert_eq!(api.count("chat"), 1);
}

#[tokio::test]
async fn session_list_failure_is_ignored() {
    let api = FakeApi::new();
    FakeApi::script(&api.chat_sessions, Err(api_error(500, "boom")));
    let chat = ChatPanel::new(api.clone());

    assert_eq!(chat.send(&file("f1"), "hi", Locale::En).await, PanelOutcome::Applied);
    assert!(chat.snapshot().await.sessions.is_empty());
}

#[tokio::test]
async fn deleting_active_session_starts_fresh() {
    let api = FakeApi::new();
    let chat = ChatPanel::new(api.clone());
    chat.open_session(session(
        "s-7",
        "f1",
        vec![ChatMessage::user("q"), ChatMessage::assistant("a")],
    ))
    .await;
    assert_eq!(chat.snapshot().await.messages.len(), 2);

    assert_eq!(chat.delete_session(&SessionId::new("s-7")).await, PanelOutcome::Applied);

    let state = chat.snapshot().await;
    assert!(state.messages.is_empty());
    assert_eq!(state.session_id, None);
}

#[tokio::test]
async fn fetch_session_opens_saved_conversation() {
    let api = FakeApi::new();
    FakeApi::script(
        &api.chat_session,
        Ok(session("s-3", "f1", vec![ChatMessage::user("earlier question")])),
    );
    let chat = ChatPanel::new(api.clone());

    assert_eq!(chat.fetch_session(&SessionId::new("s-3")).await, PanelOutcome::Applied);
    let state = chat.snapshot().await;
    assert_eq!(state.session_id, Some(SessionId::new("s-3")));
    assert_eq!(state.messages[0].content, "earlier question");
}

#[tokio::test]
async fn compare_needs_two_files() {
    let api = FakeApi::new();
    let compare = ComparePanel::new(api.clone());

    assert_eq!(compare.compare(&file("f1"), Locale::En, None).await, PanelOutcome::Failed);
    assert_eq!(api.count("compare"), 0);
    assert_eq!(
        compare.snapshot().await.result.error.as_deref(),
        Some(COMPARE_MIN_FILES)
    );
}

#[tokio::test]
async fn compare_sends_primary_first() {
    let api = FakeApi::new();
    let compare = ComparePanel::new(api.clone());
    assert_eq!(compare.add_file(upload("q2.csv")).await, PanelOutcome::Applied);
    assert_eq!(compare.add_file(upload("q3.csv")).await, PanelOutcome::Applied);
    compare.remove_file(&file("id-q3.csv")).await;
    assert_eq!(compare.add_file(upload("q4.csv")).await, PanelOutcome::Applied);

    assert_eq!(compare.compare(&file("f1"), Locale::En, Some("  ")).await, PanelOutcome::Applied);

    let sent = api.compare_requests.lock().unwrap().clone();
    assert_eq!(sent, [vec![file("f1"), file("id-q2.csv"), file("id-q4.csv")]]);
    let state = compare.snapshot().await;
    assert_eq!(state.result.data.expect("result").comparison_summary, "compared 3");
}

#[tokio::test]
async fn comparison_for_an_old_file_set_is_dropped() {
    let api = FakeApi::new();
    let pause = api.pause("compare");
    let compare = Arc::new(ComparePanel::new(api.clone()));
    compare.add_file(upload("q2.csv")).await;

    let in_flight = {
        let compare = compare.clone();
        tokio::spawn(async move { compare.compare(&file("f1"), Locale::En, None).await })
    };
    pause.entered.notified().await;

    compare.remove_file(&file("id-q2.csv")).await;
    assert!(!compare.snapshot().await.result.loading);
    assert_eq!(compare.compare(&file("f1"), Locale::En, None).await, PanelOutcome::Failed);
    pause.release.notify_one();

    assert_eq!(in_flight.await.expect("join"), PanelOutcome::Stale);
    let state = compare.snapshot().await;
    assert!(state.files.is_empty());
    assert!(state.result.data.is_none());
    assert_eq!(state.result.error.as_deref(), Some(COMPARE_MIN_FILES));
}

#[tokio::test]
async fn validation_failure_supersedes_pending_comparison() {
    let api = FakeApi::new();
    let pause = api.pause("compare");
    let compare = Arc::new(ComparePanel::new(api.clone()));
    compare.add_file(upload("q2.csv")).await;

    let in_flight = {
        let compare = compare.clone();
        tokio::spawn(async move { compare.compare(&file("f1"), Locale::En, None).await })
    };
    pause.entered.notified().await;

    // Comparing a file with itself leaves one distinct id.
    assert_eq!(
        compare.compare(&file("id-q2.csv"), Locale::En, None).await,
        PanelOutcome::Failed
    );
    pause.release.notify_one();

    assert_eq!(in_flight.await.expect("join"), PanelOutcome::Stale);
    assert_eq!(
        compare.snapshot().await.result.error.as_deref(),
        Some(COMPARE_MIN_FILES)
    );
}

#[tokio::test]
async fn library_refresh_failure_shows_empty_list() {
    let api = FakeApi::with_files(vec![record("f1", "sales.csv")]);
    FakeApi::script(&api.list_files, Err(api_error(500, "db down")));
    let library = FileLibrary::new(api.clone());

    assert_eq!(library.refresh().await, PanelOutcome::Failed);
    assert!(library.files().await.is_empty());

    assert_eq!(library.refresh().await, PanelOutcome::Applied);
    assert_eq!(library.files().await.len(), 1);
}

#[tokio::test]
async fn library_delete_removes_locally() {
    let api = FakeApi::with_files(vec![record("f1", "sales.csv"), record("f2", "costs.csv")]);
    let library = FileLibrary::new(api.clone());
    library.refresh().await;

    assert_eq!(library.delete(&file("f1")).await, PanelOutcome::Applied);

    let files = library.files().await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_id, file("f2"));
}

#[test]
fn require_selection_reports_missing_artifact() {
    assert!(matches!(require_selection(None), Err(ClientError::NoSelection)));
}
