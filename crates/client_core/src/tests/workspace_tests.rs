use std::time::Duration;

use super::*;
use crate::{
    error::ClientError,
    fake_api::{blocking_qa, record, FakeApi},
};

fn workspace(api: &Arc<FakeApi>, location: &str) -> Arc<Workspace> {
    Workspace::new(
        api.clone(),
        Url::parse(location).expect("valid test url"),
        Locale::En,
        RetryPolicy::new(2, Duration::from_millis(1)),
    )
}

fn artifact(file_id: &str) -> ArtifactRef {
    artifact_named(file_id, &format!("{file_id}.csv"))
}

fn artifact_named(file_id: &str, filename: &str) -> ArtifactRef {
    ArtifactRef::from(&record(file_id, filename))
}

fn drain(rx: &mut broadcast::Receiver<WorkspaceEvent>) -> Vec<WorkspaceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn restore_selects_listed_artifact() {
    let api = FakeApi::with_files(vec![record("f1", "sales.csv")]);
    let ws = workspace(&api, "http://app.local/en");
    let mut rx = ws.subscribe_events();

    let outcome = ws
        .restore(Url::parse("http://app.local/en?fileId=f1").expect("url"))
        .await;

    assert!(matches!(outcome, RestoreOutcome::Restored(_)));
    assert_eq!(ws.selected().await.map(|a| a.file_id), Some(FileId::new("f1")));
    assert_eq!(
        drain(&mut rx),
        [WorkspaceEvent::SelectionChanged(Some(artifact_named("f1", "sales.csv")))]
    );
}

#[tokio::test]
async fn select_during_restore_wins() {
    let api = FakeApi::with_files(vec![record("f1", "sales.csv")]);
    let pause = api.pause("files");
    let ws = workspace(&api, "http://app.local/en");

    let restoring = {
        let ws = ws.clone();
        tokio::spawn(async move {
            ws.restore(Url::parse("http://app.local/en?fileId=f1").expect("url"))
                .await
        })
    };
    pause.entered.notified().await;
    let location = ws.select(artifact("f2")).await;
    pause.release.notify_one();

    assert_eq!(restoring.await.expect("join"), RestoreOutcome::Superseded);
    assert_eq!(ws.selected().await.map(|a| a.file_id), Some(FileId::new("f2")));
    assert_eq!(location.query(), Some("fileId=f2"));
    assert_eq!(ws.location().await, location);
}

#[tokio::test]
async fn select_replaces_location_and_announces_it() {
    let api = FakeApi::new();
    let ws = workspace(&api, "http://app.local/my?tab=dashboard");
    let mut rx = ws.subscribe_events();

    let location = ws.select(artifact("f1")).await;

    assert_eq!(location.as_str(), "http://app.local/my?tab=dashboard&fileId=f1");
    assert_eq!(
        drain(&mut rx),
        [
            WorkspaceEvent::SelectionChanged(Some(artifact("f1"))),
            WorkspaceEvent::LocationReplaced(location),
        ]
    );
}

#[tokio::test]
async fn panel_loads_need_a_selection() {
    let api = FakeApi::new();
    let ws = workspace(&api, "http://app.local/en");

    assert_eq!(ws.load_analysis(None).await, PanelOutcome::Skipped);
    assert_eq!(ws.load_dashboard().await, PanelOutcome::Skipped);
    assert_eq!(ws.ask("hello").await, PanelOutcome::Skipped);
    assert!(api.calls().is_empty());

    assert!(matches!(
        ws.export(ExportFormat::Pdf, true).await,
        Err(ClientError::NoSelection)
    ));
    assert!(matches!(
        ws.share(true, true, DEFAULT_SHARE_EXPIRY_HOURS).await,
        Err(ClientError::NoSelection)
    ));
}

#[tokio::test]
async fn changing_selection_discards_in_flight_analysis() {
    let api = FakeApi::new();
    let pause = api.pause("analyze");
    let ws = workspace(&api, "http://app.local/en");
    ws.select(artifact("f1")).await;

    let loading = {
        let ws = ws.clone();
        tokio::spawn(async move { ws.load_analysis(None).await })
    };
    pause.entered.notified().await;
    ws.select(artifact("f2")).await;
    pause.release.notify_one();

    assert_eq!(loading.await.expect("join"), PanelOutcome::Stale);
    let state = ws.analysis().snapshot().await;
    assert!(state.data.is_none());
    assert!(!state.loading);
}

#[tokio::test]
async fn blocked_dashboard_is_published_as_update() {
    let api = FakeApi::new();
    FakeApi::script(&api.qa, Ok(blocking_qa()));
    let ws = workspace(&api, "http://app.local/en");
    ws.select(artifact("f1")).await;
    let mut rx = ws.subscribe_events();

    assert_eq!(ws.load_dashboard().await, PanelOutcome::Blocked);
    assert_eq!(ws.remediate_dashboard().await, PanelOutcome::Applied);
    assert!(ws.reorder_chart("chart-1", "chart-0").await);

    assert_eq!(api.calls(), ["qa", "refine", "dashboard", "causal"]);
    assert_eq!(
        drain(&mut rx),
        [
            WorkspaceEvent::PanelUpdated(PanelKind::Dashboard),
            WorkspaceEvent::PanelUpdated(PanelKind::Dashboard),
            WorkspaceEvent::PanelUpdated(PanelKind::Dashboard),
        ]
    );
    let titles: Vec<String> = ws
        .dashboard()
        .snapshot()
        .await
        .ordered_charts()
        .into_iter()
        .map(|chart| chart.title.clone())
        .collect();
    assert_eq!(titles, ["B", "A", "C"]);
}

#[tokio::test]
async fn failed_panel_publishes_inline_message() {
    let api = FakeApi::new();
    FakeApi::script(
        &api.cleaning,
        Err(ClientError::Api {
            status: 404,
            message: "File not found".to_string(),
        }),
    );
    let ws = workspace(&api, "http://app.local/en");
    ws.select(artifact("f1")).await;
    let mut rx = ws.subscribe_events();

    assert_eq!(ws.load_cleaning().await, PanelOutcome::Failed);
    assert_eq!(
        drain(&mut rx),
        [WorkspaceEvent::PanelFailed {
            panel: PanelKind::Cleaning,
            message: "File not found".to_string(),
        }]
    );
}

#[tokio::test]
async fn upload_selects_new_artifact_and_refreshes_library() {
    let api = FakeApi::new();
    let ws = workspace(&api, "http://app.local/en");

    let artifact = ws
        .upload_and_select(UploadFile {
            filename: "orders.xlsx".to_string(),
            mime_type: None,
            bytes: vec![1, 2, 3],
        })
        .await
        .expect("upload");

    assert_eq!(artifact.file_id, FileId::new("id-orders.xlsx"));
    assert_eq!(artifact.preview, "a,b\n1,2");
    assert_eq!(ws.location().await.query(), Some("fileId=id-orders.xlsx"));
    assert_eq!(api.calls(), ["upload", "files"]);
}

#[tokio::test]
async fn export_and_share_use_active_artifact() {
    let api = FakeApi::new();
    let ws = workspace(&api, "http://app.local/en");
    ws.select(artifact("0123456789abcdef")).await;

    let export = ws.export(ExportFormat::Pptx, true).await.expect("export");
    assert_eq!(export.filename, "analysis_report_01234567.pptx");

    let share = ws.share(true, false, 24).await.expect("share");
    assert_eq!(share.share_id.as_str(), "share-0123456789abcdef");
}

#[tokio::test]
async fn locale_is_passed_explicitly() {
    let api = FakeApi::new();
    let ws = workspace(&api, "http://app.local/en");
    ws.select(artifact("f1")).await;
    ws.set_locale(Locale::Th).await;

    ws.ask("สวัสดี").await;

    let requests = api.chat_requests.lock().unwrap().clone();
    assert_eq!(requests[0].language, Some(Locale::Th));
    assert_eq!(ws.locale().await, Locale::Th);
}

#[tokio::test]
async fn deleting_active_artifact_deselects_it() {
    let api = FakeApi::with_files(vec![record("f1", "sales.csv"), record("f2", "costs.csv")]);
    let ws = workspace(&api, "http://app.local/en?tab=x");
    ws.library().refresh().await;
    ws.select(artifact("f1")).await;
    let mut rx = ws.subscribe_events();

    assert_eq!(ws.delete_file(&FileId::new("f1")).await, PanelOutcome::Applied);

    assert!(ws.selected().await.is_none());
    let location = ws.location().await;
    assert_eq!(location.query(), Some("tab=x"));
    assert_eq!(
        drain(&mut rx),
        [
            WorkspaceEvent::SelectionChanged(None),
            WorkspaceEvent::LocationReplaced(location),
            WorkspaceEvent::PanelUpdated(PanelKind::Library),
        ]
    );

    assert_eq!(ws.load_analysis(None).await, PanelOutcome::Skipped);
    assert_eq!(api.calls(), ["files", "delete_file"]);
}

#[tokio::test]
async fn deleting_other_artifact_keeps_selection() {
    let api = FakeApi::with_files(vec![record("f1", "sales.csv"), record("f2", "costs.csv")]);
    let ws = workspace(&api, "http://app.local/en");
    ws.select(artifact("f1")).await;

    assert_eq!(ws.delete_file(&FileId::new("f2")).await, PanelOutcome::Applied);

    assert_eq!(ws.selected().await.map(|a| a.file_id), Some(FileId::new("f1")));
    assert_eq!(ws.location().await.query(), Some("fileId=f1"));
}

#[tokio::test]
async fn failed_delete_keeps_selection() {
    let api = FakeApi::new();
    FakeApi::script(
        &api.delete_file,
        Err(ClientError::Api {
            status: 404,
            message: "File not found".to_string(),
        }),
    );
    let ws = workspace(&api, "http://app.local/en");
    ws.select(artifact("f1")).await;

    assert_eq!(ws.delete_file(&FileId::new("f1")).await, PanelOutcome::Failed);
    assert_eq!(ws.selected().await.map(|a| a.file_id), Some(FileId::new("f1")));
}
