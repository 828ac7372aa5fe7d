//! One analysis session: the active artifact, its location, and every panel
//! derived from it.
//!
//! Changing the selection resets and invalidates all panels, so a load that
//! started for the previous artifact can never land on the new one.

use std::sync::Arc;

use shared::{
    domain::{ExportFormat, FileId, Locale},
    protocol::{ShareRequest, ShareResponse},
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info};
use url::Url;

use crate::{
    error::ClientResult,
    gate::DashboardPanel,
    panels::{
        require_selection, AnalysisPanel, ChatPanel, CleaningPanel, ComparePanel, FileLibrary,
        PanelOutcome, CHAT_ERROR_REPLY,
    },
    retry::RetryPolicy,
    selection::{ArtifactRef, RestoreOutcome, RestoreStep, SelectionSync},
    AnalysisApi, ExportArtifact, UploadFile,
};

pub const DEFAULT_SHARE_EXPIRY_HOURS: u32 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    Analysis,
    Dashboard,
    Cleaning,
    Chat,
    Compare,
    Library,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceEvent {
    SelectionChanged(Option<ArtifactRef>),
    /// The location was rewritten in place (no new history entry).
    LocationReplaced(Url),
    PanelUpdated(PanelKind),
    PanelFailed { panel: PanelKind, message: String },
}

pub struct Workspace {
    api: Arc<dyn AnalysisApi>,
    locale: RwLock<Locale>,
    selection: Mutex<SelectionSync>,
    analysis: AnalysisPanel,
    dashboard: DashboardPanel,
    cleaning: CleaningPanel,
    chat: ChatPanel,
    compare: ComparePanel,
    library: FileLibrary,
    events: broadcast::Sender<WorkspaceEvent>,
}

impl Workspace {
    /// Analysis and dashboard panels each receive their own copy of `retry`.
    pub fn new(
        api: Arc<dyn AnalysisApi>,
        location: Url,
        locale: Locale,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            analysis: AnalysisPanel::new(api.clone(), retry),
            dashboard: DashboardPanel::new(api.clone(), retry),
            cleaning: CleaningPanel::new(api.clone()),
            chat: ChatPanel::new(api.clone()),
            compare: ComparePanel::new(api.clone()),
            library: FileLibrary::new(api.clone()),
            api,
            locale: RwLock::new(locale),
            selection: Mutex::new(SelectionSync::new(location)),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub async fn locale(&self) -> Locale {
        *self.locale.read().await
    }

    pub async fn set_locale(&self, locale: Locale) {
        *self.locale.write().await = locale;
    }

    pub async fn selected(&self) -> Option<ArtifactRef> {
        self.selection.lock().await.selected().cloned()
    }

    pub async fn location(&self) -> Url {
        self.selection.lock().await.location().clone()
    }

    pub fn analysis(&self) -> &AnalysisPanel {
        &self.analysis
    }

    pub fn dashboard(&self) -> &DashboardPanel {
        &self.dashboard
    }

    pub fn cleaning(&self) -> &CleaningPanel {
        &self.cleaning
    }

    pub fn chat(&self) -> &ChatPanel {
        &self.chat
    }

    pub fn compare_panel(&self) -> &ComparePanel {
        &self.compare
    }

    pub fn library(&self) -> &FileLibrary {
        &self.library
    }

    /// Adopts `location` (initial load or external navigation) and resolves
    /// its artifact identifier. The list request runs without holding the
    /// selection lock; a `select` made meanwhile wins.
    pub async fn restore(&self, location: Url) -> RestoreOutcome {
        let step = {
            let mut selection = self.selection.lock().await;
            selection.navigate(location);
            selection.plan_restore()
        };

        let outcome = match step {
            RestoreStep::Unchanged => RestoreOutcome::Unchanged,
            RestoreStep::Cleared => RestoreOutcome::Cleared,
            RestoreStep::Resolve { file_id, ticket } => {
                let listing = self.api.list_files().await;
                self.selection
                    .lock()
                    .await
                    .complete_restore(ticket, &file_id, listing)
            }
        };

        match &outcome {
            RestoreOutcome::Restored(artifact) => {
                self.reset_panels().await;
                self.emit(WorkspaceEvent::SelectionChanged(Some(artifact.clone())));
            }
            RestoreOutcome::Cleared | RestoreOutcome::Unresolved => {
                self.reset_panels().await;
                self.emit(WorkspaceEvent::SelectionChanged(None));
            }
            RestoreOutcome::Unchanged | RestoreOutcome::Superseded => {}
        }
        outcome
    }

    pub async fn select(&self, artifact: ArtifactRef) -> Url {
        let location = {
            let mut selection = self.selection.lock().await;
            selection.select(artifact.clone()).clone()
        };
        info!(file_id = %artifact.file_id, "workspace: artifact selected");
        self.reset_panels().await;
        self.emit(WorkspaceEvent::SelectionChanged(Some(artifact)));
        self.emit(WorkspaceEvent::LocationReplaced(location.clone()));
        location
    }

    pub async fn deselect(&self) -> Url {
        let location = self.selection.lock().await.deselect().clone();
        info!("workspace: selection cleared");
        self.reset_panels().await;
        self.emit(WorkspaceEvent::SelectionChanged(None));
        self.emit(WorkspaceEvent::LocationReplaced(location.clone()));
        location
    }

    pub async fn upload_and_select(&self, file: UploadFile) -> ClientResult<ArtifactRef> {
        let uploaded = self.api.upload_file(file).await?;
        let artifact = ArtifactRef::from(uploaded);
        self.select(artifact.clone()).await;
        self.library.refresh().await;
        Ok(artifact)
    }

    /// Deleting the active artifact also deselects it.
    pub async fn delete_file(&self, file_id: &FileId) -> PanelOutcome {
        let outcome = self.library.delete(file_id).await;
        if outcome == PanelOutcome::Applied {
            let was_selected = self
                .selection
                .lock()
                .await
                .selected()
                .is_some_and(|artifact| &artifact.file_id == file_id);
            if was_selected {
                self.deselect().await;
            } else {
                self.compare.remove_file(file_id).await;
            }
        }
        self.publish(PanelKind::Library, outcome).await
    }

    pub async fn load_analysis(&self, custom_prompt: Option<&str>) -> PanelOutcome {
        let Some(file_id) = self.active_file(PanelKind::Analysis).await else {
            return PanelOutcome::Skipped;
        };
        let locale = self.locale().await;
        let outcome = match custom_prompt {
            Some(prompt) => self.analysis.run_custom(&file_id, locale, prompt).await,
            None => self.analysis.run(&file_id, locale, None).await,
        };
        self.publish(PanelKind::Analysis, outcome).await
    }

    pub async fn load_dashboard(&self) -> PanelOutcome {
        let Some(file_id) = self.active_file(PanelKind::Dashboard).await else {
            return PanelOutcome::Skipped;
        };
        let outcome = self.dashboard.load(&file_id, self.locale().await).await;
        self.publish(PanelKind::Dashboard, outcome).await
    }

    pub async fn proceed_dashboard(&self) -> PanelOutcome {
        let Some(file_id) = self.active_file(PanelKind::Dashboard).await else {
            return PanelOutcome::Skipped;
        };
        let outcome = self
            .dashboard
            .proceed_anyway(&file_id, self.locale().await)
            .await;
        self.publish(PanelKind::Dashboard, outcome).await
    }

    pub async fn remediate_dashboard(&self) -> PanelOutcome {
        let Some(file_id) = self.active_file(PanelKind::Dashboard).await else {
            return PanelOutcome::Skipped;
        };
        let outcome = self.dashboard.remediate(&file_id, self.locale().await).await;
        self.publish(PanelKind::Dashboard, outcome).await
    }

    pub async fn reorder_chart(&self, source: &str, target: &str) -> bool {
        let moved = self.dashboard.reorder(source, target).await;
        if moved {
            self.emit(WorkspaceEvent::PanelUpdated(PanelKind::Dashboard));
        }
        moved
    }

    pub async fn load_cleaning(&self) -> PanelOutcome {
        let Some(file_id) = self.active_file(PanelKind::Cleaning).await else {
            return PanelOutcome::Skipped;
        };
        let outcome = self.cleaning.load(&file_id).await;
        self.publish(PanelKind::Cleaning, outcome).await
    }

    pub async fn ask(&self, question: &str) -> PanelOutcome {
        let Some(file_id) = self.active_file(PanelKind::Chat).await else {
            return PanelOutcome::Skipped;
        };
        let outcome = self
            .chat
            .send(&file_id, question, self.locale().await)
            .await;
        self.publish(PanelKind::Chat, outcome).await
    }

    pub async fn compare(&self, custom_prompt: Option<&str>) -> PanelOutcome {
        let Some(file_id) = self.active_file(PanelKind::Compare).await else {
            return PanelOutcome::Skipped;
        };
        let outcome = self
            .compare
            .compare(&file_id, self.locale().await, custom_prompt)
            .await;
        self.publish(PanelKind::Compare, outcome).await
    }

    pub async fn share(
        &self,
        include_analysis: bool,
        include_dashboard: bool,
        expires_hours: u32,
    ) -> ClientResult<ShareResponse> {
        let file_id = require_selection(self.selected().await.as_ref())?;
        let response = self
            .api
            .share(ShareRequest {
                file_id: file_id.clone(),
                include_analysis,
                include_dashboard,
                expires_hours,
            })
            .await?;
        info!(file_id = %file_id, share_id = %response.share_id, "workspace: report shared");
        Ok(response)
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        include_charts: bool,
    ) -> ClientResult<ExportArtifact> {
        let file_id = require_selection(self.selected().await.as_ref())?;
        self.api.export(&file_id, format, include_charts).await
    }

    async fn active_file(&self, panel: PanelKind) -> Option<FileId> {
        let file_id = self
            .selection
            .lock()
            .await
            .selected()
            .map(|artifact| artifact.file_id.clone());
        if file_id.is_none() {
            debug!(?panel, "workspace: no artifact selected; load skipped");
        }
        file_id
    }

    async fn reset_panels(&self) {
        self.analysis.clear().await;
        self.dashboard.clear().await;
        self.cleaning.clear().await;
        self.chat.clear().await;
        self.compare.clear().await;
    }

    async fn publish(&self, panel: PanelKind, outcome: PanelOutcome) -> PanelOutcome {
        match outcome {
            PanelOutcome::Applied | PanelOutcome::Blocked => {
                self.emit(WorkspaceEvent::PanelUpdated(panel));
            }
            PanelOutcome::Failed => {
                let message = self.panel_error(panel).await.unwrap_or_default();
                self.emit(WorkspaceEvent::PanelFailed { panel, message });
            }
            PanelOutcome::Stale | PanelOutcome::Skipped => {}
        }
        outcome
    }

    async fn panel_error(&self, panel: PanelKind) -> Option<String> {
        match panel {
            PanelKind::Analysis => self.analysis.snapshot().await.error,
            PanelKind::Dashboard => self.dashboard.snapshot().await.error,
            PanelKind::Cleaning => self.cleaning.snapshot().await.error,
            PanelKind::Chat => Some(CHAT_ERROR_REPLY.to_string()),
            PanelKind::Compare => self.compare.snapshot().await.result.error,
            PanelKind::Library => self.library.snapshot().await.error,
        }
    }

    fn emit(&self, event: WorkspaceEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/workspace_tests.rs"]
mod tests;
