//! View state for every derived panel.
//!
//! Panels never hand an error back to their caller. A failed load becomes the
//! panel's inline message and the returned [`PanelOutcome`] says what
//! happened. Each load takes a generation ticket; a result that arrives after
//! a newer load (or a selection change) is dropped.

use std::{future::Future, sync::Arc};

use shared::{
    domain::{FileId, Locale, SessionId},
    protocol::{
        AnalysisResponse, ChatMessage, ChatRequest, ChatSessionInfo, CompareResponse,
        DataCleaningResponse, FileRecord,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, ClientResult},
    generation::RequestGeneration,
    retry::{exhausted_or_fatal, with_retry, RetryPolicy},
    selection::ArtifactRef,
    AnalysisApi, UploadFile,
};

pub const ANALYSIS_FALLBACK: &str = "Analysis failed. Please try again.";
pub const CLEANING_FALLBACK: &str = "Could not load the data cleaning report.";
pub const CHAT_ERROR_REPLY: &str = "Sorry, something went wrong while answering. Please try again.";
pub const COMPARE_FALLBACK: &str = "Comparison failed. Please try again.";
pub const COMPARE_MIN_FILES: &str = "Select at least two files to compare.";
pub const UPLOAD_FALLBACK: &str = "Upload failed. Please try again.";
pub const LIBRARY_FALLBACK: &str = "Could not delete the file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOutcome {
    /// The fetched payload was stored.
    Applied,
    /// The panel now shows an inline error.
    Failed,
    /// A newer request or a selection change superseded this one.
    Stale,
    /// The quality gate stopped the load; the user must decide.
    Blocked,
    /// Nothing was sent (blank input, send already pending).
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelState<T> {
    pub loading: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Default for PanelState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            data: None,
            error: None,
        }
    }
}

impl<T> PanelState<T> {
    pub fn start(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub fn succeed(&mut self, data: T) {
        self.loading = false;
        self.data = Some(data);
        self.error = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.data = None;
        self.error = Some(message.into());
    }
}

/// Runs one ticketed load against `state`.
async fn run_ticketed<T, Fut>(
    label: &'static str,
    fallback: &str,
    state: &Mutex<PanelState<T>>,
    generation: &RequestGeneration,
    load: Fut,
) -> PanelOutcome
where
    Fut: Future<Output = ClientResult<T>>,
{
    let ticket = generation.begin();
    state.lock().await.start();

    let result = load.await;

    let mut state = state.lock().await;
    if !generation.is_current(ticket) {
        debug!(panel = label, "panel: stale result discarded");
        return PanelOutcome::Stale;
    }
    match result {
        Ok(data) => {
            state.succeed(data);
            PanelOutcome::Applied
        }
        Err(err) => {
            warn!(panel = label, error = %err, reason = exhausted_or_fatal(&err), "panel: load failed");
            state.fail(err.user_message(fallback));
            PanelOutcome::Failed
        }
    }
}

pub struct AnalysisPanel {
    api: Arc<dyn AnalysisApi>,
    retry: RetryPolicy,
    state: Mutex<PanelState<AnalysisResponse>>,
    generation: RequestGeneration,
}

impl AnalysisPanel {
    pub fn new(api: Arc<dyn AnalysisApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            state: Mutex::new(PanelState::default()),
            generation: RequestGeneration::new(),
        }
    }

    pub async fn run(
        &self,
        file_id: &FileId,
        locale: Locale,
        custom_prompt: Option<&str>,
    ) -> PanelOutcome {
        let api = self.api.as_ref();
        run_ticketed(
            "analysis",
            ANALYSIS_FALLBACK,
            &self.state,
            &self.generation,
            with_retry(self.retry, "analysis", || {
                api.analyze(file_id, custom_prompt, locale)
            }),
        )
        .await
    }

    /// A user-authored prompt; blank prompts are never sent.
    pub async fn run_custom(&self, file_id: &FileId, locale: Locale, prompt: &str) -> PanelOutcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return PanelOutcome::Skipped;
        }
        self.run(file_id, locale, Some(prompt)).await
    }

    pub async fn snapshot(&self) -> PanelState<AnalysisResponse> {
        self.state.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.generation.invalidate();
        *self.state.lock().await = PanelState::default();
    }
}

pub struct CleaningPanel {
    api: Arc<dyn AnalysisApi>,
    state: Mutex<PanelState<DataCleaningResponse>>,
    generation: RequestGeneration,
}

impl CleaningPanel {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Mutex::new(PanelState::default()),
            generation: RequestGeneration::new(),
        }
    }

    pub async fn load(&self, file_id: &FileId) -> PanelOutcome {
        run_ticketed(
            "cleaning",
            CLEANING_FALLBACK,
            &self.state,
            &self.generation,
            self.api.cleaning_report(file_id),
        )
        .await
    }

    pub async fn snapshot(&self) -> PanelState<DataCleaningResponse> {
        self.state.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.generation.invalidate();
        *self.state.lock().await = PanelState::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub session_id: Option<SessionId>,
    pub sending: bool,
    pub sessions: Vec<ChatSessionInfo>,
}

pub struct ChatPanel {
    api: Arc<dyn AnalysisApi>,
    state: Mutex<ChatState>,
    generation: RequestGeneration,
}

impl ChatPanel {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Mutex::new(ChatState::default()),
            generation: RequestGeneration::new(),
        }
    }

    /// Appends the question, asks the backend with the history that preceded
    /// it, and appends the answer (or a generic error reply).
    pub async fn send(&self, file_id: &FileId, question: &str, locale: Locale) -> PanelOutcome {
        let question = question.trim();
        if question.is_empty() {
            return PanelOutcome::Skipped;
        }

        let (request, ticket) = {
            let mut state = self.state.lock().await;
            if state.sending {
                debug!(file_id = %file_id, "chat: send already pending");
                return PanelOutcome::Skipped;
            }
            let request = ChatRequest {
                file_id: file_id.clone(),
                question: question.to_string(),
                chat_history: state.messages.clone(),
                session_id: state.session_id.clone(),
                language: Some(locale),
            };
            state.messages.push(ChatMessage::user(question));
            state.sending = true;
            (request, self.generation.begin())
        };

        let result = self.api.chat(request).await;

        let outcome = {
            let mut state = self.state.lock().await;
            if !self.generation.is_current(ticket) {
                debug!(file_id = %file_id, "chat: reply for abandoned conversation dropped");
                return PanelOutcome::Stale;
            }
            state.sending = false;
            match result {
                Ok(reply) => {
                    state.session_id = Some(reply.session_id);
                    state.messages.push(ChatMessage::assistant(reply.answer));
                    PanelOutcome::Applied
                }
                Err(err) => {
                    warn!(file_id = %file_id, error = %err, "chat: question failed");
                    state.messages.push(ChatMessage::assistant(CHAT_ERROR_REPLY));
                    PanelOutcome::Failed
                }
            }
        };

        if outcome == PanelOutcome::Applied {
            self.refresh_sessions(file_id).await;
        }
        outcome
    }

    /// Reloads the saved-session list; failures keep the previous list.
    pub async fn refresh_sessions(&self, file_id: &FileId) {
        match self.api.chat_sessions(file_id).await {
            Ok(sessions) => self.state.lock().await.sessions = sessions,
            Err(err) => debug!(file_id = %file_id, error = %err, "chat: session list unavailable"),
        }
    }

    pub async fn open_session(&self, session: ChatSessionInfo) {
        self.generation.invalidate();
        let mut state = self.state.lock().await;
        state.messages = session.messages;
        state.session_id = Some(session.session_id);
        state.sending = false;
    }

    pub async fn fetch_session(&self, session_id: &SessionId) -> PanelOutcome {
        match self.api.chat_session(session_id).await {
            Ok(session) => {
                self.open_session(session).await;
                PanelOutcome::Applied
            }
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "chat: failed to load session");
                PanelOutcome::Failed
            }
        }
    }

    pub async fn new_session(&self) {
        self.generation.invalidate();
        let mut state = self.state.lock().await;
        state.messages.clear();
        state.session_id = None;
        state.sending = false;
    }

    pub async fn delete_session(&self, session_id: &SessionId) -> PanelOutcome {
        if let Err(err) = self.api.delete_chat_session(session_id).await {
            warn!(session_id = %session_id, error = %err, "chat: failed to delete session");
            return PanelOutcome::Failed;
        }

        let was_active = {
            let mut state = self.state.lock().await;
            state.sessions.retain(|session| &session.session_id != session_id);
            state.session_id.as_ref() == Some(session_id)
        };
        if was_active {
            self.new_session().await;
        }
        info!(session_id = %session_id, "chat: session deleted");
        PanelOutcome::Applied
    }

    pub async fn snapshot(&self) -> ChatState {
        self.state.lock().await.clone()
    }

    /// Forgets the conversation and the session list (selection changed).
    pub async fn clear(&self) {
        self.generation.invalidate();
        *self.state.lock().await = ChatState::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompareState {
    /// Files compared against the active artifact.
    pub files: Vec<ArtifactRef>,
    pub uploading: bool,
    pub result: PanelState<CompareResponse>,
}

pub struct ComparePanel {
    api: Arc<dyn AnalysisApi>,
    state: Mutex<CompareState>,
    generation: RequestGeneration,
}

impl ComparePanel {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Mutex::new(CompareState::default()),
            generation: RequestGeneration::new(),
        }
    }

    pub async fn add_file(&self, file: UploadFile) -> PanelOutcome {
        self.state.lock().await.uploading = true;
        let result = self.api.upload_file(file).await;

        let mut state = self.state.lock().await;
        state.uploading = false;
        match result {
            Ok(uploaded) => {
                let artifact = ArtifactRef::from(uploaded);
                if !state.files.iter().any(|file| file.file_id == artifact.file_id) {
                    self.abandon_pending(&mut state);
                    state.files.push(artifact);
                }
                PanelOutcome::Applied
            }
            Err(err) => {
                warn!(error = %err, "compare: upload failed");
                state.result.error = Some(err.user_message(UPLOAD_FALLBACK));
                PanelOutcome::Failed
            }
        }
    }

    pub async fn remove_file(&self, file_id: &FileId) {
        let mut state = self.state.lock().await;
        let before = state.files.len();
        state.files.retain(|file| &file.file_id != file_id);
        if state.files.len() != before {
            self.abandon_pending(&mut state);
        }
    }

    /// The file set changed, so a comparison still in flight no longer applies.
    fn abandon_pending(&self, state: &mut CompareState) {
        self.generation.invalidate();
        state.result.loading = false;
    }

    /// Compares `primary` with every added file. Fewer than two distinct
    /// identifiers never reach the backend.
    pub async fn compare(
        &self,
        primary: &FileId,
        locale: Locale,
        custom_prompt: Option<&str>,
    ) -> PanelOutcome {
        let ticket = self.generation.begin();
        let file_ids = {
            let mut state = self.state.lock().await;
            let mut file_ids = vec![primary.clone()];
            for file in &state.files {
                if !file_ids.contains(&file.file_id) {
                    file_ids.push(file.file_id.clone());
                }
            }
            if file_ids.len() < 2 {
                state.result.fail(COMPARE_MIN_FILES);
                return PanelOutcome::Failed;
            }
            state.result.start();
            file_ids
        };

        let custom_prompt = custom_prompt.map(str::trim).filter(|prompt| !prompt.is_empty());
        let result = self.api.compare(&file_ids, custom_prompt, locale).await;

        let mut state = self.state.lock().await;
        if !self.generation.is_current(ticket) {
            return PanelOutcome::Stale;
        }
        match result {
            Ok(response) => {
                info!(files = file_ids.len(), "compare: finished");
                state.result.succeed(response);
                PanelOutcome::Applied
            }
            Err(err) => {
                warn!(files = file_ids.len(), error = %err, "compare: request failed");
                state.result.fail(err.user_message(COMPARE_FALLBACK));
                PanelOutcome::Failed
            }
        }
    }

    pub async fn snapshot(&self) -> CompareState {
        self.state.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.generation.invalidate();
        *self.state.lock().await = CompareState::default();
    }
}

pub struct FileLibrary {
    api: Arc<dyn AnalysisApi>,
    state: Mutex<PanelState<Vec<FileRecord>>>,
}

impl FileLibrary {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Mutex::new(PanelState::default()),
        }
    }

    /// A failed listing shows an empty library rather than an error.
    pub async fn refresh(&self) -> PanelOutcome {
        self.state.lock().await.start();
        let result = self.api.list_files().await;

        let mut state = self.state.lock().await;
        match result {
            Ok(files) => {
                state.succeed(files);
                PanelOutcome::Applied
            }
            Err(err) => {
                warn!(error = %err, "library: listing failed");
                state.succeed(Vec::new());
                PanelOutcome::Failed
            }
        }
    }

    pub async fn delete(&self, file_id: &FileId) -> PanelOutcome {
        match self.api.delete_file(file_id).await {
            Ok(()) => {
                let mut state = self.state.lock().await;
                if let Some(files) = state.data.as_mut() {
                    files.retain(|file| &file.file_id != file_id);
                }
                state.error = None;
                info!(file_id = %file_id, "library: file deleted");
                PanelOutcome::Applied
            }
            Err(err) => {
                warn!(file_id = %file_id, error = %err, "library: delete failed");
                self.state.lock().await.error = Some(err.user_message(LIBRARY_FALLBACK));
                PanelOutcome::Failed
            }
        }
    }

    pub async fn files(&self) -> Vec<FileRecord> {
        self.state.lock().await.data.clone().unwrap_or_default()
    }

    pub async fn snapshot(&self) -> PanelState<Vec<FileRecord>> {
        self.state.lock().await.clone()
    }
}

/// Rejects an operation that needs an active artifact.
pub(crate) fn require_selection(selected: Option<&ArtifactRef>) -> ClientResult<FileId> {
    selected
        .map(|artifact| artifact.file_id.clone())
        .ok_or(ClientError::NoSelection)
}

#[cfg(test)]
#[path = "tests/panels_tests.rs"]
mod tests;
