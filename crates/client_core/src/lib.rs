use async_trait::async_trait;
use shared::{
    domain::{ExportFormat, FileId, Locale, SessionId, ShareId},
    protocol::{
        AnalysisResponse, ApiKeyStatus, CausalNetwork, ChatRequest, ChatResponse,
        ChatSessionInfo, CompareResponse, DashboardResponse, DataCleaningResponse,
        EmailReportRequest, FileRecord, FileUploadResponse, LanguageDetectResponse,
        LoginResponse, QaResponse, RefineResponse, ShareRequest, ShareResponse,
        SharedReportResponse,
    },
};

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod generation;
pub mod http;
pub mod panels;
pub mod reorder;
pub mod retry;
pub mod selection;
pub mod workspace;

pub use auth::{AccessGate, FileTokenStore, MemoryTokenStore, TokenStore};
pub use error::{ClientError, ClientResult};
pub use gate::{DashboardPanel, DashboardPhase, DashboardState};
pub use http::HttpAnalysisClient;
pub use panels::{PanelOutcome, PanelState};
pub use reorder::DisplayOrder;
pub use retry::{with_retry, RetryPolicy};
pub use selection::{ArtifactRef, SelectionSync, FILE_ID_QUERY_KEY};
pub use workspace::{PanelKind, Workspace, WorkspaceEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A downloaded report, ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub fn suggested_filename(file_id: &FileId, format: ExportFormat) -> String {
        let prefix: String = file_id.as_str().chars().take(8).collect();
        format!("analysis_report_{prefix}.{}", format.extension())
    }
}

/// Every backend operation the client consumes.
///
/// The HTTP implementation lives in [`http::HttpAnalysisClient`]; panels and
/// the workspace only see this trait.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> ClientResult<LoginResponse>;
    async fn upload_file(&self, file: UploadFile) -> ClientResult<FileUploadResponse>;
    async fn upload_files(&self, files: Vec<UploadFile>) -> ClientResult<FileUploadResponse>;
    async fn list_files(&self) -> ClientResult<Vec<FileRecord>>;
    async fn delete_file(&self, file_id: &FileId) -> ClientResult<()>;
    async fn check_quality(&self, file_id: &FileId) -> ClientResult<QaResponse>;
    async fn refine(&self, file_id: &FileId) -> ClientResult<RefineResponse>;
    async fn analyze(
        &self,
        file_id: &FileId,
        custom_prompt: Option<&str>,
        locale: Locale,
    ) -> ClientResult<AnalysisResponse>;
    async fn dashboard(&self, file_id: &FileId, locale: Locale)
        -> ClientResult<DashboardResponse>;
    async fn causal_network(&self, file_id: &FileId) -> ClientResult<CausalNetwork>;
    async fn cleaning_report(&self, file_id: &FileId) -> ClientResult<DataCleaningResponse>;
    async fn chat(&self, request: ChatRequest) -> ClientResult<ChatResponse>;
    async fn chat_sessions(&self, file_id: &FileId) -> ClientResult<Vec<ChatSessionInfo>>;
    async fn chat_session(&self, session_id: &SessionId) -> ClientResult<ChatSessionInfo>;
    async fn delete_chat_session(&self, session_id: &SessionId) -> ClientResult<()>;
    async fn compare(
        &self,
        file_ids: &[FileId],
        custom_prompt: Option<&str>,
        locale: Locale,
    ) -> ClientResult<CompareResponse>;
    async fn share(&self, request: ShareRequest) -> ClientResult<ShareResponse>;
    async fn shared_report(&self, share_id: &ShareId) -> ClientResult<SharedReportResponse>;
    async fn export(
        &self,
        file_id: &FileId,
        format: ExportFormat,
        include_charts: bool,
    ) -> ClientResult<ExportArtifact>;
    async fn detect_language(&self, file_id: &FileId) -> ClientResult<LanguageDetectResponse>;
    async fn email_report(&self, request: EmailReportRequest) -> ClientResult<()>;
    async fn api_key_status(&self) -> ClientResult<ApiKeyStatus>;
    async fn set_api_key(&self, key: &str) -> ClientResult<ApiKeyStatus>;
    async fn remove_api_key(&self) -> ClientResult<()>;
}

#[cfg(test)]
#[path = "tests/fake_api.rs"]
pub(crate) mod fake_api;
