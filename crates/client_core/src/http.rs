use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ExportFormat, FileId, Locale, SessionId, ShareId},
    error::ApiErrorBody,
    protocol::{
        AnalysisResponse, AnalyzeRequest, ApiKeyRequest, ApiKeyStatus, CausalNetwork,
        ChatRequest, ChatResponse, ChatSessionInfo, CompareRequest, CompareResponse,
        DashboardRequest, DashboardResponse, DataCleaningResponse, EmailReportRequest,
        FileRecord, FileRequest, FileUploadResponse, LanguageDetectResponse, LoginRequest,
        LoginResponse, QaResponse, RefineResponse, ShareRequest, ShareResponse,
        SharedReportResponse,
    },
};
use tracing::{debug, info, warn};

use crate::{
    auth::TokenStore,
    error::{ClientError, ClientResult},
    AnalysisApi, ExportArtifact, UploadFile,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// reqwest-backed client for the analysis backend.
///
/// `base_url` includes the API prefix, e.g. `https://host/api`. One timeout
/// applies to every request.
pub struct HttpAnalysisClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl HttpAnalysisClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> ClientResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Forgets the stored token. The backend keeps no session to revoke.
    pub fn logout(&self) {
        self.tokens.clear();
        info!("auth: token cleared");
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let request = match self.tokens.load() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        self.check_response(response).await
    }

    async fn check_response(&self, response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let message = ApiErrorBody::parse(&raw)
            .and_then(|body| body.best_message())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        if status == StatusCode::UNAUTHORIZED {
            warn!("auth: backend rejected token; clearing stored credentials");
            self.tokens.clear();
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.send(self.http.get(self.url(path))).await?;
        Self::decode(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.send(self.http.post(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    async fn delete(&self, path: &str) -> ClientResult<()> {
        self.send(self.http.delete(self.url(path))).await?;
        Ok(())
    }

    fn file_part(file: UploadFile) -> ClientResult<multipart::Part> {
        let part = multipart::Part::bytes(file.bytes).file_name(file.filename);
        match file.mime_type {
            Some(mime) => part
                .mime_str(&mime)
                .map_err(|err| ClientError::Validation(format!("invalid mime type '{mime}': {err}"))),
            None => Ok(part),
        }
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisClient {
    async fn login(&self, username: &str, password: &str) -> ClientResult<LoginResponse> {
        let body: LoginResponse = self
            .post_json(
                "/login",
                &LoginRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;
        if body.access_token.is_empty() {
            return Err(ClientError::Decode(
                "login response carried an empty access_token".to_string(),
            ));
        }
        self.tokens.store(&body.access_token)?;
        info!(username, "auth: signed in");
        Ok(body)
    }

    async fn upload_file(&self, file: UploadFile) -> ClientResult<FileUploadResponse> {
        let filename = file.filename.clone();
        let form = multipart::Form::new().part("file", Self::file_part(file)?);
        let response = self
            .send(self.http.post(self.url("/upload")).multipart(form))
            .await?;
        let uploaded: FileUploadResponse = Self::decode(response).await?;
        info!(
            file_id = %uploaded.file_id,
            filename = %filename,
            num_chunks = uploaded.num_chunks,
            "upload: stored"
        );
        Ok(uploaded)
    }

    async fn upload_files(&self, files: Vec<UploadFile>) -> ClientResult<FileUploadResponse> {
        if files.is_empty() {
            return Err(ClientError::Validation(
                "select at least one file to upload".to_string(),
            ));
        }
        let count = files.len();
        let mut form = multipart::Form::new();
        for file in files {
            form = form.part("files", Self::file_part(file)?);
        }
        let response = self
            .send(self.http.post(self.url("/upload-multi")).multipart(form))
            .await?;
        let uploaded: FileUploadResponse = Self::decode(response).await?;
        info!(file_id = %uploaded.file_id, count, "upload: merged multi-file upload stored");
        Ok(uploaded)
    }

    async fn list_files(&self) -> ClientResult<Vec<FileRecord>> {
        self.get_json("/files").await
    }

    async fn delete_file(&self, file_id: &FileId) -> ClientResult<()> {
        self.delete(&format!("/files/{file_id}")).await
    }

    async fn check_quality(&self, file_id: &FileId) -> ClientResult<QaResponse> {
        self.post_json(
            "/qa",
            &FileRequest {
                file_id: file_id.clone(),
            },
        )
        .await
    }

    async fn refine(&self, file_id: &FileId) -> ClientResult<RefineResponse> {
        self.post_json(
            "/refine",
            &FileRequest {
                file_id: file_id.clone(),
            },
        )
        .await
    }

    async fn analyze(
        &self,
        file_id: &FileId,
        custom_prompt: Option<&str>,
        locale: Locale,
    ) -> ClientResult<AnalysisResponse> {
        self.post_json(
            "/analyze",
            &AnalyzeRequest {
                file_id: file_id.clone(),
                custom_prompt: custom_prompt.map(str::to_string),
                language: Some(locale),
            },
        )
        .await
    }

    async fn dashboard(
        &self,
        file_id: &FileId,
        locale: Locale,
    ) -> ClientResult<DashboardResponse> {
        self.post_json(
            "/dashboard",
            &DashboardRequest {
                file_id: file_id.clone(),
                language: Some(locale),
            },
        )
        .await
    }

    async fn causal_network(&self, file_id: &FileId) -> ClientResult<CausalNetwork> {
        self.get_json(&format!("/causal/{file_id}")).await
    }

    async fn cleaning_report(&self, file_id: &FileId) -> ClientResult<DataCleaningResponse> {
        self.post_json(
            "/clean",
            &FileRequest {
                file_id: file_id.clone(),
            },
        )
        .await
    }

    async fn chat(&self, request: ChatRequest) -> ClientResult<ChatResponse> {
        self.post_json("/chat", &request).await
    }

    async fn chat_sessions(&self, file_id: &FileId) -> ClientResult<Vec<ChatSessionInfo>> {
        self.get_json(&format!("/chat/sessions/{file_id}")).await
    }

    async fn chat_session(&self, session_id: &SessionId) -> ClientResult<ChatSessionInfo> {
        self.get_json(&format!("/chat/session/{session_id}")).await
    }

    async fn delete_chat_session(&self, session_id: &SessionId) -> ClientResult<()> {
        self.delete(&format!("/chat/session/{session_id}")).await
    }

    async fn compare(
        &self,
        file_ids: &[FileId],
        custom_prompt: Option<&str>,
        locale: Locale,
    ) -> ClientResult<CompareResponse> {
        self.post_json(
            "/compare",
            &CompareRequest {
                file_ids: file_ids.to_vec(),
                custom_prompt: custom_prompt.map(str::to_string),
                language: Some(locale),
            },
        )
        .await
    }

    async fn share(&self, request: ShareRequest) -> ClientResult<ShareResponse> {
        self.post_json("/share", &request).await
    }

    async fn shared_report(&self, share_id: &ShareId) -> ClientResult<SharedReportResponse> {
        self.get_json(&format!("/shared/{share_id}")).await
    }

    async fn export(
        &self,
        file_id: &FileId,
        format: ExportFormat,
        include_charts: bool,
    ) -> ClientResult<ExportArtifact> {
        let mut request = self
            .http
            .get(self.url(&format!("/export/{file_id}/{}", format.extension())));
        if format.supports_chart_flag() {
            request = request.query(&[("include_charts", include_charts)]);
        }
        let response = self.send(request).await?;

        let bytes = match format {
            ExportFormat::Json => {
                let value: serde_json::Value = Self::decode(response).await?;
                serde_json::to_vec_pretty(&value)
                    .map_err(|err| ClientError::Decode(err.to_string()))?
            }
            ExportFormat::Pdf | ExportFormat::Pptx => response.bytes().await?.to_vec(),
        };
        debug!(file_id = %file_id, format = format.extension(), size = bytes.len(), "export: downloaded");

        Ok(ExportArtifact {
            filename: ExportArtifact::suggested_filename(file_id, format),
            content_type: format.content_type(),
            bytes,
        })
    }

    async fn detect_language(&self, file_id: &FileId) -> ClientResult<LanguageDetectResponse> {
        self.post_json(
            "/detect-language",
            &FileRequest {
                file_id: file_id.clone(),
            },
        )
        .await
    }

    async fn email_report(&self, request: EmailReportRequest) -> ClientResult<()> {
        self.send(self.http.post(self.url("/email-report")).json(&request))
            .await?;
        Ok(())
    }

    async fn api_key_status(&self) -> ClientResult<ApiKeyStatus> {
        self.get_json("/settings/api-key").await
    }

    async fn set_api_key(&self, key: &str) -> ClientResult<ApiKeyStatus> {
        self.post_json(
            "/settings/api-key",
            &ApiKeyRequest {
                openai_api_key: key.to_string(),
            },
        )
        .await
    }

    async fn remove_api_key(&self) -> ClientResult<()> {
        self.delete("/settings/api-key").await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
