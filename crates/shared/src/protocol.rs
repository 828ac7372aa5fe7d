use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ChatRole, FileId, Locale, SessionId, ShareId};

pub type JsonObject = Map<String, Value>;

/// The backend serializes absent optional collections as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Body of every single-artifact command (`/qa`, `/refine`, `/clean`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRequest {
    pub file_id: FileId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub file_id: FileId,
    pub filename: String,
    pub file_type: String,
    pub num_chunks: u32,
    #[serde(default)]
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub filename: String,
    pub file_type: String,
    pub num_chunks: u32,
    pub uploaded_at: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResponse {
    pub score: f64,
    pub requires_refinement: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<String>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub col_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub final_rows: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub file_id: FileId,
    pub custom_prompt: Option<String>,
    pub language: Option<Locale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub file_id: FileId,
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_insights: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trends: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub data_stats: Option<JsonObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardRequest {
    pub file_id: FileId,
    pub language: Option<Locale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub chart_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axis: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<JsonObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitLossData {
    pub total_revenue: f64,
    pub total_cost: f64,
    pub net_profit: f64,
    pub margin_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthSuggestion {
    pub title: String,
    pub description: String,
    pub impact: String,
    pub feasibility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMetric {
    pub column_a: String,
    pub column_b: String,
    pub correlation: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub column: String,
    pub row_index: i64,
    pub value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub score: f64,
    #[serde(default)]
    pub missing_values_count: u64,
    #[serde(default)]
    pub duplicates_count: u64,
    #[serde(default)]
    pub variance_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceMetric {
    pub feature_name: String,
    pub importance_score: f64,
    pub impact_level: String,
    pub contribution_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSegment {
    pub name: String,
    pub size: u64,
    pub characteristics: String,
    pub growth_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesDecomposition {
    pub dates: Vec<String>,
    pub observed: Vec<f64>,
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInsight {
    pub agent_role: String,
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub file_id: FileId,
    #[serde(default)]
    pub detection_profile: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub charts: Vec<ChartData>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary_stats: JsonObject,
    #[serde(default)]
    pub profit_loss: Option<ProfitLossData>,
    #[serde(default)]
    pub growth_suggestions: Option<Vec<GrowthSuggestion>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub correlations: Vec<CorrelationMetric>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub anomalies: Vec<AnomalyAlert>,
    #[serde(default)]
    pub data_quality: Option<DataQualityReport>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub feature_importance: Vec<FeatureImportanceMetric>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub segments: Vec<DataSegment>,
    #[serde(default)]
    pub time_series_decomposition: Option<TimeSeriesDecomposition>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_insights: Vec<AgentInsight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalNode {
    pub id: String,
    #[serde(default)]
    pub group: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalLink {
    pub source: String,
    pub target: String,
    pub value: f64,
    #[serde(default)]
    pub strength: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalNetwork {
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<CausalNode>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub links: Vec<CausalLink>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CausalNetwork {
    /// A network worth rendering: no backend error and at least one node.
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningIssue {
    pub column: String,
    pub issue_type: String,
    pub severity: String,
    pub description: String,
    pub suggestion: String,
    pub affected_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCleaningResponse {
    pub file_id: FileId,
    pub total_issues: u64,
    pub quality_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<CleaningIssue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ai_recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub file_id: FileId,
    pub question: String,
    pub chat_history: Vec<ChatMessage>,
    pub session_id: Option<SessionId>,
    pub language: Option<Locale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<String>,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSessionInfo {
    pub session_id: SessionId,
    pub file_id: FileId,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    pub file_ids: Vec<FileId>,
    pub custom_prompt: Option<String>,
    pub language: Option<Locale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareResponse {
    pub comparison_summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub similarities: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub differences: Vec<String>,
    #[serde(default)]
    pub metrics_delta: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub comparative_strategy: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_summaries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRequest {
    pub file_id: FileId,
    pub include_analysis: bool,
    pub include_dashboard: bool,
    pub expires_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareResponse {
    pub share_id: ShareId,
    pub share_url: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedReportResponse {
    pub filename: String,
    #[serde(default)]
    pub analysis: Option<AnalysisResponse>,
    #[serde(default)]
    pub dashboard: Option<DashboardResponse>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetectResponse {
    pub file_id: FileId,
    pub detected_language: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailReportRequest {
    pub file_id: FileId,
    pub email: String,
    pub include_charts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    pub openai_api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyStatus {
    pub has_key: bool,
    #[serde(default)]
    pub key_preview: String,
}
