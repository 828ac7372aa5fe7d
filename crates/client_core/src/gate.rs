//! Quality-gated dashboard loading.
//!
//! A dashboard is only fetched after `/qa` has had its say: a report that
//! asks for refinement stops the load until the user either proceeds anyway
//! or remediates. A failing `/qa` call never blocks the dashboard.

use std::sync::Arc;

use shared::{
    domain::{FileId, Locale},
    protocol::{CausalNetwork, ChartData, DashboardResponse, QaResponse},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    generation::{RequestGeneration, Ticket},
    panels::PanelOutcome,
    reorder::DisplayOrder,
    retry::{exhausted_or_fatal, with_retry, RetryPolicy},
    AnalysisApi,
};

pub const DASHBOARD_FALLBACK: &str = "Dashboard generation failed. Please try again.";
pub const REFINE_FALLBACK: &str = "Data refinement failed.";

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DashboardPhase {
    #[default]
    Idle,
    CheckingQuality,
    /// The quality report asked for refinement; nothing else was fetched.
    AwaitingDecision(QaResponse),
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub phase: DashboardPhase,
    pub refining: bool,
    pub dashboard: Option<DashboardResponse>,
    /// Absent when the causal fetch failed or produced nothing to draw.
    pub causal: Option<CausalNetwork>,
    pub order: DisplayOrder,
    pub error: Option<String>,
}

impl DashboardState {
    pub fn quality_report(&self) -> Option<&QaResponse> {
        match &self.phase {
            DashboardPhase::AwaitingDecision(report) => Some(report),
            _ => None,
        }
    }

    pub fn ordered_charts(&self) -> Vec<&ChartData> {
        match &self.dashboard {
            Some(dashboard) => self.order.arrange(&dashboard.charts),
            None => Vec::new(),
        }
    }
}

pub struct DashboardPanel {
    api: Arc<dyn AnalysisApi>,
    retry: RetryPolicy,
    state: Mutex<DashboardState>,
    generation: RequestGeneration,
}

impl DashboardPanel {
    pub fn new(api: Arc<dyn AnalysisApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            state: Mutex::new(DashboardState::default()),
            generation: RequestGeneration::new(),
        }
    }

    pub async fn load(&self, file_id: &FileId, locale: Locale) -> PanelOutcome {
        let ticket = self.generation.begin();
        {
            let mut state = self.state.lock().await;
            state.phase = DashboardPhase::CheckingQuality;
            state.error = None;
        }

        let quality = self.api.check_quality(file_id).await;
        if !self.generation.is_current(ticket) {
            return PanelOutcome::Stale;
        }

        match quality {
            Ok(report) if report.requires_refinement => {
                info!(
                    file_id = %file_id,
                    score = report.score,
                    issues = report.issues.len(),
                    "dashboard: quality gate blocked"
                );
                self.state.lock().await.phase = DashboardPhase::AwaitingDecision(report);
                return PanelOutcome::Blocked;
            }
            Ok(report) => {
                debug!(file_id = %file_id, score = report.score, "dashboard: quality gate passed");
            }
            Err(err) => {
                warn!(file_id = %file_id, error = %err, "dashboard: quality check failed; continuing");
            }
        }

        self.fetch(ticket, file_id, locale).await
    }

    /// Loads the dashboard despite a blocking quality report.
    pub async fn proceed_anyway(&self, file_id: &FileId, locale: Locale) -> PanelOutcome {
        info!(file_id = %file_id, "dashboard: proceeding without refinement");
        let ticket = self.generation.begin();
        self.fetch(ticket, file_id, locale).await
    }

    /// Refines the data, then loads the dashboard without checking quality
    /// again. A failed refinement keeps the panel blocked.
    pub async fn remediate(&self, file_id: &FileId, locale: Locale) -> PanelOutcome {
        let ticket = self.generation.begin();
        {
            let mut state = self.state.lock().await;
            state.refining = true;
            state.error = None;
        }

        let refined = self.api.refine(file_id).await.and_then(|response| {
            if response.success {
                Ok(response)
            } else {
                Err(ClientError::Validation(if response.message.trim().is_empty() {
                    REFINE_FALLBACK.to_string()
                } else {
                    response.message
                }))
            }
        });

        let mut state = self.state.lock().await;
        if !self.generation.is_current(ticket) {
            return PanelOutcome::Stale;
        }
        state.refining = false;
        match refined {
            Ok(response) => {
                info!(file_id = %file_id, final_rows = response.final_rows, "dashboard: data refined");
                drop(state);
                self.fetch(ticket, file_id, locale).await
            }
            Err(err) => {
                warn!(file_id = %file_id, error = %err, "dashboard: refinement failed");
                state.error = Some(err.user_message(REFINE_FALLBACK));
                PanelOutcome::Failed
            }
        }
    }

    async fn fetch(&self, ticket: Ticket, file_id: &FileId, locale: Locale) -> PanelOutcome {
        {
            let mut state = self.state.lock().await;
            if !self.generation.is_current(ticket) {
                return PanelOutcome::Stale;
            }
            state.phase = DashboardPhase::Loading;
            state.error = None;
        }

        let api = self.api.as_ref();
        let result = with_retry(self.retry, "dashboard", || api.dashboard(file_id, locale)).await;

        {
            let mut state = self.state.lock().await;
            if !self.generation.is_current(ticket) {
                return PanelOutcome::Stale;
            }
            match result {
                Ok(dashboard) => {
                    info!(file_id = %file_id, charts = dashboard.charts.len(), "dashboard: loaded");
                    state.order.reset(dashboard.charts.len());
                    state.dashboard = Some(dashboard);
                    state.causal = None;
                    state.phase = DashboardPhase::Ready;
                }
                Err(err) => {
                    warn!(
                        file_id = %file_id,
                        error = %err,
                        reason = exhausted_or_fatal(&err),
                        "dashboard: load failed"
                    );
                    state.dashboard = None;
                    state.causal = None;
                    state.order.reset(0);
                    state.phase = DashboardPhase::Failed;
                    state.error = Some(err.user_message(DASHBOARD_FALLBACK));
                    return PanelOutcome::Failed;
                }
            }
        }

        self.attach_causal(ticket, file_id).await;
        PanelOutcome::Applied
    }

    async fn attach_causal(&self, ticket: Ticket, file_id: &FileId) {
        let causal = match self.api.causal_network(file_id).await {
            Ok(network) if network.is_usable() => network,
            Ok(network) => {
                debug!(
                    file_id = %file_id,
                    error = network.error.as_deref().unwrap_or("no nodes"),
                    "dashboard: causal network omitted"
                );
                return;
            }
            Err(err) => {
                warn!(file_id = %file_id, error = %err, "dashboard: causal network unavailable");
                return;
            }
        };

        let mut state = self.state.lock().await;
        if self.generation.is_current(ticket) {
            state.causal = Some(causal);
        }
    }

    /// Client-side chart reorder; returns whether anything moved.
    pub async fn reorder(&self, source: &str, target: &str) -> bool {
        self.state.lock().await.order.move_item(source, target)
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.generation.invalidate();
        *self.state.lock().await = DashboardState::default();
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
