//! Plain-text rendering of backend payloads for the terminal.

use chrono::{DateTime, Local, NaiveDateTime};
use client_core::{gate::DashboardState, panels::ChatState};
use shared::{
    domain::{ChatRole, FileId},
    protocol::{
        AnalysisResponse, ApiKeyStatus, ChatSessionInfo, CompareResponse, DataCleaningResponse,
        FileRecord, QaResponse, SharedReportResponse,
    },
};

/// Backend timestamps come with or without an offset; naive ones are shown
/// as-is, offset ones in local time.
pub fn timestamp(raw: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return parsed.format("%Y-%m-%d %H:%M").to_string();
    }
    raw.to_string()
}

pub fn size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn bullets(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("\n{title}");
    for item in items {
        println!("  - {item}");
    }
}

pub fn files(files: &[FileRecord]) {
    if files.is_empty() {
        println!("No files uploaded yet.");
        return;
    }
    for file in files {
        println!(
            "{}  {:<32} {:>6} {:>10}  {}",
            file.file_id,
            file.filename,
            file.file_type,
            size(file.file_size),
            timestamp(&file.uploaded_at)
        );
    }
}

pub fn uploaded(file_id: &FileId, filename: &str, num_chunks: u32, preview: &str) {
    println!("Uploaded {filename} as {file_id} ({num_chunks} chunks)");
    if !preview.is_empty() {
        println!("\n{preview}");
    }
}

pub fn analysis(analysis: &AnalysisResponse) {
    println!("{}", analysis.summary);
    bullets("Key insights", &analysis.key_insights);
    bullets("Trends", &analysis.trends);
    bullets("Recommendations", &analysis.recommendations);
}

pub fn quality_report(report: &QaResponse) {
    println!(
        "Data quality score {:.1} ({} rows x {} columns) needs refinement.",
        report.score, report.row_count, report.col_count
    );
    bullets("Issues", &report.issues);
}

pub fn dashboard(state: &DashboardState) {
    let Some(dashboard) = &state.dashboard else {
        return;
    };
    if let Some(profile) = &dashboard.detection_profile {
        println!("Profile: {profile}");
    }

    println!("Charts:");
    for (position, chart) in state.order.ids().iter().zip(state.ordered_charts()) {
        println!("  [{position}] {} ({})", chart.title, chart.chart_type);
    }

    if let Some(pl) = &dashboard.profit_loss {
        println!(
            "\nRevenue {:.2}  Cost {:.2}  Net {:.2}  Margin {:.1}%",
            pl.total_revenue, pl.total_cost, pl.net_profit, pl.margin_percentage
        );
    }
    if !dashboard.anomalies.is_empty() {
        println!("\nAnomalies:");
        for anomaly in &dashboard.anomalies {
            println!(
                "  - {} row {}: {} ({})",
                anomaly.column, anomaly.row_index, anomaly.value, anomaly.reason
            );
        }
    }
    if let Some(causal) = &state.causal {
        println!("\nCausal links:");
        for link in &causal.links {
            println!("  {} -> {} ({:.2})", link.source, link.target, link.value);
        }
    }
}

pub fn cleaning(report: &DataCleaningResponse) {
    println!(
        "Quality score {:.1}, {} issue(s)",
        report.quality_score, report.total_issues
    );
    for issue in &report.issues {
        println!(
            "  [{}] {} {}: {} ({} rows) -> {}",
            issue.severity,
            issue.column,
            issue.issue_type,
            issue.description,
            issue.affected_rows,
            issue.suggestion
        );
    }
    bullets("Recommendations", &report.ai_recommendations);
}

pub fn chat_reply(state: &ChatState) {
    if let Some(reply) = state
        .messages
        .iter()
        .rev()
        .find(|message| message.role == ChatRole::Assistant)
    {
        println!("{}", reply.content);
    }
    if let Some(session_id) = &state.session_id {
        println!("\n(session {session_id})");
    }
}

pub fn sessions(sessions: &[ChatSessionInfo]) {
    if sessions.is_empty() {
        println!("No saved chat sessions.");
        return;
    }
    for session in sessions {
        println!(
            "{}  {:<40} {} messages  {}",
            session.session_id,
            session.title,
            session.messages.len(),
            timestamp(&session.updated_at)
        );
    }
}

pub fn comparison(result: &CompareResponse) {
    println!("{}", result.comparison_summary);
    bullets("Similarities", &result.similarities);
    bullets("Differences", &result.differences);
    if let Some(delta) = &result.metrics_delta {
        println!("\nMetric deltas:");
        for (metric, value) in delta {
            println!("  {metric}: {value:+.2}");
        }
    }
    if let Some(strategy) = &result.comparative_strategy {
        println!("\nStrategy: {strategy}");
    }
}

pub fn shared_report(report: &SharedReportResponse) {
    println!("{} (shared {})", report.filename, timestamp(&report.created_at));
    if let Some(analysis) = &report.analysis {
        println!();
        self::analysis(analysis);
    }
    if let Some(dashboard) = &report.dashboard {
        println!("\nCharts:");
        for chart in &dashboard.charts {
            println!("  - {} ({})", chart.title, chart.chart_type);
        }
    }
}

pub fn api_key(status: &ApiKeyStatus) {
    if status.has_key {
        println!("API key configured ({})", status.key_preview);
    } else {
        println!("No API key configured; the server default is used.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_timestamps_are_trimmed_to_minutes() {
        assert_eq!(timestamp("2024-05-01T10:07:59.123456"), "2024-05-01 10:07");
        assert_eq!(timestamp("2024-05-01T10:07:59"), "2024-05-01 10:07");
    }

    #[test]
    fn offset_timestamps_are_shown_in_local_time() {
        let raw = "2024-05-01T10:07:59.5+07:00";
        let expected = DateTime::parse_from_rfc3339(raw)
            .expect("rfc3339")
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        assert_eq!(timestamp(raw), expected);
        assert_eq!(timestamp(raw), timestamp("2024-05-01T03:07:59Z"));
    }

    #[test]
    fn unparseable_timestamps_pass_through() {
        assert_eq!(timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(size(512), "512 B");
        assert_eq!(size(2048), "2.0 KB");
        assert_eq!(size(5 * 1024 * 1024), "5.0 MB");
    }
}
