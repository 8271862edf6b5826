//! Synchronization trigger endpoints
//!
//! Thin HTTP faces over the orchestrator and the sweep. The same
//! operations are plain async methods, so background jobs and these
//! user-facing routes share one implementation. An LMS-side failure is a
//! 200 with a report body the caller inspects: the local action already
//! succeeded, the sync status is secondary.

use crate::db::entries;
use crate::error::ApiResult;
use crate::services::passback::PassbackReport;
use crate::services::reconciliation::SweepSummary;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use penlight_common::db::models::Entry;
use serde::{Deserialize, Serialize};

/// POST /api/journals/:journal_guid/passback
///
/// Synchronous full-grade passback for one journal.
pub async fn passback_journal(
    State(state): State<AppState>,
    Path(journal_guid): Path<String>,
) -> ApiResult<Json<PassbackReport>> {
    let report = state.orchestrator.replace_result(&journal_guid).await?;
    Ok(Json(report))
}

/// POST /api/journals/:journal_guid/entries/:entry_guid/notify
///
/// Needs-grading notification for one submitted entry.
pub async fn notify_entry(
    State(state): State<AppState>,
    Path((journal_guid, entry_guid)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .notify_needs_grading(&journal_guid, &entry_guid)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub grade: Option<f64>,
    pub published: bool,
}

#[derive(Debug, Serialize)]
pub struct GradeResponse {
    pub entry: Entry,
    /// Present when the grade was published on a linked journal and an
    /// immediate passback was attempted
    pub report: Option<PassbackReport>,
}

/// POST /api/entries/:entry_guid/grade
///
/// Records a grading action. The grade always persists locally; when it is
/// published, a synchronous passback follows so the grader sees the LMS
/// echo immediately.
pub async fn grade_entry(
    State(state): State<AppState>,
    Path(entry_guid): Path<String>,
    Json(request): Json<GradeRequest>,
) -> ApiResult<Json<GradeResponse>> {
    let entry = entries::set_grade(&state.db, &entry_guid, request.grade, request.published).await?;

    let report = if entry.published && entry.grade.is_some() {
        Some(state.orchestrator.replace_result(&entry.journal_guid).await?)
    } else {
        None
    };

    // Re-read: the passback may have moved the coupling status
    let entry = entries::get(&state.db, &entry_guid).await?;

    Ok(Json(GradeResponse { entry, report }))
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub journal_guid: String,
    pub report: PassbackReport,
}

/// POST /api/assignments/:assignment_guid/publish
///
/// Bulk publish/unpublish, then one passback per linked journal.
pub async fn publish_assignment(
    State(state): State<AppState>,
    Path(assignment_guid): Path<String>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<Json<Vec<PublishResponse>>> {
    let reports = state
        .orchestrator
        .publish_all_and_sync(&assignment_guid, request.published)
        .await?;

    Ok(Json(
        reports
            .into_iter()
            .map(|(journal_guid, report)| PublishResponse {
                journal_guid,
                report,
            })
            .collect(),
    ))
}

/// POST /api/sweep
///
/// Manually trigger one reconciliation pass.
pub async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepSummary>> {
    let summary = state.sweep.run_once().await?;
    Ok(Json(summary))
}
