//! Grade passback orchestration
//!
//! **[LTI-SYNC-010]** Decides when and what to send to the LMS, applies
//! responses, and drives per-entry coupling status. LMS-side failures and
//! transport errors are returned as a [`PassbackReport`] the caller
//! inspects; only configuration and database faults raise. A teacher's
//! grading action therefore always succeeds locally even when the LMS sync
//! behind it fails.

use crate::config::LtiCredentials;
use crate::db::{counters, entries, journals};
use crate::lti::pox::{self, PoxStatus, ReplaceResultRequest, ResultData};
use crate::services::outcome_client::OutcomeClient;
use chrono::{TimeZone, Utc};
use penlight_common::events::{EventBus, SyncEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

/// Errors the orchestrator raises (as opposed to reports it returns)
#[derive(Debug, Error)]
pub enum PassbackError {
    /// Deployment misconfiguration: missing credentials, unusable
    /// points_possible. Surfaces to the operator, never retried.
    #[error("LTI configuration error: {0}")]
    Configuration(String),

    /// penlight-common error (database, not-found, ...)
    #[error(transparent)]
    Common(#[from] penlight_common::Error),
}

/// Outcome of one replace_result invocation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassbackReport {
    /// Journal has no sourcedid/grade_url; nothing was sent
    NotConfigured,
    /// The LMS answered; inspect `status.code_major` for success
    Delivered { status: PoxStatus },
    /// The POST itself failed (network, timeout, non-2xx)
    TransportFailed { reason: String },
}

impl PassbackReport {
    pub fn is_success(&self) -> bool {
        matches!(self, PassbackReport::Delivered { status } if status.is_success())
    }
}

/// Orchestrates grade passback for journals and entries
pub struct PassbackOrchestrator {
    db: SqlitePool,
    client: OutcomeClient,
    credentials: LtiCredentials,
    events: EventBus,
    platform_base_url: String,
}

impl PassbackOrchestrator {
    pub fn new(
        db: SqlitePool,
        credentials: LtiCredentials,
        events: EventBus,
        platform_base_url: String,
    ) -> Result<Self, PassbackError> {
        let client = OutcomeClient::new()
            .map_err(|e| PassbackError::Configuration(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            db,
            client,
            credentials,
            events,
            platform_base_url: platform_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Tell the LMS an ungraded submission is waiting for attention
    ///
    /// Sends a scoreless envelope whose resultData.url deep-links back to
    /// the entry. The notification is informational: it NEVER changes
    /// coupling status; only a successful replace_result does. Journals
    /// without an outcome-service link are a silent no-op, and delivery
    /// failures are logged rather than raised (the submission itself
    /// already persisted).
    pub async fn notify_needs_grading(
        &self,
        journal_guid: &str,
        entry_guid: &str,
    ) -> Result<(), PassbackError> {
        let journal = journals::get(&self.db, journal_guid).await?;
        let (sourcedid, grade_url) = match (&journal.sourcedid, &journal.grade_url) {
            (Some(sourcedid), Some(grade_url)) => (sourcedid.clone(), grade_url.clone()),
            _ => {
                tracing::debug!(
                    journal_guid = %journal_guid,
                    "Journal not linked to an LMS gradebook, skipping needs-grading notification"
                );
                return Ok(());
            }
        };

        let entry = entries::get(&self.db, entry_guid).await?;
        let message_id = counters::next_message_id(&self.db).await?;

        let request = ReplaceResultRequest {
            sourcedid,
            message_id: message_id.to_string(),
            score: None,
            result_data: Some(ResultData::link(format!(
                "{}/journals/{}/entries/{}",
                self.platform_base_url, journal_guid, entry_guid
            ))),
            submitted_at: entry.submitted_at.map(|t| Utc.from_utc_datetime(&t)),
        };

        match self
            .client
            .post_outcome(&grade_url, request.to_xml(), &self.credentials)
            .await
        {
            Ok(body) => {
                let status = PoxStatus::parse(&body);
                if status.is_success() {
                    tracing::info!(
                        journal_guid = %journal_guid,
                        entry_guid = %entry_guid,
                        "Needs-grading notification accepted by LMS"
                    );
                    self.events
                        .emit(SyncEvent::GradingNotificationSent {
                            journal_guid: journal_guid.to_string(),
                            entry_guid: entry_guid.to_string(),
                            timestamp: Utc::now(),
                        })
                        .ok();
                } else {
                    tracing::warn!(
                        journal_guid = %journal_guid,
                        entry_guid = %entry_guid,
                        code_major = %status.code_major.as_deref().unwrap_or("not found"),
                        description = %status.description_or_default(),
                        "LMS rejected needs-grading notification"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    journal_guid = %journal_guid,
                    entry_guid = %entry_guid,
                    error = %e,
                    "Needs-grading notification failed"
                );
            }
        }

        Ok(())
    }

    /// Replace the journal's full grade in the LMS gradebook
    ///
    /// Ordering matters for crash safety:
    /// 1. mark every published, non-complete entry SUBMITTED_WAITING
    ///    (discoverable by the sweep if we die mid-flight);
    /// 2. bail out with NotConfigured when the journal has no link;
    /// 3. compute the clamped score, build and sign the envelope, POST;
    /// 4. parse the acknowledgment;
    /// 5. success completes the in-flight entries, anything else reopens
    ///    them as retry-eligible.
    pub async fn replace_result(&self, journal_guid: &str) -> Result<PassbackReport, PassbackError> {
        let journal = journals::get(&self.db, journal_guid).await?;

        let marked = entries::mark_journal_in_flight(&self.db, journal_guid).await?;

        let (sourcedid, grade_url) = match (&journal.sourcedid, &journal.grade_url) {
            (Some(sourcedid), Some(grade_url)) => (sourcedid.clone(), grade_url.clone()),
            _ => {
                tracing::debug!(
                    journal_guid = %journal_guid,
                    "Journal not linked to an LMS gradebook, passback skipped"
                );
                return Ok(PassbackReport::NotConfigured);
            }
        };

        let points_possible = journals::points_possible(&self.db, journal_guid)
            .await?
            .filter(|points| *points > 0.0)
            .ok_or_else(|| {
                PassbackError::Configuration(format!(
                    "assignment of journal {} has no usable points_possible",
                    journal_guid
                ))
            })?;

        let total = entries::graded_published_total(&self.db, journal_guid).await?;
        let score = pox::clamp_and_format_score(total / points_possible);

        let message_id = counters::next_message_id(&self.db).await?;
        let request = ReplaceResultRequest {
            sourcedid,
            message_id: message_id.to_string(),
            score: Some(score.clone()),
            result_data: None,
            submitted_at: None,
        };

        tracing::debug!(
            journal_guid = %journal_guid,
            score = %score,
            entries_in_flight = marked.len(),
            "Dispatching replaceResult"
        );

        let body = match self
            .client
            .post_outcome(&grade_url, request.to_xml(), &self.credentials)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                entries::reopen_in_flight(&self.db, journal_guid).await?;
                tracing::warn!(
                    journal_guid = %journal_guid,
                    error = %e,
                    "Grade passback transport failed, entries left retry-eligible"
                );
                self.events
                    .emit(SyncEvent::GradePassbackFailed {
                        journal_guid: journal_guid.to_string(),
                        code_major: None,
                        description: e.to_string(),
                        timestamp: Utc::now(),
                    })
                    .ok();
                return Ok(PassbackReport::TransportFailed {
                    reason: e.to_string(),
                });
            }
        };

        let status = PoxStatus::parse(&body);
        if status.is_success() {
            let completed = entries::complete_in_flight(&self.db, journal_guid).await?;
            tracing::info!(
                journal_guid = %journal_guid,
                score = %score,
                entries_completed = completed,
                "Grade passback accepted by LMS"
            );
            self.events
                .emit(SyncEvent::GradePassbackSucceeded {
                    journal_guid: journal_guid.to_string(),
                    score,
                    timestamp: Utc::now(),
                })
                .ok();
        } else {
            entries::reopen_in_flight(&self.db, journal_guid).await?;
            tracing::warn!(
                journal_guid = %journal_guid,
                code_major = %status.code_major.as_deref().unwrap_or("not found"),
                description = %status.description_or_default(),
                "LMS rejected grade passback, entries left retry-eligible"
            );
            self.events
                .emit(SyncEvent::GradePassbackFailed {
                    journal_guid: journal_guid.to_string(),
                    code_major: status.code_major.clone(),
                    description: status.description_or_default().to_string(),
                    timestamp: Utc::now(),
                })
                .ok();
        }

        Ok(PassbackReport::Delivered { status })
    }

    /// Bulk publish/unpublish an assignment's entries, then sync every
    /// linked journal
    ///
    /// Idempotent: repeating the call with the same flag converges to the
    /// same end state (the repeat still syncs journals that are not yet
    /// fully LINK_COMPLETE, which is exactly one replaceResult each).
    pub async fn publish_all_and_sync(
        &self,
        assignment_guid: &str,
        published: bool,
    ) -> Result<Vec<(String, PassbackReport)>, PassbackError> {
        let affected = entries::publish_all(&self.db, assignment_guid, published).await?;
        tracing::info!(
            assignment_guid = %assignment_guid,
            published,
            entries_affected = affected,
            "Bulk publish applied"
        );

        let linked = journals::linked_journals_for_assignment(&self.db, assignment_guid).await?;
        let mut reports = Vec::with_capacity(linked.len());
        for journal in linked {
            let report = self.replace_result(&journal.guid).await?;
            reports.push((journal.guid, report));
        }

        Ok(reports)
    }
}

// ============================================================================
// Tests
// ============================================================================
