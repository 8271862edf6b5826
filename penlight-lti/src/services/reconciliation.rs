//! Reconciliation sweep
//!
//! **[LTI-SWP-010]** Periodic scan for entries whose coupling status says
//! the LMS is behind: NEEDS_SUBMISSION, or SUBMITTED_WAITING left stale by
//! a crash or a lost response. The sweep re-drives the same orchestration
//! path the synchronous flows use, which makes the whole pipeline
//! self-healing. Every pass is idempotent and safely re-entrant.

use crate::db::{entries, roles};
use crate::services::passback::{PassbackError, PassbackOrchestrator};
use chrono::Utc;
use penlight_common::db::models::{Capability, Entry};
use penlight_common::db::settings;
use penlight_common::events::{EventBus, SyncEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Counters from one sweep pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    /// Entries matched by the outstanding-work scan
    pub entries_seen: usize,
    /// Journals whose replaceResult was accepted
    pub journals_synced: usize,
    /// Journals whose attempt failed (left retry-eligible)
    pub journals_failed: usize,
    /// Journals skipped because the author lost journal access
    pub journals_skipped: usize,
    /// Per-entry needs-grading notifications delivered
    pub notifications_sent: usize,
}

/// Scans for unfinished synchronization work and drives the orchestrator
pub struct ReconciliationSweep {
    db: SqlitePool,
    orchestrator: Arc<PassbackOrchestrator>,
    events: EventBus,
}

impl ReconciliationSweep {
    pub fn new(db: SqlitePool, orchestrator: Arc<PassbackOrchestrator>, events: EventBus) -> Self {
        Self {
            db,
            orchestrator,
            events,
        }
    }

    /// One sweep pass
    ///
    /// Entries group by journal so a journal with N outstanding entries
    /// costs one replaceResult, not N. A failing journal is counted and
    /// logged; it never aborts the rest of the pass.
    pub async fn run_once(&self) -> Result<SweepSummary, PassbackError> {
        let stale_after = settings::get_sweep_stale_after_secs(&self.db).await?;
        let eligible = entries::find_retry_eligible(&self.db, stale_after).await?;

        let mut summary = SweepSummary {
            entries_seen: eligible.len(),
            ..Default::default()
        };

        let mut by_journal: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
        for entry in eligible {
            by_journal.entry(entry.journal_guid.clone()).or_default().push(entry);
        }

        for (journal_guid, journal_entries) in by_journal {
            // Capability resolved once per journal per pass: an author who
            // lost journal access must not trigger further LMS writes
            match roles::author_has_capability(&self.db, &journal_guid, Capability::CanHaveJournal)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        journal_guid = %journal_guid,
                        "Author no longer holds journal capability, skipping"
                    );
                    summary.journals_skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        journal_guid = %journal_guid,
                        error = %e,
                        "Capability lookup failed, skipping journal this pass"
                    );
                    summary.journals_failed += 1;
                    continue;
                }
            }

            let mut grade_outstanding = false;
            for entry in &journal_entries {
                if entry.grade.is_none() {
                    // Pure submission: nudge the grader
                    match self
                        .orchestrator
                        .notify_needs_grading(&journal_guid, &entry.guid)
                        .await
                    {
                        Ok(()) => summary.notifications_sent += 1,
                        Err(e) => {
                            tracing::warn!(
                                journal_guid = %journal_guid,
                                entry_guid = %entry.guid,
                                error = %e,
                                "Needs-grading notification failed during sweep"
                            );
                        }
                    }
                } else if entry.published {
                    grade_outstanding = true;
                }
                // Graded but unpublished entries have nothing to tell the
                // LMS until the grade becomes visible
            }

            if grade_outstanding {
                match self.orchestrator.replace_result(&journal_guid).await {
                    Ok(report) if report.is_success() => summary.journals_synced += 1,
                    Ok(_) => summary.journals_failed += 1,
                    Err(e) => {
                        // Per-journal isolation: a bad assignment config
                        // must not starve the other journals
                        tracing::error!(
                            journal_guid = %journal_guid,
                            error = %e,
                            "Grade passback raised during sweep"
                        );
                        summary.journals_failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            entries_seen = summary.entries_seen,
            journals_synced = summary.journals_synced,
            journals_failed = summary.journals_failed,
            journals_skipped = summary.journals_skipped,
            notifications_sent = summary.notifications_sent,
            "Reconciliation sweep completed"
        );
        self.events
            .emit(SyncEvent::SweepCompleted {
                entries_seen: summary.entries_seen,
                journals_synced: summary.journals_synced,
                journals_failed: summary.journals_failed,
                notifications_sent: summary.notifications_sent,
                timestamp: Utc::now(),
            })
            .ok();

        Ok(summary)
    }

    /// Run the sweep on a fixed interval until the task is aborted
    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately; consume the first tick so startup
            // is not a sweep
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Reconciliation sweep pass failed");
                }
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
