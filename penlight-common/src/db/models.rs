//! Database models
//!
//! **[LTI-CPL-010]** Per-entry coupling status tracks how far a grade has
//! propagated to the host LMS gradebook.

use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Synchronization status of one entry's grade with the host LMS
///
/// **[LTI-CPL-010]** Transitions:
///
/// ```text
/// NO_SUBMISSION ──(entry published & gradable)──> NEEDS_SUBMISSION
/// NEEDS_SUBMISSION ──(dispatch attempted)──> SUBMITTED_WAITING
/// SUBMITTED_WAITING ──(LMS success)──> LINK_COMPLETE
/// SUBMITTED_WAITING ──(LMS failure / transport error)──> NEEDS_SUBMISSION
/// LINK_COMPLETE ──(grade edited)──> NEEDS_SUBMISSION
/// ```
///
/// There is no terminal state: `LinkComplete` reopens whenever the grade
/// changes. The reconciliation sweep treats `NeedsSubmission` (and stale
/// `SubmittedWaiting`) as outstanding work, so the pipeline is safe to
/// re-run after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouplingStatus {
    /// No gradable submission exists yet
    NoSubmission,
    /// Grade/publish state changed locally; LMS has not been told
    NeedsSubmission,
    /// A dispatch attempt is (or was) in flight
    SubmittedWaiting,
    /// LMS acknowledged the last replaceResult for this entry
    LinkComplete,
}

impl CouplingStatus {
    /// Stable TEXT representation stored in the entries table
    pub fn as_str(&self) -> &'static str {
        match self {
            CouplingStatus::NoSubmission => "NO_SUBMISSION",
            CouplingStatus::NeedsSubmission => "NEEDS_SUBMISSION",
            CouplingStatus::SubmittedWaiting => "SUBMITTED_WAITING",
            CouplingStatus::LinkComplete => "LINK_COMPLETE",
        }
    }

    /// Parse the TEXT representation back into the enum
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "NO_SUBMISSION" => Ok(CouplingStatus::NoSubmission),
            "NEEDS_SUBMISSION" => Ok(CouplingStatus::NeedsSubmission),
            "SUBMITTED_WAITING" => Ok(CouplingStatus::SubmittedWaiting),
            "LINK_COMPLETE" => Ok(CouplingStatus::LinkComplete),
            other => Err(Error::Internal(format!(
                "Unknown coupling status in database: {}",
                other
            ))),
        }
    }

    /// True when the reconciliation sweep should (eventually) re-drive this entry
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            CouplingStatus::NeedsSubmission | CouplingStatus::SubmittedWaiting
        )
    }
}

impl std::fmt::Display for CouplingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed set of capability names resolved from a participant's role record
///
/// Capabilities are queried through boolean columns on the roles table,
/// never through free-form permission strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The participant may own a journal in the course
    CanHaveJournal,
    /// The participant may grade entries
    CanGrade,
}

impl Capability {
    /// Column name on the roles table backing this capability
    pub fn column(&self) -> &'static str {
        match self {
            Capability::CanHaveJournal => "can_have_journal",
            Capability::CanGrade => "can_grade",
        }
    }
}

/// A student's journal for one assignment
///
/// `sourcedid` and `grade_url` are the LMS-assigned outcome coordinates,
/// populated together by an authenticated LTI launch. Either may be NULL
/// independently; passback is only attempted when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub guid: String,
    pub assignment_guid: String,
    pub author_guid: String,
    /// LMS identifier for this gradable placement (assignment x user)
    pub sourcedid: Option<String>,
    /// LMS endpoint that accepts replaceResult POX for this placement
    pub grade_url: Option<String>,
}

impl Journal {
    /// True when both outcome-service coordinates are present
    pub fn has_outcome_service(&self) -> bool {
        self.sourcedid.is_some() && self.grade_url.is_some()
    }
}

/// One journal entry (a student submission)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub guid: String,
    pub journal_guid: String,
    /// "content" entries carry grades; "progress" entries never count
    /// toward the journal score
    pub kind: EntryKind,
    pub grade: Option<f64>,
    pub published: bool,
    pub coupling_status: CouplingStatus,
    pub submitted_at: Option<NaiveDateTime>,
    pub coupling_updated_at: Option<NaiveDateTime>,
}

/// Entry kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Content,
    Progress,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Content => "content",
            EntryKind::Progress => "progress",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "content" => Ok(EntryKind::Content),
            "progress" => Ok(EntryKind::Progress),
            other => Err(Error::Internal(format!(
                "Unknown entry kind in database: {}",
                other
            ))),
        }
    }
}

/// Assignment record (the gradable container journals hang off)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub guid: String,
    pub course_guid: String,
    pub name: String,
    /// Denominator for the journal score; zero/absent makes passback a
    /// configuration error rather than a division by zero
    pub points_possible: Option<f64>,
    pub is_published: bool,
}
