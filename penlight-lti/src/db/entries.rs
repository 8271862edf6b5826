//! Entry database operations
//!
//! **[LTI-CPL-020]** All coupling-status writes go through conditional
//! updates keyed on the current status, so two concurrent dispatch attempts
//! for the same entry cannot both claim the NEEDS_SUBMISSION ->
//! SUBMITTED_WAITING transition. A lost race finds zero rows to move and
//! carries on.

use chrono::NaiveDateTime;
use penlight_common::db::models::{CouplingStatus, Entry, EntryKind, Journal};
use penlight_common::uuid_utils::new_guid;
use penlight_common::{Error, Result};
use sqlx::SqlitePool;

type EntryRow = (
    String,
    String,
    String,
    Option<f64>,
    i64,
    String,
    Option<NaiveDateTime>,
    Option<NaiveDateTime>,
);

const ENTRY_COLUMNS: &str =
    "guid, journal_guid, kind, grade, published, coupling_status, submitted_at, coupling_updated_at";

fn row_to_entry(row: EntryRow) -> Result<Entry> {
    let (guid, journal_guid, kind, grade, published, coupling_status, submitted_at, coupling_updated_at) =
        row;
    Ok(Entry {
        guid,
        journal_guid,
        kind: EntryKind::parse(&kind)?,
        grade,
        published: published != 0,
        coupling_status: CouplingStatus::parse(&coupling_status)?,
        submitted_at,
        coupling_updated_at,
    })
}

/// Fetch one entry by guid
pub async fn get(db: &SqlitePool, guid: &str) -> Result<Entry> {
    let row: Option<EntryRow> =
        sqlx::query_as(&format!("SELECT {} FROM entries WHERE guid = ?", ENTRY_COLUMNS))
            .bind(guid)
            .fetch_optional(db)
            .await?;

    match row {
        Some(row) => row_to_entry(row),
        None => Err(Error::NotFound(format!("entry {}", guid))),
    }
}

/// Create an entry for a student submission
///
/// Initial coupling status depends on whether a grade path exists:
/// `NEEDS_SUBMISSION` when the journal is already linked to an LMS
/// gradebook, `NO_SUBMISSION` otherwise.
pub async fn insert(db: &SqlitePool, journal: &Journal, kind: EntryKind) -> Result<Entry> {
    let guid = new_guid();
    let initial = if journal.has_outcome_service() {
        CouplingStatus::NeedsSubmission
    } else {
        CouplingStatus::NoSubmission
    };

    sqlx::query(
        "INSERT INTO entries (guid, journal_guid, kind, coupling_status, submitted_at, coupling_updated_at)
         VALUES (?, ?, ?, ?, datetime('now'), datetime('now'))",
    )
    .bind(&guid)
    .bind(&journal.guid)
    .bind(kind.as_str())
    .bind(initial.as_str())
    .execute(db)
    .await?;

    get(db, &guid).await
}

/// Record a grading action and reopen coupling when the grade is visible
///
/// The grade/publish flags always persist, independent of any LMS sync
/// outcome. When the entry ends up published with a grade, a coupling
/// status of NO_SUBMISSION or LINK_COMPLETE moves (back) to
/// NEEDS_SUBMISSION so the next passback picks it up.
pub async fn set_grade(
    db: &SqlitePool,
    guid: &str,
    grade: Option<f64>,
    published: bool,
) -> Result<Entry> {
    let mut tx = db.begin().await?;

    let updated = sqlx::query("UPDATE entries SET grade = ?, published = ? WHERE guid = ?")
        .bind(grade)
        .bind(published)
        .bind(guid)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::NotFound(format!("entry {}", guid)));
    }

    sqlx::query(
        "UPDATE entries
         SET coupling_status = ?, coupling_updated_at = datetime('now')
         WHERE guid = ? AND published = 1 AND grade IS NOT NULL
           AND coupling_status IN (?, ?)",
    )
    .bind(CouplingStatus::NeedsSubmission.as_str())
    .bind(guid)
    .bind(CouplingStatus::NoSubmission.as_str())
    .bind(CouplingStatus::LinkComplete.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get(db, guid).await
}

/// Mark a journal's outstanding entries as in flight, before the send
///
/// Transitions every published, non-LINK_COMPLETE entry of the journal to
/// SUBMITTED_WAITING and stamps coupling_updated_at. Writing the marker
/// before the HTTP call means a crash mid-flight leaves the work
/// discoverable by the reconciliation sweep. Returns the affected guids.
pub async fn mark_journal_in_flight(db: &SqlitePool, journal_guid: &str) -> Result<Vec<String>> {
    let mut tx = db.begin().await?;

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT guid FROM entries
         WHERE journal_guid = ? AND published = 1 AND coupling_status != ?",
    )
    .bind(journal_guid)
    .bind(CouplingStatus::LinkComplete.as_str())
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE entries
         SET coupling_status = ?, coupling_updated_at = datetime('now')
         WHERE journal_guid = ? AND published = 1 AND coupling_status != ?",
    )
    .bind(CouplingStatus::SubmittedWaiting.as_str())
    .bind(journal_guid)
    .bind(CouplingStatus::LinkComplete.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(rows.into_iter().map(|(guid,)| guid).collect())
}

/// Finalize a journal's in-flight entries after an LMS success
pub async fn complete_in_flight(db: &SqlitePool, journal_guid: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE entries
         SET coupling_status = ?, coupling_updated_at = datetime('now')
         WHERE journal_guid = ? AND coupling_status = ?",
    )
    .bind(CouplingStatus::LinkComplete.as_str())
    .bind(journal_guid)
    .bind(CouplingStatus::SubmittedWaiting.as_str())
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}

/// Return a journal's in-flight entries to retry-eligible after a failure
pub async fn reopen_in_flight(db: &SqlitePool, journal_guid: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE entries
         SET coupling_status = ?, coupling_updated_at = datetime('now')
         WHERE journal_guid = ? AND coupling_status = ?",
    )
    .bind(CouplingStatus::NeedsSubmission.as_str())
    .bind(journal_guid)
    .bind(CouplingStatus::SubmittedWaiting.as_str())
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}

/// Sum of grades over the journal's published content entries
///
/// Progress entries never count toward the score. An empty journal sums
/// to 0.0.
pub async fn graded_published_total(db: &SqlitePool, journal_guid: &str) -> Result<f64> {
    let total: Option<f64> = sqlx::query_scalar(
        "SELECT SUM(grade) FROM entries
         WHERE journal_guid = ? AND published = 1 AND kind = ? AND grade IS NOT NULL",
    )
    .bind(journal_guid)
    .bind(EntryKind::Content.as_str())
    .fetch_one(db)
    .await?;

    Ok(total.unwrap_or(0.0))
}

/// Bulk publish/unpublish an assignment's content entries
///
/// When publishing, graded entries whose coupling sits at NO_SUBMISSION or
/// LINK_COMPLETE reopen to NEEDS_SUBMISSION (their grade just became
/// visible, so the LMS is now behind). Returns the number of entries whose
/// published flag was written.
pub async fn publish_all(db: &SqlitePool, assignment_guid: &str, published: bool) -> Result<u64> {
    let mut tx = db.begin().await?;

    let updated = sqlx::query(
        "UPDATE entries SET published = ?
         WHERE kind = ?
           AND journal_guid IN (SELECT guid FROM journals WHERE assignment_guid = ?)",
    )
    .bind(published)
    .bind(EntryKind::Content.as_str())
    .bind(assignment_guid)
    .execute(&mut *tx)
    .await?;

    if published {
        sqlx::query(
            "UPDATE entries
             SET coupling_status = ?, coupling_updated_at = datetime('now')
             WHERE journal_guid IN (SELECT guid FROM journals WHERE assignment_guid = ?)
               AND published = 1 AND grade IS NOT NULL
               AND coupling_status IN (?, ?)",
        )
        .bind(CouplingStatus::NeedsSubmission.as_str())
        .bind(assignment_guid)
        .bind(CouplingStatus::NoSubmission.as_str())
        .bind(CouplingStatus::LinkComplete.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(updated.rows_affected())
}

/// Entries the reconciliation sweep should look at
///
/// NEEDS_SUBMISSION entries, plus SUBMITTED_WAITING entries whose marker is
/// older than `stale_after_secs` (stuck in flight after a crash or a lost
/// response), restricted to journals with a complete outcome-service link.
pub async fn find_retry_eligible(db: &SqlitePool, stale_after_secs: u64) -> Result<Vec<Entry>> {
    let rows: Vec<EntryRow> = sqlx::query_as(&format!(
        "SELECT e.{} FROM entries e
         JOIN journals j ON j.guid = e.journal_guid
         WHERE (e.coupling_status = ?
                OR (e.coupling_status = ?
                    AND e.coupling_updated_at < datetime('now', '-' || ? || ' seconds')))
           AND j.sourcedid IS NOT NULL
           AND j.grade_url IS NOT NULL
         ORDER BY e.journal_guid, e.guid",
        ENTRY_COLUMNS.replace(", ", ", e.")
    ))
    .bind(CouplingStatus::NeedsSubmission.as_str())
    .bind(CouplingStatus::SubmittedWaiting.as_str())
    .bind(stale_after_secs as i64)
    .fetch_all(db)
    .await?;

    rows.into_iter().map(row_to_entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::journals;
    use crate::db::test_fixtures::TestCourse;
    use penlight_common::db::init::init_memory_database;

    #[tokio::test]
    async fn new_entry_defaults_depend_on_journal_link() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create(&pool).await;

        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();
        let entry = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        assert_eq!(entry.coupling_status, CouplingStatus::NoSubmission);

        journals::link_outcome_service(&pool, &fixture.journal_guid, "abc", "https://lms.example/g")
            .await
            .unwrap();
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();
        let entry = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        assert_eq!(entry.coupling_status, CouplingStatus::NeedsSubmission);
    }

    #[tokio::test]
    async fn grading_a_published_entry_reopens_coupling() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();
        let entry = insert(&pool, &journal, EntryKind::Content).await.unwrap();

        // Simulate a finished sync
        sqlx::query("UPDATE entries SET coupling_status = 'LINK_COMPLETE' WHERE guid = ?")
            .bind(&entry.guid)
            .execute(&pool)
            .await
            .unwrap();

        let entry = set_grade(&pool, &entry.guid, Some(7.0), true).await.unwrap();
        assert_eq!(entry.grade, Some(7.0));
        assert!(entry.published);
        assert_eq!(entry.coupling_status, CouplingStatus::NeedsSubmission);
    }

    #[tokio::test]
    async fn unpublished_grade_does_not_reopen_coupling() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();
        let entry = insert(&pool, &journal, EntryKind::Content).await.unwrap();

        sqlx::query("UPDATE entries SET coupling_status = 'LINK_COMPLETE' WHERE guid = ?")
            .bind(&entry.guid)
            .execute(&pool)
            .await
            .unwrap();

        let entry = set_grade(&pool, &entry.guid, Some(7.0), false).await.unwrap();
        assert_eq!(entry.coupling_status, CouplingStatus::LinkComplete);
    }

    #[tokio::test]
    async fn in_flight_marking_skips_completed_entries() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();

        let pending = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        set_grade(&pool, &pending.guid, Some(7.0), true).await.unwrap();

        let done = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        set_grade(&pool, &done.guid, Some(3.0), true).await.unwrap();
        sqlx::query("UPDATE entries SET coupling_status = 'LINK_COMPLETE' WHERE guid = ?")
            .bind(&done.guid)
            .execute(&pool)
            .await
            .unwrap();

        let marked = mark_journal_in_flight(&pool, &fixture.journal_guid).await.unwrap();
        assert_eq!(marked, vec![pending.guid.clone()]);

        let pending = get(&pool, &pending.guid).await.unwrap();
        assert_eq!(pending.coupling_status, CouplingStatus::SubmittedWaiting);
        let done = get(&pool, &done.guid).await.unwrap();
        assert_eq!(done.coupling_status, CouplingStatus::LinkComplete);
    }

    #[tokio::test]
    async fn complete_and_reopen_only_touch_in_flight_entries() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();

        let entry = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        set_grade(&pool, &entry.guid, Some(5.0), true).await.unwrap();
        mark_journal_in_flight(&pool, &fixture.journal_guid).await.unwrap();

        assert_eq!(complete_in_flight(&pool, &fixture.journal_guid).await.unwrap(), 1);
        let entry = get(&pool, &entry.guid).await.unwrap();
        assert_eq!(entry.coupling_status, CouplingStatus::LinkComplete);

        // Nothing in flight anymore: reopen is a no-op
        assert_eq!(reopen_in_flight(&pool, &fixture.journal_guid).await.unwrap(), 0);
        let entry = get(&pool, &entry.guid).await.unwrap();
        assert_eq!(entry.coupling_status, CouplingStatus::LinkComplete);
    }

    #[tokio::test]
    async fn graded_total_ignores_progress_and_unpublished() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();

        let graded = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        set_grade(&pool, &graded.guid, Some(7.0), true).await.unwrap();

        let hidden = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        set_grade(&pool, &hidden.guid, Some(2.0), false).await.unwrap();

        let progress = insert(&pool, &journal, EntryKind::Progress).await.unwrap();
        set_grade(&pool, &progress.guid, Some(4.0), true).await.unwrap();

        assert_eq!(
            graded_published_total(&pool, &fixture.journal_guid).await.unwrap(),
            7.0
        );
    }

    #[tokio::test]
    async fn empty_journal_sums_to_zero() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;

        assert_eq!(
            graded_published_total(&pool, &fixture.journal_guid).await.unwrap(),
            0.0
        );
    }

    #[tokio::test]
    async fn publish_all_reopens_graded_entries() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();

        let entry = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        set_grade(&pool, &entry.guid, Some(6.0), false).await.unwrap();

        let affected = publish_all(&pool, &fixture.assignment_guid, true).await.unwrap();
        assert_eq!(affected, 1);

        let entry = get(&pool, &entry.guid).await.unwrap();
        assert!(entry.published);
        assert_eq!(entry.coupling_status, CouplingStatus::NeedsSubmission);

        // Idempotent: repeating converges to the same state
        publish_all(&pool, &fixture.assignment_guid, true).await.unwrap();
        let again = get(&pool, &entry.guid).await.unwrap();
        assert!(again.published);
        assert_eq!(again.coupling_status, CouplingStatus::NeedsSubmission);
    }

    #[tokio::test]
    async fn retry_scan_finds_pending_and_stale_in_flight() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create_linked(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();

        let pending = insert(&pool, &journal, EntryKind::Content).await.unwrap();

        let stale = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        sqlx::query(
            "UPDATE entries SET coupling_status = 'SUBMITTED_WAITING',
             coupling_updated_at = datetime('now', '-3600 seconds') WHERE guid = ?",
        )
        .bind(&stale.guid)
        .execute(&pool)
        .await
        .unwrap();

        let fresh = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        sqlx::query(
            "UPDATE entries SET coupling_status = 'SUBMITTED_WAITING',
             coupling_updated_at = datetime('now') WHERE guid = ?",
        )
        .bind(&fresh.guid)
        .execute(&pool)
        .await
        .unwrap();

        let eligible = find_retry_eligible(&pool, 900).await.unwrap();
        let guids: Vec<&str> = eligible.iter().map(|e| e.guid.as_str()).collect();

        assert!(guids.contains(&pending.guid.as_str()));
        assert!(guids.contains(&stale.guid.as_str()));
        assert!(!guids.contains(&fresh.guid.as_str()));
    }

    #[tokio::test]
    async fn retry_scan_skips_unlinked_journals() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create(&pool).await;
        let journal = journals::get(&pool, &fixture.journal_guid).await.unwrap();

        let entry = insert(&pool, &journal, EntryKind::Content).await.unwrap();
        sqlx::query("UPDATE entries SET coupling_status = 'NEEDS_SUBMISSION' WHERE guid = ?")
            .bind(&entry.guid)
            .execute(&pool)
            .await
            .unwrap();

        let eligible = find_retry_eligible(&pool, 900).await.unwrap();
        assert!(eligible.is_empty());
    }
}
