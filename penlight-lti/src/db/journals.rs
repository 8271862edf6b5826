//! Journal database operations

use penlight_common::db::models::Journal;
use penlight_common::{Error, Result};
use sqlx::SqlitePool;

type JournalRow = (String, String, String, Option<String>, Option<String>);

fn row_to_journal(row: JournalRow) -> Journal {
    let (guid, assignment_guid, author_guid, sourcedid, grade_url) = row;
    Journal {
        guid,
        assignment_guid,
        author_guid,
        sourcedid,
        grade_url,
    }
}

/// Fetch one journal by guid
pub async fn get(db: &SqlitePool, guid: &str) -> Result<Journal> {
    let row: Option<JournalRow> = sqlx::query_as(
        "SELECT guid, assignment_guid, author_guid, sourcedid, grade_url
         FROM journals WHERE guid = ?",
    )
    .bind(guid)
    .fetch_optional(db)
    .await?;

    row.map(row_to_journal)
        .ok_or_else(|| Error::NotFound(format!("journal {}", guid)))
}

/// Record the LMS outcome-service coordinates delivered by an LTI launch
///
/// Both fields are always written together; an earlier link is replaced
/// (an assignment re-created on the LMS side hands out fresh sourcedids).
pub async fn link_outcome_service(
    db: &SqlitePool,
    guid: &str,
    sourcedid: &str,
    grade_url: &str,
) -> Result<()> {
    let result = sqlx::query("UPDATE journals SET sourcedid = ?, grade_url = ? WHERE guid = ?")
        .bind(sourcedid)
        .bind(grade_url)
        .bind(guid)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("journal {}", guid)));
    }

    Ok(())
}

/// All journals of an assignment that are linked to an LMS gradebook
pub async fn linked_journals_for_assignment(
    db: &SqlitePool,
    assignment_guid: &str,
) -> Result<Vec<Journal>> {
    let rows: Vec<JournalRow> = sqlx::query_as(
        "SELECT guid, assignment_guid, author_guid, sourcedid, grade_url
         FROM journals
         WHERE assignment_guid = ?
           AND sourcedid IS NOT NULL
           AND grade_url IS NOT NULL
         ORDER BY guid",
    )
    .bind(assignment_guid)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(row_to_journal).collect())
}

/// points_possible of the journal's assignment (None when unset)
pub async fn points_possible(db: &SqlitePool, journal_guid: &str) -> Result<Option<f64>> {
    let row: Option<(Option<f64>,)> = sqlx::query_as(
        "SELECT a.points_possible
         FROM journals j JOIN assignments a ON a.guid = j.assignment_guid
         WHERE j.guid = ?",
    )
    .bind(journal_guid)
    .fetch_optional(db)
    .await?;

    match row {
        Some((points,)) => Ok(points),
        None => Err(Error::NotFound(format!("journal {}", journal_guid))),
    }
}
