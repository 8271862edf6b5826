//! Role capability queries
//!
//! Capabilities come from boolean columns on a participant's role record
//! and are addressed through the fixed [`Capability`] enum, not free-form
//! permission strings. The reconciliation sweep resolves the journal
//! author's capability once per journal per pass.

use penlight_common::db::models::Capability;
use penlight_common::Result;
use sqlx::SqlitePool;

/// Does the journal's author still hold the given capability in the
/// journal's course?
///
/// A participant without a role record (dropped from the course) resolves
/// to false: losing access must stop further LMS writes on their behalf.
pub async fn author_has_capability(
    db: &SqlitePool,
    journal_guid: &str,
    capability: Capability,
) -> Result<bool> {
    // Column name comes from the enum, never from caller input
    let sql = format!(
        "SELECT r.{} FROM journals j
         JOIN assignments a ON a.guid = j.assignment_guid
         JOIN participants p ON p.user_guid = j.author_guid AND p.course_guid = a.course_guid
         JOIN roles r ON r.guid = p.role_guid
         WHERE j.guid = ?",
        capability.column()
    );

    let row: Option<(i64,)> = sqlx::query_as(&sql).bind(journal_guid).fetch_optional(db).await?;

    Ok(row.map(|(value,)| value != 0).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_fixtures::TestCourse;
    use penlight_common::db::init::init_memory_database;

    #[tokio::test]
    async fn student_role_grants_journal_capability() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create(&pool).await;

        assert!(author_has_capability(&pool, &fixture.journal_guid, Capability::CanHaveJournal)
            .await
            .unwrap());
        assert!(!author_has_capability(&pool, &fixture.journal_guid, Capability::CanGrade)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn dropped_participant_loses_all_capabilities() {
        let pool = init_memory_database().await.unwrap();
        let fixture = TestCourse::create(&pool).await;

        sqlx::query("DELETE FROM participants WHERE user_guid = ?")
            .bind(&fixture.student_guid)
            .execute(&pool)
            .await
            .unwrap();

        assert!(!author_has_capability(&pool, &fixture.journal_guid, Capability::CanHaveJournal)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unknown_journal_resolves_to_false() {
        let pool = init_memory_database().await.unwrap();
        assert!(!author_has_capability(&pool, "missing", Capability::CanHaveJournal)
            .await
            .unwrap());
    }
}
