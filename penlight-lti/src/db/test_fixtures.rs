//! Shared test fixtures: a course with one assignment, one student role,
//! one student, and one journal.

use penlight_common::uuid_utils::new_guid;
use sqlx::SqlitePool;

/// Guids of the rows created by [`TestCourse::create`]
pub struct TestCourse {
    pub course_guid: String,
    pub assignment_guid: String,
    pub role_guid: String,
    pub student_guid: String,
    pub journal_guid: String,
}

impl TestCourse {
    /// Course with points_possible=10 and an unlinked journal
    pub async fn create(pool: &SqlitePool) -> Self {
        let fixture = Self {
            course_guid: new_guid(),
            assignment_guid: new_guid(),
            role_guid: new_guid(),
            student_guid: new_guid(),
            journal_guid: new_guid(),
        };

        sqlx::query("INSERT INTO courses (guid, name, abbreviation) VALUES (?, 'Research Methods', 'RM1')")
            .bind(&fixture.course_guid)
            .execute(pool)
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO assignments (guid, course_guid, name, points_possible, is_published)
             VALUES (?, ?, 'Logbook', 10.0, 1)",
        )
        .bind(&fixture.assignment_guid)
        .bind(&fixture.course_guid)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO roles (guid, course_guid, name, can_have_journal, can_grade)
             VALUES (?, ?, 'Student', 1, 0)",
        )
        .bind(&fixture.role_guid)
        .bind(&fixture.course_guid)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO users (guid, username, full_name) VALUES (?, ?, 'Test Student')")
            .bind(&fixture.student_guid)
            .bind(format!("student-{}", &fixture.student_guid[..8]))
            .execute(pool)
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO participants (user_guid, course_guid, role_guid) VALUES (?, ?, ?)",
        )
        .bind(&fixture.student_guid)
        .bind(&fixture.course_guid)
        .bind(&fixture.role_guid)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO journals (guid, assignment_guid, author_guid) VALUES (?, ?, ?)")
            .bind(&fixture.journal_guid)
            .bind(&fixture.assignment_guid)
            .bind(&fixture.student_guid)
            .execute(pool)
            .await
            .unwrap();

        fixture
    }

    /// Same as [`create`](Self::create), with the journal already linked to
    /// a (placeholder) LMS outcome service
    pub async fn create_linked(pool: &SqlitePool) -> Self {
        let fixture = Self::create(pool).await;
        fixture.link(pool, "https://lms.example/grades").await;
        fixture
    }

    /// Link the journal to an outcome service at `grade_url`
    pub async fn link(&self, pool: &SqlitePool, grade_url: &str) {
        sqlx::query("UPDATE journals SET sourcedid = 'abc:123', grade_url = ? WHERE guid = ?")
            .bind(grade_url)
            .bind(&self.journal_guid)
            .execute(pool)
            .await
            .unwrap();
    }
}
