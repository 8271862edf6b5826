//! Database initialization
//!
//! Creates the schema on first run and re-applies defaults idempotently.
//! All `create_*_table` functions use CREATE TABLE IF NOT EXISTS so the
//! sequence is safe to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Counter row that feeds imsx_messageIdentifier values
pub const MESSAGE_ID_COUNTER: &str = "message_id";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; passback dispatch and
    // the reconciliation sweep run on the same file
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory database with the full schema
///
/// Intended for tests and local tooling. A single connection is used so
/// every pool checkout sees the same in-memory database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and seed defaults (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_counters_table(pool).await?;
    create_courses_table(pool).await?;
    create_assignments_table(pool).await?;
    create_roles_table(pool).await?;
    create_users_table(pool).await?;
    create_participants_table(pool).await?;
    create_journals_table(pool).await?;
    create_entries_table(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the counters table and seed the message id counter
///
/// The counter is a single persisted row shared by every process instance;
/// increments must go through one atomic UPDATE, never an in-process global.
pub async fn create_counters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO counters (name, count) VALUES (?, 0)")
        .bind(MESSAGE_ID_COUNTER)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_courses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            abbreviation TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            guid TEXT PRIMARY KEY,
            course_guid TEXT NOT NULL REFERENCES courses(guid),
            name TEXT NOT NULL,
            points_possible REAL,
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_roles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roles (
            guid TEXT PRIMARY KEY,
            course_guid TEXT NOT NULL REFERENCES courses(guid),
            name TEXT NOT NULL,
            can_have_journal INTEGER NOT NULL DEFAULT 0,
            can_grade INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            full_name TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_participants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS participants (
            user_guid TEXT NOT NULL REFERENCES users(guid),
            course_guid TEXT NOT NULL REFERENCES courses(guid),
            role_guid TEXT NOT NULL REFERENCES roles(guid),
            PRIMARY KEY (user_guid, course_guid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_journals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS journals (
            guid TEXT PRIMARY KEY,
            assignment_guid TEXT NOT NULL REFERENCES assignments(guid),
            author_guid TEXT NOT NULL REFERENCES users(guid),
            sourcedid TEXT,
            grade_url TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            guid TEXT PRIMARY KEY,
            journal_guid TEXT NOT NULL REFERENCES journals(guid),
            kind TEXT NOT NULL DEFAULT 'content',
            grade REAL,
            published INTEGER NOT NULL DEFAULT 0,
            coupling_status TEXT NOT NULL DEFAULT 'NO_SUBMISSION',
            submitted_at TIMESTAMP,
            coupling_updated_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The reconciliation sweep scans on coupling_status every pass
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_entries_coupling_status
         ON entries (coupling_status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Reconciliation sweep cadence
    ensure_setting(pool, "sweep_interval_secs", "300").await?;
    // SUBMITTED_WAITING older than this is considered stuck in flight
    ensure_setting(pool, "sweep_stale_after_secs", "900").await?;
    // Deep links sent to the LMS point back into this base URL
    ensure_setting(pool, "platform_base_url", "http://127.0.0.1:5761").await?;

    Ok(())
}

/// Insert a setting if missing, reset it if NULL
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value WHERE settings.value IS NULL
        "#,
    )
    .bind(key)
    .bind(default_value)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        // Second pass must not fail on existing tables or seeded rows
        create_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT count FROM counters WHERE name = ?")
            .bind(MESSAGE_ID_COUNTER)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn default_settings_are_seeded() {
        let pool = init_memory_database().await.unwrap();

        let interval: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'sweep_interval_secs'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(interval, "300");
    }

    #[tokio::test]
    async fn ensure_setting_does_not_clobber_existing_value() {
        let pool = init_memory_database().await.unwrap();

        sqlx::query("UPDATE settings SET value = '60' WHERE key = 'sweep_interval_secs'")
            .execute(&pool)
            .await
            .unwrap();

        ensure_setting(&pool, "sweep_interval_secs", "300").await.unwrap();

        let value: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'sweep_interval_secs'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value, "60");
    }

    #[tokio::test]
    async fn init_database_creates_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("penlight.db");

        let pool = init_database(&db_path).await.unwrap();
        drop(pool);

        assert!(db_path.exists());
    }
}
