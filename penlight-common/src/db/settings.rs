//! Settings database operations
//!
//! Typed get/set accessors over the settings key-value table.

use crate::{Error, Result};
use sqlx::SqlitePool;

/// Get reconciliation sweep interval in seconds
///
/// **Default:** 300
pub async fn get_sweep_interval_secs(db: &SqlitePool) -> Result<u64> {
    get_setting(db, "sweep_interval_secs").await.map(|opt| opt.unwrap_or(300))
}

/// Get the age threshold after which SUBMITTED_WAITING counts as stuck
///
/// **Default:** 900 (15 minutes)
pub async fn get_sweep_stale_after_secs(db: &SqlitePool) -> Result<u64> {
    get_setting(db, "sweep_stale_after_secs").await.map(|opt| opt.unwrap_or(900))
}

/// Get the public base URL used for deep links sent to the LMS
pub async fn get_platform_base_url(db: &SqlitePool) -> Result<String> {
    get_setting(db, "platform_base_url")
        .await
        .map(|opt| opt.unwrap_or_else(|| "http://127.0.0.1:5761".to_string()))
}

/// Get the LTI consumer key, if stored in the database
pub async fn get_lti_consumer_key(db: &SqlitePool) -> Result<Option<String>> {
    get_setting(db, "lti_consumer_key").await
}

/// Get the LTI consumer secret, if stored in the database
pub async fn get_lti_consumer_secret(db: &SqlitePool) -> Result<Option<String>> {
    get_setting(db, "lti_consumer_secret").await
}

/// Store the LTI consumer credentials
pub async fn set_lti_credentials(db: &SqlitePool, key: &str, secret: &str) -> Result<()> {
    set_setting(db, "lti_consumer_key", key).await?;
    set_setting(db, "lti_consumer_secret", secret).await
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting failed: {}", e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (internal)
async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    #[tokio::test]
    async fn sweep_interval_falls_back_to_seeded_default() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(get_sweep_interval_secs(&pool).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn lti_credentials_roundtrip() {
        let pool = init_memory_database().await.unwrap();

        assert_eq!(get_lti_consumer_key(&pool).await.unwrap(), None);

        set_lti_credentials(&pool, "penlight-key", "penlight-secret")
            .await
            .unwrap();

        assert_eq!(
            get_lti_consumer_key(&pool).await.unwrap(),
            Some("penlight-key".to_string())
        );
        assert_eq!(
            get_lti_consumer_secret(&pool).await.unwrap(),
            Some("penlight-secret".to_string())
        );
    }

    #[tokio::test]
    async fn set_setting_upserts_without_duplicates() {
        let pool = init_memory_database().await.unwrap();

        set_lti_credentials(&pool, "first", "s1").await.unwrap();
        set_lti_credentials(&pool, "second", "s2").await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'lti_consumer_key'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);

        assert_eq!(
            get_lti_consumer_key(&pool).await.unwrap(),
            Some("second".to_string())
        );
    }

    #[tokio::test]
    async fn unparsable_setting_is_a_config_error() {
        let pool = init_memory_database().await.unwrap();

        sqlx::query("UPDATE settings SET value = 'soon' WHERE key = 'sweep_interval_secs'")
            .execute(&pool)
            .await
            .unwrap();

        assert!(get_sweep_interval_secs(&pool).await.is_err());
    }
}
