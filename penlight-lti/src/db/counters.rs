//! Message id counter operations
//!
//! **[LTI-MID-010]** Every outbound POX envelope carries a unique
//! imsx_messageIdentifier. The counter is a single persisted row shared by
//! all process instances; the increment is one atomic read-modify-write at
//! the storage layer so concurrent passback attempts can never observe the
//! same value.

use penlight_common::db::init::MESSAGE_ID_COUNTER;
use penlight_common::Result;
use sqlx::SqlitePool;

/// Claim the next message id
pub async fn next_message_id(db: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "UPDATE counters SET count = count + 1 WHERE name = ? RETURNING count",
    )
    .bind(MESSAGE_ID_COUNTER)
    .fetch_one(db)
    .await?;

    Ok(count)
}
