use crate::db::connection::DbPool;
use crate::db::models::Like;
use sqlx::Error;

#[derive(Debug)]
pub enum LikeToggle {
    Added(Like),
    Removed,
}

/// Like the poll, or remove the like if `user_id` already has one.
///
/// The insert goes first so two concurrent first likes cannot both miss the
/// row and collide on `UNIQUE(poll_id, user_id)`.
pub async fn toggle_like(pool: &DbPool, poll_id: i64, user_id: &str) -> Result<LikeToggle, Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_as::<_, Like>(
        "INSERT INTO likes (poll_id, user_id) VALUES ($1, $2)
         ON CONFLICT (poll_id, user_id) DO NOTHING
         RETURNING id, poll_id, user_id, created_at",
    )
    .bind(poll_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let toggle = match inserted {
        Some(like) => LikeToggle::Added(like),
        None => {
            sqlx::query("DELETE FROM likes WHERE poll_id = $1 AND user_id = $2")
                .bind(poll_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            LikeToggle::Removed
        }
    };

    tx.commit().await?;
    Ok(toggle)
}

pub async fn get_poll_likes(pool: &DbPool, poll_id: i64) -> Result<Vec<Like>, Error> {
    sqlx::query_as::<_, Like>(
        "SELECT id, poll_id, user_id, created_at FROM likes WHERE poll_id = $1 ORDER BY id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await
}
