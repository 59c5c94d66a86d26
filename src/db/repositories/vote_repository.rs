use crate::db::connection::DbPool;
use crate::db::models::Vote;
use sqlx::Error;

/// Record `user_id`'s vote on a poll. A user has at most one vote per poll;
/// voting again moves it to the new option.
pub async fn cast_vote(
    pool: &DbPool,
    poll_id: i64,
    option_id: i64,
    user_id: &str,
) -> Result<Vote, Error> {
    sqlx::query_as::<_, Vote>(
        "INSERT INTO votes (poll_id, option_id, user_id) VALUES ($1, $2, $3)
         ON CONFLICT (poll_id, user_id) DO UPDATE SET option_id = EXCLUDED.option_id
         RETURNING id, poll_id, option_id, user_id, created_at",
    )
    .bind(poll_id)
    .bind(option_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn get_poll_votes(pool: &DbPool, poll_id: i64) -> Result<Vec<Vote>, Error> {
    sqlx::query_as::<_, Vote>(
        "SELECT id, poll_id, option_id, user_id, created_at FROM votes WHERE poll_id = $1 ORDER BY id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await
}
