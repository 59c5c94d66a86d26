use crate::db::connection::DbPool;
use crate::db::models::PollOption;
use sqlx::Error;

pub async fn add_option(pool: &DbPool, poll_id: i64, text: &str) -> Result<PollOption, Error> {
    sqlx::query_as::<_, PollOption>(
        "INSERT INTO options (poll_id, text) VALUES ($1, $2)
         RETURNING id, poll_id, text, created_at, 0::BIGINT AS vote_count",
    )
    .bind(poll_id)
    .bind(text)
    .fetch_one(pool)
    .await
}

/// Options of a poll with their current vote counts.
pub async fn get_poll_options(pool: &DbPool, poll_id: i64) -> Result<Vec<PollOption>, Error> {
    sqlx::query_as::<_, PollOption>(
        "SELECT o.id, o.poll_id, o.text, o.created_at, COUNT(v.id) AS vote_count
         FROM options o
         LEFT JOIN votes v ON v.option_id = o.id
         WHERE o.poll_id = $1
         GROUP BY o.id
         ORDER BY o.id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await
}

pub async fn option_in_poll(pool: &DbPool, poll_id: i64, option_id: i64) -> Result<bool, Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM options WHERE id = $1 AND poll_id = $2")
        .bind(option_id)
        .bind(poll_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}
