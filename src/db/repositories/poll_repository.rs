use crate::db::connection::DbPool;
use crate::db::models::Poll;
use sqlx::Error;

pub async fn create_poll(
    pool: &DbPool,
    title: &str,
    description: Option<&str>,
) -> Result<Poll, Error> {
    sqlx::query_as::<_, Poll>(
        "INSERT INTO polls (title, description) VALUES ($1, $2)
         RETURNING id, title, description, status, created_at, updated_at",
    )
    .bind(title)
    .bind(description)
    .fetch_one(pool)
    .await
}

pub async fn get_poll(pool: &DbPool, poll_id: i64) -> Result<Option<Poll>, Error> {
    sqlx::query_as::<_, Poll>(
        "SELECT id, title, description, status, created_at, updated_at FROM polls WHERE id = $1",
    )
    .bind(poll_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_all_polls(pool: &DbPool) -> Result<Vec<Poll>, Error> {
    sqlx::query_as::<_, Poll>(
        "SELECT id, title, description, status, created_at, updated_at FROM polls ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn poll_exists(pool: &DbPool, poll_id: i64) -> Result<bool, Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM polls WHERE id = $1")
        .bind(poll_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}
