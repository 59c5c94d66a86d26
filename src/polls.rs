use crate::db::{self, LikeToggle};
use crate::error::PollError;
use crate::realtime::{Event, LikeSummary, OptionSummary, PollSummary, VoteSummary};
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOptionRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option_id: i64,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct PollWithDetails {
    #[serde(flatten)]
    pub poll: PollSummary,
    pub options: Vec<OptionSummary>,
    pub votes: Vec<VoteSummary>,
    pub likes: Vec<LikeSummary>,
    pub total_votes: usize,
    pub total_likes: usize,
}

fn require_text(value: &str, what: &'static str) -> Result<(), PollError> {
    if value.trim().is_empty() {
        return Err(PollError::InvalidRequest(what));
    }
    Ok(())
}

async fn ensure_poll(app_state: &AppState, poll_id: i64) -> Result<(), PollError> {
    if db::poll_exists(&app_state.db, poll_id).await? {
        Ok(())
    } else {
        Err(PollError::PollNotFound)
    }
}

/// Create a new poll
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, PollError> {
    require_text(&payload.title, "title is required")?;

    let poll = db::create_poll(&app_state.db, &payload.title, payload.description.as_deref()).await?;
    let summary = PollSummary::from(&poll);

    app_state.publish(&Event::PollCreated {
        poll: summary.clone(),
    });

    Ok((StatusCode::OK, Json(summary)))
}

/// List all polls, newest first
pub async fn list_polls(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, PollError> {
    let polls = db::get_all_polls(&app_state.db).await?;
    let summaries: Vec<PollSummary> = polls.iter().map(PollSummary::from).collect();

    Ok((StatusCode::OK, Json(summaries)))
}

/// Get a poll with its options, vote counts, votes and likes
pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<i64>,
) -> Result<impl IntoResponse, PollError> {
    let poll = db::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(PollError::PollNotFound)?;

    let options = db::get_poll_options(&app_state.db, poll_id).await?;
    let votes = db::get_poll_votes(&app_state.db, poll_id).await?;
    let likes = db::get_poll_likes(&app_state.db, poll_id).await?;

    let response = PollWithDetails {
        poll: PollSummary::from(&poll),
        options: options.iter().map(OptionSummary::from).collect(),
        total_votes: votes.len(),
        total_likes: likes.len(),
        votes: votes.iter().map(VoteSummary::from).collect(),
        likes: likes.iter().map(LikeSummary::from).collect(),
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Add an option to a poll
pub async fn add_option(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<i64>,
    Json(payload): Json<CreateOptionRequest>,
) -> Result<impl IntoResponse, PollError> {
    require_text(&payload.text, "option text is required")?;
    ensure_poll(&app_state, poll_id).await?;

    let option = db::add_option(&app_state.db, poll_id, &payload.text).await?;
    let summary = OptionSummary::from(&option);

    app_state.publish(&Event::OptionAdded {
        poll_id,
        option: summary.clone(),
    });

    Ok((StatusCode::OK, Json(summary)))
}

/// Cast, or move, a user's vote
pub async fn vote(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, PollError> {
    require_text(&payload.user_id, "user_id is required")?;
    ensure_poll(&app_state, poll_id).await?;

    if !db::option_in_poll(&app_state.db, poll_id, payload.option_id).await? {
        return Err(PollError::OptionNotFound);
    }

    let vote = db::cast_vote(&app_state.db, poll_id, payload.option_id, &payload.user_id).await?;
    let summary = VoteSummary::from(&vote);

    app_state.publish(&Event::VoteCast {
        poll_id,
        vote: summary.clone(),
    });

    Ok((StatusCode::OK, Json(summary)))
}

/// Toggle a user's like. Only adding a like is broadcast.
pub async fn like_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<i64>,
    Json(payload): Json<LikeRequest>,
) -> Result<Response, PollError> {
    require_text(&payload.user_id, "user_id is required")?;
    ensure_poll(&app_state, poll_id).await?;

    match db::toggle_like(&app_state.db, poll_id, &payload.user_id).await? {
        LikeToggle::Added(like) => {
            let summary = LikeSummary::from(&like);
            app_state.publish(&Event::LikeAdded {
                poll_id,
                like: summary.clone(),
            });
            Ok((StatusCode::OK, Json(summary)).into_response())
        }
        LikeToggle::Removed => {
            Ok((StatusCode::OK, Json(json!({"message": "Like removed"}))).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::PollStatus;
    use chrono::Utc;

    #[test]
    fn blank_text_is_rejected() {
        assert!(require_text("   ", "title is required").is_err());
        assert!(require_text("Lunch?", "title is required").is_ok());
    }

    #[test]
    fn details_flatten_the_poll_fields() {
        let now = Utc::now();
        let details = PollWithDetails {
            poll: PollSummary {
                id: 1,
                title: "Lunch?".into(),
                description: None,
                status: PollStatus::Active,
                created_at: now,
                updated_at: now,
            },
            options: vec![],
            votes: vec![],
            likes: vec![],
            total_votes: 0,
            total_likes: 0,
        };
        let json = serde_json::to_value(details).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["title"], "Lunch?");
        assert_eq!(json["total_likes"], 0);
        assert!(json["options"].as_array().unwrap().is_empty());
    }
}
