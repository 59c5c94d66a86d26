use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

use crate::realtime::{LikeSummary, OptionSummary, PollStatus, PollSummary, VoteSummary};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: i64,
    pub poll_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: i64,
    pub poll_id: i64,
    pub option_id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Like {
    pub id: i64,
    pub poll_id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn status(&self) -> PollStatus {
        match self.status.as_str() {
            "closed" => PollStatus::Closed,
            _ => PollStatus::Active,
        }
    }
}

impl From<&Poll> for PollSummary {
    fn from(poll: &Poll) -> Self {
        PollSummary {
            id: poll.id,
            title: poll.title.clone(),
            description: poll.description.clone(),
            status: poll.status(),
            created_at: poll.created_at,
            updated_at: poll.updated_at,
        }
    }
}

impl From<&PollOption> for OptionSummary {
    fn from(option: &PollOption) -> Self {
        OptionSummary {
            id: option.id,
            poll_id: option.poll_id,
            text: option.text.clone(),
            created_at: option.created_at,
            vote_count: option.vote_count,
        }
    }
}

impl From<&Vote> for VoteSummary {
    fn from(vote: &Vote) -> Self {
        VoteSummary {
            id: vote.id,
            poll_id: vote.poll_id,
            option_id: vote.option_id,
            user_id: vote.user_id.clone(),
            created_at: vote.created_at,
        }
    }
}

impl From<&Like> for LikeSummary {
    fn from(like: &Like) -> Self {
        LikeSummary {
            id: like.id,
            poll_id: like.poll_id,
            user_id: like.user_id.clone(),
            created_at: like.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(status: &str) -> Poll {
        let now = Utc::now();
        Poll {
            id: 3,
            title: "Tabs or spaces".into(),
            description: Some("settle it".into()),
            status: status.into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unknown_status_reads_as_active() {
        assert_eq!(poll("active").status(), PollStatus::Active);
        assert_eq!(poll("closed").status(), PollStatus::Closed);
        assert_eq!(poll("archived").status(), PollStatus::Active);
    }

    #[test]
    fn poll_summary_copies_row() {
        let row = poll("active");
        let summary = PollSummary::from(&row);
        assert_eq!(summary.id, 3);
        assert_eq!(summary.description.as_deref(), Some("settle it"));
        assert_eq!(summary.created_at, row.created_at);
    }
}
