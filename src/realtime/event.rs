use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: PollStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSummary {
    pub id: i64,
    pub poll_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub vote_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub id: i64,
    pub poll_id: i64,
    pub option_id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeSummary {
    pub id: i64,
    pub poll_id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// One committed mutation, as broadcast to every session.
///
/// On the wire this is a JSON object whose `type` field names the kind.
/// Every kind except `poll_created` carries a top-level `poll_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PollCreated { poll: PollSummary },
    OptionAdded { poll_id: i64, option: OptionSummary },
    VoteCast { poll_id: i64, vote: VoteSummary },
    LikeAdded { poll_id: i64, like: LikeSummary },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PollCreated { .. } => "poll_created",
            Event::OptionAdded { .. } => "option_added",
            Event::VoteCast { .. } => "vote_cast",
            Event::LikeAdded { .. } => "like_added",
        }
    }

    /// The poll this event concerns.
    pub fn poll_id(&self) -> i64 {
        match self {
            Event::PollCreated { poll } => poll.id,
            Event::OptionAdded { poll_id, .. }
            | Event::VoteCast { poll_id, .. }
            | Event::LikeAdded { poll_id, .. } => *poll_id,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap()
    }

    pub fn vote_cast(poll_id: i64) -> Event {
        Event::VoteCast {
            poll_id,
            vote: VoteSummary {
                id: 1,
                poll_id,
                option_id: 3,
                user_id: "user-a".into(),
                created_at: ts(),
            },
        }
    }

    pub fn poll_created(id: i64) -> Event {
        Event::PollCreated {
            poll: PollSummary {
                id,
                title: "Lunch?".into(),
                description: None,
                status: PollStatus::Active,
                created_at: ts(),
                updated_at: ts(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::Value;

    #[test]
    fn vote_cast_wire_shape() {
        let json: Value = serde_json::to_value(vote_cast(7)).unwrap();
        assert_eq!(json["type"], "vote_cast");
        assert_eq!(json["poll_id"], 7);
        assert_eq!(json["vote"]["option_id"], 3);
    }

    #[test]
    fn poll_created_has_summary_and_no_top_level_poll_id() {
        let json: Value = serde_json::to_value(poll_created(2)).unwrap();
        assert_eq!(json["type"], "poll_created");
        assert!(json.get("poll_id").is_none());
        assert_eq!(json["poll"]["id"], 2);
        assert_eq!(json["poll"]["status"], "active");
    }

    #[test]
    fn parses_client_payload() {
        let raw = r#"{
            "type": "like_added",
            "poll_id": 4,
            "like": {"id": 9, "poll_id": 4, "user_id": "u", "created_at": "2026-01-01T00:00:00Z"}
        }"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind(), "like_added");
        assert_eq!(event.poll_id(), 4);
    }

    #[test]
    fn rejects_missing_type() {
        let raw = r#"{"poll_id": 4}"#;
        assert!(serde_json::from_str::<Event>(raw).is_err());
    }

    #[test]
    fn rejects_unknown_kind() {
        let raw = r#"{"type": "poll_deleted", "poll_id": 4}"#;
        assert!(serde_json::from_str::<Event>(raw).is_err());
    }
}
