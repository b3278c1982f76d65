use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    profile::AnonymousProfile,
    session::{DecisionChoice, Outcome, SessionState},
    ticket::Mood,
};

/// A session as seen by one of its participants.
///
/// Clients render this; they never keep their own countdown or decision state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: SessionState,
    pub mood: Mood,
    pub duration_seconds: u32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub extension_count: u32,
    pub round: u32,
    pub decision_deadline: Option<DateTime<Utc>>,
    pub reveal_available: bool,
    /// Whether this viewer creates the peer-connection offer.
    pub initiator: bool,
    pub partner: AnonymousProfile,
    /// Only present after a mutual reveal.
    pub partner_user_id: Option<Uuid>,
    pub my_choice: Option<DecisionChoice>,
    pub partner_submitted: bool,
    /// Only present once the round it belongs to has resolved.
    pub partner_choice: Option<DecisionChoice>,
    pub outcome: Option<Outcome>,
    pub icebreaker: Option<&'static str>,
}

/// Response to `join` and `poll_status`.
#[derive(Debug, Clone, Serialize)]
pub struct MatchStatus {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
}

impl MatchStatus {
    pub fn waiting(ticket_id: Uuid, enqueued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            matched: false,
            ticket_id: Some(ticket_id),
            enqueued_at: Some(enqueued_at),
            expires_at: Some(expires_at),
            session: None,
        }
    }

    pub fn matched(session: SessionView) -> Self {
        Self {
            matched: true,
            ticket_id: None,
            enqueued_at: None,
            expires_at: None,
            session: Some(session),
        }
    }
}

/// Response to `decision.submit` and `session.endEarly`.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionStatus {
    pub resolved: bool,
    pub round: u32,
    pub outcome: Option<Outcome>,
    pub session: SessionView,
}
