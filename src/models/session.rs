use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ticket::Mood;

/// Lifecycle of a paired date.
///
/// `Matching` only exists inside the queue's critical section; every session
/// observable outside it is at least `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "blind_date_state")]
pub enum SessionState {
    #[postgres(name = "matching")]
    Matching,
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "deciding")]
    Deciding,
    #[postgres(name = "concluded")]
    Concluded,
}

/// A participant's end-of-date choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "reveal_choice")]
pub enum DecisionChoice {
    #[postgres(name = "reveal")]
    Reveal,
    #[postgres(name = "extend")]
    Extend,
    #[postgres(name = "end")]
    End,
}

/// How a decision round resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "date_outcome")]
pub enum Outcome {
    #[postgres(name = "mutual_reveal")]
    MutualReveal,
    #[postgres(name = "extended")]
    Extended,
    #[postgres(name = "graceful_end")]
    GracefulEnd,
    #[postgres(name = "timed_out_end")]
    TimedOutEnd,
}

impl Outcome {
    /// Every outcome except `Extended` concludes the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Extended)
    }
}

/// One participant's submission for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealDecision {
    pub user_id: Uuid,
    pub choice: DecisionChoice,
    pub submitted_at: DateTime<Utc>,
}

/// The durable record of a paired voice date.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub mood: Mood,
    pub duration_seconds: u32,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub active_started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub extension_count: u32,
    /// Number of decision rounds opened so far; the open round while `Deciding`.
    pub round: u32,
    pub decision_deadline: Option<DateTime<Utc>>,
    /// Current round's submissions, keyed by participant.
    pub decisions: BTreeMap<Uuid, Option<RevealDecision>>,
    /// Outcome of the most recently resolved round.
    pub outcome: Option<Outcome>,
    pub concluded_at: Option<DateTime<Utc>>,
    pub icebreaker_seed: u64,
    /// Bumped on every persisted change; older writes never overwrite newer ones.
    pub revision: u64,
}

/// The terminal record of one resolved decision round.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub session_id: Uuid,
    pub round: u32,
    pub outcome: Outcome,
    /// Each participant's submission; `None` for a participant who never answered.
    pub decisions: BTreeMap<Uuid, Option<RevealDecision>>,
    pub resolved_at: DateTime<Utc>,
}

impl Resolution {
    pub fn choice_of(&self, user_id: Uuid) -> Option<DecisionChoice> {
        self.decisions
            .get(&user_id)
            .copied()
            .flatten()
            .map(|decision| decision.choice)
    }
}

/// Fired on MUTUAL_REVEAL so a durable conversation can be created.
#[derive(Debug, Clone, Serialize)]
pub struct MutualReveal {
    pub session_id: Uuid,
    pub participants: [Uuid; 2],
    pub revealed_at: DateTime<Utc>,
}
