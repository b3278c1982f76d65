use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    config::DatePolicy,
    error::{AppError, Result},
    models::session::{DecisionChoice, Outcome, Resolution, Session, SessionState},
    models::ticket::WaitingTicket,
    services::consensus::SubmitResult,
};

impl Session {
    /// Pairs two compatible tickets. The date lasts as long as the shorter request.
    pub fn pair(
        waiting: &WaitingTicket,
        joining: &WaitingTicket,
        icebreaker_seed: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let duration_seconds = waiting
            .desired_duration_seconds
            .min(joining.desired_duration_seconds);

        let decisions = BTreeMap::from([(waiting.user_id, None), (joining.user_id, None)]);

        Self {
            session_id: Uuid::new_v4(),
            participant_a: waiting.user_id,
            participant_b: joining.user_id,
            mood: waiting.mood,
            duration_seconds,
            state: SessionState::Matching,
            created_at: now,
            active_started_at: now,
            expires_at: now + Duration::seconds(i64::from(duration_seconds)),
            extension_count: 0,
            round: 0,
            decision_deadline: None,
            decisions,
            outcome: None,
            concluded_at: None,
            icebreaker_seed,
            revision: 0,
        }
    }

    /// MATCHING → ACTIVE; starts the countdown.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state != SessionState::Matching {
            return Err(self.invalid("activate"));
        }
        self.state = SessionState::Active;
        self.active_started_at = now;
        self.expires_at = now + Duration::seconds(i64::from(self.duration_seconds));
        Ok(())
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.participant_a || user_id == self.participant_b
    }

    pub fn ensure_participant(&self, user_id: Uuid) -> Result<()> {
        if self.is_participant(user_id) {
            Ok(())
        } else {
            Err(AppError::ParticipantMismatch)
        }
    }

    /// The other participant. Recipients are always resolved here, never taken from clients.
    pub fn counterpart(&self, user_id: Uuid) -> Result<Uuid> {
        if user_id == self.participant_a {
            Ok(self.participant_b)
        } else if user_id == self.participant_b {
            Ok(self.participant_a)
        } else {
            Err(AppError::ParticipantMismatch)
        }
    }

    /// The participant expected to create the peer-connection offer.
    pub fn initiator(&self) -> Uuid {
        self.participant_a.min(self.participant_b)
    }

    pub fn is_concluded(&self) -> bool {
        self.state == SessionState::Concluded
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        match self.state {
            SessionState::Matching | SessionState::Active => {
                (self.expires_at - now).num_seconds().max(0)
            }
            _ => 0,
        }
    }

    /// Total time the date may have lasted, extensions included.
    pub fn lifetime(&self, policy: &DatePolicy) -> Duration {
        Duration::seconds(i64::from(self.duration_seconds))
            + policy.extension_increment * self.extension_count as i32
    }

    /// Whether a participant may open the decision round now.
    pub fn reveal_available(&self, now: DateTime<Utc>, policy: &DatePolicy) -> bool {
        match self.state {
            SessionState::Active => {
                now - self.active_started_at >= policy.min_reveal_after || now >= self.expires_at
            }
            SessionState::Deciding => true,
            _ => false,
        }
    }

    /// ACTIVE → DECIDING: opens a fresh round with empty decisions.
    pub fn open_round(&mut self, now: DateTime<Utc>, policy: &DatePolicy) -> Result<u32> {
        if self.state != SessionState::Active {
            return Err(self.invalid("open a decision round"));
        }
        self.state = SessionState::Deciding;
        self.round += 1;
        self.clear_decisions();
        self.decision_deadline = Some(now + policy.decision_timeout);
        Ok(self.round)
    }

    /// Forces ACTIVE → DECIDING once the countdown has run out.
    /// Returns whether a round was opened.
    pub fn expire(&mut self, now: DateTime<Utc>, policy: &DatePolicy) -> bool {
        if self.state != SessionState::Active || now < self.expires_at {
            return false;
        }
        self.open_round(now, policy).is_ok()
    }

    /// Manual decision trigger, allowed once the minimum active time has passed.
    pub fn request_decision(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
        policy: &DatePolicy,
    ) -> Result<u32> {
        self.ensure_participant(user_id)?;
        match self.state {
            SessionState::Deciding => Ok(self.round),
            SessionState::Active if self.reveal_available(now, policy) => {
                self.open_round(now, policy)
            }
            _ => Err(self.invalid("request a decision")),
        }
    }

    /// Forces DECIDING with the caller's choice recorded as `end`.
    /// `None` means the session had already concluded and nothing changed.
    pub fn end_early(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
        policy: &DatePolicy,
    ) -> Result<Option<SubmitResult>> {
        self.ensure_participant(user_id)?;
        match self.state {
            SessionState::Concluded => return Ok(None),
            SessionState::Matching => return Err(self.invalid("end the date")),
            SessionState::Active => {
                self.open_round(now, policy)?;
            }
            SessionState::Deciding => {}
        }
        Ok(Some(self.record_choice(user_id, DecisionChoice::End, now, policy)))
    }

    /// Applies a resolved round and returns its terminal record.
    pub(crate) fn apply_outcome(
        &mut self,
        outcome: Outcome,
        now: DateTime<Utc>,
        policy: &DatePolicy,
    ) -> Resolution {
        let resolution = Resolution {
            session_id: self.session_id,
            round: self.round,
            outcome,
            decisions: self.decisions.clone(),
            resolved_at: now,
        };

        self.outcome = Some(outcome);
        self.decision_deadline = None;

        if outcome.is_terminal() {
            self.state = SessionState::Concluded;
            self.concluded_at = Some(now);
        } else {
            self.state = SessionState::Active;
            self.extension_count += 1;
            self.expires_at += policy.extension_increment;
            self.clear_decisions();
        }

        resolution
    }

    /// Concludes the session regardless of state. `None` if it already had.
    pub fn force_conclude(&mut self, outcome: Outcome, now: DateTime<Utc>, policy: &DatePolicy) -> Option<Resolution> {
        if self.is_concluded() {
            return None;
        }
        let terminal = if outcome.is_terminal() { outcome } else { Outcome::TimedOutEnd };
        Some(self.apply_outcome(terminal, now, policy))
    }

    /// Structural invariants every live session must hold.
    pub fn check_invariants(&self, policy: &DatePolicy) -> std::result::Result<(), String> {
        if self.participant_a == self.participant_b {
            return Err(format!("identical participants {}", self.participant_a));
        }
        if self.expires_at < self.active_started_at {
            return Err("expires_at precedes active_started_at".to_string());
        }
        if self.extension_count > policy.max_extensions {
            return Err(format!(
                "extension count {} exceeds cap {}",
                self.extension_count, policy.max_extensions
            ));
        }
        if self.decisions.len() != 2 || self.decisions.keys().any(|user| !self.is_participant(*user)) {
            return Err("decision slots do not match participants".to_string());
        }
        if self.state == SessionState::Deciding && self.decision_deadline.is_none() {
            return Err("deciding without a round deadline".to_string());
        }
        Ok(())
    }

    fn clear_decisions(&mut self) {
        for decision in self.decisions.values_mut() {
            *decision = None;
        }
    }

    pub(crate) fn invalid(&self, action: &'static str) -> AppError {
        AppError::InvalidStateTransition {
            from: self.state,
            action,
        }
    }
}
