//! End-of-date decision rounds.
//!
//! Revealing requires unanimous consent: anything short of two `reveal`s in the
//! same round keeps both participants anonymous. A silent participant is
//! treated as having chosen `end` once the round deadline passes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    config::DatePolicy,
    error::{AppError, Result},
    models::session::{DecisionChoice, Outcome, Resolution, RevealDecision, Session, SessionState},
};

/// Result of recording a choice.
#[derive(Debug, Clone)]
pub enum SubmitResult {
    /// The counterpart has not answered yet.
    Pending { round: u32 },
    /// Both sides are in (or the round was forced) and the round resolved.
    Resolved(Resolution),
}

/// Resolves a round from the two participants' choices. Argument order never
/// matters. `None` marks a participant who did not answer before the deadline.
pub fn resolve(
    first: Option<DecisionChoice>,
    second: Option<DecisionChoice>,
    can_extend: bool,
) -> Outcome {
    use DecisionChoice::{End, Extend, Reveal};

    match (first, second) {
        (Some(Reveal), Some(Reveal)) => Outcome::MutualReveal,
        (Some(Extend), Some(Extend)) if can_extend => Outcome::Extended,
        (Some(_), Some(_)) => Outcome::GracefulEnd,
        // An explicit end stays an end when the other side goes silent.
        (Some(End), None) | (None, Some(End)) => Outcome::GracefulEnd,
        _ => Outcome::TimedOutEnd,
    }
}

impl Session {
    /// Records `choice` for the current round on behalf of `user_id`.
    ///
    /// `round`, when supplied, must name the open round.
    pub fn submit(
        &mut self,
        user_id: Uuid,
        choice: DecisionChoice,
        round: Option<u32>,
        now: DateTime<Utc>,
        policy: &DatePolicy,
    ) -> Result<SubmitResult> {
        self.ensure_participant(user_id)?;

        match self.state {
            SessionState::Concluded => return Err(AppError::StaleRound(self.round)),
            SessionState::Deciding => {
                if let Some(requested) = round {
                    if requested != self.round {
                        return Err(AppError::StaleRound(requested));
                    }
                }
            }
            SessionState::Active | SessionState::Matching => {
                return match round {
                    Some(requested) if requested <= self.round => Err(AppError::StaleRound(requested)),
                    // the last round already resolved (extended)
                    None if self.round > 0 => Err(AppError::StaleRound(self.round)),
                    _ => Err(self.invalid("submit a decision")),
                };
            }
        }

        Ok(self.record_choice(user_id, choice, now, policy))
    }

    /// Stores the choice and resolves the round once both sides are in.
    /// Callers guarantee the session is `Deciding` and `user_id` is a participant.
    pub(crate) fn record_choice(
        &mut self,
        user_id: Uuid,
        choice: DecisionChoice,
        now: DateTime<Utc>,
        policy: &DatePolicy,
    ) -> SubmitResult {
        let slot = self.decisions.entry(user_id).or_insert(None);
        let unchanged = matches!(slot, Some(existing) if existing.choice == choice);
        if !unchanged {
            *slot = Some(RevealDecision {
                user_id,
                choice,
                submitted_at: now,
            });
        }

        if self.decisions.values().all(Option::is_some) {
            SubmitResult::Resolved(self.resolve_round(now, policy))
        } else {
            SubmitResult::Pending { round: self.round }
        }
    }

    /// Resolves the open round if its deadline has passed.
    pub fn timeout_round(&mut self, now: DateTime<Utc>, policy: &DatePolicy) -> Option<Resolution> {
        match (self.state, self.decision_deadline) {
            (SessionState::Deciding, Some(deadline)) if now >= deadline => {
                Some(self.resolve_round(now, policy))
            }
            _ => None,
        }
    }

    fn resolve_round(&mut self, now: DateTime<Utc>, policy: &DatePolicy) -> Resolution {
        let choice = |user: Uuid| {
            self.decisions
                .get(&user)
                .copied()
                .flatten()
                .map(|decision| decision.choice)
        };
        let can_extend = self.extension_count < policy.max_extensions;
        let outcome = resolve(choice(self.participant_a), choice(self.participant_b), can_extend);

        self.apply_outcome(outcome, now, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::{MatchProfile, Mood, Preferences, WaitingTicket};
    use chrono::Duration;
    use DecisionChoice::{End, Extend, Reveal};

    const ALL: [Option<DecisionChoice>; 4] = [Some(Reveal), Some(Extend), Some(End), None];

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn deciding_session() -> Session {
        let ticket = || {
            WaitingTicket::new(
                Uuid::new_v4(),
                Mood::Deep,
                600,
                Preferences::default(),
                MatchProfile::default(),
                start(),
            )
        };
        let mut session = Session::pair(&ticket(), &ticket(), 0, start());
        session.activate(start()).unwrap();
        session.expire(session.expires_at, &DatePolicy::default());
        session
    }

    #[test]
    fn resolution_is_order_independent() {
        for first in ALL {
            for second in ALL {
                for can_extend in [true, false] {
                    assert_eq!(
                        resolve(first, second, can_extend),
                        resolve(second, first, can_extend),
                        "{:?} vs {:?}",
                        first,
                        second
                    );
                }
            }
        }
    }

    #[test]
    fn any_end_is_a_graceful_end() {
        for other in [Reveal, Extend, End] {
            assert_eq!(resolve(Some(End), Some(other), true), Outcome::GracefulEnd);
        }
    }

    #[test]
    fn mismatched_reveal_and_extend_stays_anonymous() {
        assert_eq!(resolve(Some(Reveal), Some(Extend), true), Outcome::GracefulEnd);
    }

    #[test]
    fn extension_beyond_cap_ends_gracefully() {
        assert_eq!(resolve(Some(Extend), Some(Extend), true), Outcome::Extended);
        assert_eq!(resolve(Some(Extend), Some(Extend), false), Outcome::GracefulEnd);
    }

    #[test]
    fn silence_resolves_as_timed_out_unless_the_other_side_ended() {
        assert_eq!(resolve(Some(Reveal), None, true), Outcome::TimedOutEnd);
        assert_eq!(resolve(Some(Extend), None, true), Outcome::TimedOutEnd);
        assert_eq!(resolve(None, None, true), Outcome::TimedOutEnd);
        assert_eq!(resolve(None, Some(End), true), Outcome::GracefulEnd);
    }

    #[test]
    fn mutual_reveal_in_either_order() {
        let policy = DatePolicy::default();
        for reversed in [false, true] {
            let mut session = deciding_session();
            let (first, second) = if reversed {
                (session.participant_b, session.participant_a)
            } else {
                (session.participant_a, session.participant_b)
            };

            let pending = session.submit(first, Reveal, None, start(), &policy).unwrap();
            assert!(matches!(pending, SubmitResult::Pending { round: 1 }));

            match session.submit(second, Reveal, Some(1), start(), &policy).unwrap() {
                SubmitResult::Resolved(resolution) => {
                    assert_eq!(resolution.outcome, Outcome::MutualReveal);
                    assert_eq!(resolution.choice_of(first), Some(Reveal));
                }
                other => panic!("expected resolution, got {:?}", other),
            }
            assert_eq!(session.state, SessionState::Concluded);
        }
    }

    #[test]
    fn resubmitting_the_same_choice_keeps_the_original_timestamp() {
        let policy = DatePolicy::default();
        let mut session = deciding_session();
        let user = session.participant_a;

        session.submit(user, Reveal, None, start(), &policy).unwrap();
        session
            .submit(user, Reveal, None, start() + Duration::seconds(5), &policy)
            .unwrap();

        assert_eq!(session.decisions[&user].unwrap().submitted_at, start());
    }

    #[test]
    fn a_pending_choice_can_be_changed() {
        let policy = DatePolicy::default();
        let mut session = deciding_session();
        let (a, b) = (session.participant_a, session.participant_b);

        session.submit(a, Reveal, None, start(), &policy).unwrap();
        session.submit(a, Extend, None, start(), &policy).unwrap();

        match session.submit(b, Extend, None, start(), &policy).unwrap() {
            SubmitResult::Resolved(resolution) => assert_eq!(resolution.outcome, Outcome::Extended),
            other => panic!("expected resolution, got {:?}", other),
        }
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.extension_count, 1);
    }

    #[test]
    fn submitting_to_a_resolved_round_is_stale() {
        let policy = DatePolicy::default();
        let mut session = deciding_session();
        let (a, b) = (session.participant_a, session.participant_b);

        session.submit(a, Extend, None, start(), &policy).unwrap();
        session.submit(b, Extend, None, start(), &policy).unwrap();

        assert!(matches!(
            session.submit(a, Reveal, Some(1), start(), &policy),
            Err(AppError::StaleRound(1))
        ));
        assert!(matches!(
            session.submit(a, Reveal, None, start(), &policy),
            Err(AppError::StaleRound(1))
        ));
        assert!(matches!(
            session.submit(a, Reveal, Some(2), start(), &policy),
            Err(AppError::InvalidStateTransition { .. })
        ));

        session.force_conclude(Outcome::GracefulEnd, start(), &policy);
        assert!(matches!(
            session.submit(a, Reveal, None, start(), &policy),
            Err(AppError::StaleRound(_))
        ));
    }

    #[test]
    fn round_timeout_waits_for_the_deadline() {
        let policy = DatePolicy::default();
        let mut session = deciding_session();
        let deadline = session.decision_deadline.unwrap();
        session
            .submit(session.participant_a, Reveal, None, deadline - Duration::seconds(10), &policy)
            .unwrap();

        assert!(session.timeout_round(deadline - Duration::seconds(1), &policy).is_none());

        let resolution = session.timeout_round(deadline, &policy).unwrap();
        assert_eq!(resolution.outcome, Outcome::TimedOutEnd);
        assert_eq!(resolution.choice_of(session.participant_b), None);
        assert!(session.is_concluded());
    }

    #[test]
    fn extensions_are_capped() {
        let policy = DatePolicy::default();
        let mut session = deciding_session();
        let (a, b) = (session.participant_a, session.participant_b);

        for _ in 0..policy.max_extensions {
            session.submit(a, Extend, None, start(), &policy).unwrap();
            session.submit(b, Extend, None, start(), &policy).unwrap();
            assert_eq!(session.state, SessionState::Active);
            session.expire(session.expires_at, &policy);
        }

        session.submit(a, Extend, None, start(), &policy).unwrap();
        match session.submit(b, Extend, None, start(), &policy).unwrap() {
            SubmitResult::Resolved(resolution) => assert_eq!(resolution.outcome, Outcome::GracefulEnd),
            other => panic!("expected resolution, got {:?}", other),
        }
        assert_eq!(session.extension_count, policy.max_extensions);
    }
}
