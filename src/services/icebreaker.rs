use chrono::{DateTime, Duration, Utc};

use crate::models::session::{Session, SessionState};

const PROMPTS: &[&str] = &[
    "What was the best part of your week so far?",
    "Where would you teleport to right now if you could?",
    "What does a perfect lazy Sunday look like for you?",
    "What's a small thing that always cheers you up?",
    "Sum up your current mood as a movie title.",
    "Which song have you had on repeat lately?",
    "What's a hobby you'd love to pick up?",
    "What would the first five minutes of our first real date look like?",
];

const FIRST_PROMPT_AFTER_SECS: i64 = 30;
const ROTATION_SECS: i64 = 90;
const VISIBLE_SECS: i64 = 15;

/// The prompt both participants should see right now, if any.
///
/// Derived only from persisted session fields so every replica and every
/// restart shows the same prompt at the same moment.
pub fn current_prompt(session: &Session, now: DateTime<Utc>) -> Option<&'static str> {
    if session.state != SessionState::Active {
        return None;
    }

    let since_first = (now - session.active_started_at) - Duration::seconds(FIRST_PROMPT_AFTER_SECS);
    if since_first < Duration::zero() {
        return None;
    }

    let elapsed = since_first.num_seconds();
    if elapsed % ROTATION_SECS >= VISIBLE_SECS {
        return None;
    }

    let slot = (elapsed / ROTATION_SECS) as u64;
    let index = session.icebreaker_seed.wrapping_add(slot) % PROMPTS.len() as u64;
    PROMPTS.get(index as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::{MatchProfile, Mood, Preferences, WaitingTicket};
    use uuid::Uuid;

    fn session(seed: u64) -> Session {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let ticket = || {
            WaitingTicket::new(Uuid::new_v4(), Mood::Chill, 1200, Preferences::default(), MatchProfile::default(), start)
        };
        let mut session = Session::pair(&ticket(), &ticket(), seed, start);
        session.activate(start).unwrap();
        session
    }

    #[test]
    fn first_prompt_appears_after_thirty_seconds() {
        let session = session(0);
        let start = session.active_started_at;

        assert_eq!(current_prompt(&session, start + Duration::seconds(29)), None);
        assert_eq!(current_prompt(&session, start + Duration::seconds(30)), Some(PROMPTS[0]));
        assert_eq!(current_prompt(&session, start + Duration::seconds(44)), Some(PROMPTS[0]));
        assert_eq!(current_prompt(&session, start + Duration::seconds(45)), None);
    }

    #[test]
    fn prompts_rotate_every_ninety_seconds() {
        let session = session(3);
        let start = session.active_started_at;

        assert_eq!(current_prompt(&session, start + Duration::seconds(30)), Some(PROMPTS[3]));
        assert_eq!(current_prompt(&session, start + Duration::seconds(120)), Some(PROMPTS[4]));
    }

    #[test]
    fn no_prompt_outside_active_state() {
        let mut session = session(0);
        let at = session.active_started_at + Duration::seconds(30);
        session.state = SessionState::Deciding;
        assert_eq!(current_prompt(&session, at), None);
    }
}
