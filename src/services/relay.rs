use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::Session,
    models::signal::{SignalEnvelope, SignalKind},
};

/// Outcome of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendReceipt {
    Queued { seq: u64, to_user_id: Uuid },
    /// The session has concluded; the envelope was accepted and dropped.
    Inert,
}

/// Per-session mailbox for negotiation payloads.
///
/// Envelopes are append-only in sequence order, so draining in storage order
/// preserves each sender's submission order.
#[derive(Debug)]
pub struct Mailbox {
    envelopes: Vec<SignalEnvelope>,
    next_seq: u64,
    max_pending: usize,
}

impl Mailbox {
    /// Creates an empty mailbox holding at most `max_pending` undelivered
    /// envelopes per recipient.
    pub fn new(max_pending: usize) -> Self {
        Self {
            envelopes: Vec::new(),
            next_seq: 0,
            max_pending,
        }
    }

    /// Queues an envelope for the sender's counterpart.
    ///
    /// # Arguments
    ///
    /// * `session` - The session the envelope belongs to.
    /// * `from_user_id` - The sending participant.
    /// * `kind` - Offer, answer or ICE candidate.
    /// * `payload` - The opaque negotiation payload.
    /// * `now` - Server time stamped on the envelope.
    ///
    /// # Returns
    ///
    /// A `Result<SendReceipt>`. Sends into a concluded session are `Inert`;
    /// a counterpart with `max_pending` undrained envelopes gets `RateLimitExceeded`.
    pub fn send(
        &mut self,
        session: &Session,
        from_user_id: Uuid,
        kind: SignalKind,
        payload: sonic_rs::Value,
        now: DateTime<Utc>,
    ) -> Result<SendReceipt> {
        let to_user_id = session.counterpart(from_user_id)?;

        if session.is_concluded() {
            return Ok(SendReceipt::Inert);
        }

        if self.pending_for(to_user_id) >= self.max_pending {
            return Err(AppError::RateLimitExceeded(format!(
                "{} undelivered envelopes are already waiting",
                self.max_pending
            )));
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        self.envelopes.push(SignalEnvelope {
            seq,
            session_id: session.session_id,
            from_user_id,
            to_user_id,
            kind,
            payload,
            created_at: now,
            delivered: false,
        });

        Ok(SendReceipt::Queued { seq, to_user_id })
    }

    /// Returns every undelivered envelope addressed to `user_id` and marks them delivered.
    pub fn drain(&mut self, session: &Session, user_id: Uuid) -> Result<Vec<SignalEnvelope>> {
        session.ensure_participant(user_id)?;

        let drained = self
            .envelopes
            .iter_mut()
            .filter(|envelope| envelope.to_user_id == user_id && !envelope.delivered)
            .map(|envelope| {
                envelope.delivered = true;
                envelope.clone()
            })
            .collect();

        Ok(drained)
    }

    /// Drops delivered envelopes and anything created before `stale_before`.
    pub fn purge(&mut self, stale_before: DateTime<Utc>) -> usize {
        let before = self.envelopes.len();
        self.envelopes
            .retain(|envelope| !envelope.delivered && envelope.created_at >= stale_before);
        before - self.envelopes.len()
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.envelopes.len();
        self.envelopes.clear();
        dropped
    }

    fn pending_for(&self, user_id: Uuid) -> usize {
        self.envelopes
            .iter()
            .filter(|envelope| envelope.to_user_id == user_id && !envelope.delivered)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatePolicy;
    use crate::models::session::Outcome;
    use crate::models::ticket::{MatchProfile, Mood, Preferences, WaitingTicket};
    use chrono::Duration;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn session() -> Session {
        let ticket = || {
            WaitingTicket::new(
                Uuid::new_v4(),
                Mood::Fun,
                600,
                Preferences::default(),
                MatchProfile::default(),
                start(),
            )
        };
        let mut session = Session::pair(&ticket(), &ticket(), 0, start());
        session.activate(start()).unwrap();
        session
    }

    fn mailbox() -> Mailbox {
        Mailbox::new(DatePolicy::default().max_pending_envelopes)
    }

    fn sdp(label: &str) -> sonic_rs::Value {
        sonic_rs::json!({ "sdp": label })
    }

    #[test]
    fn recipient_is_resolved_from_the_session() {
        let session = session();
        let mut mailbox = mailbox();

        let receipt = mailbox
            .send(&session, session.participant_a, SignalKind::Offer, sdp("o"), start())
            .unwrap();

        assert_eq!(
            receipt,
            SendReceipt::Queued { seq: 1, to_user_id: session.participant_b }
        );
        assert_eq!(mailbox.pending_for(session.participant_b), 1);
        assert_eq!(mailbox.pending_for(session.participant_a), 0);
    }

    #[test]
    fn drain_preserves_order_and_never_redelivers() {
        let session = session();
        let (a, b) = (session.participant_a, session.participant_b);
        let mut mailbox = mailbox();

        mailbox.send(&session, a, SignalKind::Offer, sdp("1"), start()).unwrap();
        mailbox.send(&session, b, SignalKind::Answer, sdp("x"), start()).unwrap();
        mailbox.send(&session, a, SignalKind::IceCandidate, sdp("2"), start()).unwrap();
        mailbox.send(&session, a, SignalKind::IceCandidate, sdp("3"), start()).unwrap();

        let for_b = mailbox.drain(&session, b).unwrap();
        let kinds: Vec<_> = for_b.iter().map(|envelope| envelope.kind).collect();
        assert_eq!(
            kinds,
            vec![SignalKind::Offer, SignalKind::IceCandidate, SignalKind::IceCandidate]
        );
        assert!(for_b.iter().all(|envelope| envelope.to_user_id == b));
        assert!(for_b.windows(2).all(|pair| pair[0].seq < pair[1].seq));

        assert!(mailbox.drain(&session, b).unwrap().is_empty());

        let for_a = mailbox.drain(&session, a).unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].kind, SignalKind::Answer);
    }

    #[test]
    fn outsiders_cannot_send_or_drain() {
        let session = session();
        let mut mailbox = mailbox();
        let outsider = Uuid::new_v4();

        assert!(mailbox.send(&session, outsider, SignalKind::Offer, sdp("o"), start()).is_err());
        assert!(mailbox.drain(&session, outsider).is_err());
    }

    #[test]
    fn sends_after_conclusion_are_inert() {
        let mut session = session();
        session.force_conclude(Outcome::GracefulEnd, start(), &DatePolicy::default());
        let mut mailbox = mailbox();

        let receipt = mailbox
            .send(&session, session.participant_a, SignalKind::IceCandidate, sdp("late"), start())
            .unwrap();

        assert_eq!(receipt, SendReceipt::Inert);
        assert!(mailbox.envelopes.is_empty());
    }

    #[test]
    fn purge_drops_delivered_and_stale_envelopes() {
        let session = session();
        let (a, b) = (session.participant_a, session.participant_b);
        let mut mailbox = mailbox();

        mailbox.send(&session, a, SignalKind::Offer, sdp("old"), start()).unwrap();
        mailbox.drain(&session, b).unwrap();
        mailbox
            .send(&session, b, SignalKind::Answer, sdp("stale"), start())
            .unwrap();
        mailbox
            .send(&session, a, SignalKind::IceCandidate, sdp("fresh"), start() + Duration::seconds(60))
            .unwrap();

        let purged = mailbox.purge(start() + Duration::seconds(30));
        assert_eq!(purged, 2);
        assert_eq!(mailbox.envelopes.len(), 1);
        assert_eq!(mailbox.pending_for(b), 1);
    }

    #[test]
    fn undrained_envelopes_are_capped_per_recipient() {
        let session = session();
        let (a, b) = (session.participant_a, session.participant_b);
        let mut mailbox = Mailbox::new(2);

        mailbox.send(&session, a, SignalKind::IceCandidate, sdp("1"), start()).unwrap();
        mailbox.send(&session, a, SignalKind::IceCandidate, sdp("2"), start()).unwrap();
        assert!(matches!(
            mailbox.send(&session, a, SignalKind::IceCandidate, sdp("3"), start()),
            Err(AppError::RateLimitExceeded(_))
        ));

        // the other direction has its own budget
        mailbox.send(&session, b, SignalKind::Answer, sdp("x"), start()).unwrap();

        // draining frees the budget again
        assert_eq!(mailbox.drain(&session, b).unwrap().len(), 2);
        mailbox.send(&session, a, SignalKind::IceCandidate, sdp("3"), start()).unwrap();
    }
}
