use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::Session,
    models::ticket::WaitingTicket,
};

/// Result of offering a ticket to the queue.
#[derive(Debug, Clone)]
pub enum Pairing {
    /// No compatible candidate; the ticket now waits in the queue.
    Queued(WaitingTicket),
    /// Paired with the oldest compatible waiting ticket, which left the queue.
    Matched {
        waiting: WaitingTicket,
        joining: WaitingTicket,
    },
}

/// Where a user currently stands outside the waiting set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engagement {
    pub session_id: Uuid,
    /// `false` once the session concluded but has not been archived yet.
    pub live: bool,
}

/// The waiting set plus the user→session index.
///
/// A single instance lives behind one lock. It is not partitioned by mood so
/// the oldest compatible ticket always wins, whatever its mood.
#[derive(Debug, Default)]
pub struct MatchQueue {
    waiting: VecDeque<WaitingTicket>,
    engaged: HashMap<Uuid, Uuid>,
    concluded: HashMap<Uuid, Uuid>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `ticket` with the oldest compatible waiting ticket, or enqueues it.
    ///
    /// # Arguments
    ///
    /// * `ticket` - The joining ticket, stamped with the current time.
    /// * `ttl` - How long a ticket may wait before it is no longer matchable.
    ///
    /// # Returns
    ///
    /// A `Result<Pairing>`, or `AlreadyQueued` when the user already waits or dates.
    pub fn join(&mut self, ticket: WaitingTicket, ttl: Duration) -> Result<Pairing> {
        self.expire_stale(ticket.enqueued_at, ttl);

        if self.ticket_for(ticket.user_id).is_some() || self.engaged.contains_key(&ticket.user_id) {
            return Err(AppError::AlreadyQueued);
        }

        let candidate = self
            .waiting
            .iter()
            .position(|candidate| candidate.is_compatible_with(&ticket))
            .and_then(|index| self.waiting.remove(index));

        match candidate {
            Some(waiting) => Ok(Pairing::Matched {
                waiting,
                joining: ticket,
            }),
            None => {
                self.waiting.push_back(ticket.clone());
                Ok(Pairing::Queued(ticket))
            }
        }
    }

    pub fn ticket_for(&self, user_id: Uuid) -> Option<&WaitingTicket> {
        self.waiting.iter().find(|ticket| ticket.user_id == user_id)
    }

    /// Withdraws the user's waiting ticket, if any.
    pub fn cancel(&mut self, user_id: Uuid) -> Option<WaitingTicket> {
        let index = self.waiting.iter().position(|ticket| ticket.user_id == user_id)?;
        self.waiting.remove(index)
    }

    /// Removes a ticket whose time ran out. A ticket already paired or cancelled is left alone.
    pub fn expire(&mut self, ticket_id: Uuid) -> Option<WaitingTicket> {
        let index = self.waiting.iter().position(|ticket| ticket.ticket_id == ticket_id)?;
        self.waiting.remove(index)
    }

    /// Removes every ticket that has waited `ttl` or longer by `now`.
    pub fn expire_stale(&mut self, now: DateTime<Utc>, ttl: Duration) -> Vec<WaitingTicket> {
        let (stale, live): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.waiting)
            .into_iter()
            .partition(|ticket| ticket.enqueued_at + ttl <= now);
        self.waiting = live;
        stale.into()
    }

    /// Marks both participants as holding `session`.
    pub fn engage(&mut self, session: &Session) {
        for user in [session.participant_a, session.participant_b] {
            self.engaged.insert(user, session.session_id);
            self.concluded.remove(&user);
        }
    }

    /// Frees both participants to queue again; the session stays visible to
    /// their status polls until it is forgotten.
    pub fn release(&mut self, session_id: Uuid, participants: [Uuid; 2]) {
        for user in participants {
            if self.engaged.get(&user) == Some(&session_id) {
                self.engaged.remove(&user);
            }
            self.concluded.insert(user, session_id);
        }
    }

    /// Drops the post-conclusion link once the session is archived.
    pub fn forget(&mut self, session_id: Uuid, participants: [Uuid; 2]) {
        for user in participants {
            if self.concluded.get(&user) == Some(&session_id) {
                self.concluded.remove(&user);
            }
        }
    }

    pub fn engagement(&self, user_id: Uuid) -> Option<Engagement> {
        if let Some(session_id) = self.engaged.get(&user_id) {
            return Some(Engagement { session_id: *session_id, live: true });
        }
        self.concluded
            .get(&user_id)
            .map(|session_id| Engagement { session_id: *session_id, live: false })
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}
