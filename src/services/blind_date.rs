//! The coordinating blind-date service.
//!
//! Lock order is lobby, then the session table, then a single session slot,
//! then the scheduler. Store and notification I/O only ever happen after every
//! lock has been released.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::DatePolicy,
    error::{AppError, Result},
    models::profile::AnonymousProfile,
    models::session::{
        DecisionChoice, MutualReveal, Outcome, Resolution, RevealDecision, Session, SessionState,
    },
    models::signal::{SignalEnvelope, SignalKind},
    models::ticket::{Mood, Preferences, WaitingTicket},
    models::view::{DecisionStatus, MatchStatus, SessionView},
    repositories::session::SessionStore,
    services::consensus::SubmitResult,
    services::directory::UserDirectory,
    services::icebreaker,
    services::match_queue::{MatchQueue, Pairing},
    services::notify::NotificationDispatch,
    services::relay::{Mailbox, SendReceipt},
    services::scheduler::{DeadlineKey, Scheduler},
};

/// A live session together with its signaling mailbox.
#[derive(Debug)]
pub struct SessionSlot {
    pub session: Session,
    pub mailbox: Mailbox,
}

/// What a user asks for when joining the queue.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub mood: Mood,
    pub duration_seconds: u32,
    pub preferences: Preferences,
}

/// Point-in-time counters for the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServiceStats {
    pub waiting_tickets: usize,
    pub sessions: usize,
    pub armed_deadlines: usize,
}

/// Context handed to an operation while it holds a session's lock.
struct Step<'a> {
    now: DateTime<Utc>,
    policy: &'a DatePolicy,
    resolved: Vec<Resolution>,
}

impl Step<'_> {
    fn record(&mut self, resolution: Resolution) {
        self.resolved.push(resolution);
    }
}

/// The parts of a session whose change must be persisted.
#[derive(PartialEq)]
struct Fingerprint {
    state: SessionState,
    round: u32,
    extension_count: u32,
    expires_at: DateTime<Utc>,
    decision_deadline: Option<DateTime<Utc>>,
    decisions: BTreeMap<Uuid, Option<RevealDecision>>,
}

impl Fingerprint {
    fn of(session: &Session) -> Self {
        Self {
            state: session.state,
            round: session.round,
            extension_count: session.extension_count,
            expires_at: session.expires_at,
            decision_deadline: session.decision_deadline,
            decisions: session.decisions.clone(),
        }
    }
}

/// Side effects collected under the lock and applied after it is released.
struct Settlement {
    session_id: Uuid,
    participants: [Uuid; 2],
    saved: Option<Session>,
    resolutions: Vec<Resolution>,
    concluded: bool,
}

struct Inner {
    policy: DatePolicy,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn NotificationDispatch>,
    lobby: Mutex<MatchQueue>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionSlot>>>>,
    scheduler: Mutex<Scheduler>,
}

/// Matchmaking, signaling, and decision rounds for anonymous voice dates.
#[derive(Clone)]
pub struct BlindDateService {
    inner: Arc<Inner>,
}

impl BlindDateService {
    pub fn new(
        policy: DatePolicy,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationDispatch>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                clock,
                store,
                directory,
                notifier,
                lobby: Mutex::new(MatchQueue::new()),
                sessions: RwLock::new(HashMap::new()),
                scheduler: Mutex::new(Scheduler::new()),
            }),
        }
    }

    pub fn policy(&self) -> &DatePolicy {
        &self.inner.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Pairs the caller with the oldest compatible waiting user, or queues them.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The joining user.
    /// * `request` - Mood, duration in seconds and matching preferences.
    ///
    /// # Returns
    ///
    /// A `Result<MatchStatus>` holding either the new session or the waiting ticket.
    pub async fn join(&self, user_id: Uuid, request: JoinRequest) -> Result<MatchStatus> {
        let policy = &self.inner.policy;
        if request.duration_seconds < policy.min_duration_seconds
            || request.duration_seconds > policy.max_duration_seconds
        {
            return Err(AppError::Validation(format!(
                "Duration must be between {} and {} seconds",
                policy.min_duration_seconds, policy.max_duration_seconds
            )));
        }

        let profile = self.inner.directory.match_profile(user_id).await?;
        let now = self.inner.clock.now();
        let ticket = WaitingTicket::new(
            user_id,
            request.mood,
            request.duration_seconds,
            request.preferences,
            profile,
            now,
        );

        let session = {
            let mut lobby = self.inner.lobby.lock().await;
            self.sweep_tickets(&mut lobby, now).await;
            match lobby.join(ticket, policy.ticket_ttl)? {
                Pairing::Queued(ticket) => {
                    let expires_at = ticket.enqueued_at + policy.ticket_ttl;
                    self.inner
                        .scheduler
                        .lock()
                        .await
                        .schedule(DeadlineKey::TicketExpiry(ticket.ticket_id), expires_at);
                    tracing::debug!("🎟️ User {} queued with ticket {}", user_id, ticket.ticket_id);
                    return Ok(MatchStatus::waiting(ticket.ticket_id, ticket.enqueued_at, expires_at));
                }
                Pairing::Matched { waiting, joining } => {
                    let mut session = Session::pair(&waiting, &joining, rand::random::<u64>(), now);
                    session.activate(now)?;
                    session.revision = 1;
                    lobby.engage(&session);

                    self.inner.sessions.write().await.insert(
                        session.session_id,
                        Arc::new(Mutex::new(SessionSlot {
                            session: session.clone(),
                            mailbox: Mailbox::new(policy.max_pending_envelopes),
                        })),
                    );

                    let mut scheduler = self.inner.scheduler.lock().await;
                    scheduler.cancel(DeadlineKey::TicketExpiry(waiting.ticket_id));
                    scheduler.schedule(DeadlineKey::ActiveExpiry(session.session_id), session.expires_at);
                    scheduler.schedule(
                        DeadlineKey::EnvelopePurge(session.session_id),
                        now + policy.envelope_grace,
                    );
                    session
                }
            }
        };

        tracing::info!(
            "💞 Session {} paired {} and {} ({}, {}s)",
            session.session_id,
            session.participant_a,
            session.participant_b,
            session.mood,
            session.duration_seconds
        );

        if let Err(e) = self.inner.store.save_session(&session).await {
            tracing::error!("❌ Failed to persist new session {}: {}", session.session_id, e);
        }

        Ok(MatchStatus::matched(self.view(&session, user_id, now).await))
    }

    /// The caller's waiting ticket, or the session they are (or were recently) in.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The polling user.
    ///
    /// # Returns
    ///
    /// A `Result<MatchStatus>`, or `NotFound` when the user neither waits nor dates.
    pub async fn poll_status(&self, user_id: Uuid) -> Result<MatchStatus> {
        let engagement = {
            let mut lobby = self.inner.lobby.lock().await;
            self.sweep_tickets(&mut lobby, self.inner.clock.now()).await;
            if let Some(ticket) = lobby.ticket_for(user_id) {
                return Ok(MatchStatus::waiting(
                    ticket.ticket_id,
                    ticket.enqueued_at,
                    ticket.enqueued_at + self.inner.policy.ticket_ttl,
                ));
            }
            lobby.engagement(user_id)
        };

        let engagement = engagement
            .ok_or_else(|| AppError::NotFound("No waiting ticket or session for this user".to_string()))?;

        let view = self.session_view(engagement.session_id, user_id).await?;
        Ok(MatchStatus::matched(view))
    }

    /// Withdraws the caller's waiting ticket. `false` when there was none.
    pub async fn cancel(&self, user_id: Uuid) -> Result<bool> {
        let mut lobby = self.inner.lobby.lock().await;
        self.sweep_tickets(&mut lobby, self.inner.clock.now()).await;
        match lobby.cancel(user_id) {
            Some(ticket) => {
                self.inner
                    .scheduler
                    .lock()
                    .await
                    .cancel(DeadlineKey::TicketExpiry(ticket.ticket_id));
                tracing::debug!("🚪 User {} left the queue", user_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Relays a negotiation payload to the sender's counterpart.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The session the payload belongs to.
    /// * `from_user_id` - The sending participant.
    /// * `kind` - Offer, answer or ICE candidate.
    /// * `payload` - The already size-checked payload.
    ///
    /// # Returns
    ///
    /// A `Result<SendReceipt>`; sends into a concluded session are accepted but inert.
    pub async fn send_signal(
        &self,
        session_id: Uuid,
        from_user_id: Uuid,
        kind: SignalKind,
        payload: sonic_rs::Value,
    ) -> Result<SendReceipt> {
        let (receipt, _) = self
            .with_session(session_id, false, move |slot, step| {
                slot.mailbox.send(&slot.session, from_user_id, kind, payload, step.now)
            })
            .await?;

        if receipt == SendReceipt::Inert {
            tracing::debug!("📭 Dropped {} for concluded session {}", kind, session_id);
        }
        Ok(receipt)
    }

    /// Every undelivered envelope addressed to the caller, oldest first.
    pub async fn drain_signals(&self, session_id: Uuid, user_id: Uuid) -> Result<Vec<SignalEnvelope>> {
        let (envelopes, _) = self
            .with_session(session_id, false, |slot, _| slot.mailbox.drain(&slot.session, user_id))
            .await?;
        Ok(envelopes)
    }

    /// Records the caller's choice for the open decision round.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The session being decided.
    /// * `user_id` - The submitting participant.
    /// * `choice` - Reveal, extend or end.
    /// * `round` - The round the client believes is open, if it knows.
    ///
    /// # Returns
    ///
    /// A `Result<DecisionStatus>`, or `StaleRound` when that round already resolved.
    pub async fn submit_decision(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        choice: DecisionChoice,
        round: Option<u32>,
    ) -> Result<DecisionStatus> {
        let (result, session) = self
            .with_session(session_id, false, |slot, step| {
                let result = slot.session.submit(user_id, choice, round, step.now, step.policy)?;
                Ok(Self::absorb(result, step))
            })
            .await?;

        Ok(self.decision_status(result, &session, user_id).await)
    }

    /// Forces the decision round with the caller's choice set to `end`.
    pub async fn end_early(&self, session_id: Uuid, user_id: Uuid) -> Result<DecisionStatus> {
        let (result, session) = self
            .with_session(session_id, false, |slot, step| {
                let result = slot.session.end_early(user_id, step.now, step.policy)?;
                Ok(result.map(|result| Self::absorb(result, step)))
            })
            .await?;

        match result {
            Some(result) => Ok(self.decision_status(result, &session, user_id).await),
            None => {
                tracing::debug!("🔚 End requested on concluded session {}", session_id);
                Ok(DecisionStatus {
                    resolved: true,
                    round: session.round,
                    outcome: session.outcome,
                    session: self.view(&session, user_id, self.inner.clock.now()).await,
                })
            }
        }
    }

    /// Opens the decision round before the countdown runs out.
    pub async fn request_decision(&self, session_id: Uuid, user_id: Uuid) -> Result<SessionView> {
        let (round, session) = self
            .with_session(session_id, false, |slot, step| {
                slot.session.request_decision(user_id, step.now, step.policy)
            })
            .await?;

        tracing::info!("🗳️ User {} opened round {} of session {}", user_id, round, session_id);
        Ok(self.view(&session, user_id, self.inner.clock.now()).await)
    }

    /// The session as the caller should render it.
    pub async fn session_view(&self, session_id: Uuid, user_id: Uuid) -> Result<SessionView> {
        let (_, session) = self
            .with_session(session_id, false, |slot, _| slot.session.ensure_participant(user_id))
            .await?;
        Ok(self.view(&session, user_id, self.inner.clock.now()).await)
    }

    pub async fn stats(&self) -> ServiceStats {
        let waiting_tickets = self.inner.lobby.lock().await.waiting_len();
        let sessions = self.inner.sessions.read().await.len();
        let armed_deadlines = self.inner.scheduler.lock().await.armed_count();
        ServiceStats {
            waiting_tickets,
            sessions,
            armed_deadlines,
        }
    }

    /// Fires every deadline that is due. Returns how many fired.
    pub async fn run_due(&self) -> usize {
        let now = self.inner.clock.now();
        let due = self.inner.scheduler.lock().await.pop_due(now);
        let fired = due.len();

        for key in due {
            match self.fire(key).await {
                Ok(()) => {}
                Err(AppError::SessionNotFound(id)) => {
                    tracing::debug!("Deadline {:?} outlived session {}", key, id);
                }
                Err(e) => tracing::warn!("⚠️ Deadline {:?} failed: {}", key, e),
            }
        }

        fired
    }

    /// Reloads ACTIVE and DECIDING sessions after a restart and re-arms their deadlines.
    ///
    /// # Returns
    ///
    /// A `Result<usize>` containing how many sessions were resumed.
    pub async fn restore(&self) -> Result<usize> {
        let live = self.inner.store.load_live_sessions().await?;
        let now = self.inner.clock.now();
        let policy = &self.inner.policy;
        let mut restored = 0;

        for mut session in live {
            let participants = [session.participant_a, session.participant_b];
            let rejected = {
                let mut lobby = self.inner.lobby.lock().await;
                let double_booked = participants
                    .iter()
                    .any(|user| lobby.engagement(*user).is_some_and(|engagement| engagement.live));

                let problem = match session.check_invariants(policy) {
                    Err(violation) => Some(violation),
                    Ok(()) if double_booked => Some("participant already holds a live session".to_string()),
                    Ok(()) => None,
                };

                match problem {
                    Some(violation) => {
                        tracing::error!(
                            "❌ Session {} cannot be restored ({}); concluding it",
                            session.session_id,
                            violation
                        );
                        session.force_conclude(Outcome::TimedOutEnd, now, policy)
                    }
                    None => {
                        lobby.engage(&session);
                        self.inner.sessions.write().await.insert(
                            session.session_id,
                            Arc::new(Mutex::new(SessionSlot {
                                session: session.clone(),
                                mailbox: Mailbox::new(policy.max_pending_envelopes),
                            })),
                        );
                        self.reconcile(&session, session.state, now).await;
                        self.inner.scheduler.lock().await.schedule(
                            DeadlineKey::EnvelopePurge(session.session_id),
                            now + policy.envelope_grace,
                        );
                        restored += 1;
                        None
                    }
                }
            };

            if let Some(resolution) = rejected {
                session.revision += 1;
                self.settle(Settlement {
                    session_id: session.session_id,
                    participants,
                    saved: Some(session),
                    resolutions: vec![resolution],
                    concluded: false,
                })
                .await;
            }
        }

        if restored > 0 {
            tracing::info!("♻️ Restored {} live sessions", restored);
        }
        Ok(restored)
    }

    /// Drops tickets whose wait ran out, even if their deadline has not fired yet.
    async fn sweep_tickets(&self, lobby: &mut MatchQueue, now: DateTime<Utc>) {
        let expired = lobby.expire_stale(now, self.inner.policy.ticket_ttl);
        if expired.is_empty() {
            return;
        }

        let mut scheduler = self.inner.scheduler.lock().await;
        for ticket in expired {
            scheduler.cancel(DeadlineKey::TicketExpiry(ticket.ticket_id));
            tracing::info!("⌛ Ticket {} of user {} expired unmatched", ticket.ticket_id, ticket.user_id);
        }
    }

    async fn fire(&self, key: DeadlineKey) -> Result<()> {
        match key {
            DeadlineKey::TicketExpiry(ticket_id) => {
                if let Some(ticket) = self.inner.lobby.lock().await.expire(ticket_id) {
                    tracing::info!("⌛ Ticket {} of user {} expired unmatched", ticket_id, ticket.user_id);
                }
            }
            DeadlineKey::ActiveExpiry(session_id) | DeadlineKey::DecisionTimeout(session_id) => {
                self.with_session(session_id, true, |_, _| Ok(())).await?;
            }
            DeadlineKey::EnvelopePurge(session_id) => {
                let (purged, session) = self
                    .with_session(session_id, false, |slot, step| {
                        if slot.session.is_concluded() {
                            return Ok(slot.mailbox.clear());
                        }
                        let stale_before =
                            step.now - (slot.session.lifetime(step.policy) + step.policy.envelope_grace);
                        Ok(slot.mailbox.purge(stale_before))
                    })
                    .await?;

                if purged > 0 {
                    tracing::debug!("🧹 Purged {} envelopes from session {}", purged, session_id);
                }
                if !session.is_concluded() {
                    let next = self.inner.clock.now() + self.inner.policy.envelope_grace;
                    self.inner
                        .scheduler
                        .lock()
                        .await
                        .schedule(DeadlineKey::EnvelopePurge(session_id), next);
                }
            }
            DeadlineKey::Archive(session_id) => self.archive(session_id).await,
        }
        Ok(())
    }

    async fn archive(&self, session_id: Uuid) {
        let mut lobby = self.inner.lobby.lock().await;
        let mut sessions = self.inner.sessions.write().await;

        let Some(slot) = sessions.get(&session_id).cloned() else {
            return;
        };
        let slot = slot.lock().await;
        if !slot.session.is_concluded() {
            tracing::warn!("⚠️ Archive fired for live session {}", session_id);
            return;
        }

        sessions.remove(&session_id);
        lobby.forget(session_id, [slot.session.participant_a, slot.session.participant_b]);
        self.inner
            .scheduler
            .lock()
            .await
            .cancel(DeadlineKey::EnvelopePurge(session_id));
        tracing::info!("📦 Session {} archived", session_id);
    }

    fn absorb(result: SubmitResult, step: &mut Step<'_>) -> SubmitResult {
        if let SubmitResult::Resolved(resolution) = &result {
            step.record(resolution.clone());
        }
        result
    }

    async fn decision_status(&self, result: SubmitResult, session: &Session, user_id: Uuid) -> DecisionStatus {
        let (resolved, round, outcome) = match result {
            SubmitResult::Pending { round } => (false, round, None),
            SubmitResult::Resolved(resolution) => (true, resolution.round, Some(resolution.outcome)),
        };

        DecisionStatus {
            resolved,
            round,
            outcome,
            session: self.view(session, user_id, self.inner.clock.now()).await,
        }
    }

    async fn slot(&self, session_id: Uuid) -> Result<Arc<Mutex<SessionSlot>>> {
        self.inner
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(AppError::SessionNotFound(session_id))
    }

    /// Runs `op` against the session under its lock.
    ///
    /// Overdue deadlines are applied first so every operation sees current
    /// state, whether or not the driver has caught up. Any change is
    /// persisted and the session's deadlines re-armed from its new state.
    async fn with_session<T, F>(&self, session_id: Uuid, rearm: bool, op: F) -> Result<(T, Session)>
    where
        F: FnOnce(&mut SessionSlot, &mut Step<'_>) -> Result<T>,
    {
        let slot = self.slot(session_id).await?;
        let now = self.inner.clock.now();
        let policy = &self.inner.policy;

        let (result, settlement) = {
            let mut slot = slot.lock().await;
            let before = Fingerprint::of(&slot.session);
            let mut step = Step {
                now,
                policy,
                resolved: Vec::new(),
            };

            Self::catch_up(&mut slot.session, &mut step);
            let result = op(&mut *slot, &mut step);

            let after = Fingerprint::of(&slot.session);
            let dirty = after != before;
            if dirty {
                slot.session.revision += 1;
            }
            if dirty || rearm {
                self.reconcile(&slot.session, before.state, now).await;
            }

            let snapshot = slot.session.clone();
            let settlement = Settlement {
                session_id,
                participants: [snapshot.participant_a, snapshot.participant_b],
                saved: dirty.then(|| snapshot.clone()),
                resolutions: step.resolved,
                concluded: before.state != SessionState::Concluded && snapshot.is_concluded(),
            };
            (result.map(|value| (value, snapshot)), settlement)
        };

        self.settle(settlement).await;
        result
    }

    /// Applies invariant repair and overdue deadlines.
    fn catch_up(session: &mut Session, step: &mut Step<'_>) {
        if !session.is_concluded() {
            if let Err(violation) = session.check_invariants(step.policy) {
                tracing::error!(
                    "❌ Session {} violates an invariant ({}); concluding it",
                    session.session_id,
                    violation
                );
                if let Some(resolution) = session.force_conclude(Outcome::TimedOutEnd, step.now, step.policy) {
                    step.record(resolution);
                }
                return;
            }
        }

        if session.expire(step.now, step.policy) {
            tracing::info!("⏳ Session {} reached its end; round {} open", session.session_id, session.round);
        }
        if let Some(resolution) = session.timeout_round(step.now, step.policy) {
            tracing::info!(
                "⏰ Round {} of session {} timed out as {:?}",
                resolution.round,
                session.session_id,
                resolution.outcome
            );
            step.record(resolution);
        }
    }

    /// Re-arms the session's deadlines from its current state.
    async fn reconcile(&self, session: &Session, was: SessionState, now: DateTime<Utc>) {
        let id = session.session_id;
        let mut scheduler = self.inner.scheduler.lock().await;

        match session.state {
            SessionState::Matching | SessionState::Active => {
                scheduler.cancel(DeadlineKey::DecisionTimeout(id));
                scheduler.schedule(DeadlineKey::ActiveExpiry(id), session.expires_at);
            }
            SessionState::Deciding => {
                scheduler.cancel(DeadlineKey::ActiveExpiry(id));
                if let Some(deadline) = session.decision_deadline {
                    scheduler.schedule(DeadlineKey::DecisionTimeout(id), deadline);
                }
            }
            SessionState::Concluded => {
                scheduler.cancel(DeadlineKey::ActiveExpiry(id));
                scheduler.cancel(DeadlineKey::DecisionTimeout(id));
                if was != SessionState::Concluded {
                    scheduler.schedule(DeadlineKey::EnvelopePurge(id), now + self.inner.policy.envelope_grace);
                    scheduler.schedule(DeadlineKey::Archive(id), now + self.inner.policy.archive_after);
                }
            }
        }
    }

    /// Persists, records rounds, frees participants, and notifies.
    async fn settle(&self, settlement: Settlement) {
        let Settlement {
            session_id,
            participants,
            saved,
            resolutions,
            concluded,
        } = settlement;

        if let Some(session) = &saved {
            if let Err(e) = self.inner.store.save_session(session).await {
                tracing::error!("❌ Failed to persist session {}: {}", session_id, e);
            }
        }

        if concluded {
            self.inner.lobby.lock().await.release(session_id, participants);
        }

        for resolution in &resolutions {
            tracing::info!(
                "🏁 Session {} round {} resolved as {:?}",
                session_id,
                resolution.round,
                resolution.outcome
            );

            if let Err(e) = self.inner.store.record_round(resolution).await {
                tracing::error!("❌ Failed to record round {} of session {}: {}", resolution.round, session_id, e);
            }

            if resolution.outcome == Outcome::MutualReveal {
                let event = MutualReveal {
                    session_id,
                    participants,
                    revealed_at: resolution.resolved_at,
                };
                if let Err(e) = self.inner.notifier.mutual_reveal(&event).await {
                    tracing::error!("❌ Failed to dispatch mutual reveal for {}: {}", session_id, e);
                }
            }
        }
    }

    /// Projects `session` for `viewer`. The partner's identity stays hidden
    /// unless the date ended in a mutual reveal.
    async fn view(&self, session: &Session, viewer: Uuid, now: DateTime<Utc>) -> SessionView {
        let partner_id = if viewer == session.participant_a {
            session.participant_b
        } else {
            session.participant_a
        };

        let partner = match self.inner.directory.anonymous_profile(partner_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("⚠️ Partner profile unavailable for session {}: {}", session.session_id, e);
                AnonymousProfile::unknown()
            }
        };

        let choice_of = |user: Uuid| {
            session
                .decisions
                .get(&user)
                .copied()
                .flatten()
                .map(|decision| decision.choice)
        };

        let partner_choice = match (session.state, session.outcome) {
            (SessionState::Concluded, _) => choice_of(partner_id),
            (SessionState::Active, Some(Outcome::Extended)) => Some(DecisionChoice::Extend),
            _ => None,
        };

        SessionView {
            session_id: session.session_id,
            state: session.state,
            mood: session.mood,
            duration_seconds: session.duration_seconds,
            started_at: session.active_started_at,
            expires_at: session.expires_at,
            seconds_remaining: session.seconds_remaining(now),
            extension_count: session.extension_count,
            round: session.round,
            decision_deadline: session.decision_deadline,
            reveal_available: session.reveal_available(now, &self.inner.policy),
            initiator: session.initiator() == viewer,
            partner,
            partner_user_id: (session.outcome == Some(Outcome::MutualReveal)).then_some(partner_id),
            my_choice: choice_of(viewer),
            partner_submitted: choice_of(partner_id).is_some(),
            partner_choice,
            outcome: session.outcome,
            icebreaker: icebreaker::current_prompt(session, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::ticket::Preferences;
    use crate::repositories::session::MemorySessionStore;
    use crate::services::directory::AnonymousDirectory;
    use crate::services::notify::RecordingDispatch;
    use chrono::Duration;

    struct Harness {
        service: BlindDateService,
        clock: Arc<ManualClock>,
        store: Arc<MemorySessionStore>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
        let store = Arc::new(MemorySessionStore::new());
        let service = BlindDateService::new(
            DatePolicy::default(),
            clock.clone(),
            store.clone(),
            Arc::new(AnonymousDirectory::new()),
            Arc::new(RecordingDispatch::new()),
        );
        Harness { service, clock, store }
    }

    fn request(duration_seconds: u32) -> JoinRequest {
        JoinRequest {
            mood: Mood::Chill,
            duration_seconds,
            preferences: Preferences::default(),
        }
    }

    async fn paired(h: &Harness) -> (Uuid, Uuid, Uuid) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        h.service.join(a, request(600)).await.unwrap();
        let status = h.service.join(b, request(600)).await.unwrap();
        (status.session.unwrap().session_id, a, b)
    }

    #[tokio::test]
    async fn out_of_range_durations_are_rejected() {
        let h = harness();
        let err = h.service.join(Uuid::new_v4(), request(60)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn partner_identity_stays_hidden_until_mutual_reveal() {
        let h = harness();
        let (session_id, a, b) = paired(&h).await;

        let view = h.service.session_view(session_id, a).await.unwrap();
        assert_eq!(view.partner_user_id, None);
        assert_eq!(view.partner, AnonymousProfile::unknown());

        h.clock.advance(Duration::seconds(600));
        h.service.submit_decision(session_id, a, DecisionChoice::Reveal, None).await.unwrap();
        h.service.submit_decision(session_id, b, DecisionChoice::Reveal, None).await.unwrap();

        let view = h.service.session_view(session_id, a).await.unwrap();
        assert_eq!(view.partner_user_id, Some(b));
        assert_eq!(view.partner_choice, Some(DecisionChoice::Reveal));
    }

    #[tokio::test]
    async fn partner_choice_is_hidden_while_the_round_is_open() {
        let h = harness();
        let (session_id, a, b) = paired(&h).await;
        h.clock.advance(Duration::seconds(600));

        h.service.submit_decision(session_id, b, DecisionChoice::Extend, None).await.unwrap();
        let view = h.service.session_view(session_id, a).await.unwrap();

        assert!(view.partner_submitted);
        assert_eq!(view.partner_choice, None);
        assert_eq!(view.my_choice, None);
    }

    #[tokio::test]
    async fn every_change_bumps_the_persisted_revision() {
        let h = harness();
        let (session_id, a, _) = paired(&h).await;
        assert_eq!(h.store.session(session_id).await.unwrap().revision, 1);

        h.service.end_early(session_id, a).await.unwrap();
        let stored = h.store.session(session_id).await.unwrap();
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.state, SessionState::Deciding);
    }

    #[tokio::test]
    async fn invariant_violations_conclude_the_session() {
        let h = harness();
        let (session_id, a, _) = paired(&h).await;

        {
            let slot = h.service.slot(session_id).await.unwrap();
            slot.lock().await.session.extension_count = 99;
        }

        let view = h.service.session_view(session_id, a).await.unwrap();
        assert_eq!(view.state, SessionState::Concluded);
        assert_eq!(view.outcome, Some(Outcome::TimedOutEnd));
    }

    #[tokio::test]
    async fn concluded_sessions_are_archived_after_the_grace_period() {
        let h = harness();
        let (session_id, a, b) = paired(&h).await;

        h.service.end_early(session_id, a).await.unwrap();
        h.service.end_early(session_id, b).await.unwrap();
        assert_eq!(h.service.poll_status(a).await.unwrap().session.unwrap().state, SessionState::Concluded);

        h.clock.advance(h.service.policy().archive_after);
        h.service.run_due().await;

        assert_eq!(h.service.stats().await.sessions, 0);
        assert!(matches!(h.service.poll_status(a).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            h.service.session_view(session_id, a).await,
            Err(AppError::SessionNotFound(_))
        ));
    }
}
