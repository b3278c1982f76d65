use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::blind_date::BlindDateService;

/// Every time-based transition the service performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadlineKey {
    /// A waiting ticket's queue lifetime ran out.
    TicketExpiry(Uuid),
    /// A session's countdown reached `expires_at`.
    ActiveExpiry(Uuid),
    /// A decision round's deadline passed.
    DecisionTimeout(Uuid),
    /// Periodic envelope garbage collection for a session.
    EnvelopePurge(Uuid),
    /// A concluded session can be evicted from memory.
    Archive(Uuid),
}

#[derive(Debug)]
struct Entry {
    at: DateTime<Utc>,
    seq: u64,
    key: DeadlineKey,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered deadline heap.
///
/// Re-arming a key pushes a fresh entry and retires the old one; retired
/// entries are skipped when they surface, never edited in place.
#[derive(Debug, Default)]
pub struct Scheduler {
    heap: BinaryHeap<Reverse<Entry>>,
    armed: HashMap<DeadlineKey, (u64, DateTime<Utc>)>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` to fire at `at`, replacing any earlier arming of the same key.
    pub fn schedule(&mut self, key: DeadlineKey, at: DateTime<Utc>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.armed.insert(key, (seq, at));
        self.heap.push(Reverse(Entry { at, seq, key }));
        self.compact();
    }

    pub fn cancel(&mut self, key: DeadlineKey) -> bool {
        self.armed.remove(&key).is_some()
    }

    /// Removes and returns every armed key due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<DeadlineKey> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.at > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            if self.armed.get(&entry.key).map(|(seq, _)| *seq) == Some(entry.seq) {
                self.armed.remove(&entry.key);
                due.push(entry.key);
            }
        }
        due
    }

    /// Number of keys currently armed.
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.armed.len() + 64 {
            return;
        }
        let armed = &self.armed;
        self.heap
            .retain(|Reverse(entry)| armed.get(&entry.key).map(|(seq, _)| *seq) == Some(entry.seq));
    }
}

/// Sweeps due deadlines on a fixed tick until `shutdown` fires.
pub async fn drive(service: BlindDateService, tick: StdDuration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("🛑 Deadline driver stopping");
                break;
            }
            _ = interval.tick() => {
                let fired = service.run_due().await;
                if fired > 0 {
                    tracing::debug!("⏰ Processed {} deadlines", fired);
                }
            }
        }
    }
}
