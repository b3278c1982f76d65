use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{DecisionChoice, Outcome, Resolution, RevealDecision, Session, SessionState},
    models::ticket::Mood,
};

/// Durable storage for session records and resolved decision rounds.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or replaces the session's current record.
    async fn save_session(&self, session: &Session) -> Result<()>;

    /// Appends the terminal decisions of a resolved round.
    async fn record_round(&self, resolution: &Resolution) -> Result<()>;

    /// Sessions that were ACTIVE or DECIDING when the process stopped.
    async fn load_live_sessions(&self) -> Result<Vec<Session>>;
}

/// Postgres-backed `SessionStore`.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

const UPSERT_SESSION: &str = r#"
    INSERT INTO blind_date_sessions (
        session_id, participant_a, participant_b, mood, duration_seconds, state,
        created_at, active_started_at, expires_at, extension_count, round,
        decision_deadline, a_choice, a_submitted_at, b_choice, b_submitted_at,
        outcome, concluded_at, icebreaker_seed, revision, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, NOW())
    ON CONFLICT (session_id) DO UPDATE SET
        state = EXCLUDED.state,
        active_started_at = EXCLUDED.active_started_at,
        expires_at = EXCLUDED.expires_at,
        extension_count = EXCLUDED.extension_count,
        round = EXCLUDED.round,
        decision_deadline = EXCLUDED.decision_deadline,
        a_choice = EXCLUDED.a_choice,
        a_submitted_at = EXCLUDED.a_submitted_at,
        b_choice = EXCLUDED.b_choice,
        b_submitted_at = EXCLUDED.b_submitted_at,
        outcome = EXCLUDED.outcome,
        concluded_at = EXCLUDED.concluded_at,
        revision = EXCLUDED.revision,
        updated_at = NOW()
    WHERE blind_date_sessions.revision < EXCLUDED.revision
"#;

const INSERT_DECISION: &str = r#"
    INSERT INTO blind_date_decisions (session_id, round, user_id, choice, submitted_at, outcome, resolved_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (session_id, round, user_id) DO NOTHING
"#;

const SELECT_LIVE: &str = r#"
    SELECT *
    FROM blind_date_sessions
    WHERE state IN ('active', 'deciding')
    ORDER BY created_at ASC
"#;

fn column<'a, T>(row: &'a Row, name: &str) -> Result<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name)
        .map_err(|_| AppError::MissingData(name.to_string()))
}

fn decision_from_columns(
    user_id: Uuid,
    choice: Option<DecisionChoice>,
    submitted_at: Option<DateTime<Utc>>,
) -> Option<RevealDecision> {
    match (choice, submitted_at) {
        (Some(choice), Some(submitted_at)) => Some(RevealDecision {
            user_id,
            choice,
            submitted_at,
        }),
        _ => None,
    }
}

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    let participant_a: Uuid = column(row, "participant_a")?;
    let participant_b: Uuid = column(row, "participant_b")?;
    let mood_raw: String = column(row, "mood")?;
    let mood: Mood = mood_raw
        .parse()
        .map_err(|_| AppError::MissingData(format!("mood '{}'", mood_raw)))?;
    let duration_seconds: i32 = column(row, "duration_seconds")?;
    let extension_count: i32 = column(row, "extension_count")?;
    let round: i32 = column(row, "round")?;
    let icebreaker_seed: i64 = column(row, "icebreaker_seed")?;
    let revision: i64 = column(row, "revision")?;

    let decision_a = decision_from_columns(
        participant_a,
        column(row, "a_choice")?,
        column(row, "a_submitted_at")?,
    );
    let decision_b = decision_from_columns(
        participant_b,
        column(row, "b_choice")?,
        column(row, "b_submitted_at")?,
    );

    let mut decisions = BTreeMap::new();
    decisions.insert(participant_b, decision_b);
    decisions.insert(participant_a, decision_a);

    Ok(Session {
        session_id: column(row, "session_id")?,
        participant_a,
        participant_b,
        mood,
        duration_seconds: u32::try_from(duration_seconds)
            .map_err(|_| AppError::MissingData("duration_seconds".to_string()))?,
        state: column(row, "state")?,
        created_at: column(row, "created_at")?,
        active_started_at: column(row, "active_started_at")?,
        expires_at: column(row, "expires_at")?,
        extension_count: u32::try_from(extension_count)
            .map_err(|_| AppError::MissingData("extension_count".to_string()))?,
        round: u32::try_from(round).map_err(|_| AppError::MissingData("round".to_string()))?,
        decision_deadline: column(row, "decision_deadline")?,
        decisions,
        outcome: column(row, "outcome")?,
        concluded_at: column(row, "concluded_at")?,
        icebreaker_seed: icebreaker_seed as u64,
        revision: u64::try_from(revision).map_err(|_| AppError::MissingData("revision".to_string()))?,
    })
}

fn to_i32(value: u32, name: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| AppError::Internal(format!("{} out of range", name)))
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(UPSERT_SESSION).await?;

        let decision = |user: Uuid| session.decisions.get(&user).copied().flatten();
        let decision_a = decision(session.participant_a);
        let decision_b = decision(session.participant_b);
        let a_choice = decision_a.map(|d| d.choice);
        let a_submitted_at = decision_a.map(|d| d.submitted_at);
        let b_choice = decision_b.map(|d| d.choice);
        let b_submitted_at = decision_b.map(|d| d.submitted_at);

        let mood = session.mood.as_str();
        let duration_seconds = to_i32(session.duration_seconds, "duration_seconds")?;
        let extension_count = to_i32(session.extension_count, "extension_count")?;
        let round = to_i32(session.round, "round")?;
        let icebreaker_seed = session.icebreaker_seed as i64;
        let revision = i64::try_from(session.revision)
            .map_err(|_| AppError::Internal("revision out of range".to_string()))?;

        client
            .execute(
                &statement,
                &[
                    &session.session_id,
                    &session.participant_a,
                    &session.participant_b,
                    &mood,
                    &duration_seconds,
                    &session.state,
                    &session.created_at,
                    &session.active_started_at,
                    &session.expires_at,
                    &extension_count,
                    &round,
                    &session.decision_deadline,
                    &a_choice,
                    &a_submitted_at,
                    &b_choice,
                    &b_submitted_at,
                    &session.outcome,
                    &session.concluded_at,
                    &icebreaker_seed,
                    &revision,
                ],
            )
            .await?;

        tracing::debug!("💾 Session {} saved ({:?})", session.session_id, session.state);
        Ok(())
    }

    async fn record_round(&self, resolution: &Resolution) -> Result<()> {
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;
        let statement = transaction.prepare_cached(INSERT_DECISION).await?;
        let round = to_i32(resolution.round, "round")?;

        for (user_id, decision) in &resolution.decisions {
            let choice = decision.map(|d| d.choice);
            let submitted_at = decision.map(|d| d.submitted_at);
            transaction
                .execute(
                    &statement,
                    &[
                        &resolution.session_id,
                        &round,
                        user_id,
                        &choice,
                        &submitted_at,
                        &resolution.outcome,
                        &resolution.resolved_at,
                    ],
                )
                .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn load_live_sessions(&self) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        let rows = client.query(SELECT_LIVE, &[]).await?;
        rows.iter().map(row_to_session).collect()
    }
}

/// Keeps only the latest state of each session, in process memory.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: tokio::sync::RwLock<BTreeMap<Uuid, Session>>,
    rounds: tokio::sync::RwLock<Vec<Resolution>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session(&self, session_id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn rounds(&self) -> Vec<Resolution> {
        self.rounds.read().await.clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let newer = sessions
            .get(&session.session_id)
            .is_none_or(|stored| stored.revision < session.revision);
        if newer {
            sessions.insert(session.session_id, session.clone());
        }
        Ok(())
    }

    async fn record_round(&self, resolution: &Resolution) -> Result<()> {
        self.rounds.write().await.push(resolution.clone());
        Ok(())
    }

    async fn load_live_sessions(&self) -> Result<Vec<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| matches!(session.state, SessionState::Active | SessionState::Deciding))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::{MatchProfile, Preferences, WaitingTicket};

    fn session() -> Session {
        let now = Utc::now();
        let ticket = || {
            WaitingTicket::new(Uuid::new_v4(), Mood::Chill, 600, Preferences::default(), MatchProfile::default(), now)
        };
        let mut session = Session::pair(&ticket(), &ticket(), 11, now);
        session.activate(now).unwrap();
        session
    }

    #[tokio::test]
    async fn memory_store_only_reloads_live_sessions() {
        let store = MemorySessionStore::new();
        let live = session();
        let mut done = session();
        done.force_conclude(Outcome::GracefulEnd, Utc::now(), &Default::default());
        done.revision = 1;

        store.save_session(&live).await.unwrap();
        store.save_session(&done).await.unwrap();

        let loaded = store.load_live_sessions().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].session_id, live.session_id);
        assert_eq!(store.session(done.session_id).await.unwrap().state, SessionState::Concluded);
    }

    #[tokio::test]
    async fn memory_store_ignores_older_revisions() {
        let store = MemorySessionStore::new();
        let mut newer = session();
        newer.revision = 3;
        let mut older = newer.clone();
        older.revision = 2;
        older.extension_count = 1;

        store.save_session(&newer).await.unwrap();
        store.save_session(&older).await.unwrap();

        assert_eq!(store.session(newer.session_id).await.unwrap().extension_count, 0);
    }

    #[test]
    fn decision_columns_need_both_choice_and_time() {
        let user = Uuid::new_v4();
        assert!(decision_from_columns(user, Some(DecisionChoice::End), None).is_none());
        let decision = decision_from_columns(user, Some(DecisionChoice::End), Some(Utc::now())).unwrap();
        assert_eq!(decision.user_id, user);
    }
}
