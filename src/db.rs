use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres::config::Host;
use crate::error::{AppError, Result};
use std::time::Duration;

/// Creates a new database connection pool.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
///
/// # Returns
///
/// A `Result` containing the `Pool`.
pub fn create_pool(database_url: &str) -> Result<Pool> {
    let mut cfg = Config::new();
    let pg_config: tokio_postgres::Config = database_url.parse()?;

    if let Some(Host::Tcp(hostname)) = pg_config.get_hosts().first() {
        cfg.host = Some(hostname.clone());
    }

    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }

    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }

    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size: 32,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(AppError::from)
}

const SCHEMA: &str = r#"
DO $$ BEGIN
    CREATE TYPE blind_date_state AS ENUM ('matching', 'active', 'deciding', 'concluded');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE reveal_choice AS ENUM ('reveal', 'extend', 'end');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE date_outcome AS ENUM ('mutual_reveal', 'extended', 'graceful_end', 'timed_out_end');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS blind_date_sessions (
    session_id        UUID PRIMARY KEY,
    participant_a     UUID NOT NULL,
    participant_b     UUID NOT NULL,
    mood              TEXT NOT NULL,
    duration_seconds  INTEGER NOT NULL CHECK (duration_seconds > 0),
    state             blind_date_state NOT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    active_started_at TIMESTAMPTZ NOT NULL,
    expires_at        TIMESTAMPTZ NOT NULL,
    extension_count   INTEGER NOT NULL DEFAULT 0 CHECK (extension_count >= 0),
    round             INTEGER NOT NULL DEFAULT 0 CHECK (round >= 0),
    decision_deadline TIMESTAMPTZ,
    a_choice          reveal_choice,
    a_submitted_at    TIMESTAMPTZ,
    b_choice          reveal_choice,
    b_submitted_at    TIMESTAMPTZ,
    outcome           date_outcome,
    concluded_at      TIMESTAMPTZ,
    icebreaker_seed   BIGINT NOT NULL,
    revision          BIGINT NOT NULL DEFAULT 0,
    updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (participant_a <> participant_b),
    CHECK (expires_at >= active_started_at)
);

CREATE INDEX IF NOT EXISTS idx_blind_date_sessions_live
    ON blind_date_sessions (state)
    WHERE state IN ('active', 'deciding');

CREATE INDEX IF NOT EXISTS idx_blind_date_sessions_participant_a ON blind_date_sessions (participant_a);
CREATE INDEX IF NOT EXISTS idx_blind_date_sessions_participant_b ON blind_date_sessions (participant_b);

CREATE TABLE IF NOT EXISTS blind_date_decisions (
    session_id   UUID NOT NULL REFERENCES blind_date_sessions (session_id) ON DELETE CASCADE,
    round        INTEGER NOT NULL,
    user_id      UUID NOT NULL,
    choice       reveal_choice,
    submitted_at TIMESTAMPTZ,
    outcome      date_outcome NOT NULL,
    resolved_at  TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (session_id, round, user_id)
);
"#;

/// Creates the blind-date types, tables and indexes if they are missing.
pub async fn ensure_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    tracing::info!("✅ Blind date schema ready");
    Ok(())
}
