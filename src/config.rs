use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;

/// Timing and limits governing the lifecycle of a blind date.
#[derive(Clone, Debug)]
pub struct DatePolicy {
    /// How long a waiting ticket stays in the queue.
    pub ticket_ttl: Duration,
    /// How long a decision round waits for the second submission.
    pub decision_timeout: Duration,
    /// How much an EXTENDED outcome adds to the session's expiry.
    pub extension_increment: Duration,
    /// Hard cap on EXTENDED outcomes per session.
    pub max_extensions: u32,
    /// Active time required before a participant may open the decision round early.
    pub min_reveal_after: Duration,
    /// Grace period applied to envelope lifetime and post-conclusion purge.
    pub envelope_grace: Duration,
    /// How long a concluded session stays observable in memory.
    pub archive_after: Duration,
    /// Shortest date a user may ask for, in seconds.
    pub min_duration_seconds: u32,
    /// Longest date a user may ask for, in seconds.
    pub max_duration_seconds: u32,
    /// Largest accepted signaling payload once serialized.
    pub max_signal_payload_bytes: usize,
    /// Undelivered envelopes one participant may have waiting before sends to them are refused.
    pub max_pending_envelopes: usize,
}

impl Default for DatePolicy {
    fn default() -> Self {
        Self {
            ticket_ttl: Duration::seconds(120),
            decision_timeout: Duration::seconds(20),
            extension_increment: Duration::minutes(5),
            max_extensions: 2,
            min_reveal_after: Duration::minutes(3),
            envelope_grace: Duration::seconds(30),
            archive_after: Duration::seconds(120),
            min_duration_seconds: 5 * 60,
            max_duration_seconds: 20 * 60,
            max_signal_payload_bytes: 16 * 1024,
            max_pending_envelopes: 256,
        }
    }
}

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database; `None` keeps sessions in memory.
    pub database_url: Option<String>,
    /// The URL of the Redis server; `None` disables rate limiting and durable notifications.
    pub redis_url: Option<String>,
    /// Upper bound on requests serviced concurrently.
    pub max_concurrent_requests: usize,
    /// Interval between scheduler sweeps, in milliseconds.
    pub scheduler_tick_ms: u64,
    /// Join attempts allowed per user per minute.
    pub join_rate_limit_per_minute: u32,
    /// Origins allowed by the CORS layer.
    pub cors_allowed_origins: Vec<String>,
    /// Blind date timings.
    pub policy: DatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            redis_url: None,
            max_concurrent_requests: 512,
            scheduler_tick_ms: 250,
            join_rate_limit_per_minute: 20,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            policy: DatePolicy::default(),
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}

fn seconds_or(key: &str, default: Duration) -> Result<Duration> {
    let secs: i64 = parse_or(key, default.num_seconds())?;
    if secs < 0 {
        anyhow::bail!("{} must not be negative", key);
    }
    Ok(Duration::seconds(secs))
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let policy_defaults = DatePolicy::default();

        let policy = DatePolicy {
            ticket_ttl: seconds_or("TICKET_TTL_SECS", policy_defaults.ticket_ttl)?,
            decision_timeout: seconds_or("DECISION_TIMEOUT_SECS", policy_defaults.decision_timeout)?,
            extension_increment: seconds_or("EXTENSION_SECS", policy_defaults.extension_increment)?,
            max_extensions: parse_or("MAX_EXTENSIONS", policy_defaults.max_extensions)?,
            min_reveal_after: seconds_or("MIN_REVEAL_AFTER_SECS", policy_defaults.min_reveal_after)?,
            envelope_grace: seconds_or("ENVELOPE_GRACE_SECS", policy_defaults.envelope_grace)?,
            archive_after: seconds_or("ARCHIVE_AFTER_SECS", policy_defaults.archive_after)?,
            min_duration_seconds: parse_or("MIN_DURATION_SECS", policy_defaults.min_duration_seconds)?,
            max_duration_seconds: parse_or("MAX_DURATION_SECS", policy_defaults.max_duration_seconds)?,
            max_signal_payload_bytes: parse_or(
                "MAX_SIGNAL_PAYLOAD_BYTES",
                policy_defaults.max_signal_payload_bytes,
            )?,
            max_pending_envelopes: parse_or(
                "MAX_PENDING_ENVELOPES",
                policy_defaults.max_pending_envelopes,
            )?,
        };

        if policy.min_duration_seconds == 0 || policy.min_duration_seconds > policy.max_duration_seconds {
            anyhow::bail!("MIN_DURATION_SECS must be positive and not exceed MAX_DURATION_SECS");
        }

        let cors_allowed_origins = match env::var("CORS_ALLOWED_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => defaults.cors_allowed_origins,
        };

        Ok(Self {
            bind_addr: parse_or("BIND_ADDR", defaults.bind_addr)?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            max_concurrent_requests: parse_or("MAX_CONCURRENT_REQUESTS", defaults.max_concurrent_requests)?,
            scheduler_tick_ms: parse_or("SCHEDULER_TICK_MS", defaults.scheduler_tick_ms)?,
            join_rate_limit_per_minute: parse_or(
                "JOIN_RATE_LIMIT_PER_MINUTE",
                defaults.join_rate_limit_per_minute,
            )?,
            cors_allowed_origins,
            policy,
        })
    }
}
