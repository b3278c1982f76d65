use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::{
    error::{AppError, Result},
    models::session::MutualReveal,
};

/// Redis list the conversation service consumes to open a chat after a reveal.
pub const MUTUAL_REVEAL_QUEUE: &str = "blinddate:mutual_reveals";

/// Outbound notifications produced by date outcomes.
#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    /// Both participants chose to reveal; a durable conversation should be created.
    async fn mutual_reveal(&self, event: &MutualReveal) -> Result<()>;
}

/// Pushes events onto a durable Redis list.
#[derive(Clone)]
pub struct RedisNotificationDispatch {
    redis: ConnectionManager,
}

impl RedisNotificationDispatch {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl NotificationDispatch for RedisNotificationDispatch {
    async fn mutual_reveal(&self, event: &MutualReveal) -> Result<()> {
        let payload = sonic_rs::to_string(event)
            .map_err(|e| AppError::Internal(format!("Failed to encode reveal event: {}", e)))?;

        let mut redis = self.redis.clone();
        let _: () = redis.rpush(MUTUAL_REVEAL_QUEUE, payload).await?;

        tracing::info!("💌 Mutual reveal queued for session {}", event.session_id);
        Ok(())
    }
}

/// Logs events only. Used when no Redis is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotificationDispatch;

#[async_trait]
impl NotificationDispatch for LogNotificationDispatch {
    async fn mutual_reveal(&self, event: &MutualReveal) -> Result<()> {
        tracing::info!(
            "💌 Mutual reveal for session {} between {} and {}",
            event.session_id,
            event.participants[0],
            event.participants[1]
        );
        Ok(())
    }
}

/// Keeps every event in memory so callers can inspect what was sent.
#[derive(Debug, Default)]
pub struct RecordingDispatch {
    events: Mutex<Vec<MutualReveal>>,
}

impl RecordingDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<MutualReveal> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatch for RecordingDispatch {
    async fn mutual_reveal(&self, event: &MutualReveal) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
