use redis::aio::ConnectionManager;
use std::sync::Arc;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::repositories::profile::PgUserDirectory;
use crate::repositories::session::{MemorySessionStore, PgSessionStore, SessionStore};
use crate::services::blind_date::BlindDateService;
use crate::services::directory::{AnonymousDirectory, UserDirectory};
use crate::services::notify::{LogNotificationDispatch, NotificationDispatch, RedisNotificationDispatch};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Matchmaking, signaling and decision rounds.
    pub blind_date: BlindDateService,
    /// The Redis connection manager, when Redis is configured.
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// Postgres backs sessions and profiles when `DATABASE_URL` is set;
    /// Redis backs rate limiting and reveal notifications when `REDIS_URL` is set.
    pub async fn new(config: &Config) -> Result<Self> {
        let (store, directory): (Arc<dyn SessionStore>, Arc<dyn UserDirectory>) =
            match config.database_url.as_deref() {
                Some(url) => {
                    let db = crate::db::create_pool(url)?;
                    crate::db::ensure_schema(&db).await?;
                    tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");
                    (
                        Arc::new(PgSessionStore::new(db.clone())),
                        Arc::new(PgUserDirectory::new(db)),
                    )
                }
                None => {
                    tracing::warn!("⚠️ DATABASE_URL not set; sessions are kept in memory only");
                    (
                        Arc::new(MemorySessionStore::new()),
                        Arc::new(AnonymousDirectory::new()),
                    )
                }
            };

        let redis = match config.redis_url.as_deref() {
            Some(url) => {
                let redis_client = redis::Client::open(url)?;
                let redis = ConnectionManager::new(redis_client).await?;
                tracing::info!("✅ Redis Connection Manager initialized (pooled)");
                Some(redis)
            }
            None => {
                tracing::warn!("⚠️ REDIS_URL not set; join rate limiting disabled");
                None
            }
        };

        let notifier: Arc<dyn NotificationDispatch> = match &redis {
            Some(redis) => Arc::new(RedisNotificationDispatch::new(redis.clone())),
            None => Arc::new(LogNotificationDispatch),
        };

        let blind_date = BlindDateService::new(
            config.policy.clone(),
            Arc::new(SystemClock),
            store,
            directory,
            notifier,
        );
        tracing::info!("✅ Blind date service initialized");

        Ok(AppState {
            config: config.clone(),
            blind_date,
            redis,
        })
    }

    /// A state with no external backends, driven by `clock`.
    pub fn in_memory(
        config: Config,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationDispatch>,
    ) -> Self {
        let blind_date = BlindDateService::new(config.policy.clone(), clock, store, directory, notifier);
        AppState {
            config,
            blind_date,
            redis: None,
        }
    }
}
