use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::profile::AnonymousProfile,
    models::ticket::{Gender, MatchProfile},
    services::directory::UserDirectory,
};

/// Reads anonymized attributes from the profile service's `user_profiles` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool,
}

impl PgUserDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn parse_gender(raw: Option<String>) -> Option<Gender> {
    match raw.as_deref() {
        Some("man") | Some("male") => Some(Gender::Man),
        Some("woman") | Some("female") => Some(Gender::Woman),
        Some("non_binary") | Some("nonbinary") => Some(Gender::NonBinary),
        _ => None,
    }
}

fn clamp_age(raw: Option<i32>) -> Option<u8> {
    raw.and_then(|age| u8::try_from(age).ok())
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn match_profile(&self, user_id: Uuid) -> Result<MatchProfile> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT gender, age
                FROM user_profiles
                WHERE user_id = $1
                "#,
                &[&user_id],
            )
            .await?;

        Ok(match row {
            Some(row) => MatchProfile {
                gender: parse_gender(row.try_get("gender").ok().flatten()),
                age: clamp_age(row.try_get("age").ok().flatten()),
            },
            None => MatchProfile::default(),
        })
    }

    async fn anonymous_profile(&self, user_id: Uuid) -> Result<AnonymousProfile> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT alias, age, vibe_emojis
                FROM user_profiles
                WHERE user_id = $1
                "#,
                &[&user_id],
            )
            .await?;

        let Some(row) = row else {
            return Ok(AnonymousProfile::unknown());
        };

        let fallback = AnonymousProfile::unknown();
        let alias: Option<String> = row.try_get("alias").ok().flatten();
        let vibe_emojis: Option<Vec<String>> = row.try_get("vibe_emojis").ok().flatten();

        Ok(AnonymousProfile {
            alias: alias.filter(|alias| !alias.trim().is_empty()).unwrap_or(fallback.alias),
            age: clamp_age(row.try_get("age").ok().flatten()),
            vibe_emojis: vibe_emojis
                .filter(|emojis| !emojis.is_empty())
                .unwrap_or(fallback.vibe_emojis),
        })
    }
}
