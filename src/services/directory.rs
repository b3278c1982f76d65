use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Result,
    models::profile::AnonymousProfile,
    models::ticket::MatchProfile,
};

/// Read-only access to the attributes a blind date may use.
/// Never exposes real identity.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Attributes other users' preferences are matched against.
    async fn match_profile(&self, user_id: Uuid) -> Result<MatchProfile>;

    /// What a partner may see before a mutual reveal.
    async fn anonymous_profile(&self, user_id: Uuid) -> Result<AnonymousProfile>;
}

/// Directory backed by a fixed map; unknown users are fully anonymous.
#[derive(Debug, Default, Clone)]
pub struct AnonymousDirectory {
    profiles: HashMap<Uuid, (MatchProfile, AnonymousProfile)>,
}

impl AnonymousDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, user_id: Uuid, matching: MatchProfile, display: AnonymousProfile) -> Self {
        self.profiles.insert(user_id, (matching, display));
        self
    }
}

#[async_trait]
impl UserDirectory for AnonymousDirectory {
    async fn match_profile(&self, user_id: Uuid) -> Result<MatchProfile> {
        Ok(self
            .profiles
            .get(&user_id)
            .map(|(matching, _)| *matching)
            .unwrap_or_default())
    }

    async fn anonymous_profile(&self, user_id: Uuid) -> Result<AnonymousProfile> {
        Ok(self
            .profiles
            .get(&user_id)
            .map(|(_, display)| display.clone())
            .unwrap_or_else(AnonymousProfile::unknown))
    }
}
