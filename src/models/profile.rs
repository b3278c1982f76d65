use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a participant may learn about their partner before a mutual reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymousProfile {
    pub alias: String,
    pub age: Option<u8>,
    pub vibe_emojis: Vec<String>,
}

impl AnonymousProfile {
    /// Used when the directory knows nothing about the user.
    pub fn unknown() -> Self {
        Self {
            alias: "Anonymous".to_string(),
            age: None,
            vibe_emojis: vec!["🌙".to_string(), "💫".to_string(), "✨".to_string()],
        }
    }
}

/// The pre-authenticated caller, injected by the `require_caller` middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
}
