use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Peer-connection negotiation message kinds. Content is never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    #[serde(rename = "offer")]
    Offer,
    #[serde(rename = "answer")]
    Answer,
    #[serde(rename = "ice-candidate")]
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "offer" => Ok(SignalKind::Offer),
            "answer" => Ok(SignalKind::Answer),
            "ice-candidate" => Ok(SignalKind::IceCandidate),
            other => Err(format!("Unknown signal kind '{}'", other)),
        }
    }
}

/// An opaque negotiation message relayed between the two participants.
#[derive(Debug, Clone, Serialize)]
pub struct SignalEnvelope {
    /// Monotonic per-session sequence; defines delivery order.
    pub seq: u64,
    pub session_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub kind: SignalKind,
    pub payload: sonic_rs::Value,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}
