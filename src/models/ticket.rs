use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The vibe a user is looking for. Only equal moods are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Chill,
    Flirty,
    Deep,
    Fun,
    Mysterious,
    Romantic,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Chill => "chill",
            Mood::Flirty => "flirty",
            Mood::Deep => "deep",
            Mood::Fun => "fun",
            Mood::Mysterious => "mysterious",
            Mood::Romantic => "romantic",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "chill" => Ok(Mood::Chill),
            "flirty" => Ok(Mood::Flirty),
            "deep" => Ok(Mood::Deep),
            "fun" => Ok(Mood::Fun),
            "mysterious" => Ok(Mood::Mysterious),
            "romantic" => Ok(Mood::Romantic),
            other => Err(format!("Unknown mood '{}'", other)),
        }
    }
}

/// A user's self-described gender, as known to the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Man,
    Woman,
    NonBinary,
}

/// Who a user is willing to be paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderPreference {
    #[default]
    Any,
    Men,
    Women,
}

/// Inclusive age bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl AgeRange {
    pub fn contains(&self, age: u8) -> bool {
        self.min <= age && age <= self.max
    }
}

/// Matching preferences attached to a waiting ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub gender: GenderPreference,
    /// `None` accepts any age.
    pub age_range: Option<AgeRange>,
}

/// The attributes of a user that other users' preferences are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchProfile {
    pub gender: Option<Gender>,
    pub age: Option<u8>,
}

impl Preferences {
    /// Whether a candidate with `profile` satisfies these preferences.
    /// An unknown attribute only satisfies an unrestricted preference.
    pub fn accepts(&self, profile: &MatchProfile) -> bool {
        let gender_ok = match self.gender {
            GenderPreference::Any => true,
            GenderPreference::Men => profile.gender == Some(Gender::Man),
            GenderPreference::Women => profile.gender == Some(Gender::Woman),
        };

        let age_ok = match (self.age_range, profile.age) {
            (None, _) => true,
            (Some(range), Some(age)) => range.contains(age),
            (Some(_), None) => false,
        };

        gender_ok && age_ok
    }
}

/// A queued request to be paired for a blind date.
#[derive(Debug, Clone, Serialize)]
pub struct WaitingTicket {
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub mood: Mood,
    pub desired_duration_seconds: u32,
    pub preferences: Preferences,
    pub profile: MatchProfile,
    pub enqueued_at: DateTime<Utc>,
}

impl WaitingTicket {
    pub fn new(
        user_id: Uuid,
        mood: Mood,
        desired_duration_seconds: u32,
        preferences: Preferences,
        profile: MatchProfile,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            user_id,
            mood,
            desired_duration_seconds,
            preferences,
            profile,
            enqueued_at,
        }
    }

    /// Symmetric compatibility: same mood, different users, and each side's
    /// preferences accept the other side's profile.
    pub fn is_compatible_with(&self, other: &WaitingTicket) -> bool {
        self.user_id != other.user_id
            && self.mood == other.mood
            && self.preferences.accepts(&other.profile)
            && other.preferences.accepts(&self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(mood: Mood, preferences: Preferences, profile: MatchProfile) -> WaitingTicket {
        WaitingTicket::new(Uuid::new_v4(), mood, 600, preferences, profile, Utc::now())
    }

    #[test]
    fn compatibility_requires_both_sides_to_accept() {
        let woman_seeking_men = ticket(
            Mood::Chill,
            Preferences { gender: GenderPreference::Men, age_range: None },
            MatchProfile { gender: Some(Gender::Woman), age: Some(27) },
        );
        let man_seeking_anyone = ticket(
            Mood::Chill,
            Preferences::default(),
            MatchProfile { gender: Some(Gender::Man), age: Some(30) },
        );
        let man_seeking_men = ticket(
            Mood::Chill,
            Preferences { gender: GenderPreference::Men, age_range: None },
            MatchProfile { gender: Some(Gender::Man), age: Some(30) },
        );

        assert!(woman_seeking_men.is_compatible_with(&man_seeking_anyone));
        assert!(man_seeking_anyone.is_compatible_with(&woman_seeking_men));
        assert!(!woman_seeking_men.is_compatible_with(&man_seeking_men));
        assert!(!man_seeking_men.is_compatible_with(&woman_seeking_men));
    }

    #[test]
    fn moods_must_match() {
        let a = ticket(Mood::Chill, Preferences::default(), MatchProfile::default());
        let b = ticket(Mood::Deep, Preferences::default(), MatchProfile::default());
        assert!(!a.is_compatible_with(&b));
    }

    #[test]
    fn unknown_age_fails_a_restricted_range() {
        let prefs = Preferences {
            gender: GenderPreference::Any,
            age_range: Some(AgeRange { min: 25, max: 35 }),
        };
        assert!(!prefs.accepts(&MatchProfile::default()));
        assert!(prefs.accepts(&MatchProfile { gender: None, age: Some(25) }));
        assert!(!prefs.accepts(&MatchProfile { gender: None, age: Some(36) }));
    }

    #[test]
    fn a_user_is_never_compatible_with_themselves() {
        let a = ticket(Mood::Fun, Preferences::default(), MatchProfile::default());
        let mut again = a.clone();
        again.ticket_id = Uuid::new_v4();
        assert!(!a.is_compatible_with(&again));
    }

    #[test]
    fn mood_parses_from_wire_names() {
        assert_eq!("mysterious".parse::<Mood>(), Ok(Mood::Mysterious));
        assert!("sleepy".parse::<Mood>().is_err());
    }
}
