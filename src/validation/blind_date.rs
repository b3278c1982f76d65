use crate::{
    config::DatePolicy,
    error::{AppError, Result},
    models::session::DecisionChoice,
    models::signal::SignalKind,
    models::ticket::{AgeRange, GenderPreference, Mood, Preferences},
};

/// Youngest age a range may start at.
const MIN_AGE: u8 = 18;
/// Oldest age a range may end at.
const MAX_AGE: u8 = 99;

/// Parses a mood name.
///
/// # Arguments
///
/// * `raw` - The mood as sent by the client, case-insensitive.
///
/// # Returns
///
/// A `Result<Mood>`, or a validation error naming the accepted moods.
pub fn parse_mood(raw: &str) -> Result<Mood> {
    raw.trim().to_lowercase().parse().map_err(AppError::Validation)
}

/// Converts a requested duration in minutes to seconds and checks it against the policy.
///
/// # Arguments
///
/// * `minutes` - The requested date length.
/// * `policy` - The policy holding the allowed range.
///
/// # Returns
///
/// A `Result<u32>` containing the duration in seconds.
pub fn validate_duration_minutes(minutes: u32, policy: &DatePolicy) -> Result<u32> {
    let seconds = minutes
        .checked_mul(60)
        .ok_or_else(|| AppError::Validation("Duration is too long".to_string()))?;

    if seconds < policy.min_duration_seconds || seconds > policy.max_duration_seconds {
        return Err(AppError::Validation(format!(
            "Duration must be between {} and {} minutes",
            policy.min_duration_seconds / 60,
            policy.max_duration_seconds / 60
        )));
    }

    Ok(seconds)
}

/// Parses `any`, `men` or `women`.
pub fn parse_gender_preference(raw: Option<&str>) -> Result<GenderPreference> {
    match raw.map(|value| value.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("any") => Ok(GenderPreference::Any),
        Some("men") => Ok(GenderPreference::Men),
        Some("women") => Ok(GenderPreference::Women),
        Some(other) => Err(AppError::Validation(format!(
            "Unknown gender preference '{}'",
            other
        ))),
    }
}

/// Parses `any` or an inclusive `"<min>-<max>"` range.
///
/// # Arguments
///
/// * `raw` - The range as sent by the client; missing means `any`.
///
/// # Returns
///
/// A `Result` containing `None` for `any`, or the parsed range.
pub fn parse_age_range(raw: Option<&str>) -> Result<Option<AgeRange>> {
    let raw = match raw.map(str::trim) {
        None | Some("") | Some("any") => return Ok(None),
        Some(raw) => raw,
    };

    let invalid = || AppError::Validation(format!("Age range '{}' must look like 25-35", raw));

    let (min, max) = raw.split_once('-').ok_or_else(invalid)?;
    let min: u8 = min.trim().parse().map_err(|_| invalid())?;
    let max: u8 = max.trim().parse().map_err(|_| invalid())?;

    if min < MIN_AGE || max > MAX_AGE || min > max {
        return Err(AppError::Validation(format!(
            "Age range must lie within {}-{} with min not above max",
            MIN_AGE, MAX_AGE
        )));
    }

    Ok(Some(AgeRange { min, max }))
}

/// Parses both matching preferences.
pub fn parse_preferences(gender: Option<&str>, age_range: Option<&str>) -> Result<Preferences> {
    Ok(Preferences {
        gender: parse_gender_preference(gender)?,
        age_range: parse_age_range(age_range)?,
    })
}

pub fn parse_signal_kind(raw: &str) -> Result<SignalKind> {
    raw.trim().parse().map_err(AppError::Validation)
}

/// Rejects payloads larger than the policy allows once serialized.
///
/// # Arguments
///
/// * `payload` - The opaque negotiation payload.
/// * `policy` - The policy holding the size limit.
///
/// # Returns
///
/// A `Result<()>` indicating whether the payload may be relayed.
pub fn validate_payload(payload: &sonic_rs::Value, policy: &DatePolicy) -> Result<()> {
    let encoded = sonic_rs::to_string(payload)
        .map_err(|e| AppError::Validation(format!("Payload is not valid JSON: {}", e)))?;

    if encoded.len() > policy.max_signal_payload_bytes {
        return Err(AppError::Validation(format!(
            "Payload exceeds {} bytes",
            policy.max_signal_payload_bytes
        )));
    }

    Ok(())
}

pub fn parse_choice(raw: &str) -> Result<DecisionChoice> {
    match raw.trim().to_lowercase().as_str() {
        "reveal" => Ok(DecisionChoice::Reveal),
        "extend" => Ok(DecisionChoice::Extend),
        "end" => Ok(DecisionChoice::End),
        other => Err(AppError::Validation(format!("Unknown choice '{}'", other))),
    }
}
