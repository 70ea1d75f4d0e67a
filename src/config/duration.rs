//! Duration parsing for config files
//!
//! Accepts bare seconds (`30`) or unit strings (`500ms`, `30s`, `5m`, `1h`,
//! `1m30s`).

use std::time::Duration;

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationHelper {
    Secs(u64),
    Text(String),
}

/// Parse a duration string such as `1m30s`
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in '{}'", input))?;
        if digits == 0 {
            return Err(format!("invalid duration '{}'", input));
        }
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in '{}'", input))?;

        let unit_len = rest[digits..]
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len() - digits);
        let unit = &rest[digits..digits + unit_len];
        let scale = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => return Err(format!("unknown unit '{}' in '{}'", other, input)),
        };

        total += Duration::try_from_secs_f64(value * scale)
            .map_err(|_| format!("duration out of range '{}'", input))?;
        rest = &rest[digits + unit_len..];
    }

    Ok(total)
}

/// `deserialize_with` helper for optional durations
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<DurationHelper>::deserialize(deserializer)? {
        None => Ok(None),
        Some(DurationHelper::Secs(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(DurationHelper::Text(text)) => parse_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
