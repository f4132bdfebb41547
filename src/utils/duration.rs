use crate::error::{LockError, Result};
use std::time::Duration;

/// Parse a duration string like "250ms", "30s", "5m", "2h", "7d"
/// Defaults to seconds if no unit specified
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(LockError::InvalidDuration {
            input: s.to_string(),
            message: "empty string".to_string(),
        });
    }

    // "ms" must be checked before the single-letter units
    let (num_str, millis_per_unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, 1)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1_000)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60 * 1_000)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 60 * 60 * 1_000)
    } else if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 24 * 60 * 60 * 1_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = num_str.parse().map_err(|_| LockError::InvalidDuration {
        input: s.to_string(),
        message: "expected format: NUMBER[ms|s|m|h|d] (e.g., '500ms', '15s', '5m')"
            .to_string(),
    })?;

    let millis = value
        .checked_mul(millis_per_unit)
        .ok_or_else(|| LockError::InvalidDuration {
            input: s.to_string(),
            message: "value too large".to_string(),
        })?;

    Ok(Duration::from_millis(millis))
}
