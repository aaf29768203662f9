use std::sync::LazyLock;

use regex::Regex;

use super::ScheduleError;

static UNIT_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(day|week|month)").unwrap());

/// Longest course a single prescription may schedule.
pub const MAX_DURATION_DAYS: u32 = 366;

static BARE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());

/// Converts a free-text duration ("5 days", "2 weeks", "1 month", "7") into a day count.
/// A month counts as 30 days. Zero and anything past `MAX_DURATION_DAYS` are rejected.
pub fn parse_duration_days(raw: &str) -> Result<u32, ScheduleError> {
    let invalid = || ScheduleError::InvalidDuration(raw.to_string());

    let days = if let Some(caps) = UNIT_DURATION.captures(raw) {
        let value: u32 = caps[1].parse().map_err(|_| invalid())?;
        let multiplier = match caps[2].to_lowercase().as_str() {
            "week" => 7,
            "month" => 30,
            _ => 1,
        };
        value.checked_mul(multiplier).ok_or_else(invalid)?
    } else if let Some(caps) = BARE_NUMBER.captures(raw) {
        caps[1].parse().map_err(|_| invalid())?
    } else {
        return Err(invalid());
    };

    if days == 0 || days > MAX_DURATION_DAYS {
        return Err(invalid());
    }
    Ok(days)
}
