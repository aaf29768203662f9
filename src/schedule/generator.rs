use chrono::{Days, NaiveDate, NaiveDateTime};

use super::{Frequency, SchedulePattern, ScheduleError};

/// Every scheduled timestamp of a day pattern over `days` calendar days,
/// day 1 being `start`. Slots keep the pattern's order within each day.
pub fn pattern_slots(pattern: &SchedulePattern, start: NaiveDate, days: u32) -> Vec<NaiveDateTime> {
    let mut slots = Vec::new();
    for day in 1..=days {
        let Some(date) = start.checked_add_days(Days::new(u64::from(day - 1))) else {
            break;
        };
        slots.extend(pattern.times_for_day(day).iter().map(|time| date.and_time(*time)));
    }
    slots
}

/// Slots for a prescription of the given frequency. PRN yields nothing and
/// STAT yields a single dose at `now`; every other frequency needs a pattern.
pub fn plan_slots(
    frequency: Frequency,
    pattern: Option<&SchedulePattern>,
    start: NaiveDate,
    days: u32,
    now: NaiveDateTime,
) -> Result<Vec<NaiveDateTime>, ScheduleError> {
    match frequency {
        Frequency::AsNeeded => Ok(Vec::new()),
        Frequency::Stat => Ok(vec![now]),
        _ => {
            let pattern = pattern
                .ok_or_else(|| ScheduleError::validation("schedule_pattern", "is required"))?;
            Ok(pattern_slots(pattern, start, days))
        }
    }
}
