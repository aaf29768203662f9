use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::{ScheduleError, MAX_DURATION_DAYS};

const TIME_FORMAT: &str = "%H:%M";

/// Raw pattern as submitted: `{"day_1": ["10:30"], "subsequent": ["06:00"], "day_3": [...]}`.
pub type RawPattern = BTreeMap<String, Vec<String>>;

/// Two-tier daily time pattern with optional per-day overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPattern", into = "RawPattern")]
pub struct SchedulePattern {
    pub day_1: Vec<NaiveTime>,
    pub subsequent: Vec<NaiveTime>,
    /// Explicit times for day N (N ≥ 2).
    pub overrides: BTreeMap<u32, Vec<NaiveTime>>,
}

impl SchedulePattern {
    pub fn new(day_1: Vec<NaiveTime>, subsequent: Vec<NaiveTime>) -> Self {
        Self {
            day_1,
            subsequent,
            overrides: BTreeMap::new(),
        }
    }

    /// Validates a submitted pattern. Errors name the offending field, e.g.
    /// `schedule_pattern.day_1.0`.
    pub fn parse(raw: &RawPattern) -> Result<Self, ScheduleError> {
        let mut day_1 = None;
        let mut subsequent = None;
        let mut overrides = BTreeMap::new();

        for (key, times) in raw {
            let field = format!("schedule_pattern.{key}");
            let parsed = parse_times(&field, times)?;
            match key.as_str() {
                "day_1" => day_1 = Some(parsed),
                "subsequent" => subsequent = Some(parsed),
                other => {
                    let day = override_day(other).ok_or_else(|| {
                        ScheduleError::validation(&field, "must be day_1, subsequent or day_N")
                    })?;
                    overrides.insert(day, parsed);
                }
            }
        }

        Ok(Self {
            day_1: day_1.ok_or_else(|| ScheduleError::validation("schedule_pattern.day_1", "is required"))?,
            subsequent: subsequent
                .ok_or_else(|| ScheduleError::validation("schedule_pattern.subsequent", "is required"))?,
            overrides,
        })
    }

    /// Times to give on calendar day `day` (1-based).
    pub fn times_for_day(&self, day: u32) -> &[NaiveTime] {
        if day == 1 {
            return &self.day_1;
        }
        self.overrides
            .get(&day)
            .map(Vec::as_slice)
            .unwrap_or(&self.subsequent)
    }

    pub fn to_raw(&self) -> RawPattern {
        let mut raw = RawPattern::new();
        raw.insert("day_1".into(), format_times(&self.day_1));
        raw.insert("subsequent".into(), format_times(&self.subsequent));
        for (day, times) in &self.overrides {
            raw.insert(format!("day_{day}"), format_times(times));
        }
        raw
    }
}

fn override_day(key: &str) -> Option<u32> {
    let day: u32 = key.strip_prefix("day_")?.parse().ok()?;
    (2..=MAX_DURATION_DAYS).contains(&day).then_some(day)
}

fn parse_times(field: &str, times: &[String]) -> Result<Vec<NaiveTime>, ScheduleError> {
    if times.is_empty() {
        return Err(ScheduleError::validation(field, "must contain at least one time"));
    }
    times
        .iter()
        .enumerate()
        .map(|(i, t)| parse_hh_mm(t).ok_or_else(|| {
            ScheduleError::validation(format!("{field}.{i}"), "must be a time in HH:MM format")
        }))
        .collect()
}

/// Strict 24-hour `HH:MM`.
pub fn parse_hh_mm(value: &str) -> Option<NaiveTime> {
    if value.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(value, TIME_FORMAT).ok()
}

pub fn format_hh_mm(time: &NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn format_times(times: &[NaiveTime]) -> Vec<String> {
    times.iter().map(format_hh_mm).collect()
}

impl TryFrom<RawPattern> for SchedulePattern {
    type Error = ScheduleError;

    fn try_from(raw: RawPattern) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<SchedulePattern> for RawPattern {
    fn from(pattern: SchedulePattern) -> Self {
        pattern.to_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, &[&str])]) -> RawPattern {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn hm(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn field_of(err: ScheduleError) -> String {
        match err {
            ScheduleError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn day_selection_prefers_overrides() {
        let pattern = SchedulePattern::parse(&raw(&[
            ("day_1", &["10:30", "18:00"]),
            ("subsequent", &["06:00", "18:00"]),
            ("day_3", &["08:00"]),
        ]))
        .unwrap();

        assert_eq!(pattern.times_for_day(1), &[hm("10:30"), hm("18:00")]);
        assert_eq!(pattern.times_for_day(2), &[hm("06:00"), hm("18:00")]);
        assert_eq!(pattern.times_for_day(3), &[hm("08:00")]);
        assert_eq!(pattern.times_for_day(4), &[hm("06:00"), hm("18:00")]);
    }

    #[test]
    fn missing_tiers_are_reported() {
        let err = SchedulePattern::parse(&raw(&[("subsequent", &["06:00"])])).unwrap_err();
        assert_eq!(field_of(err), "schedule_pattern.day_1");
        let err = SchedulePattern::parse(&raw(&[("day_1", &["06:00"])])).unwrap_err();
        assert_eq!(field_of(err), "schedule_pattern.subsequent");
    }

    #[test]
    fn empty_lists_and_bad_times_are_field_addressed() {
        let err = SchedulePattern::parse(&raw(&[("day_1", &[]), ("subsequent", &["06:00"])])).unwrap_err();
        assert_eq!(field_of(err), "schedule_pattern.day_1");

        let err = SchedulePattern::parse(&raw(&[
            ("day_1", &["06:00", "25:00"]),
            ("subsequent", &["06:00"]),
        ]))
        .unwrap_err();
        assert_eq!(field_of(err), "schedule_pattern.day_1.1");

        let err = SchedulePattern::parse(&raw(&[("day_1", &["6:00"]), ("subsequent", &["06:00"])])).unwrap_err();
        assert_eq!(field_of(err), "schedule_pattern.day_1.0");
    }

    #[test]
    fn unknown_keys_rejected() {
        for key in ["day_0", "day_x", "weekend"] {
            let err = SchedulePattern::parse(&raw(&[
                ("day_1", &["06:00"]),
                ("subsequent", &["06:00"]),
                (key, &["06:00"]),
            ]))
            .unwrap_err();
            assert_eq!(field_of(err), format!("schedule_pattern.{key}"));
        }
    }

    #[test]
    fn json_uses_hh_mm_map() {
        let pattern = SchedulePattern::new(vec![hm("10:30")], vec![hm("06:00"), hm("18:00")]);
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json, serde_json::json!({"day_1": ["10:30"], "subsequent": ["06:00", "18:00"]}));
        let back: SchedulePattern = serde_json::from_value(json).unwrap();
        assert_eq!(back, pattern);
    }
}
