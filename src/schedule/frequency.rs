use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::ScheduleError;

/// Recognised dosing frequency, normalised from the free-text prescription field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    OnceDaily,
    TwiceDaily,
    ThreeTimesDaily,
    FourTimesDaily,
    Every4Hours,
    Every2Hours,
    /// "every N hours" with an interval that has no standard code.
    EveryHours(u32),
    AsNeeded,
    Stat,
}

const CODE_ALIASES: &[(&str, Frequency)] = &[
    ("OD", Frequency::OnceDaily),
    ("BID", Frequency::TwiceDaily),
    ("BD", Frequency::TwiceDaily),
    ("Q12H", Frequency::TwiceDaily),
    ("TID", Frequency::ThreeTimesDaily),
    ("TDS", Frequency::ThreeTimesDaily),
    ("Q8H", Frequency::ThreeTimesDaily),
    ("QID", Frequency::FourTimesDaily),
    ("QDS", Frequency::FourTimesDaily),
    ("Q6H", Frequency::FourTimesDaily),
    ("Q4H", Frequency::Every4Hours),
    ("Q2H", Frequency::Every2Hours),
    ("PRN", Frequency::AsNeeded),
    ("STAT", Frequency::Stat),
];

static PARENTHESISED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*([A-Za-z0-9]+)\s*\)").unwrap());

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9]+\b").unwrap());

static EVERY_N_HOURS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)every\s+(\d+)\s+hours?\b").unwrap(),
        Regex::new(r"(?i)(\d+)\s+hourly\b").unwrap(),
        Regex::new(r"(?i)every\s+(\d+)\s+hrs?\b").unwrap(),
    ]
});

fn lookup_code(code: &str) -> Option<Frequency> {
    let upper = code.trim().to_uppercase();
    CODE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, freq)| *freq)
}

impl Frequency {
    /// Parses a prescription frequency.
    ///
    /// Accepts a bare code ("BID"), a code in parentheses or as a whole word
    /// inside descriptive text ("Twice daily (BID)"), and interval phrases
    /// ("every 6 hours", "4 hourly", "every 3 hrs").
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        if let Some(freq) = lookup_code(raw) {
            return Ok(freq);
        }

        if let Some(freq) = PARENTHESISED_CODE
            .captures_iter(raw)
            .find_map(|caps| lookup_code(&caps[1]))
        {
            return Ok(freq);
        }

        if let Some(freq) = WORD.find_iter(raw).find_map(|m| lookup_code(m.as_str())) {
            return Ok(freq);
        }

        for pattern in EVERY_N_HOURS.iter() {
            if let Some(caps) = pattern.captures(raw) {
                return caps[1]
                    .parse::<u32>()
                    .ok()
                    .and_then(Self::from_interval)
                    .ok_or_else(|| ScheduleError::UnknownFrequency(raw.to_string()));
            }
        }

        Err(ScheduleError::UnknownFrequency(raw.to_string()))
    }

    /// Maps an hour interval to its canonical frequency. Intervals outside 1..=24 are rejected.
    pub fn from_interval(hours: u32) -> Option<Self> {
        match hours {
            24 => Some(Self::OnceDaily),
            12 => Some(Self::TwiceDaily),
            8 => Some(Self::ThreeTimesDaily),
            6 => Some(Self::FourTimesDaily),
            4 => Some(Self::Every4Hours),
            2 => Some(Self::Every2Hours),
            1..=23 => Some(Self::EveryHours(hours)),
            _ => None,
        }
    }

    pub fn interval_hours(&self) -> Option<u32> {
        match self {
            Self::OnceDaily => Some(24),
            Self::TwiceDaily => Some(12),
            Self::ThreeTimesDaily => Some(8),
            Self::FourTimesDaily => Some(6),
            Self::Every4Hours => Some(4),
            Self::Every2Hours => Some(2),
            Self::EveryHours(h) => Some(*h),
            Self::AsNeeded | Self::Stat => None,
        }
    }

    /// Short code used on ward charts.
    pub fn code(&self) -> String {
        match self {
            Self::OnceDaily => "OD".into(),
            Self::TwiceDaily => "BID".into(),
            Self::ThreeTimesDaily => "TID".into(),
            Self::FourTimesDaily => "QID".into(),
            Self::Every4Hours => "Q4H".into(),
            Self::Every2Hours => "Q2H".into(),
            Self::EveryHours(h) => format!("Q{h}H"),
            Self::AsNeeded => "PRN".into(),
            Self::Stat => "STAT".into(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
