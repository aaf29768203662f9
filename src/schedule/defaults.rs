use chrono::{NaiveTime, Timelike};

use super::{Frequency, SchedulePattern};

const BID_SLOTS: [(u32, u32); 2] = [(6, 0), (18, 0)];
const TID_SLOTS: [(u32, u32); 3] = [(6, 0), (14, 0), (22, 0)];
const QID_SLOTS: [(u32, u32); 4] = [(6, 0), (12, 0), (18, 0), (0, 0)];

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

fn slots(table: &[(u32, u32)]) -> Vec<NaiveTime> {
    table.iter().map(|(h, m)| at(*h, *m)).collect()
}

/// Suggested pattern for a prescription started at `now`.
///
/// Day 1 gets whatever standard slots remain today; `subsequent` is the
/// steady-state pattern anchored at 06:00. Interval frequencies start at
/// the next whole hour and step by the interval.
pub fn smart_defaults(frequency: Frequency, now: NaiveTime) -> SchedulePattern {
    let current = at(now.hour(), now.minute());

    match frequency {
        Frequency::AsNeeded => SchedulePattern::new(Vec::new(), Vec::new()),
        Frequency::Stat => SchedulePattern::new(vec![current], Vec::new()),
        Frequency::OnceDaily => {
            let first = if current >= at(6, 0) { current } else { at(6, 0) };
            SchedulePattern::new(vec![first], vec![at(6, 0)])
        }
        Frequency::TwiceDaily => {
            let next = slots(&BID_SLOTS)
                .into_iter()
                .find(|slot| *slot > current)
                .unwrap_or(at(18, 0));
            SchedulePattern::new(vec![current, next], slots(&BID_SLOTS))
        }
        Frequency::ThreeTimesDaily => {
            let day_1 = remaining_today(&TID_SLOTS, current, &[(14, 0), (22, 0)]);
            SchedulePattern::new(day_1, slots(&TID_SLOTS))
        }
        Frequency::FourTimesDaily => {
            let day_1 = remaining_today(&QID_SLOTS, current, &[(12, 0), (18, 0), (0, 0)]);
            SchedulePattern::new(day_1, slots(&QID_SLOTS))
        }
        Frequency::Every4Hours | Frequency::Every2Hours | Frequency::EveryHours(_) => {
            let interval = frequency.interval_hours().unwrap_or(24).max(1);
            interval_defaults(now, interval)
        }
    }
}

fn remaining_today(table: &[(u32, u32)], current: NaiveTime, fallback: &[(u32, u32)]) -> Vec<NaiveTime> {
    let remaining: Vec<NaiveTime> = slots(table).into_iter().filter(|slot| *slot >= current).collect();
    if remaining.is_empty() {
        slots(fallback)
    } else {
        remaining
    }
}

fn interval_defaults(now: NaiveTime, interval: u32) -> SchedulePattern {
    let on_the_hour = now.minute() == 0 && now.second() == 0;
    let first_hour = if on_the_hour { now.hour() } else { (now.hour() + 1) % 24 };
    let doses = 24u32.div_ceil(interval);

    let times: Vec<NaiveTime> = (0..doses)
        .map(|i| at((first_hour + i * interval) % 24, 0))
        .collect();
    SchedulePattern::new(vec![times[0]], times)
}
