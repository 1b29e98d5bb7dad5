//! Next-fire-time calculation for report schedules.
//!
//! All arithmetic is in UTC. The result is always strictly after `now`: when the naive slot
//! for the period lands on or before `now`, it is pushed forward by whole periods.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc};

use super::types::{Frequency, ScheduleSpec};

const DEFAULT_DAY_OF_WEEK: u8 = 1;
const DEFAULT_DAY_OF_MONTH: u32 = 1;

/// Computes when a definition with `spec` should next fire, relative to `now`.
#[must_use]
pub fn calculate_next_generation(now: DateTime<Utc>, spec: &ScheduleSpec) -> DateTime<Utc> {
    let time = spec.time_of_day().unwrap_or_else(|_| nine_am());

    let candidate = match spec.frequency {
        Some(Frequency::Hourly) => next_hour_boundary(now),
        Some(Frequency::Daily) => next_daily(now, time),
        Some(Frequency::Weekly) => {
            next_weekly(now, time, spec.day_of_week.unwrap_or(DEFAULT_DAY_OF_WEEK))
        }
        Some(Frequency::Monthly) => {
            next_monthly(now, time, spec.day_of_month.unwrap_or(DEFAULT_DAY_OF_MONTH))
        }
        Some(Frequency::Unknown) | None => None,
    };

    let mut next = candidate.unwrap_or(now + Duration::hours(24));
    while next <= now {
        next = advance_one_period(next, spec.frequency);
    }
    next
}

fn nine_am() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

fn next_hour_boundary(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let hour_start = now.date_naive().and_hms_opt(now.hour(), 0, 0)?.and_utc();
    Some(hour_start + Duration::hours(1))
}

fn next_daily(now: DateTime<Utc>, time: NaiveTime) -> Option<DateTime<Utc>> {
    let today = at(now.date_naive(), time);
    if today > now {
        Some(today)
    } else {
        Some(today + Duration::days(1))
    }
}

fn next_weekly(now: DateTime<Utc>, time: NaiveTime, day_of_week: u8) -> Option<DateTime<Utc>> {
    let target = u32::from(day_of_week.min(6));
    let current = now.weekday().num_days_from_sunday();
    let days_ahead = (target + 7 - current) % 7;

    let candidate = at(now.date_naive(), time) + Duration::days(i64::from(days_ahead));
    if days_ahead == 0 && candidate <= now {
        Some(candidate + Duration::days(7))
    } else {
        Some(candidate)
    }
}

fn next_monthly(now: DateTime<Utc>, time: NaiveTime, day_of_month: u32) -> Option<DateTime<Utc>> {
    let this_month = day_in_month(now.year(), now.month(), day_of_month)?;
    let candidate = at(this_month, time);
    if candidate > now {
        return Some(candidate);
    }

    let (year, month) =
        if now.month() == 12 { (now.year() + 1, 1) } else { (now.year(), now.month() + 1) };
    day_in_month(year, month, day_of_month).map(|date| at(date, time))
}

/// Returns `day` in the given month, clamped to the month's last day.
fn day_in_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last_day = first.checked_add_months(Months::new(1))?.pred_opt()?.day();
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last_day))
}

fn advance_one_period(at: DateTime<Utc>, frequency: Option<Frequency>) -> DateTime<Utc> {
    match frequency {
        Some(Frequency::Hourly) => at + Duration::hours(1),
        Some(Frequency::Weekly) => at + Duration::days(7),
        Some(Frequency::Monthly) => {
            at.checked_add_months(Months::new(1)).unwrap_or(at + Duration::days(31))
        }
        Some(Frequency::Daily | Frequency::Unknown) | None => at + Duration::days(1),
    }
}
