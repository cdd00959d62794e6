//! Recurrence calculator.
//!
//! Pure functions: given a frequency descriptor, a reference instant and a
//! time zone, compute the next due instant. Nothing here reads the clock.
//!
//! Day-of-month clamping: a monthly (or yearly) schedule on day 29, 30 or 31
//! fires on the last day of any month that is shorter. `frequency_day = 31`
//! fires on Feb 28 (Feb 29 in leap years), Apr 30, and so on; it never spills
//! into the following month.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc, Weekday,
};
use shared::validation::{validate_day_of_month, validate_month, validate_weekday};
use thiserror::Error;

use crate::models::Frequency;

/// Longest DST gap we step across when a local time does not exist.
const MAX_GAP_MINUTES: i64 = 180;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Invalid combination of frequency fields.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrequencyError {
    #[error("{0} schedules require frequency_day")]
    MissingDay(Frequency),

    #[error("Invalid frequency_day {day} for {frequency} schedule: {reason}")]
    InvalidDay {
        frequency: Frequency,
        day: i32,
        reason: String,
    },

    #[error("yearly schedules require frequency_month")]
    MissingMonth,

    #[error("Invalid frequency_month {month}: {reason}")]
    InvalidMonth { month: i32, reason: String },
}

/// The calendar rule of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Daily,
    Weekly { weekday: Weekday },
    Monthly { day: u32 },
    Yearly { month: u32, day: u32 },
}

/// Validated frequency fields of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyDescriptor {
    pub recurrence: Recurrence,
    /// Local wall-clock time, minute granularity.
    pub time: NaiveTime,
}

impl FrequencyDescriptor {
    /// Validate raw schedule fields.
    ///
    /// Fields a frequency does not use (the day for `daily`, the month for
    /// `weekly`/`monthly`) are ignored.
    pub fn from_parts(
        frequency: Frequency,
        day: Option<i32>,
        month: Option<i32>,
        time: NaiveTime,
    ) -> Result<Self, FrequencyError> {
        let time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);

        let recurrence = match frequency {
            Frequency::Daily => Recurrence::Daily,
            Frequency::Weekly => {
                let day = day.ok_or(FrequencyError::MissingDay(frequency))?;
                check_day(frequency, day, validate_weekday(day))?;
                Recurrence::Weekly {
                    weekday: WEEKDAYS[day as usize],
                }
            }
            Frequency::Monthly => {
                let day = day.ok_or(FrequencyError::MissingDay(frequency))?;
                check_day(frequency, day, validate_day_of_month(day))?;
                Recurrence::Monthly { day: day as u32 }
            }
            Frequency::Yearly => {
                let day = day.ok_or(FrequencyError::MissingDay(frequency))?;
                check_day(frequency, day, validate_day_of_month(day))?;
                let month = month.ok_or(FrequencyError::MissingMonth)?;
                validate_month(month).map_err(|e| FrequencyError::InvalidMonth {
                    month,
                    reason: reason(&e),
                })?;
                Recurrence::Yearly {
                    month: month as u32,
                    day: day as u32,
                }
            }
        };

        Ok(Self { recurrence, time })
    }

    /// Human-readable description, e.g. "Weekly on Monday at 09:00".
    pub fn describe(&self) -> String {
        let at = self.time.format("%H:%M");
        match self.recurrence {
            Recurrence::Daily => format!("Daily at {}", at),
            Recurrence::Weekly { weekday } => format!(
                "Weekly on {} at {}",
                WEEKDAY_NAMES[weekday.num_days_from_sunday() as usize],
                at
            ),
            Recurrence::Monthly { day } => format!("Monthly on day {} at {}", day, at),
            Recurrence::Yearly { month, day } => format!(
                "Yearly on {} {} at {}",
                MONTH_NAMES[(month - 1) as usize],
                day,
                at
            ),
        }
    }

    /// First calendar date on or after `date` matching the recurrence.
    fn first_date_on_or_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self.recurrence {
            Recurrence::Daily => Some(date),
            Recurrence::Weekly { weekday } => {
                let offset = (7 + weekday.num_days_from_sunday()
                    - date.weekday().num_days_from_sunday())
                    % 7;
                date.checked_add_signed(Duration::days(offset as i64))
            }
            Recurrence::Monthly { day } => {
                let this_month = clamped_date(date.year(), date.month(), day)?;
                if this_month >= date {
                    Some(this_month)
                } else {
                    let (year, month) = next_month(date.year(), date.month());
                    clamped_date(year, month, day)
                }
            }
            Recurrence::Yearly { month, day } => {
                let this_year = clamped_date(date.year(), month, day)?;
                if this_year >= date {
                    Some(this_year)
                } else {
                    clamped_date(date.year() + 1, month, day)
                }
            }
        }
    }
}

/// Next occurrence strictly after `after`.
///
/// An occurrence that falls exactly on `after` is treated as already due,
/// so feeding the result back in always moves forward. Returns `None` only
/// when the calendar runs out of representable dates.
pub fn next_run<Tz: TimeZone>(
    descriptor: &FrequencyDescriptor,
    after: DateTime<Utc>,
    tz: &Tz,
) -> Option<DateTime<Utc>> {
    let mut date = after.with_timezone(tz).date_naive();

    loop {
        let candidate = descriptor.first_date_on_or_after(date)?;
        let instant = resolve_local(tz, candidate.and_time(descriptor.time))?;
        if instant > after {
            return Some(instant);
        }
        date = candidate.succ_opt()?;
    }
}

/// Map a local wall-clock time to an instant.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times in
/// a DST gap move forward to the first minute that exists.
fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    for shift in 0..=MAX_GAP_MINUTES {
        let candidate = local + Duration::minutes(shift);
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => continue,
        }
    }
    None
}

fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(last_day_of_month(year, month)?))
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (year, month) = next_month(year, month);
    NaiveDate::from_ymd_opt(year, month, 1)?
        .pred_opt()
        .map(|d| d.day())
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn check_day(
    frequency: Frequency,
    day: i32,
    result: Result<(), validator::ValidationError>,
) -> Result<(), FrequencyError> {
    result.map_err(|e| FrequencyError::InvalidDay {
        frequency,
        day,
        reason: reason(&e),
    })
}

fn reason(err: &validator::ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::{America::New_York, Europe::Berlin};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn descriptor(
        frequency: Frequency,
        day: Option<i32>,
        month: Option<i32>,
    ) -> FrequencyDescriptor {
        FrequencyDescriptor::from_parts(frequency, day, month, time(9, 0)).unwrap()
    }

    #[test]
    fn test_daily_same_day_when_time_not_passed() {
        let d = descriptor(Frequency::Daily, None, None);
        assert_eq!(
            next_run(&d, at("2024-03-05T08:59:00Z"), &Utc),
            Some(at("2024-03-05T09:00:00Z"))
        );
    }

    #[test]
    fn test_daily_rolls_to_next_day_when_passed() {
        let d = descriptor(Frequency::Daily, None, None);
        assert_eq!(
            next_run(&d, at("2024-03-05T09:01:00Z"), &Utc),
            Some(at("2024-03-06T09:00:00Z"))
        );
    }

    #[test]
    fn test_exact_scheduled_time_counts_as_due() {
        let d = descriptor(Frequency::Daily, None, None);
        assert_eq!(
            next_run(&d, at("2024-03-05T09:00:00Z"), &Utc),
            Some(at("2024-03-06T09:00:00Z"))
        );
    }

    #[test]
    fn test_weekly_monday_after_time_passed_rolls_a_week() {
        // 2024-01-15 is a Monday.
        let d = descriptor(Frequency::Weekly, Some(1), None);
        assert_eq!(
            next_run(&d, at("2024-01-15T09:05:00Z"), &Utc),
            Some(at("2024-01-22T09:00:00Z"))
        );
    }

    #[test]
    fn test_weekly_finds_later_weekday_in_same_week() {
        let d = descriptor(Frequency::Weekly, Some(5), None);
        assert_eq!(
            next_run(&d, at("2024-01-15T12:00:00Z"), &Utc),
            Some(at("2024-01-19T09:00:00Z"))
        );
    }

    #[test]
    fn test_weekly_sunday_is_zero() {
        let d = descriptor(Frequency::Weekly, Some(0), None);
        assert_eq!(
            next_run(&d, at("2024-01-15T12:00:00Z"), &Utc),
            Some(at("2024-01-21T09:00:00Z"))
        );
    }

    #[test]
    fn test_monthly_31_clamps_to_end_of_february() {
        let d = descriptor(Frequency::Monthly, Some(31), None);
        let first = next_run(&d, at("2023-01-15T00:00:00Z"), &Utc).unwrap();
        assert_eq!(first, at("2023-01-31T09:00:00Z"));

        let second = next_run(&d, first + Duration::seconds(1), &Utc).unwrap();
        assert_eq!(second, at("2023-02-28T09:00:00Z"));

        let third = next_run(&d, second, &Utc).unwrap();
        assert_eq!(third, at("2023-03-31T09:00:00Z"));

        let fourth = next_run(&d, third, &Utc).unwrap();
        assert_eq!(fourth, at("2023-04-30T09:00:00Z"));
    }

    #[test]
    fn test_monthly_leap_february() {
        let d = descriptor(Frequency::Monthly, Some(30), None);
        assert_eq!(
            next_run(&d, at("2024-02-01T00:00:00Z"), &Utc),
            Some(at("2024-02-29T09:00:00Z"))
        );
    }

    #[test]
    fn test_monthly_rolls_over_year_end() {
        let d = descriptor(Frequency::Monthly, Some(5), None);
        assert_eq!(
            next_run(&d, at("2024-12-06T00:00:00Z"), &Utc),
            Some(at("2025-01-05T09:00:00Z"))
        );
    }

    #[test]
    fn test_yearly_feb_29_clamps_in_non_leap_years() {
        let d = descriptor(Frequency::Yearly, Some(29), Some(2));
        assert_eq!(
            next_run(&d, at("2023-01-01T00:00:00Z"), &Utc),
            Some(at("2023-02-28T09:00:00Z"))
        );
        assert_eq!(
            next_run(&d, at("2023-03-01T00:00:00Z"), &Utc),
            Some(at("2024-02-29T09:00:00Z"))
        );
        assert_eq!(
            next_run(&d, at("2024-02-29T09:00:00Z"), &Utc),
            Some(at("2025-02-28T09:00:00Z"))
        );
    }

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let descriptors = [
            descriptor(Frequency::Daily, None, None),
            descriptor(Frequency::Weekly, Some(3), None),
            descriptor(Frequency::Monthly, Some(31), None),
            descriptor(Frequency::Monthly, Some(1), None),
            descriptor(Frequency::Yearly, Some(29), Some(2)),
            descriptor(Frequency::Yearly, Some(31), Some(12)),
        ];

        for d in descriptors {
            for tz_case in 0..2 {
                let mut after = at("2023-10-28T23:30:00Z");
                for _ in 0..40 {
                    let next = (if tz_case == 0 {
                        next_run(&d, after, &Utc)
                    } else {
                        next_run(&d, after, &Berlin)
                    })
                    .unwrap();
                    assert!(next > after, "{:?}: {} !> {}", d, next, after);
                    after = next;
                }
            }
        }
    }

    #[test]
    fn test_time_zone_is_applied() {
        let d = descriptor(Frequency::Daily, None, None);
        // Berlin is UTC+2 in June.
        assert_eq!(
            next_run(&d, at("2024-06-01T00:00:00Z"), &Berlin),
            Some(at("2024-06-01T07:00:00Z"))
        );
    }

    #[test]
    fn test_dst_gap_moves_forward() {
        let d = FrequencyDescriptor::from_parts(Frequency::Daily, None, None, time(2, 30)).unwrap();
        // 2024-03-10 02:00 EST jumps to 03:00 EDT in New York.
        assert_eq!(
            next_run(&d, at("2024-03-10T05:00:00Z"), &New_York),
            Some(at("2024-03-10T07:00:00Z"))
        );
    }

    #[test]
    fn test_dst_ambiguous_uses_earlier_instant() {
        let d = FrequencyDescriptor::from_parts(Frequency::Daily, None, None, time(1, 30)).unwrap();
        // 2024-11-03 01:30 happens twice in New York; the EDT one is 05:30Z.
        assert_eq!(
            next_run(&d, at("2024-11-03T04:00:00Z"), &New_York),
            Some(at("2024-11-03T05:30:00Z"))
        );
    }

    #[test]
    fn test_from_parts_validation() {
        let t = time(9, 0);
        assert_eq!(
            FrequencyDescriptor::from_parts(Frequency::Weekly, None, None, t),
            Err(FrequencyError::MissingDay(Frequency::Weekly))
        );
        assert!(matches!(
            FrequencyDescriptor::from_parts(Frequency::Weekly, Some(7), None, t),
            Err(FrequencyError::InvalidDay { day: 7, .. })
        ));
        assert!(matches!(
            FrequencyDescriptor::from_parts(Frequency::Monthly, Some(0), None, t),
            Err(FrequencyError::InvalidDay { day: 0, .. })
        ));
        assert_eq!(
            FrequencyDescriptor::from_parts(Frequency::Yearly, Some(1), None, t),
            Err(FrequencyError::MissingMonth)
        );
        assert!(matches!(
            FrequencyDescriptor::from_parts(Frequency::Yearly, Some(1), Some(13), t),
            Err(FrequencyError::InvalidMonth { month: 13, .. })
        ));
        assert!(FrequencyDescriptor::from_parts(Frequency::Daily, Some(99), Some(99), t).is_ok());
    }

    #[test]
    fn test_from_parts_drops_seconds() {
        let d = FrequencyDescriptor::from_parts(
            Frequency::Daily,
            None,
            None,
            NaiveTime::from_hms_opt(9, 0, 45).unwrap(),
        )
        .unwrap();
        assert_eq!(d.time, time(9, 0));
    }

    #[test]
    fn test_error_messages() {
        let err = FrequencyDescriptor::from_parts(Frequency::Weekly, Some(9), None, time(9, 0))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            concat!(
                "Invalid frequency_day 9 for weekly schedule: ",
                "Day of week must be between 0 (Sunday) and 6 (Saturday)"
            )
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            descriptor(Frequency::Daily, None, None).describe(),
            "Daily at 09:00"
        );
        assert_eq!(
            descriptor(Frequency::Weekly, Some(1), None).describe(),
            "Weekly on Monday at 09:00"
        );
        assert_eq!(
            descriptor(Frequency::Yearly, Some(29), Some(2)).describe(),
            "Yearly on February 29 at 09:00"
        );
    }
}
