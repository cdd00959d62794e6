//! Common validation utilities.

use chrono::NaiveTime;
use validator::{ValidateEmail, ValidationError};

/// Maximum number of recipients a single schedule may deliver to.
pub const MAX_RECIPIENTS: usize = 50;

/// Validates a single email address.
pub fn validate_email_address(email: &str) -> Result<(), ValidationError> {
    if email.trim().validate_email() {
        Ok(())
    } else {
        let mut err = ValidationError::new("email_invalid");
        err.message = Some(format!("Invalid email address: {}", email).into());
        Err(err)
    }
}

/// Validates a recipient list: non-empty, bounded, every entry a valid address.
pub fn validate_recipients(recipients: &[String]) -> Result<(), ValidationError> {
    if recipients.is_empty() {
        let mut err = ValidationError::new("recipients_empty");
        err.message = Some("At least one email recipient is required".into());
        return Err(err);
    }

    if recipients.len() > MAX_RECIPIENTS {
        let mut err = ValidationError::new("recipients_too_many");
        err.message =
            Some(format!("At most {} email recipients are allowed", MAX_RECIPIENTS).into());
        return Err(err);
    }

    for recipient in recipients {
        validate_email_address(recipient)?;
    }

    Ok(())
}

/// Normalizes a recipient list into an ordered set.
///
/// Entries are trimmed; later case-insensitive duplicates are dropped.
pub fn normalize_recipients(recipients: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(recipients.len());
    let mut out = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let trimmed = recipient.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Validates a weekday number (0 = Sunday .. 6 = Saturday).
pub fn validate_weekday(day: i32) -> Result<(), ValidationError> {
    if (0..=6).contains(&day) {
        Ok(())
    } else {
        let mut err = ValidationError::new("weekday_range");
        err.message = Some("Day of week must be between 0 (Sunday) and 6 (Saturday)".into());
        Err(err)
    }
}

/// Validates a day of month (1-31).
pub fn validate_day_of_month(day: i32) -> Result<(), ValidationError> {
    if (1..=31).contains(&day) {
        Ok(())
    } else {
        let mut err = ValidationError::new("day_of_month_range");
        err.message = Some("Day of month must be between 1 and 31".into());
        Err(err)
    }
}

/// Validates a month number (1-12).
pub fn validate_month(month: i32) -> Result<(), ValidationError> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        let mut err = ValidationError::new("month_range");
        err.message = Some("Month must be between 1 and 12".into());
        Err(err)
    }
}

/// Parses a wall-clock time of day in `HH:MM` or `HH:MM:SS` form.
///
/// Seconds are discarded; schedules have minute granularity.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
        .and_then(|t| {
            use chrono::Timelike;
            NaiveTime::from_hms_opt(t.hour(), t.minute(), 0)
        })
}

/// Validates a time-of-day string.
pub fn validate_time_of_day(value: &str) -> Result<(), ValidationError> {
    if parse_time_of_day(value).is_some() {
        Ok(())
    } else {
        let mut err = ValidationError::new("time_of_day_invalid");
        err.message = Some("Scheduled time must be formatted as HH:MM".into());
        Err(err)
    }
}
