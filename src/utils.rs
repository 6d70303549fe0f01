use chrono::{Datelike, Days, NaiveDate};
use std::fmt::Write;

pub const FROM_TAG: &str = "<<from>>";
pub const TO_TAG: &str = "<<to>>";

/// Shifts a date by a signed number of days, saturating at the calendar limits.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.unwrap_or(if days >= 0 {
        NaiveDate::MAX
    } else {
        NaiveDate::MIN
    })
}

/// Returns the Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday() as i64;
    add_days(date, -weekday)
}

/// Formats a date with a strftime-style pattern, falling back to ISO 8601
/// when the pattern is invalid.
pub fn format_date(date: NaiveDate, date_format: &str) -> String {
    let mut output = String::new();
    if write!(output, "{}", date.format(date_format)).is_err() {
        return date.format("%Y-%m-%d").to_string();
    }
    output
}

/// Replaces the `<<from>>` and `<<to>>` placeholders of a description format.
pub fn subst_description_dates(description_format: &str, date_from: &str, date_to: &str) -> String {
    description_format
        .replace(FROM_TAG, date_from)
        .replace(TO_TAG, date_to)
}
