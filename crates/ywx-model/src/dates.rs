//! Reference-date arithmetic for sections that carry a relative day
//! instead of an absolute date.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::ModelError;

fn parse_iso_date(date: &str) -> Result<NaiveDate, ModelError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ModelError::InvalidDate(date.to_string()))
}

/// Resolves a day offset against the novel's reference date, yielding an
/// absolute ISO date.
pub fn specific_date(day: &str, reference: &str) -> Result<String, ModelError> {
    let days: i64 = day
        .parse()
        .map_err(|_| ModelError::InvalidInt(day.to_string()))?;
    let reference = parse_iso_date(reference)?;
    Ok((reference + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string())
}

/// Expresses an absolute ISO date as a signed day offset from the
/// reference date.
pub fn unspecific_date(date: &str, reference: &str) -> Result<String, ModelError> {
    let date = parse_iso_date(date)?;
    let reference = parse_iso_date(reference)?;
    Ok((date - reference).num_days().to_string())
}

/// End of a span that starts at `date`+`time` (or day `day`+`time`) and
/// lasts the given whole days/hours/minutes.
///
/// Returns `(end_date, end_time, end_day)`: either the date or the day slot
/// is populated, mirroring the start representation.
pub fn end_date_time(
    date: Option<&str>,
    day: Option<&str>,
    time: Option<&str>,
    lasts_days: Option<&str>,
    lasts_hours: Option<&str>,
    lasts_minutes: Option<&str>,
) -> (Option<String>, Option<String>, Option<String>) {
    let Some(time) = time else {
        return (None, None, None);
    };
    let parse_count = |v: Option<&str>| v.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
    let duration = Duration::days(parse_count(lasts_days))
        + Duration::hours(parse_count(lasts_hours))
        + Duration::minutes(parse_count(lasts_minutes));
    let Ok(start_time) = NaiveTime::parse_from_str(time, "%H:%M:%S") else {
        return (None, None, None);
    };

    if let Some(date) = date {
        let Ok(start_date) = parse_iso_date(date) else {
            return (None, None, None);
        };
        let end = NaiveDateTime::new(start_date, start_time) + duration;
        return (
            Some(end.format("%Y-%m-%d").to_string()),
            Some(end.format("%H:%M:%S").to_string()),
            None,
        );
    }

    // Unspecific start: anchor the day offset at the epoch of the calendar
    // so only the offset survives in the result.
    let day_offset = parse_count(day);
    let anchor = NaiveDate::MIN + Duration::days(day_offset);
    let end = NaiveDateTime::new(anchor, start_time) + duration;
    let end_day = (end.date() - NaiveDate::MIN).num_days();
    (
        None,
        Some(end.format("%H:%M:%S").to_string()),
        Some(end_day.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_and_date_convert_both_ways() {
        assert_eq!(specific_date("3", "2024-07-13").unwrap(), "2024-07-16");
        assert_eq!(specific_date("-1", "2024-07-13").unwrap(), "2024-07-12");
        assert_eq!(unspecific_date("2024-07-16", "2024-07-13").unwrap(), "3");
    }

    #[test]
    fn end_date_time_spans_midnight() {
        let (date, time, day) = end_date_time(
            Some("2024-07-13"),
            None,
            Some("23:30:00"),
            None,
            Some("1"),
            None,
        );
        assert_eq!(date.as_deref(), Some("2024-07-14"));
        assert_eq!(time.as_deref(), Some("00:30:00"));
        assert_eq!(day, None);
    }

    #[test]
    fn end_date_time_keeps_day_representation() {
        let (date, time, day) =
            end_date_time(None, Some("2"), Some("10:00:00"), Some("1"), None, None);
        assert_eq!(date, None);
        assert_eq!(time.as_deref(), Some("10:00:00"));
        assert_eq!(day.as_deref(), Some("3"));
    }
}
