use std::sync::LazyLock;

use chrono::{Local, NaiveDate, NaiveTime, TimeZone, Timelike};
use regex::Regex;

static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})").expect("valid clock time regex"));

/// This is the standard way of converting a date to a string in kairos. Every file name for a date
/// starts with it.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a leading `H:MM`/`HH:MM` out of a string. Anything after the minutes is ignored, so
/// `"09:30 <u1>"` gives `09:30`.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let captures = CLOCK_TIME.captures(value.trim())?;
    let hours = captures[1].parse::<u32>().ok()?;
    let minutes = captures[2].parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

pub fn format_clock_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Minutes passed since midnight. Seconds are truncated.
pub fn minutes_of_day(time: NaiveTime) -> i64 {
    i64::from(time.hour()) * 60 + i64::from(time.minute())
}

/// Milliseconds timestamp of `time` on `date` in the local timezone. Used when a value is set
/// without a precise moment supplied by the caller.
pub fn local_timestamp_millis(date: NaiveDate, time: NaiveTime) -> Option<i64> {
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|v| v.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{date_to_record_name, local_timestamp_millis, minutes_of_day, parse_clock_time};

    #[test]
    fn test_parse_clock_time_variants() {
        assert_eq!(parse_clock_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock_time(" 9:05 <u12>"), NaiveTime::from_hms_opt(9, 5, 0));
        assert_eq!(parse_clock_time("<end-1>"), None);
        assert_eq!(parse_clock_time("25:00"), None);
        assert_eq!(parse_clock_time(""), None);
    }

    #[test]
    fn test_minutes_and_names() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        assert_eq!(date_to_record_name(date), "2025-11-10");
        assert_eq!(minutes_of_day(NaiveTime::from_hms_opt(14, 30, 59).unwrap()), 870);
    }

    #[test]
    fn test_local_timestamp_is_ordered() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let nine = local_timestamp_millis(date, NaiveTime::from_hms_opt(9, 0, 0).unwrap()).unwrap();
        let ten = local_timestamp_millis(date, NaiveTime::from_hms_opt(10, 0, 0).unwrap()).unwrap();
        assert_eq!(ten - nine, 60 * 60 * 1000);
    }
}
