//! Formatting helpers for weather readings.
//!
//! Condition codes follow the WMO table used by Open-Meteo. Icons are Font
//! Awesome class strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

pub const PLACEHOLDER: &str = "-";

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

const ARROWS: [&str; 8] = ["↑", "↗", "→", "↘", "↓", "↙", "←", "↖"];

pub fn code_to_text(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 => "Snow",
        77 => "Snow grains",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96..=99 => "Thunderstorm w/ hail",
        _ => "Unknown",
    }
}

pub fn code_to_icon(code: i64, is_day: bool) -> &'static str {
    match code {
        0 if is_day => "fa-solid fa-sun",
        0 => "fa-solid fa-moon",
        1 | 2 if is_day => "fa-solid fa-cloud-sun",
        1 | 2 => "fa-solid fa-cloud-moon",
        3 => "fa-solid fa-cloud",
        45 | 48 => "fa-solid fa-smog",
        51 | 53 | 55 | 56 | 57 | 61 | 63 | 65 | 66 | 67 | 80..=82 => "fa-solid fa-cloud-rain",
        71 | 73 | 75 | 77 | 85 | 86 => "fa-solid fa-snowflake",
        95..=99 => "fa-solid fa-cloud-bolt",
        _ => "fa-solid fa-cloud",
    }
}

fn bucket(deg: f64, buckets: usize) -> Option<usize> {
    if !deg.is_finite() {
        return None;
    }
    let width = 360.0 / buckets as f64;
    // Halves round toward positive infinity.
    let index = (deg / width + 0.5).floor() as i64;
    Some(index.rem_euclid(buckets as i64) as usize)
}

/// Nearest of the 16 compass points, wrapping past 360 and below 0.
pub fn deg_to_compass(deg: f64) -> &'static str {
    bucket(deg, COMPASS_POINTS.len())
        .map(|index| COMPASS_POINTS[index])
        .unwrap_or(PLACEHOLDER)
}

pub fn deg_to_arrow(deg: f64) -> &'static str {
    bucket(deg, ARROWS.len())
        .map(|index| ARROWS[index])
        .unwrap_or(PLACEHOLDER)
}

fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

/// Short weekday for a `YYYY-MM-DD` date, e.g. `Fri`.
pub fn fmt_day(date: &str) -> String {
    parse_date(date)
        .map(|day| day.format("%a").to_string())
        .unwrap_or_else(|| date.to_string())
}

/// Month and day for a `YYYY-MM-DD` date, e.g. `Oct 16`.
pub fn fmt_date_short(date: &str) -> String {
    parse_date(date)
        .map(|day| day.format("%b %-d").to_string())
        .unwrap_or_else(|| date.to_string())
}

/// Accepts epoch milliseconds, RFC 3339, or a zone-less
/// `YYYY-MM-DDTHH:MM[:SS]` read as local time in `tz`.
pub fn parse_timestamp(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(tz));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(tz));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(raw, pattern).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
}

/// Hour only, e.g. `3 PM`.
pub fn fmt_time(ts: &str, tz: &Tz) -> String {
    parse_timestamp(ts, tz)
        .map(|dt| dt.format("%-I %p").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Hour and minute, e.g. `3:05 PM`.
pub fn fmt_hm(ts: &str, tz: &Tz) -> String {
    parse_timestamp(ts, tz)
        .map(|dt| dt.format("%-I:%M %p").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub fn round_reading(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_text_table() {
        assert_eq!(code_to_text(0), "Clear sky");
        assert_eq!(code_to_text(2), "Partly cloudy");
        assert_eq!(code_to_text(48), "Fog");
        assert_eq!(code_to_text(66), "Freezing rain");
        assert_eq!(code_to_text(81), "Rain showers");
        assert_eq!(code_to_text(99), "Thunderstorm w/ hail");
        assert_eq!(code_to_text(999), "Unknown");
        assert_eq!(code_to_text(-1), "Unknown");
    }

    #[test]
    fn code_icons_follow_daylight() {
        assert_eq!(code_to_icon(0, true), "fa-solid fa-sun");
        assert_eq!(code_to_icon(0, false), "fa-solid fa-moon");
        assert_eq!(code_to_icon(2, false), "fa-solid fa-cloud-moon");
        assert_eq!(code_to_icon(57, true), "fa-solid fa-cloud-rain");
        assert_eq!(code_to_icon(86, true), "fa-solid fa-snowflake");
        assert_eq!(code_to_icon(95, false), "fa-solid fa-cloud-bolt");
        assert_eq!(code_to_icon(4, true), "fa-solid fa-cloud");
    }

    #[test]
    fn compass_rounds_and_wraps() {
        assert_eq!(deg_to_compass(0.0), "N");
        assert_eq!(deg_to_compass(361.0), "N");
        assert_eq!(deg_to_compass(11.0), "N");
        assert_eq!(deg_to_compass(12.0), "NNE");
        assert_eq!(deg_to_compass(180.0), "S");
        assert_eq!(deg_to_compass(350.0), "N");
        assert_eq!(deg_to_compass(-90.0), "W");
        assert_eq!(deg_to_compass(f64::NAN), PLACEHOLDER);
    }

    #[test]
    fn bearing_halfway_between_points_rounds_up() {
        assert_eq!(deg_to_compass(11.25), "NNE");
        assert_eq!(deg_to_compass(-11.25), "N");
        assert_eq!(deg_to_compass(-33.75), "NNW");
        assert_eq!(deg_to_arrow(22.5), "↗");
        assert_eq!(deg_to_arrow(-22.5), "↑");
    }

    #[test]
    fn arrows_use_eight_directions() {
        assert_eq!(deg_to_arrow(90.0), "→");
        assert_eq!(deg_to_arrow(0.0), "↑");
        assert_eq!(deg_to_arrow(225.0), "↙");
        assert_eq!(deg_to_arrow(359.0), "↑");
        assert_eq!(deg_to_arrow(f64::INFINITY), PLACEHOLDER);
    }

    #[test]
    fn date_only_formatting() {
        assert_eq!(fmt_day("2026-10-16"), "Fri");
        assert_eq!(fmt_date_short("2026-10-06"), "Oct 6");
        assert_eq!(fmt_day("soon"), "soon");
    }

    #[test]
    fn timestamps_render_in_timezone() {
        let tz = chrono_tz::America::New_York;
        assert_eq!(fmt_time("2026-10-16T15:00", &tz), "3 PM");
        assert_eq!(fmt_hm("2026-10-16T19:05:00Z", &tz), "3:05 PM");
        assert_eq!(fmt_hm("0", &chrono_tz::UTC), "12:00 AM");
        assert_eq!(fmt_time("later", &tz), "later");
    }

    #[test]
    fn readings_round_to_nearest() {
        assert_eq!(round_reading(12.5), Some(13));
        assert_eq!(round_reading(-0.4), Some(0));
        assert_eq!(round_reading(f64::NAN), None);
    }
}
