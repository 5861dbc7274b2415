//! Date coercions for the `date.*` operations.
//!
//! Dates travel through remappers as RFC 3339 UTC strings with millisecond
//! precision (`2024-03-01T12:00:00.000Z`).

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::Value as JsonValue;

/// Calendar months plus a fixed number of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateDuration {
    pub months: i32,
    pub millis: i64,
}

/// Parse durations such as `1w`, `2d 3h`, `-90min`, `1y6mo`.
///
/// Units: `ms`, `s`, `m`/`min`, `h`, `d`, `w`, `mo`, `y`.
pub fn parse_duration(source: &str) -> Option<DateDuration> {
    let mut duration = DateDuration::default();
    let mut rest = source.trim();
    if rest.is_empty() {
        return None;
    }

    while !rest.is_empty() {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }
        let (sign, unsigned) = match rest.as_bytes()[0] {
            b'-' => (-1i64, &rest[1..]),
            b'+' => (1, &rest[1..]),
            _ => (1, rest),
        };
        let digits_end = unsigned
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(unsigned.len());
        if digits_end == 0 {
            return None;
        }
        let amount: i64 = unsigned[..digits_end].parse().ok()?;
        let after_digits = unsigned[digits_end..].trim_start();
        let unit_end = after_digits
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after_digits.len());
        let unit = &after_digits[..unit_end];
        let amount = amount.checked_mul(sign)?;

        let millis_per_unit: i64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" | "min" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            "w" => 604_800_000,
            "mo" => {
                duration.months = duration.months.checked_add(i32::try_from(amount).ok()?)?;
                rest = &after_digits[unit_end..];
                continue;
            }
            "y" => {
                let months = i32::try_from(amount.checked_mul(12)?).ok()?;
                duration.months = duration.months.checked_add(months)?;
                rest = &after_digits[unit_end..];
                continue;
            }
            _ => return None,
        };
        duration.millis = duration
            .millis
            .checked_add(amount.checked_mul(millis_per_unit)?)?;
        rest = &after_digits[unit_end..];
    }
    Some(duration)
}

/// True when `format` only contains valid strftime specifiers.
pub fn is_valid_format(format: &str) -> bool {
    StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

/// Coerce a JSON value into a UTC instant.
///
/// Strings are read as RFC 3339, ISO-8601 date-time without offset (taken
/// as UTC) or a plain date; numbers as Unix epoch milliseconds. With a
/// `format`, strings are parsed by that strftime pattern instead.
pub fn parse_date(value: &JsonValue, format: Option<&str>) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => {
            let s = s.trim();
            match format {
                Some(format) => parse_with_format(s, format),
                None => parse_iso(s),
            }
        }
        JsonValue::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_with_format(s: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, format) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn add_duration(date: DateTime<Utc>, duration: DateDuration) -> Option<DateTime<Utc>> {
    let months = duration.months.unsigned_abs();
    let shifted = if duration.months >= 0 {
        date.checked_add_months(Months::new(months))?
    } else {
        date.checked_sub_months(Months::new(months))?
    };
    shifted.checked_add_signed(TimeDelta::try_milliseconds(duration.millis)?)
}

/// Format an instant; `None` gives RFC 3339 with milliseconds.
///
/// `format` must have been checked with [`is_valid_format`].
pub fn format_date(date: DateTime<Utc>, format: Option<&str>) -> String {
    match format {
        Some(format) => date.format(format).to_string(),
        None => date.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}
