//! Time builtins. Dates travel as ISO-8601 strings; any unparseable input
//! yields `null` rather than an error.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc};
use serde_json::Value;

use super::{arg, coerce_num, num, opt_str};

pub(super) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "now" => iso(Utc::now()),
        "date" => match date_arg_or_now(args, 0) {
            Some(dt) => Value::String(dt.format("%Y-%m-%d").to_string()),
            None => Value::Null,
        },
        "time" => match date_arg_or_now(args, 0) {
            Some(dt) => Value::String(dt.format("%H:%M:%S").to_string()),
            None => Value::Null,
        },
        "parse_date" => {
            let Some(s) = opt_str(arg(args, 0)) else {
                return Some(Ok(Value::Null));
            };
            let parsed = match opt_str(arg(args, 1)) {
                Some(fmt) => parse_with_format(s, fmt),
                None => parse_iso(s),
            };
            parsed.map_or(Value::Null, iso)
        }
        "format_date" => {
            match (parse_arg(args, 0), opt_str(arg(args, 1))) {
                (Some(dt), Some(fmt)) => Value::String(dt.format(fmt).to_string()),
                (Some(dt), None) => iso(dt),
                _ => Value::Null,
            }
        }
        "add_time" => shift(args, 1),
        "subtract_time" => shift(args, -1),
        "diff" => {
            match (parse_arg(args, 0), parse_arg(args, 1)) {
                (Some(a), Some(b)) => {
                    let unit = opt_str(arg(args, 2)).unwrap_or("milliseconds");
                    let ms = (a - b).num_milliseconds() as f64;
                    match unit_millis(unit) {
                        Some(per) => num((ms / per).trunc()),
                        None => Value::Null,
                    }
                }
                _ => Value::Null,
            }
        }
        "timestamp" => match date_arg_or_now(args, 0) {
            Some(dt) => num(dt.timestamp_millis() as f64),
            None => Value::Null,
        },
        "from_timestamp" => {
            let ms = coerce_num(arg(args, 0)) as i64;
            Utc.timestamp_millis_opt(ms).single().map_or(Value::Null, iso)
        }
        "start_of" => boundary(args, true),
        "end_of" => boundary(args, false),
        "get_part" => {
            match (parse_arg(args, 0), opt_str(arg(args, 1))) {
                (Some(dt), Some(part)) => match part {
                    "year" => num(dt.year() as f64),
                    "month" => num(dt.month() as f64),
                    "day" => num(dt.day() as f64),
                    "hour" => num(dt.hour() as f64),
                    "minute" => num(dt.minute() as f64),
                    "second" => num(dt.second() as f64),
                    // Sunday-start weekday number, matching the scripting
                    // convention templates usually assume.
                    "weekday" => num(dt.weekday().num_days_from_sunday() as f64),
                    "day_of_year" => num(dt.ordinal() as f64),
                    _ => Value::Null,
                },
                _ => Value::Null,
            }
        }
        "is_before" => match (parse_arg(args, 0), parse_arg(args, 1)) {
            (Some(a), Some(b)) => Value::Bool(a < b),
            _ => Value::Bool(false),
        },
        "is_after" => match (parse_arg(args, 0), parse_arg(args, 1)) {
            (Some(a), Some(b)) => Value::Bool(a > b),
            _ => Value::Bool(false),
        },
        "relative" => match parse_arg(args, 0) {
            Some(dt) => Value::String(relative_label(dt, Utc::now())),
            None => Value::Null,
        },
        _ => return None,
    };
    Some(Ok(result))
}

fn iso(dt: DateTime<Utc>) -> Value {
    Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn parse_arg(args: &[Value], i: usize) -> Option<DateTime<Utc>> {
    opt_str(arg(args, i)).and_then(parse_iso)
}

/// Missing/`null` argument means "now"; a present but invalid argument is
/// a parse failure.
fn date_arg_or_now(args: &[Value], i: usize) -> Option<DateTime<Utc>> {
    match arg(args, i) {
        Value::Null => Some(Utc::now()),
        other => opt_str(other).and_then(parse_iso),
    }
}

pub(crate) fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

fn parse_with_format(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

fn unit_millis(unit: &str) -> Option<f64> {
    match unit {
        "ms" | "millisecond" | "milliseconds" => Some(1.0),
        "s" | "second" | "seconds" => Some(1_000.0),
        "m" | "minute" | "minutes" => Some(60_000.0),
        "h" | "hour" | "hours" => Some(3_600_000.0),
        "d" | "day" | "days" => Some(86_400_000.0),
        "w" | "week" | "weeks" => Some(604_800_000.0),
        _ => None,
    }
}

fn shift(args: &[Value], direction: i64) -> Value {
    let Some(dt) = parse_arg(args, 0) else {
        return Value::Null;
    };
    let amount = coerce_num(arg(args, 1)) as i64 * direction;
    let unit = opt_str(arg(args, 2)).unwrap_or("milliseconds");
    let shifted = match unit {
        "month" | "months" => {
            if amount >= 0 {
                dt.checked_add_months(Months::new(amount as u32))
            } else {
                dt.checked_sub_months(Months::new((-amount) as u32))
            }
        }
        "year" | "years" => {
            let months = amount * 12;
            if months >= 0 {
                dt.checked_add_months(Months::new(months as u32))
            } else {
                dt.checked_sub_months(Months::new((-months) as u32))
            }
        }
        other => unit_millis(other)
            .map(|per| dt + Duration::milliseconds(amount * per as i64)),
    };
    shifted.map_or(Value::Null, iso)
}

fn boundary(args: &[Value], start: bool) -> Value {
    let Some(dt) = parse_arg(args, 0) else {
        return Value::Null;
    };
    let unit = opt_str(arg(args, 1)).unwrap_or("day");
    let floored = match unit {
        "minute" => dt.with_second(0).and_then(|d| d.with_nanosecond(0)),
        "hour" => dt
            .with_minute(0)
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0)),
        "day" => day_start(dt),
        "week" => {
            let days_from_monday = dt.weekday().num_days_from_monday() as i64;
            day_start(dt - Duration::days(days_from_monday))
        }
        "month" => dt.with_day(1).and_then(day_start),
        "year" => dt.with_day(1).and_then(|d| d.with_month(1)).and_then(day_start),
        _ => None,
    };
    let Some(floored) = floored else {
        return Value::Null;
    };
    if start {
        return iso(floored);
    }
    // End of the unit: start of the next one, minus a millisecond.
    let next = match unit {
        "minute" => Some(floored + Duration::minutes(1)),
        "hour" => Some(floored + Duration::hours(1)),
        "day" => Some(floored + Duration::days(1)),
        "week" => Some(floored + Duration::weeks(1)),
        "month" => floored.checked_add_months(Months::new(1)),
        "year" => floored.checked_add_months(Months::new(12)),
        _ => None,
    };
    next.map_or(Value::Null, |n| iso(n - Duration::milliseconds(1)))
}

fn day_start(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    dt.with_hour(0)?
        .with_minute(0)?
        .with_second(0)?
        .with_nanosecond(0)
}

fn relative_label(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now - dt;
    let past = delta >= Duration::zero();
    let delta = if past { delta } else { -delta };
    let seconds = delta.num_seconds();
    let phrase = if seconds < 45 {
        return "just now".to_string();
    } else if seconds < 90 {
        "a minute".to_string()
    } else if seconds < 3_600 {
        format!("{} minutes", delta.num_minutes())
    } else if seconds < 7_200 {
        "an hour".to_string()
    } else if seconds < 86_400 {
        format!("{} hours", delta.num_hours())
    } else if seconds < 172_800 {
        "a day".to_string()
    } else if seconds < 2_592_000 {
        format!("{} days", delta.num_days())
    } else if seconds < 31_536_000 {
        format!("{} months", delta.num_days() / 30)
    } else {
        format!("{} years", delta.num_days() / 365)
    };
    if past {
        format!("{phrase} ago")
    } else {
        format!("in {phrase}")
    }
}

#[cfg(test)]
mod tests {
    use super::super::call;
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_and_format() {
        let parsed = call("parse_date", &[json!("2024-03-05")]).unwrap();
        assert_eq!(parsed, json!("2024-03-05T00:00:00.000Z"));
        let formatted = call(
            "format_date",
            &[json!("2024-03-05T10:20:30Z"), json!("%d/%m/%Y")],
        )
        .unwrap();
        assert_eq!(formatted, json!("05/03/2024"));
    }

    #[test]
    fn invalid_input_is_null() {
        assert_eq!(call("parse_date", &[json!("not a date")]).unwrap(), json!(null));
        assert_eq!(call("format_date", &[json!(null), json!("%Y")]).unwrap(), json!(null));
        assert_eq!(call("diff", &[json!("bad"), json!("2024-01-01")]).unwrap(), json!(null));
    }

    #[test]
    fn arithmetic() {
        let shifted = call(
            "add_time",
            &[json!("2024-01-31T00:00:00Z"), json!(1), json!("months")],
        )
        .unwrap();
        assert_eq!(shifted, json!("2024-02-29T00:00:00.000Z"));
        let diff = call(
            "diff",
            &[json!("2024-01-02T00:00:00Z"), json!("2024-01-01T00:00:00Z"), json!("hours")],
        )
        .unwrap();
        assert_eq!(diff, json!(24));
    }

    #[test]
    fn boundaries() {
        assert_eq!(
            call("start_of", &[json!("2024-03-05T10:20:30Z"), json!("month")]).unwrap(),
            json!("2024-03-01T00:00:00.000Z")
        );
        assert_eq!(
            call("end_of", &[json!("2024-03-05T10:20:30Z"), json!("day")]).unwrap(),
            json!("2024-03-05T23:59:59.999Z")
        );
    }

    #[test]
    fn ordering_and_parts() {
        assert_eq!(
            call("is_before", &[json!("2024-01-01"), json!("2024-06-01")]).unwrap(),
            json!(true)
        );
        assert_eq!(
            call("get_part", &[json!("2024-03-05T10:20:30Z"), json!("month")]).unwrap(),
            json!(3)
        );
        // 2024-03-05 is a Tuesday.
        assert_eq!(
            call("get_part", &[json!("2024-03-05"), json!("weekday")]).unwrap(),
            json!(2)
        );
    }

    #[test]
    fn relative_labels() {
        let now = Utc::now();
        assert_eq!(relative_label(now, now), "just now");
        assert_eq!(
            relative_label(now - Duration::hours(5), now),
            "5 hours ago"
        );
        assert_eq!(relative_label(now + Duration::days(3), now), "in 3 days");
    }
}
