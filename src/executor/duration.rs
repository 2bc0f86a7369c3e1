//! Duration parsing for `delay`, `timeout`, and checkpoint deadlines.
//!
//! Accepted forms:
//! - ISO-8601: `PT30S`, `PT1H30M`, `P1D`, `P2W`, `P1DT12H`
//! - shorthand: `500ms`, `5s`, `2m`, `1h`, `3d`, and composites (`1h30m`)
//! - bare numbers, interpreted as milliseconds
//!
//! Zero, negative, and unparseable inputs are rejected (`None`).

use std::time::Duration;

/// Parse a duration string; `None` when invalid or non-positive.
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let millis = if raw.starts_with('P') || raw.starts_with('p') {
        parse_iso(raw)?
    } else if raw.chars().all(|c| c.is_ascii_digit()) {
        raw.parse::<u64>().ok()?
    } else {
        parse_shorthand(raw)?
    };

    if millis == 0 {
        return None;
    }
    Some(Duration::from_millis(millis))
}

/// `P[nW]` or `P[nD][T[nH][nM][nS]]`, fractions allowed on seconds.
fn parse_iso(raw: &str) -> Option<u64> {
    let rest = &raw[1..];
    let mut millis = 0u64;
    let mut in_time = false;
    let mut number = String::new();
    let mut matched = false;

    for c in rest.chars() {
        match c {
            'T' | 't' => {
                if in_time || !number.is_empty() {
                    return None;
                }
                in_time = true;
            }
            '0'..='9' | '.' => number.push(c),
            unit => {
                let value: f64 = number.parse().ok()?;
                number.clear();
                let per: f64 = match (unit.to_ascii_uppercase(), in_time) {
                    ('W', false) => 604_800_000.0,
                    ('D', false) => 86_400_000.0,
                    ('H', true) => 3_600_000.0,
                    ('M', true) => 60_000.0,
                    ('S', true) => 1_000.0,
                    _ => return None,
                };
                millis = millis.checked_add((value * per) as u64)?;
                matched = true;
            }
        }
    }
    if !number.is_empty() || !matched {
        return None;
    }
    Some(millis)
}

/// `500ms`, `5s`, `2m`, `1h`, `3d`, and composites like `1h30m`.
fn parse_shorthand(raw: &str) -> Option<u64> {
    let mut millis = 0u64;
    let mut chars = raw.chars().peekable();
    let mut matched = false;

    while chars.peek().is_some() {
        let mut number = String::new();
        while chars.peek().is_some_and(|c| c.is_ascii_digit() || *c == '.') {
            number.push(chars.next().expect("peeked"));
        }
        if number.is_empty() {
            return None;
        }
        let value: f64 = number.parse().ok()?;

        let mut unit = String::new();
        while chars.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            // `ms` must not swallow the `m` of a following `5m`; units are
            // at most two letters and unambiguous left-to-right.
            unit.push(chars.next().expect("peeked"));
            if unit == "ms" || (unit.len() == 1 && !chars.peek().is_some_and(|c| *c == 's')) {
                break;
            }
        }
        let per: f64 = match unit.as_str() {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "d" => 86_400_000.0,
            _ => return None,
        };
        millis = millis.checked_add((value * per) as u64)?;
        matched = true;
    }
    if matched { Some(millis) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_durations() {
        assert_eq!(parse_duration("PT30S"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("P1D"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("P2W"), Some(Duration::from_secs(1_209_600)));
        assert_eq!(parse_duration("P1DT12H"), Some(Duration::from_secs(129_600)));
        assert_eq!(parse_duration("PT0.5S"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn shorthand_durations() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
    }

    #[test]
    fn bare_numbers_are_milliseconds() {
        assert_eq!(parse_duration("250"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_invalid_and_non_positive() {
        for bad in ["", "0", "0s", "-5s", "fast", "5x", "P", "PT", "1.2.3s", "T30S"] {
            assert_eq!(parse_duration(bad), None, "{bad} should be rejected");
        }
    }
}
