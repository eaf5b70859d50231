//! Field normalizer — pure, total transforms from raw CSV cells to
//! canonical values. Nothing here errors: unparseable numbers come back as
//! `NaN` and malformed strings pass through, so the validator downstream
//! rejects the whole record with a field-level message.

use chrono::NaiveDate;

/// Remove one pair of wrapping double quotes and surrounding whitespace.
#[must_use]
pub fn strip_quotes_and_trim(raw: &str) -> String {
    let s = raw.trim();
    let s = if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    };
    s.trim().to_string()
}

/// Lenient decimal parse; `NaN` for empty or garbled input.
#[must_use]
pub fn parse_number(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse a percentage cell that may carry a trailing `%` sign.
#[must_use]
pub fn parse_percentage(raw: &str) -> f64 {
    parse_number(raw.trim().trim_end_matches('%'))
}

/// True for exactly `HH:MM` with both parts zero-padded.
#[must_use]
pub fn is_clock_time(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 5
        && b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[2] == b':'
        && b[3].is_ascii_digit()
        && b[4].is_ascii_digit()
}

/// Left-pad a single-digit hour: `9:05` becomes `09:05`. Anything that is
/// not `H:MM` passes through unchanged.
#[must_use]
pub fn normalize_clock_time(raw: &str) -> String {
    let b = raw.as_bytes();
    if b.len() == 4
        && b[0].is_ascii_digit()
        && b[1] == b':'
        && b[2].is_ascii_digit()
        && b[3].is_ascii_digit()
    {
        format!("0{raw}")
    } else {
        raw.to_string()
    }
}

/// Convert a valid `HH:MM` to minutes since midnight.
#[must_use]
pub fn time_to_minutes(s: &str) -> Option<i64> {
    if !is_clock_time(s) {
        return None;
    }
    let hours: i64 = s[..2].parse().ok()?;
    let minutes: i64 = s[3..].parse().ok()?;
    Some(hours * 60 + minutes)
}

/// Minutes asleep between bed time and wake time. A wake time earlier in
/// the day than the bed time is shifted forward 24 hours — at most one
/// midnight crossing is representable.
#[must_use]
pub fn compute_duration_minutes(bed: &str, wake: &str) -> Option<i64> {
    let bed_min = time_to_minutes(bed)?;
    let mut wake_min = time_to_minutes(wake)?;
    if wake_min < bed_min {
        wake_min += 24 * 60;
    }
    Some(wake_min - bed_min)
}

/// Resolve the sleep duration for an import row.
///
/// The raw field may be plain integer minutes (`450`), an hours:minutes
/// value (`7:30`), or missing/garbled. When it cannot be used, the duration
/// falls back to the bed/wake interval, and to `0` when that is unusable
/// too (the validator rejects zero durations).
#[must_use]
pub fn resolve_duration(raw: &str, bed: &str, wake: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(minutes) = raw.parse::<i64>() {
        return minutes;
    }
    if let Some((h, m)) = raw.split_once(':') {
        if let (Ok(h), Ok(m)) = (h.trim().parse::<i64>(), m.trim().parse::<i64>()) {
            return h * 60 + m;
        }
    }
    compute_duration_minutes(bed, wake).unwrap_or(0)
}

/// Canonicalize date separators: `2024/01/05` becomes `2024-01-05`.
#[must_use]
pub fn normalize_date(raw: &str) -> String {
    raw.replace('/', "-")
}

/// True when `s` has the `YYYY-MM-DD` shape and names a real calendar date.
#[must_use]
pub fn looks_like_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
        && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_quotes_and_trim() {
        assert_eq!(strip_quotes_and_trim("\"日付\""), "日付");
        assert_eq!(strip_quotes_and_trim("  23:30 "), "23:30");
        assert_eq!(strip_quotes_and_trim(" \" 85 \" "), "85");
        assert_eq!(strip_quotes_and_trim(""), "");
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("45%"), 45.0);
        assert_eq!(parse_percentage("45"), 45.0);
        assert_eq!(parse_percentage("22.5%"), 22.5);
        assert!(parse_percentage("abc").is_nan());
        assert!(parse_percentage("").is_nan());
    }

    #[test]
    fn test_parse_number_garbage_is_nan() {
        assert_eq!(parse_number("85"), 85.0);
        assert!(parse_number("eighty").is_nan());
        assert!(parse_number("").is_nan());
    }

    #[test]
    fn test_normalize_clock_time() {
        assert_eq!(normalize_clock_time("9:05"), "09:05");
        assert_eq!(normalize_clock_time("09:05"), "09:05");
        assert_eq!(normalize_clock_time("23:30"), "23:30");
        // Not H:MM — passes through for the validator to reject
        assert_eq!(normalize_clock_time("9:5"), "9:5");
        assert_eq!(normalize_clock_time("late"), "late");
    }

    #[test]
    fn test_is_clock_time() {
        assert!(is_clock_time("09:05"));
        assert!(is_clock_time("23:59"));
        assert!(!is_clock_time("9:05"));
        assert!(!is_clock_time("09-05"));
        assert!(!is_clock_time(""));
    }

    #[test]
    fn test_compute_duration_crossing_midnight() {
        assert_eq!(compute_duration_minutes("23:30", "00:15"), Some(45));
        assert_eq!(compute_duration_minutes("23:30", "07:00"), Some(450));
    }

    #[test]
    fn test_compute_duration_same_day() {
        assert_eq!(compute_duration_minutes("22:00", "23:00"), Some(60));
    }

    #[test]
    fn test_compute_duration_invalid_times() {
        assert_eq!(compute_duration_minutes("late", "07:00"), None);
        assert_eq!(compute_duration_minutes("23:30", ""), None);
    }

    #[test]
    fn test_resolve_duration_plain_minutes() {
        assert_eq!(resolve_duration("450", "23:30", "07:00"), 450);
    }

    #[test]
    fn test_resolve_duration_hours_minutes() {
        assert_eq!(resolve_duration("7:30", "00:00", "00:00"), 450);
        assert_eq!(resolve_duration("07:30", "00:00", "00:00"), 450);
    }

    #[test]
    fn test_resolve_duration_falls_back_to_times() {
        assert_eq!(resolve_duration("", "23:30", "07:15"), 465);
        assert_eq!(resolve_duration("n/a", "22:00", "23:00"), 60);
    }

    #[test]
    fn test_resolve_duration_nothing_usable() {
        assert_eq!(resolve_duration("", "", ""), 0);
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2024/01/05"), "2024-01-05");
        assert_eq!(normalize_date("2024-01-05"), "2024-01-05");
    }

    #[test]
    fn test_looks_like_date() {
        assert!(looks_like_date("2024-01-05"));
        assert!(!looks_like_date("2024-1-5"));
        assert!(!looks_like_date("2024-13-01"));
        assert!(!looks_like_date("日付"));
    }
}
