// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collection-window resolution from explicit bounds or period shorthands.

use chrono::{DateTime, Duration, Utc};

/// Translate a period shorthand into a day count.
///
/// `today`/`1d` → 1, `7d`/`week`/`weekly` → 7, `30d`/`month` → 30, any
/// other `<N>d` clamps to `[1, 365]`. Unrecognized input falls back to 7.
pub fn period_to_days(period: &str) -> u32 {
    let normalized = period.trim().to_lowercase();
    match normalized.as_str() {
        "today" | "1d" => 1,
        "7d" | "week" | "weekly" => 7,
        "30d" | "month" => 30,
        other => match other.strip_suffix('d').and_then(|n| n.parse::<i64>().ok()) {
            Some(days) => days.clamp(1, 365) as u32,
            None => 7,
        },
    }
}

/// Resolve the RFC 3339 collection window.
///
/// Explicit bounds win when both are present; otherwise the window is
/// `[now - period, now]`.
pub fn resolve_window(
    window_from: &str,
    window_to: &str,
    period: &str,
    now: DateTime<Utc>,
) -> (String, String) {
    let from = window_from.trim();
    let to = window_to.trim();
    if !from.is_empty() && !to.is_empty() {
        return (from.to_string(), to.to_string());
    }
    let days = period_to_days(period);
    let start = now - Duration::days(i64::from(days));
    (start.to_rfc3339(), now.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_periods() {
        assert_eq!(period_to_days("today"), 1);
        assert_eq!(period_to_days("1d"), 1);
        assert_eq!(period_to_days("7d"), 7);
        assert_eq!(period_to_days("WEEK"), 7);
        assert_eq!(period_to_days("30d"), 30);
        assert_eq!(period_to_days("month"), 30);
    }

    #[test]
    fn numeric_periods_are_clamped() {
        assert_eq!(period_to_days("90d"), 90);
        assert_eq!(period_to_days("0d"), 1);
        assert_eq!(period_to_days("9999d"), 365);
    }

    #[test]
    fn unparseable_period_defaults_to_week() {
        assert_eq!(period_to_days(""), 7);
        assert_eq!(period_to_days("fortnight"), 7);
        assert_eq!(period_to_days("xd"), 7);
    }

    #[test]
    fn explicit_bounds_win() {
        let now = Utc::now();
        let (from, to) = resolve_window("2026-01-01T00:00:00Z", "2026-01-31T00:00:00Z", "7d", now);
        assert_eq!(from, "2026-01-01T00:00:00Z");
        assert_eq!(to, "2026-01-31T00:00:00Z");
    }

    #[test]
    fn period_window_spans_requested_days() {
        let now = Utc::now();
        let (from, to) = resolve_window("", "", "30d", now);
        let from: DateTime<Utc> = from.parse().unwrap();
        let to: DateTime<Utc> = to.parse().unwrap();
        assert_eq!((to - from).num_days(), 30);
    }
}
