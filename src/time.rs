//! Resolution of the `precise::...` / `relative::...` date expressions used
//! by time-based conditions.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::{BotError, BotResult};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%B %d %Y", "%b %d, %Y", "%b %d %Y", "%d %B %Y",
    "%d %b %Y",
];

const KIND_HINT: &str = "use 'precise::2016-01-01' or 'relative::yesterday'";

/// A tagged date expression, `"<kind>::<text>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateExpr {
    Precise(String),
    Relative(String),
}

impl DateExpr {
    pub fn parse(expr: &str) -> BotResult<Self> {
        let unknown = || {
            BotError::config(format!("unknown date string type in '{expr}'; {KIND_HINT}"))
        };
        let (kind, text) = expr.split_once("::").ok_or_else(unknown)?;
        match kind.trim() {
            "precise" => Ok(DateExpr::Precise(text.to_string())),
            "relative" => Ok(DateExpr::Relative(text.to_string())),
            _ => Err(unknown()),
        }
    }

    /// Resolves the expression to a concrete instant; relative expressions
    /// are anchored at `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> BotResult<DateTime<Utc>> {
        match self {
            DateExpr::Precise(text) => parse_precise(text).ok_or_else(|| BotError::Parse {
                kind: "precise",
                input: text.clone(),
            }),
            DateExpr::Relative(text) => parse_relative(text, now).ok_or_else(|| BotError::Parse {
                kind: "relative",
                input: text.clone(),
            }),
        }
    }
}

/// Signed number of seconds from the resolved expression to `subject`.
///
/// Negative means `subject` lies before the resolved instant, so
/// `seconds_relative_to(created, "relative::7 days ago") < 0` reads as
/// "created more than seven days ago".
pub fn seconds_relative_to(
    subject: DateTime<Utc>,
    expr: &str,
    now: DateTime<Utc>,
) -> BotResult<i64> {
    let compare_against = DateExpr::parse(expr)?.resolve(now)?;
    Ok((subject - compare_against).num_seconds())
}

fn parse_precise(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim().to_lowercase();

    match text.as_str() {
        "now" | "today" => return Some(now),
        "yesterday" => return shift(now, -1, "day"),
        "tomorrow" => return shift(now, 1, "day"),
        _ => {}
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    match words.as_slice() {
        [amount, unit, "ago"] => shift(now, -parse_amount(amount)?, unit),
        ["in", amount, unit] | [amount, unit, "from", "now"] | [amount, unit] => {
            shift(now, parse_amount(amount)?, unit)
        }
        ["last", unit] => shift(now, -1, unit),
        ["next", unit] => shift(now, 1, unit),
        _ => None,
    }
}

fn parse_amount(word: &str) -> Option<i64> {
    match word {
        "a" | "an" | "one" => Some(1),
        _ => word.parse::<i64>().ok().filter(|n| *n >= 0),
    }
}

fn shift(now: DateTime<Utc>, amount: i64, unit: &str) -> Option<DateTime<Utc>> {
    let unit = unit.strip_suffix('s').filter(|u| !u.is_empty()).unwrap_or(unit);

    let delta = match unit {
        "second" | "sec" | "s" => TimeDelta::try_seconds(amount),
        "minute" | "min" | "m" => TimeDelta::try_minutes(amount),
        "hour" | "hr" | "h" => TimeDelta::try_hours(amount),
        "day" | "d" => TimeDelta::try_days(amount),
        "week" | "wk" | "w" => TimeDelta::try_weeks(amount),
        "month" | "mo" => return shift_months(now, amount),
        "year" | "yr" | "y" => return shift_months(now, amount.checked_mul(12)?),
        _ => None,
    }?;

    now.checked_add_signed(delta)
}

fn shift_months(now: DateTime<Utc>, amount: i64) -> Option<DateTime<Utc>> {
    let months = Months::new(u32::try_from(amount.unsigned_abs()).ok()?);
    if amount < 0 {
        now.checked_sub_months(months)
    } else {
        now.checked_add_months(months)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn resolve(expr: &str) -> BotResult<DateTime<Utc>> {
        DateExpr::parse(expr)?.resolve(fixed_now())
    }

    #[test]
    fn test_relative_named_days() {
        let now = fixed_now();
        assert_eq!(resolve("relative::today").unwrap(), now);
        assert_eq!(resolve("relative::now").unwrap(), now);
        assert_eq!(resolve("relative::yesterday").unwrap(), now - TimeDelta::days(1));
        assert_eq!(resolve("relative::tomorrow").unwrap(), now + TimeDelta::days(1));
    }

    #[test]
    fn test_relative_amounts() {
        let now = fixed_now();
        assert_eq!(resolve("relative::7 days ago").unwrap(), now - TimeDelta::days(7));
        assert_eq!(resolve("relative::168 hours ago").unwrap(), now - TimeDelta::hours(168));
        assert_eq!(resolve("relative::1 week ago").unwrap(), now - TimeDelta::weeks(1));
        assert_eq!(resolve("relative::an hour ago").unwrap(), now - TimeDelta::hours(1));
        assert_eq!(resolve("relative::in 2 days").unwrap(), now + TimeDelta::days(2));
        assert_eq!(resolve("relative::3 days from now").unwrap(), now + TimeDelta::days(3));
        assert_eq!(resolve("relative::0 days ago").unwrap(), now);
        assert_eq!(resolve("relative:: 2 Days Ago ").unwrap(), now - TimeDelta::days(2));
    }

    #[test]
    fn test_relative_calendar_units() {
        assert_eq!(
            resolve("relative::1 month ago").unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 15, 12, 0, 0).unwrap()
        );
        assert_eq!(
            resolve("relative::2 years ago").unwrap(),
            Utc.with_ymd_and_hms(2022, 3, 15, 12, 0, 0).unwrap()
        );
        assert_eq!(
            resolve("relative::next month").unwrap(),
            Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_relative_unparseable() {
        for text in ["someday", "7 fortnights ago", "-3 days ago", "days ago", ""] {
            let err = resolve(&format!("relative::{text}")).unwrap_err();
            assert!(
                matches!(err, BotError::Parse { kind: "relative", .. }),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_precise_formats() {
        let midnight = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(resolve("precise::2016-01-01").unwrap(), midnight);
        assert_eq!(resolve("precise::2016/01/01").unwrap(), midnight);
        assert_eq!(resolve("precise::January 1, 2016").unwrap(), midnight);
        assert_eq!(resolve("precise::1 Jan 2016").unwrap(), midnight);
        assert_eq!(
            resolve("precise::2016-01-01T10:30:00Z").unwrap(),
            Utc.with_ymd_and_hms(2016, 1, 1, 10, 30, 0).unwrap()
        );
        assert_eq!(
            resolve("precise::2016-01-01T10:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2016, 1, 1, 8, 30, 0).unwrap()
        );
        assert_eq!(
            resolve("precise::2016-01-01 10:30").unwrap(),
            Utc.with_ymd_and_hms(2016, 1, 1, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_precise_unparseable() {
        let err = resolve("precise::not a date").unwrap_err();
        assert!(matches!(err, BotError::Parse { kind: "precise", .. }));
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        for expr in ["fuzzy::yesterday", "yesterday", "::today"] {
            assert!(matches!(
                DateExpr::parse(expr),
                Err(BotError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_seconds_relative_to_sign() {
        let now = fixed_now();
        let created = now - TimeDelta::days(10);
        let secs = seconds_relative_to(created, "relative::7 days ago", now).unwrap();
        assert_eq!(secs, -TimeDelta::days(3).num_seconds());

        let secs = seconds_relative_to(now, "relative::yesterday", now).unwrap();
        assert_eq!(secs, TimeDelta::days(1).num_seconds());
    }
}
